//! Transparent exchange of raw contactless frames
//!
//! PC/SC Part 3 lets a reader pass NFC-A or NFC-F frames straight to the card
//! inside a transparent session. Commands carry BER-TLV data objects: the
//! session is opened with `81 00` and closed with `82 00` through MANAGE
//! SESSION, and each frame travels in a Transceive object (`95`). The reply
//! holds a generic error status (`C0`) and the card's answer (`97`).

use bytes::Bytes;
use iso7816_tlv::ber::{Tag, Tlv, Value};
use tapread_core::apdu::StatusWord;

use crate::error::PcscError;

const MANAGE_SESSION: [u8; 4] = [0xFF, 0xC2, 0x00, 0x00];
const TRANSPARENT_EXCHANGE: [u8; 4] = [0xFF, 0xC2, 0x00, 0x01];

const START_SESSION: u8 = 0x81;
const END_SESSION: u8 = 0x82;
const TRANSCEIVE: u8 = 0x95;
const ERROR_STATUS: u8 = 0xC0;
const ICC_RESPONSE: u8 = 0x97;

/// MANAGE SESSION opening a transparent session
pub(crate) fn start_session() -> Result<Vec<u8>, PcscError> {
    envelope(MANAGE_SESSION, &data_object(START_SESSION, &[])?)
}

/// MANAGE SESSION closing the transparent session
pub(crate) fn end_session() -> Result<Vec<u8>, PcscError> {
    envelope(MANAGE_SESSION, &data_object(END_SESSION, &[])?)
}

/// TRANSPARENT EXCHANGE sending `frame` to the card
pub(crate) fn exchange(frame: &[u8]) -> Result<Vec<u8>, PcscError> {
    envelope(TRANSPARENT_EXCHANGE, &data_object(TRANSCEIVE, frame)?)
}

/// The card's answer in a transparent session reply (status word stripped)
///
/// A generic error status other than `90 00` is the reader reporting that
/// the card did not answer or the frame was refused, and comes back as
/// [`PcscError::Status`]. A reply without an answer object is an empty answer.
pub(crate) fn parse_response(data: &[u8]) -> Result<Bytes, PcscError> {
    let error_status = Tag::try_from(ERROR_STATUS)?;
    let icc_response = Tag::try_from(ICC_RESPONSE)?;
    let mut answer = Bytes::new();

    for tlv in Tlv::parse_all(data) {
        let Value::Primitive(value) = tlv.value() else {
            continue;
        };
        if tlv.tag() == &error_status {
            // Data object index, then SW1 SW2
            if let [_, sw1, sw2] = value[..] {
                let status = StatusWord::new(sw1, sw2);
                if !status.is_success() {
                    return Err(PcscError::Status(status));
                }
            }
        } else if tlv.tag() == &icc_response {
            answer = Bytes::copy_from_slice(value);
        }
    }

    Ok(answer)
}

fn data_object(tag: u8, value: &[u8]) -> Result<Vec<u8>, PcscError> {
    Ok(Tlv::new(Tag::try_from(tag)?, Value::Primitive(value.to_vec()))?.to_vec())
}

fn envelope(header: [u8; 4], body: &[u8]) -> Result<Vec<u8>, PcscError> {
    let lc = u8::try_from(body.len()).map_err(|_| PcscError::FrameTooLong(body.len()))?;
    let mut command = Vec::with_capacity(header.len() + body.len() + 2);
    command.extend_from_slice(&header);
    command.push(lc);
    command.extend_from_slice(body);
    // Le = 00, up to 256 bytes back
    command.push(0x00);
    Ok(command)
}
