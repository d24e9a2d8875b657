//! ISO/IEC 7816-4 command and response framing
//!
//! Short APDUs only. The ISO 7816, DESFire and CEPAS readers build their
//! frames through [`Command`] and split replies through [`Response`].

pub mod status;

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
pub use status::StatusWord;

use crate::{Error, Result};

/// A short command APDU
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Option<Bytes>,
    le: Option<u8>,
}

impl Command {
    /// Create a new command with only the header
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with the header and an expected length
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Create a new command with a data field
    pub fn new_with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: impl Into<Bytes>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
            le: None,
        }
    }

    /// Set the expected length
    pub const fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Instruction code
    pub const fn instruction(&self) -> u8 {
        self.ins
    }

    /// Data field, if any
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Expected length, if any
    pub const fn expected_length(&self) -> Option<u8> {
        self.le
    }

    /// Serialize to raw APDU bytes
    ///
    /// An empty data field is encoded without Lc.
    pub fn to_bytes(&self) -> Bytes {
        let data_len = self.data.as_ref().map_or(0, |d| d.len());
        let mut buffer = BytesMut::with_capacity(6 + data_len);

        // Header: CLA, INS, P1, P2
        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        if let Some(data) = self.data.as_ref().filter(|d| !d.is_empty()) {
            buffer.put_u8(data.len() as u8);
            buffer.put_slice(data);
        }

        if let Some(le) = self.le {
            buffer.put_u8(le);
        }

        buffer.freeze()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("apdu", &hex::encode(self.to_bytes()))
            .finish()
    }
}

/// A response APDU split into payload and status word
#[derive(Clone, PartialEq, Eq)]
pub struct Response {
    payload: Bytes,
    status: StatusWord,
}

impl Response {
    /// Create a response from its parts
    pub const fn new(payload: Bytes, status: StatusWord) -> Self {
        Self { payload, status }
    }

    /// Split raw response bytes; anything shorter than a status word is a protocol error
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        match raw {
            [payload @ .., sw1, sw2] => Ok(Self {
                payload: Bytes::copy_from_slice(payload),
                status: StatusWord::new(*sw1, *sw2),
            }),
            _ => Err(Error::protocol(format!(
                "response too short for a status word: {}",
                hex::encode(raw)
            ))),
        }
    }

    /// Response payload without status bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the response, returning its payload
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Whether the status word is 90 00
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("payload", &hex::encode(&self.payload))
            .field("status", &self.status)
            .finish()
    }
}
