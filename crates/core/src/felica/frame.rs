//! NFC-F command frames
//!
//! Platforms that only offer a raw NFC-F pipe (a PC/SC reader's transparent
//! exchange, for instance) build [`FelicaTechnology`](crate::technology::FelicaTechnology)
//! on these. Every frame starts with its own length byte.

/// Polling
pub const COMMAND_POLLING: u8 = 0x00;
/// Read Without Encryption
pub const COMMAND_READ_WO_ENCRYPTION: u8 = 0x06;
/// Search Service Code
pub const COMMAND_SEARCH_SERVICE_CODE: u8 = 0x0A;
/// Answer code of Search Service Code
pub const RESPONSE_SEARCH_SERVICE_CODE: u8 = 0x0B;
/// Request System Code
pub const COMMAND_REQUEST_SYSTEM_CODE: u8 = 0x0C;

/// Length of IDm and PMm
pub const ID_LEN: usize = 8;

fn frame(command: u8, idm: &[u8], data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(2 + idm.len() + data.len());
    frame.push((2 + idm.len() + data.len()) as u8);
    frame.push(command);
    frame.extend_from_slice(idm);
    frame.extend_from_slice(data);
    frame
}

/// Poll one system code, asking for the system code in the answer
pub fn polling(system_code: u16) -> Vec<u8> {
    let [hi, lo] = system_code.to_be_bytes();
    frame(COMMAND_POLLING, &[], &[hi, lo, 0x01, 0x00])
}

/// Ask the card for its system codes
pub fn request_system_code(idm: &[u8]) -> Vec<u8> {
    frame(COMMAND_REQUEST_SYSTEM_CODE, idm, &[])
}

/// Ask for the service or area at `index`
pub fn search_service_code(idm: &[u8], index: u16) -> Vec<u8> {
    frame(COMMAND_SEARCH_SERVICE_CODE, idm, &index.to_le_bytes())
}

/// Read one block of one service
pub fn read_without_encryption(idm: &[u8], service_code: u16, block: u8) -> Vec<u8> {
    let [lo, hi] = service_code.to_le_bytes();
    frame(COMMAND_READ_WO_ENCRYPTION, idm, &[0x01, lo, hi, 0x01, 0x80, block])
}

/// IDm and PMm from a polling answer
pub fn parse_polling(response: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let idm = response.get(2..2 + ID_LEN)?;
    let pmm = response.get(2 + ID_LEN..2 + 2 * ID_LEN)?;
    Some((idm.to_vec(), pmm.to_vec()))
}

/// System codes from a Request System Code answer
pub fn parse_system_codes(response: &[u8]) -> Vec<u16> {
    let Some(&count) = response.get(10) else {
        return Vec::new();
    };
    response[11..]
        .chunks_exact(2)
        .take(count as usize)
        .map(|code| u16::from_le_bytes([code[0], code[1]]))
        .collect()
}

/// One step of a service search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    /// A service code
    Service(u16),
    /// An area; skipped
    Area,
    /// No more entries
    End,
}

/// Decode a Search Service Code answer
pub fn parse_search_service_code(response: &[u8]) -> SearchResult {
    if response.get(1) != Some(&RESPONSE_SEARCH_SERVICE_CODE) {
        return SearchResult::End;
    }
    match response.get(10..) {
        Some([0xFF, 0xFF]) => SearchResult::End,
        Some([lo, hi]) => SearchResult::Service(u16::from_le_bytes([*lo, *hi])),
        Some([_, _, _, _]) => SearchResult::Area,
        _ => SearchResult::End,
    }
}

/// Block contents from a Read Without Encryption answer, `None` on a
/// non-zero status flag
pub fn parse_read_block(response: &[u8]) -> Option<Vec<u8>> {
    if *response.get(10)? != 0x00 {
        return None;
    }
    let count = *response.get(12)? as usize;
    if count < 1 {
        return None;
    }
    response.get(13..13 + 16).map(<[u8]>::to_vec)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDM: [u8; 8] = [0x01, 0x2E, 0x4C, 0xD1, 0x11, 0x22, 0x33, 0x44];

    #[test]
    fn test_frames() {
        assert_eq!(polling(0x8008), vec![0x06, 0x00, 0x80, 0x08, 0x01, 0x00]);
        assert_eq!(request_system_code(&IDM).len(), 10);
        assert_eq!(&search_service_code(&IDM, 0x0102)[10..], &[0x02, 0x01]);
        let read = read_without_encryption(&IDM, 0x0117, 3);
        assert_eq!(read[0], 16);
        assert_eq!(&read[10..], &[0x01, 0x17, 0x01, 0x01, 0x80, 0x03]);
    }

    #[test]
    fn test_parse_polling() {
        let mut response = vec![0x12, 0x01];
        response.extend_from_slice(&IDM);
        response.extend_from_slice(&[0xAA; 8]);
        let (idm, pmm) = parse_polling(&response).unwrap();
        assert_eq!(idm, IDM);
        assert_eq!(pmm, vec![0xAA; 8]);
        assert!(parse_polling(&response[..12]).is_none());
    }

    #[test]
    fn test_parse_system_codes() {
        let mut response = vec![0x0F, 0x0D];
        response.extend_from_slice(&IDM);
        response.extend_from_slice(&[0x02, 0x03, 0x00, 0xFE, 0x80]);
        assert_eq!(parse_system_codes(&response), vec![0x0003, 0x80FE]);
        assert!(parse_system_codes(&[0x01]).is_empty());
    }

    #[test]
    fn test_parse_search() {
        let head = [&[0x0C, RESPONSE_SEARCH_SERVICE_CODE][..], &IDM].concat();
        assert_eq!(
            parse_search_service_code(&[&head[..], &[0x8B, 0x10]].concat()),
            SearchResult::Service(0x108B)
        );
        assert_eq!(
            parse_search_service_code(&[&head[..], &[0x00, 0x10, 0xFF, 0x17]].concat()),
            SearchResult::Area
        );
        assert_eq!(parse_search_service_code(&[&head[..], &[0xFF, 0xFF]].concat()), SearchResult::End);
    }

    #[test]
    fn test_parse_read_block() {
        let head = [&[0x1D, 0x07][..], &IDM].concat();
        let ok = [&head[..], &[0x00, 0x00, 0x01], &[0x5A; 16]].concat();
        assert_eq!(parse_read_block(&ok), Some(vec![0x5A; 16]));
        let refused = [&head[..], &[0xFF, 0xA1]].concat();
        assert_eq!(parse_read_block(&refused), None);
    }
}
