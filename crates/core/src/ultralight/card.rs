use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{UltralightPage, UltralightType};
use crate::TagId;

/// Parsed Ultralight or NTAG tag
///
/// Construction guarantees pages 0-3 are readable and every readable page
/// holds four bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UltralightCard {
    /// Tag identifier (UID)
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// Detected sub-type
    pub ultralight_type: UltralightType,
    /// Pages in order
    pub pages: Vec<UltralightPage>,
    /// Not every page was reached
    pub is_partial_read: bool,
}

impl UltralightCard {
    /// Look up a page
    pub fn page(&self, index: usize) -> Option<&UltralightPage> {
        self.pages.get(index)
    }

    /// Concatenated contents of `count` pages from `start`
    ///
    /// `None` if any page in the range is missing or unreadable.
    pub fn read_pages(&self, start: usize, count: usize) -> Option<Vec<u8>> {
        let mut out = Vec::with_capacity(count * super::PAGE_SIZE);
        for index in start..start + count {
            out.extend_from_slice(self.page(index)?.data()?);
        }
        Some(out)
    }

    /// Seven byte serial number from the header, check bytes dropped
    pub fn serial_number(&self) -> Option<Vec<u8>> {
        let header = self.read_pages(0, 2)?;
        Some([&header[0..3], &header[4..8]].concat())
    }

    /// Static lock bytes from page 2
    pub fn lock_bytes(&self) -> Option<[u8; 2]> {
        let page = self.page(2)?.data()?;
        Some([page[2], page[3]])
    }

    /// One-time programmable area, page 3
    pub fn otp(&self) -> Option<&[u8]> {
        self.page(3)?.data()
    }

    /// User memory pages: everything after the header up to the
    /// configuration area
    pub fn user_pages(&self) -> &[UltralightPage] {
        let end = match self.ultralight_type {
            UltralightType::Mf0icu1 => 16,
            UltralightType::Mf0icu2 => 40,
            UltralightType::Ev1Mf0ul11 => 16,
            UltralightType::Ev1Mf0ul21 => 36,
            UltralightType::Ntag213 => 40,
            UltralightType::Ntag215 => 130,
            UltralightType::Ntag216 => 226,
        };
        &self.pages[4.min(self.pages.len())..end.min(self.pages.len())]
    }
}
