//! Technology capabilities over a PC/SC connection
//!
//! ISO-DEP cards get raw APDUs. Storage cards are driven through the
//! reader's pseudo-APDUs (class `FF`) from PC/SC Part 3, and raw NFC-F or
//! NFC-A frames go through a transparent session
//! ([`PcscConnection::transceive_frame`](crate::PcscConnection::transceive_frame)).

/// Implement [`TagTechnology`](tapread_core::technology::TagTechnology) by
/// delegating to the wrapped [`PcscConnection`](crate::PcscConnection)
macro_rules! impl_tag_technology {
    ($ty:ty) => {
        #[async_trait::async_trait]
        impl tapread_core::technology::TagTechnology for $ty {
            async fn connect(&mut self) -> tapread_core::Result<()> {
                Ok(self.connection.connect()?)
            }

            async fn close(&mut self) -> tapread_core::Result<()> {
                Ok(self.connection.disconnect()?)
            }

            fn is_connected(&self) -> bool {
                self.connection.is_connected()
            }
        }
    };
}
pub(crate) use impl_tag_technology;

mod classic;
mod felica;
mod iso_dep;
mod ultralight;
mod vicinity;

pub use classic::PcscClassic;
pub use felica::PcscFelica;
pub use iso_dep::PcscIsoDep;
pub use ultralight::PcscUltralight;
pub use vicinity::PcscVicinity;

/// READ BINARY of `len` bytes at block or page `address` (Le = 00 asks for a whole unit)
pub(crate) const fn read_binary(address: u16, len: u8) -> [u8; 5] {
    let [hi, lo] = address.to_be_bytes();
    [0xFF, 0xB0, hi, lo, len]
}
