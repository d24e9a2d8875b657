//! Global key dictionaries
//!
//! Dictionary files use the format shared by MIFARE Classic Tool and the
//! Proxmark3 client: one 12-character hex key per line, `#` starts a comment.

use tracing::warn;

use super::ClassicKey;

/// Keys every dictionary starts with, in the order they are tried
///
/// The factory default goes first, then the all-zero key used on sector 0
/// of some preamble layouts, then the MAD and NFC Forum keys.
pub fn well_known() -> Vec<ClassicKey> {
    vec![
        ClassicKey::DEFAULT,
        ClassicKey::ZERO,
        ClassicKey::MAD,
        ClassicKey::NFC_FORUM,
    ]
}

/// Parse dictionary text, skipping comments, blank lines and malformed entries
pub fn parse(text: &str) -> Vec<ClassicKey> {
    text.lines()
        .enumerate()
        .filter_map(|(line_no, line)| {
            let entry = line.split('#').next().unwrap_or_default().trim();
            if entry.is_empty() {
                return None;
            }
            match ClassicKey::from_hex(entry) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(line = line_no + 1, error = %e, "Skipping malformed dictionary entry");
                    None
                }
            }
        })
        .collect()
}

/// Append keys to a dictionary, keeping the first occurrence of each key
pub fn merge(dictionary: &mut Vec<ClassicKey>, keys: impl IntoIterator<Item = ClassicKey>) {
    for key in keys {
        if !dictionary.contains(&key) {
            dictionary.push(key);
        }
    }
}
