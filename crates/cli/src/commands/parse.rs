use std::{fmt::Write, fs, path::Path};

use eyre::WrapErr;
use tapread_core::{Card, RawCard};
use tapread_transit::TransitRegistry;

/// Decode a saved raw card and print what the registry makes of it
pub(crate) fn parse_file(path: &Path) -> eyre::Result<()> {
    let text = fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    let raw: RawCard = serde_json::from_str(&text).wrap_err("not a raw card")?;
    let card = raw.parse().wrap_err("parsing raw card")?;
    println!("{}", describe(&card));
    Ok(())
}

/// Human readable summary of a parsed card
pub(crate) fn describe(card: &Card) -> String {
    let registry = TransitRegistry::with_defaults();
    let mut out = format!("{} {}", card.card_type(), card.tag_id());

    let Some(info) = registry.parse_info(card) else {
        out.push_str("\n  not recognised");
        return out;
    };

    let identity = &info.identity;
    let _ = write!(out, "\n  {}", identity.name);
    if let Some(serial) = &identity.serial_number {
        let _ = write!(out, " ({serial})");
    }
    for balance in &info.balances {
        let _ = write!(out, "\n  Balance: {balance}");
    }
    for field in &info.fields {
        let _ = write!(out, "\n  {field}");
    }
    if let Some(card_info) = registry.find_card_info(card) {
        let _ = write!(out, "\n  Location: {}", card_info.location);
    }
    out
}
