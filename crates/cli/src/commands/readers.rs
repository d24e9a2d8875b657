use tapread_pcsc::{AtrInfo, PcscDeviceManager};

/// List all available readers
pub(crate) fn list_readers() -> eyre::Result<()> {
    let manager = PcscDeviceManager::new()?;
    let readers = manager.list_readers()?;

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let status = match reader.atr() {
            Some(atr) => format!("{} card, ATR {}", AtrInfo::from_atr(atr).card_type, hex::encode_upper(atr)),
            None => "no card".to_string(),
        };
        println!("{}. {} ({})", i + 1, reader.name(), status);
    }

    Ok(())
}
