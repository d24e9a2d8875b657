//! Enumerate connected readers and the card family each one holds

use tapread_pcsc::{AtrInfo, PcscDeviceManager};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manager = PcscDeviceManager::new()?;
    let readers = manager.list_readers()?;

    println!("Found {} readers:", readers.len());

    for (i, reader) in readers.iter().enumerate() {
        println!("{}. Reader: {}", i + 1, reader.name());

        match reader.atr() {
            Some(atr) => {
                let info = AtrInfo::from_atr(atr);
                println!("   {} card, ATR: {}", info.card_type, hex::encode_upper(atr));
            }
            None => println!("   No card present"),
        }
    }

    Ok(())
}
