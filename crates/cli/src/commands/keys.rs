use std::{fs, path::PathBuf};

use clap::Subcommand;
use eyre::WrapErr;
use tapread_core::{
    CardType, TagId,
    keys::{ClassicCardKeys, FileKeyStore, KeyStore},
};

use crate::config::Config;

#[derive(Subcommand)]
pub(crate) enum KeysCommand {
    /// Show saved card keys and the dictionary size
    List,

    /// Add dictionary files (one hex key per line) to the global keys
    Import {
        /// Dictionary files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Save keys for one card from a Proxmark3 key dump
    ImportDump {
        /// Tag UID in hex
        tag_id: String,

        /// Key dump: every key A, then every key B
        file: PathBuf,
    },
}

pub(crate) fn keys(config: &Config, command: KeysCommand) -> eyre::Result<()> {
    let store = FileKeyStore::open(config.keys_file()?)?;

    match command {
        KeysCommand::List => {
            println!("Key file: {}", store.path().display());
            println!("Dictionary: {} keys", store.global_keys().len());
            for saved in store.saved_keys() {
                println!(
                    "{} {} ({} sectors, saved {})",
                    saved.card_type,
                    saved.tag_id,
                    saved.keys.len(),
                    saved.saved_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        KeysCommand::Import { files } => {
            for file in files {
                let count = store.import_dictionary(&file)?;
                println!("{}: {count} keys", file.display());
            }
        }
        KeysCommand::ImportDump { tag_id, file } => {
            let tag_id = TagId::from_hex(&tag_id).wrap_err("tag id must be hex")?;
            let dump = fs::read(&file).wrap_err_with(|| format!("reading {}", file.display()))?;
            let keys = ClassicCardKeys::from_proxmark3(&dump)?;
            let sectors = keys.len();
            store.save_keys(&tag_id, CardType::MifareClassic, keys)?;
            println!("Saved keys for {sectors} sectors of {tag_id}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &tempfile::TempDir) -> Config {
        Config {
            keys_file: Some(dir.path().join("keys.json")),
            ..Default::default()
        }
    }

    #[test]
    fn test_import_dump() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        // 16 sectors: key A of every sector, then key B
        let mut dump = vec![0xA0; 16 * 6];
        dump.extend(vec![0xB0; 16 * 6]);
        let dump_file = dir.path().join("dump.bin");
        fs::write(&dump_file, dump).unwrap();

        keys(
            &config,
            KeysCommand::ImportDump {
                tag_id: "04a1b2c3".into(),
                file: dump_file,
            },
        )
        .unwrap();

        let store = FileKeyStore::open(config.keys_file().unwrap()).unwrap();
        let saved = store.keys_for_tag(&TagId::new(vec![0x04, 0xA1, 0xB2, 0xC3])).unwrap();
        assert_eq!(saved.len(), 16);
    }

    #[test]
    fn test_import_dictionary() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let dic = dir.path().join("transit.dic");
        fs::write(&dic, "4D3A99C351DD\n1A982C7E459A\n").unwrap();

        let before = FileKeyStore::open(config.keys_file().unwrap()).unwrap().global_keys().len();
        keys(&config, KeysCommand::Import { files: vec![dic] }).unwrap();

        let store = FileKeyStore::open(config.keys_file().unwrap()).unwrap();
        assert_eq!(store.global_keys().len(), before + 2);
    }
}
