use std::{fs, path::PathBuf, time::Duration};

use clap::ValueEnum;
use eyre::WrapErr;
use tapread_core::{
    CardType, RawCard, TagId,
    felica::FelicaReadOptions,
    keys::{ClassicCardKeys, ClassicKeyMaterial, FileKeyStore, KeyStore, dictionary},
};
use tapread_pcsc::{ConnectStrategy, PcscConfig, PcscDeviceManager, ScanOptions, read_card};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::parse::describe;
use crate::config::Config;

/// Chip family named on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Family {
    Classic,
    Ultralight,
    Desfire,
    Felica,
    Iso7816,
    Cepas,
    Vicinity,
}

impl From<Family> for CardType {
    fn from(family: Family) -> Self {
        match family {
            Family::Classic => Self::MifareClassic,
            Family::Ultralight => Self::MifareUltralight,
            Family::Desfire => Self::MifareDesfire,
            Family::Felica => Self::Felica,
            Family::Iso7816 => Self::Iso7816,
            Family::Cepas => Self::Cepas,
            Family::Vicinity => Self::Vicinity,
        }
    }
}

pub(crate) struct ScanArgs {
    pub(crate) family: Option<Family>,
    pub(crate) wait: Duration,
    pub(crate) output: Option<PathBuf>,
    pub(crate) felica_only_first: bool,
    pub(crate) save_keys: bool,
}

pub(crate) async fn scan(config: &Config, args: ScanArgs) -> eyre::Result<()> {
    let store = FileKeyStore::open(config.keys_file()?)?;
    let strategy = config
        .reader
        .clone()
        .map_or(ConnectStrategy::AnyCard, ConnectStrategy::Reader);

    // Waiting on the reader blocks; keep it off the runtime's worker threads
    let wait = args.wait;
    let connection = tokio::task::spawn_blocking(move || -> eyre::Result<_> {
        let manager = PcscDeviceManager::new()?;
        info!("Waiting for card...");
        let reader = manager.wait_for_card(&strategy, wait)?;
        info!(reader = reader.name(), "Using reader");
        Ok(manager.open(&reader, PcscConfig::default())?)
    })
    .await??;

    let tag_id = TagId::new(connection.uid()?);
    let keys = key_material(&store, &tag_id, &config.dictionary_files)?;
    let options = ScanOptions::default()
        .with_keys(keys)
        .with_family(args.family.map(CardType::from))
        .with_felica(FelicaReadOptions::default().with_only_first(args.felica_only_first));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping the read");
            on_interrupt.cancel();
        }
    });

    let raw = read_card(connection, &options, &cancel).await.wrap_err("reading card")?;
    if raw.is_partial_read() {
        warn!("Card left the field before the read finished");
    }

    if args.save_keys {
        save_recovered_keys(&store, &raw)?;
    }

    let json = serde_json::to_string_pretty(&raw)?;
    match &args.output {
        Some(path) => {
            fs::write(path, json).wrap_err_with(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "Raw card saved");
        }
        None => println!("{json}"),
    }

    match raw.parse() {
        Ok(card) => eprintln!("{}", describe(&card)),
        Err(e) => warn!(error = %e, "Raw card could not be parsed"),
    }
    Ok(())
}

/// Stored keys for this tag, then the store's dictionary, then extra dictionary files
fn key_material(store: &FileKeyStore, tag_id: &TagId, files: &[PathBuf]) -> eyre::Result<ClassicKeyMaterial> {
    let stored = ClassicKeyMaterial::from_store(store, tag_id);
    let mut keys = stored.dictionary().to_vec();
    for file in files {
        let text = fs::read_to_string(file).wrap_err_with(|| format!("reading dictionary {}", file.display()))?;
        dictionary::merge(&mut keys, dictionary::parse(&text));
    }
    Ok(ClassicKeyMaterial::new(stored.card_keys().cloned(), keys))
}

/// Merge keys that unlocked sectors into the set saved for this tag
///
/// A read that reached fewer sectors than the saved set, or unlocked a sector
/// with only one role, leaves the rest of the saved keys in place.
fn save_recovered_keys(store: &FileKeyStore, raw: &RawCard) -> eyre::Result<()> {
    let RawCard::MifareClassic(card) = raw else {
        return Ok(());
    };
    let recovered = card.recovered_keys();
    if recovered.is_empty() {
        return Ok(());
    }

    let sector_count = card.sectors.len();
    let keys = match store.keys_for_tag(&card.tag_id) {
        Some(mut saved) => {
            if !saved.merge_recovered(sector_count, &recovered) {
                debug!(tag_id = %card.tag_id, "Recovered keys already saved");
                return Ok(());
            }
            saved
        }
        None => ClassicCardKeys::from_recovered(sector_count, &recovered),
    };

    store
        .save_keys(&card.tag_id, CardType::MifareClassic, keys)
        .wrap_err("saving recovered keys")?;
    info!(sectors = recovered.len(), path = %store.path().display(), "Saved recovered keys");
    Ok(())
}
