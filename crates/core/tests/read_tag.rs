//! End-to-end reads through the public lifecycle with in-test technologies

use std::{collections::BTreeSet, io::Write, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tapread_core::{
    cepas::RawCepasPurse,
    classic::RawClassicSector,
    keys::{ClassicCardKeys, ClassicKeyMaterial, ClassicSectorKey, KeyStore, MemoryKeyStore},
    lifecycle::{CepasReader, ClassicReader},
    prelude::*,
};

/// Classic 1K whose sectors open with exactly one key in role A
#[derive(Debug)]
struct FakeClassic {
    keys: Vec<Option<ClassicKey>>,
    authenticated: Option<usize>,
    lost_at_sector: Option<usize>,
    opened: bool,
    closes: usize,
}

impl FakeClassic {
    fn new(keys: Vec<Option<ClassicKey>>) -> Self {
        Self {
            keys,
            authenticated: None,
            lost_at_sector: None,
            opened: false,
            closes: 0,
        }
    }
}

#[async_trait]
impl TagTechnology for FakeClassic {
    async fn connect(&mut self) -> Result<()> {
        self.opened = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.opened = false;
        self.closes += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.opened
    }
}

#[async_trait]
impl ClassicTechnology for FakeClassic {
    fn sector_count(&self) -> usize {
        self.keys.len()
    }

    async fn authenticate(&mut self, sector: usize, key: &ClassicKey, key_type: KeyType) -> Result<bool> {
        if self.lost_at_sector == Some(sector) {
            return Err(Error::tag_lost("tag left the field"));
        }
        let ok = key_type == KeyType::A && self.keys[sector] == Some(*key);
        self.authenticated = ok.then_some(sector);
        Ok(ok)
    }

    async fn read_block(&mut self, block: usize) -> Result<Bytes> {
        if self.authenticated.is_none() {
            return Err(Error::transceive("not authenticated"));
        }
        Ok(Bytes::from(vec![block as u8; 16]))
    }
}

/// ISO-DEP card that never answers
#[derive(Debug, Default)]
struct SilentCard {
    opened: bool,
    closes: usize,
}

#[async_trait]
impl TagTechnology for SilentCard {
    async fn connect(&mut self) -> Result<()> {
        self.opened = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.opened = false;
        self.closes += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.opened
    }
}

#[async_trait]
impl CardTransceiver for SilentCard {
    async fn do_transceive(&mut self, _data: &[u8]) -> Result<Bytes> {
        std::future::pending().await
    }
}

fn key(byte: u8) -> ClassicKey {
    ClassicKey::new([byte; 6])
}

fn tag() -> TagId {
    TagId::new(vec![0xDE, 0xAD, 0xBE, 0xEF])
}

#[tokio::test]
async fn classic_saved_and_dictionary_keys() {
    // sector 0 opens with the saved key, sector 1 with the dictionary, sector 2 never
    let mut tech = FakeClassic::new(vec![Some(key(0x11)), Some(ClassicKey::DEFAULT), None]);

    let store = MemoryKeyStore::with_dictionary(vec![ClassicKey::DEFAULT]);
    store
        .save_keys(
            &tag(),
            CardType::MifareClassic,
            ClassicCardKeys::new(vec![ClassicSectorKey::new(key(0x11), key(0x22))]),
        )
        .unwrap();
    let reader = ClassicReader::new(ClassicKeyMaterial::from_store(&store, &tag()));

    let raw = read_tag(&tag(), &mut tech, &reader, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(tech.closes, 1);
    assert!(!tech.is_connected());
    assert_eq!(raw.card_type(), CardType::MifareClassic);
    assert!(!raw.is_unauthorized());
    assert!(!raw.is_partial_read());

    let RawCard::MifareClassic(classic) = &raw else {
        panic!("expected a classic card");
    };
    assert!(matches!(&classic.sectors[0], RawClassicSector::Data { key_a: Some(k), .. } if *k == key(0x11)));
    assert!(matches!(
        &classic.sectors[1],
        RawClassicSector::Data { key_a: Some(k), .. } if *k == ClassicKey::DEFAULT
    ));
    assert_eq!(classic.sectors[2], RawClassicSector::Unauthorized { index: 2 });

    let recovered: BTreeSet<_> = classic.recovered_keys().iter().map(|k| k.sector).collect();
    assert_eq!(recovered, BTreeSet::from([0, 1]));

    let Card::MifareClassic(parsed) = raw.parse().unwrap() else {
        panic!("parse changed the family");
    };
    assert_eq!(parsed.sectors.len(), 3);
}

#[tokio::test]
async fn classic_locked_card_is_unauthorized() {
    let mut tech = FakeClassic::new(vec![None; 16]);
    let reader = ClassicReader::new(ClassicKeyMaterial::new(None, vec![ClassicKey::DEFAULT]));

    let raw = read_tag(&tag(), &mut tech, &reader, &CancellationToken::new())
        .await
        .unwrap();
    assert!(raw.is_unauthorized());
    assert_eq!(tech.closes, 1);
}

#[tokio::test]
async fn classic_tag_lost_is_partial() {
    let mut tech = FakeClassic::new(vec![Some(ClassicKey::DEFAULT); 16]);
    tech.lost_at_sector = Some(5);
    let reader = ClassicReader::new(ClassicKeyMaterial::new(None, vec![ClassicKey::DEFAULT]));

    let raw = read_tag(&tag(), &mut tech, &reader, &CancellationToken::new())
        .await
        .unwrap();
    assert!(raw.is_partial_read());
    let RawCard::MifareClassic(classic) = &raw else {
        panic!("expected a classic card");
    };
    assert_eq!(classic.sectors.len(), 6);
    assert!(matches!(classic.sectors[5], RawClassicSector::Invalid { index: 5, .. }));
    assert_eq!(tech.closes, 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_hung_card_still_closes() {
    let mut tech = SilentCard::default();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = read_tag(&tag(), &mut tech, &CepasReader, &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(tech.closes, 1);
    assert!(!tech.is_connected());
}

#[tokio::test]
async fn raw_card_survives_a_file() {
    let mut tech = FakeClassic::new(vec![Some(ClassicKey::DEFAULT), None]);
    let reader = ClassicReader::new(ClassicKeyMaterial::new(None, vec![ClassicKey::DEFAULT]));
    let raw = read_tag(&tag(), &mut tech, &reader, &CancellationToken::new())
        .await
        .unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string_pretty(&raw).unwrap().as_bytes())
        .unwrap();

    let text = std::fs::read_to_string(file.path()).unwrap();
    let back: RawCard = serde_json::from_str(&text).unwrap();
    assert_eq!(back, raw);
}

#[test]
fn cepas_json_shape() {
    let purse = RawCepasPurse::Unauthorized { id: 3 };
    let json = serde_json::to_value(&purse).unwrap();
    assert_eq!(json["type"], "unauthorized");
    assert_eq!(json["id"], 3);
}
