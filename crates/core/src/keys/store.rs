use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ClassicCardKeys, ClassicKey, dictionary};
use crate::{CardType, Error, Result, ResultExt, TagId};

/// Keys saved against one tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedKeys {
    /// Tag the keys belong to
    pub tag_id: TagId,
    /// Card type the keys were saved for
    pub card_type: CardType,
    /// Per-sector keys
    pub keys: ClassicCardKeys,
    /// When the keys were saved
    pub saved_at: DateTime<Utc>,
}

/// Source of key material
///
/// Readers only use the read side, and only before a scan starts. The write
/// side is for callers persisting keys recovered by a scan.
pub trait KeyStore: Send + Sync + fmt::Debug {
    /// All saved key sets, most recently saved first
    fn saved_keys(&self) -> Vec<SavedKeys>;

    /// The most recently saved key set for a tag
    fn keys_for_tag(&self, tag_id: &TagId) -> Option<ClassicCardKeys> {
        self.saved_keys()
            .into_iter()
            .find(|saved| &saved.tag_id == tag_id)
            .map(|saved| saved.keys)
    }

    /// Global dictionary in the order keys should be tried
    fn global_keys(&self) -> Vec<ClassicKey>;

    /// Save a key set for a tag
    fn save_keys(&self, tag_id: &TagId, card_type: CardType, keys: ClassicCardKeys) -> Result<()>;

    /// Append keys to the global dictionary
    fn add_global_keys(&self, keys: &[ClassicKey]) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyStoreData {
    #[serde(default)]
    saved: Vec<SavedKeys>,
    #[serde(default)]
    global: Vec<ClassicKey>,
}

impl KeyStoreData {
    fn insert(&mut self, saved: SavedKeys) {
        self.saved.insert(0, saved);
        // Newest first even when timestamps arrive out of order
        self.saved.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
    }
}

/// In-memory key store seeded with the well-known keys
#[derive(Debug)]
pub struct MemoryKeyStore {
    data: RwLock<KeyStoreData>,
}

impl MemoryKeyStore {
    /// Create a store whose dictionary holds the well-known keys
    pub fn new() -> Self {
        Self::with_dictionary(dictionary::well_known())
    }

    /// Create a store with an explicit dictionary
    pub fn with_dictionary(global: Vec<ClassicKey>) -> Self {
        Self {
            data: RwLock::new(KeyStoreData {
                saved: Vec::new(),
                global,
            }),
        }
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemoryKeyStore {
    fn saved_keys(&self) -> Vec<SavedKeys> {
        self.data.read().saved.clone()
    }

    fn global_keys(&self) -> Vec<ClassicKey> {
        self.data.read().global.clone()
    }

    fn save_keys(&self, tag_id: &TagId, card_type: CardType, keys: ClassicCardKeys) -> Result<()> {
        self.data.write().insert(SavedKeys {
            tag_id: tag_id.clone(),
            card_type,
            keys,
            saved_at: Utc::now(),
        });
        Ok(())
    }

    fn add_global_keys(&self, keys: &[ClassicKey]) -> Result<()> {
        dictionary::merge(&mut self.data.write().global, keys.iter().copied());
        Ok(())
    }
}

/// Key store persisted as a JSON file
///
/// The dictionary always starts with the well-known keys; keys read from the
/// file follow in file order. Every write rewrites the whole file.
pub struct FileKeyStore {
    path: PathBuf,
    data: RwLock<KeyStoreData>,
}

impl fmt::Debug for FileKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.read();
        f.debug_struct("FileKeyStore")
            .field("path", &self.path)
            .field("saved", &data.saved.len())
            .field("global", &data.global.len())
            .finish()
    }
}

impl FileKeyStore {
    /// Open a key file, starting empty if it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut data = if path.exists() {
            let text = fs::read_to_string(&path)
                .map_err(Error::from)
                .context(format!("reading key file {}", path.display()))?;
            serde_json::from_str::<KeyStoreData>(&text)
                .map_err(Error::from)
                .context(format!("parsing key file {}", path.display()))?
        } else {
            debug!(path = %path.display(), "Key file not found, starting empty");
            KeyStoreData::default()
        };

        let mut global = dictionary::well_known();
        dictionary::merge(&mut global, data.global);
        data.global = global;
        data.saved.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Import a dictionary file into the global keys
    pub fn import_dictionary(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(Error::from)
            .context(format!("reading dictionary {}", path.display()))?;
        let keys = dictionary::parse(&text);
        self.add_global_keys(&keys)?;
        info!(path = %path.display(), keys = keys.len(), "Imported key dictionary");
        Ok(keys.len())
    }

    fn persist(&self, data: &KeyStoreData) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, json)
            .map_err(Error::from)
            .context(format!("writing key file {}", self.path.display()))
    }
}

impl KeyStore for FileKeyStore {
    fn saved_keys(&self) -> Vec<SavedKeys> {
        self.data.read().saved.clone()
    }

    fn global_keys(&self) -> Vec<ClassicKey> {
        self.data.read().global.clone()
    }

    fn save_keys(&self, tag_id: &TagId, card_type: CardType, keys: ClassicCardKeys) -> Result<()> {
        let mut data = self.data.write();
        data.insert(SavedKeys {
            tag_id: tag_id.clone(),
            card_type,
            keys,
            saved_at: Utc::now(),
        });
        self.persist(&data)
    }

    fn add_global_keys(&self, keys: &[ClassicKey]) -> Result<()> {
        let mut data = self.data.write();
        dictionary::merge(&mut data.global, keys.iter().copied());
        self.persist(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ClassicSectorKey;

    fn card_keys(byte: u8) -> ClassicCardKeys {
        let key = ClassicKey::new([byte; 6]);
        ClassicCardKeys::new(vec![ClassicSectorKey::new(key, key)])
    }

    #[test]
    fn test_memory_store_most_recent_first() {
        let store = MemoryKeyStore::new();
        let tag = TagId::new(vec![1, 2, 3, 4]);
        let other = TagId::new(vec![9, 9, 9, 9]);

        store.save_keys(&tag, CardType::MifareClassic, card_keys(0x11)).unwrap();
        store.save_keys(&other, CardType::MifareClassic, card_keys(0x22)).unwrap();
        store.save_keys(&tag, CardType::MifareClassic, card_keys(0x33)).unwrap();

        assert_eq!(store.saved_keys().len(), 3);
        assert_eq!(store.keys_for_tag(&tag), Some(card_keys(0x33)));
        assert_eq!(store.keys_for_tag(&other), Some(card_keys(0x22)));
        assert_eq!(store.keys_for_tag(&TagId::new(vec![0])), None);
        assert_eq!(store.global_keys(), dictionary::well_known());
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("tapread-keys.json");
        let tag = TagId::new(vec![0xCA, 0xFE]);
        let extra = ClassicKey::new([0x4B, 0x0B, 0x20, 0x10, 0x7C, 0xCB]);

        {
            let store = FileKeyStore::open(&path).unwrap();
            store.save_keys(&tag, CardType::MifareClassic, card_keys(0x44)).unwrap();
            store.add_global_keys(&[extra, ClassicKey::DEFAULT]).unwrap();
        }

        let reopened = FileKeyStore::open(&path).unwrap();
        assert_eq!(reopened.keys_for_tag(&tag), Some(card_keys(0x44)));
        let global = reopened.global_keys();
        assert_eq!(&global[..4], dictionary::well_known().as_slice());
        assert_eq!(global.last(), Some(&extra));
        assert_eq!(global.len(), 5);
    }

    #[test]
    fn test_file_store_import_dictionary() {
        let dir = tempfile::tempdir().unwrap();
        let dict = dir.path().join("extra.dic");
        std::fs::write(&dict, "# comment\n010203040506\nA0A1A2A3A4A5\n").unwrap();

        let store = FileKeyStore::open(dir.path().join("keys.json")).unwrap();
        assert_eq!(store.import_dictionary(&dict).unwrap(), 2);
        assert_eq!(store.global_keys().len(), 5);
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(FileKeyStore::open(&path).is_err());
    }
}
