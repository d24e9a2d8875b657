use std::collections::HashSet;

use super::{ClassicCardKeys, ClassicKey, KeyStore, KeyType};
use crate::TagId;

/// One authentication attempt: a key in a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCandidate {
    /// The key
    pub key: ClassicKey,
    /// Role to authenticate as
    pub key_type: KeyType,
}

impl KeyCandidate {
    /// Create a candidate
    pub const fn new(key: ClassicKey, key_type: KeyType) -> Self {
        Self { key, key_type }
    }
}

/// Key material handed to the Classic reader for one scan
///
/// Built once from a [`KeyStore`] before the read starts, so the store is
/// never touched while the tag is in the field.
#[derive(Debug, Clone, Default)]
pub struct ClassicKeyMaterial {
    card_keys: Option<ClassicCardKeys>,
    dictionary: Vec<ClassicKey>,
}

impl ClassicKeyMaterial {
    /// Create key material from saved card keys and a global dictionary
    pub const fn new(card_keys: Option<ClassicCardKeys>, dictionary: Vec<ClassicKey>) -> Self {
        Self {
            card_keys,
            dictionary,
        }
    }

    /// Snapshot the keys a store holds for one tag
    pub fn from_store<S: KeyStore + ?Sized>(store: &S, tag_id: &TagId) -> Self {
        Self::new(store.keys_for_tag(tag_id), store.global_keys())
    }

    /// Keys saved against this tag, if any
    pub const fn card_keys(&self) -> Option<&ClassicCardKeys> {
        self.card_keys.as_ref()
    }

    /// Global dictionary in enumeration order
    pub fn dictionary(&self) -> &[ClassicKey] {
        &self.dictionary
    }

    /// Ordered authentication attempts for a sector
    ///
    /// Saved keys come first: the pair saved for this very sector, then every
    /// other saved pair. The dictionary follows, each key as A then B. A key
    /// and role already listed is not tried twice.
    pub fn candidates(&self, sector: usize) -> Vec<KeyCandidate> {
        let mut out = Candidates::with_capacity(self.dictionary.len() * 2);

        if let Some(card_keys) = &self.card_keys {
            if let Some(pair) = card_keys.key_for_sector(sector) {
                out.push(KeyCandidate::new(pair.key_a, KeyType::A));
                out.push(KeyCandidate::new(pair.key_b, KeyType::B));
            }
            for (_, pair) in card_keys
                .keys()
                .iter()
                .enumerate()
                .filter(|(index, _)| *index != sector)
            {
                out.push(KeyCandidate::new(pair.key_a, KeyType::A));
                out.push(KeyCandidate::new(pair.key_b, KeyType::B));
            }
        }

        for key in &self.dictionary {
            out.push(KeyCandidate::new(*key, KeyType::A));
            out.push(KeyCandidate::new(*key, KeyType::B));
        }

        out.ordered
    }
}

/// Candidates in first-seen order, each listed once
#[derive(Debug, Default)]
struct Candidates {
    ordered: Vec<KeyCandidate>,
    seen: HashSet<KeyCandidate>,
}

impl Candidates {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            ordered: Vec::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    fn push(&mut self, candidate: KeyCandidate) {
        if self.seen.insert(candidate) {
            self.ordered.push(candidate);
        }
    }
}
