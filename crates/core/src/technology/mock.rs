//! In-memory technologies for reader tests

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use bytes::Bytes;

use super::*;
use crate::{
    Error,
    classic::crypto1::{Crypto1, RawFrame, odd_parity, prng_successor},
    keys::{ClassicKey, ClassicSectorKey, KeyType},
};

/// Connect/close bookkeeping shared by every mock
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Calls {
    pub connect: usize,
    pub close: usize,
    pub connected: bool,
}

impl Calls {
    fn connect(&mut self) -> Result<()> {
        self.connect += 1;
        self.connected = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.close += 1;
        self.connected = false;
        Ok(())
    }
}

macro_rules! impl_tag_technology {
    ($ty:ty) => {
        #[async_trait]
        impl TagTechnology for $ty {
            async fn connect(&mut self) -> Result<()> {
                self.calls.connect()
            }

            async fn close(&mut self) -> Result<()> {
                self.calls.close()
            }

            fn is_connected(&self) -> bool {
                self.calls.connected
            }
        }
    };
}

/// How a Classic block read misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockFault {
    /// Transceive error
    Corrupt,
    /// Tag leaves the field
    Lost,
    /// Answer a single NAK byte this many times, then the real data
    Nak(usize),
}

#[derive(Debug, Default)]
pub(crate) struct MockClassic {
    pub calls: Calls,
    pub sectors: usize,
    pub accepted: HashMap<usize, Vec<(ClassicKey, KeyType)>>,
    pub faults: HashMap<usize, BlockFault>,
    pub auth_log: Vec<(usize, ClassicKey, KeyType)>,
    pub reads: Vec<usize>,
}

impl MockClassic {
    pub(crate) fn new(sectors: usize) -> Self {
        Self {
            sectors,
            ..Default::default()
        }
    }

    /// Let `key` authenticate `sector` in the given role
    pub(crate) fn accept(mut self, sector: usize, key: ClassicKey, key_type: KeyType) -> Self {
        self.accepted.entry(sector).or_default().push((key, key_type));
        self
    }

    pub(crate) fn fault(mut self, block: usize, fault: BlockFault) -> Self {
        self.faults.insert(block, fault);
        self
    }

    /// Block contents: every byte is the block index
    pub(crate) fn block_data(block: usize) -> Bytes {
        Bytes::from(vec![block as u8; 16])
    }
}

impl_tag_technology!(MockClassic);

#[async_trait]
impl ClassicTechnology for MockClassic {
    fn sector_count(&self) -> usize {
        self.sectors
    }

    async fn authenticate(
        &mut self,
        sector: usize,
        key: &ClassicKey,
        key_type: KeyType,
    ) -> Result<bool> {
        self.auth_log.push((sector, *key, key_type));
        Ok(self
            .accepted
            .get(&sector)
            .is_some_and(|keys| keys.contains(&(*key, key_type))))
    }

    async fn read_block(&mut self, block: usize) -> Result<Bytes> {
        self.reads.push(block);
        match self.faults.get_mut(&block) {
            Some(BlockFault::Corrupt) => Err(Error::transceive(format!("CRC error on block {block}"))),
            Some(BlockFault::Lost) => Err(Error::tag_lost("tag left the field")),
            Some(BlockFault::Nak(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Ok(Bytes::from_static(&[0x04]))
            }
            _ => Ok(Self::block_data(block)),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockUltralight {
    pub calls: Calls,
    pub pages: Vec<[u8; 4]>,
    pub version: Option<Vec<u8>>,
    pub replies_to_auth1: bool,
    pub lost_at_page: Option<u8>,
    pub commands: Vec<Vec<u8>>,
}

impl MockUltralight {
    pub(crate) fn new(page_count: usize) -> Self {
        Self {
            pages: (0..page_count).map(|p| [p as u8; 4]).collect(),
            ..Default::default()
        }
    }
}

impl_tag_technology!(MockUltralight);

#[async_trait]
impl UltralightTechnology for MockUltralight {
    async fn read_pages(&mut self, page: u8) -> Result<Bytes> {
        if self.lost_at_page.is_some_and(|lost| page >= lost) {
            return Err(Error::tag_lost("tag left the field"));
        }
        let count = self.pages.len();
        Ok((0..4)
            .flat_map(|i| self.pages[(page as usize + i) % count])
            .collect::<Vec<u8>>()
            .into())
    }

    async fn do_transceive(&mut self, data: &[u8]) -> Result<Bytes> {
        self.commands.push(data.to_vec());
        match data.first() {
            Some(0x60) => self
                .version
                .clone()
                .map(Bytes::from)
                .ok_or_else(|| Error::transceive("no answer to GET_VERSION")),
            Some(0x1A) if self.replies_to_auth1 => Ok(Bytes::from_static(&[0xAF, 1, 2, 3, 4, 5, 6, 7, 8])),
            Some(0x1A) => Err(Error::transceive("no answer to AUTH_1")),
            Some(0x50) => Err(Error::transceive("halted")),
            _ => Err(Error::transceive("unexpected command")),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockVicinity {
    pub calls: Calls,
    pub uid: Vec<u8>,
    pub system_info: Option<Vec<u8>>,
    pub blocks: Vec<Vec<u8>>,
    pub lost_at_block: Option<u8>,
}

impl_tag_technology!(MockVicinity);

#[async_trait]
impl VicinityTechnology for MockVicinity {
    fn uid(&self) -> &[u8] {
        &self.uid
    }

    async fn do_transceive(&mut self, data: &[u8]) -> Result<Bytes> {
        match data {
            [0x22, 0x2B, ..] => match &self.system_info {
                Some(info) => Ok([&[0x00][..], info.as_slice()].concat().into()),
                None => Err(Error::transceive("no system info")),
            },
            [0x22, 0x20, .., block] => {
                if self.lost_at_block.is_some_and(|lost| *block >= lost) {
                    return Err(Error::tag_lost("tag left the field"));
                }
                match self.blocks.get(*block as usize) {
                    Some(data) => Ok([&[0x00][..], data.as_slice()].concat().into()),
                    // Error flag set, block address not available
                    None => Ok(Bytes::from_static(&[0x01, 0x10])),
                }
            }
            _ => Err(Error::transceive("unexpected command")),
        }
    }
}

/// Scripted APDU card: replies are looked up by exact command bytes
#[derive(Debug, Default)]
pub(crate) struct MockTransceiver {
    pub calls: Calls,
    pub replies: HashMap<Vec<u8>, VecDeque<Vec<u8>>>,
    pub failing: HashSet<Vec<u8>>,
    pub lost: HashSet<Vec<u8>>,
    pub default_reply: Vec<u8>,
    pub commands: Vec<Vec<u8>>,
}

impl MockTransceiver {
    pub(crate) fn new(default_reply: &[u8]) -> Self {
        Self {
            default_reply: default_reply.to_vec(),
            ..Default::default()
        }
    }

    /// Queue a reply; the last queued reply repeats
    pub(crate) fn reply(mut self, command: &[u8], response: &[u8]) -> Self {
        self.replies
            .entry(command.to_vec())
            .or_default()
            .push_back(response.to_vec());
        self
    }

    pub(crate) fn fail(mut self, command: &[u8]) -> Self {
        self.failing.insert(command.to_vec());
        self
    }

    /// The tag leaves the field when this command is sent
    pub(crate) fn lose(mut self, command: &[u8]) -> Self {
        self.lost.insert(command.to_vec());
        self
    }

    pub(crate) fn sent(&self, command: &[u8]) -> usize {
        self.commands.iter().filter(|c| c.as_slice() == command).count()
    }
}

impl_tag_technology!(MockTransceiver);

#[async_trait]
impl CardTransceiver for MockTransceiver {
    async fn do_transceive(&mut self, data: &[u8]) -> Result<Bytes> {
        self.commands.push(data.to_vec());
        if self.failing.contains(data) {
            return Err(Error::transceive("scripted failure"));
        }
        if self.lost.contains(data) {
            return Err(Error::tag_lost("scripted tag loss"));
        }
        let reply = match self.replies.get_mut(data) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => self.default_reply.clone(),
        };
        Ok(reply.into())
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockFelica {
    pub calls: Calls,
    pub idm: Vec<u8>,
    pub system_codes: Vec<u16>,
    /// Systems that answer polling, with their PMm
    pub pmm: BTreeMap<u16, Vec<u8>>,
    /// Services per system, each with its blocks
    pub services: BTreeMap<u16, BTreeMap<u16, Vec<Vec<u8>>>>,
    pub selected: Option<u16>,
    pub selects: Vec<u16>,
}

impl_tag_technology!(MockFelica);

#[async_trait]
impl FelicaTechnology for MockFelica {
    async fn idm(&mut self) -> Result<Bytes> {
        Ok(Bytes::from(self.idm.clone()))
    }

    async fn system_codes(&mut self) -> Result<Vec<u16>> {
        Ok(self.system_codes.clone())
    }

    async fn select_system(&mut self, system_code: u16) -> Result<Option<Bytes>> {
        self.selects.push(system_code);
        let pmm = if system_code == 0xFFFF {
            self.pmm.values().next().cloned()
        } else {
            self.pmm.get(&system_code).cloned()
        };
        if pmm.is_some() {
            self.selected = Some(system_code);
        }
        Ok(pmm.map(Bytes::from))
    }

    async fn service_codes(&mut self) -> Result<Vec<u16>> {
        Ok(self
            .selected
            .and_then(|system| self.services.get(&system))
            .map(|services| services.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn read_block(&mut self, service_code: u16, block: u8) -> Result<Option<Bytes>> {
        Ok(self
            .selected
            .and_then(|system| self.services.get(&system))
            .and_then(|services| services.get(&service_code))
            .and_then(|blocks| blocks.get(block as usize))
            .cloned()
            .map(Bytes::from))
    }
}

#[derive(Debug, Clone, Copy)]
enum Crypto1Phase {
    Idle,
    /// Nonce sent, waiting for `{nR}{aR}`
    Challenged { cipher: Crypto1, nt: u32 },
    Authenticated { cipher: Crypto1 },
}

/// Classic card that runs Crypto1 on raw frames
///
/// Its nonce PRNG moves [`Self::STEPS_PER_FRAME`] steps for every frame
/// received, so the gap between two nonces only depends on the frames
/// exchanged in between.
#[derive(Debug)]
pub(crate) struct MockCrypto1Card {
    pub calls: Calls,
    pub uid: u32,
    pub keys: Vec<ClassicSectorKey>,
    pub raw_frames: usize,
    pub nested_auths: usize,
    clock: u32,
    phase: Crypto1Phase,
}

impl MockCrypto1Card {
    pub(crate) const STEPS_PER_FRAME: u32 = 80;

    pub(crate) fn new(uid: u32, keys: Vec<ClassicSectorKey>) -> Self {
        Self {
            calls: Calls::default(),
            uid,
            keys,
            raw_frames: 0,
            nested_auths: 0,
            clock: prng_successor(0x0120_0145, 32),
            phase: Crypto1Phase::Idle,
        }
    }

    fn key(&self, sector: usize, key_type: KeyType) -> Option<ClassicKey> {
        self.keys.get(sector).map(|keys| keys.key(key_type))
    }

    /// Parse a plaintext AUTH command into its sector and role
    fn auth_target(command: &[u8]) -> Option<(usize, KeyType)> {
        let key_type = match command.first()? {
            0x60 => KeyType::A,
            0x61 => KeyType::B,
            _ => return None,
        };
        let block = usize::from(*command.get(1)?);
        let sector = if block < 128 { block / 4 } else { 32 + (block - 128) / 16 };
        Some((sector, key_type))
    }

    /// The card nonce encrypted under the target key, with masked parity
    fn encrypted_nonce(&self, key: &ClassicKey, nt: u32) -> (Crypto1, RawFrame) {
        let mut cipher = Crypto1::new(key);
        let mut frame = RawFrame::default();
        for (byte, uid_byte) in nt.to_be_bytes().into_iter().zip(self.uid.to_be_bytes()) {
            frame.data.push(byte ^ cipher.byte(byte ^ uid_byte, false));
            frame.parity.push(odd_parity(byte) ^ cipher.peek());
        }
        (cipher, frame)
    }

    fn word(data: &[u8]) -> Option<u32> {
        Some(u32::from_be_bytes(data.get(..4)?.try_into().ok()?))
    }
}

impl_tag_technology!(MockCrypto1Card);

#[async_trait]
impl ClassicTechnology for MockCrypto1Card {
    fn sector_count(&self) -> usize {
        self.keys.len()
    }

    async fn authenticate(
        &mut self,
        sector: usize,
        key: &ClassicKey,
        key_type: KeyType,
    ) -> Result<bool> {
        self.phase = Crypto1Phase::Idle;
        Ok(self.key(sector, key_type) == Some(*key))
    }

    async fn read_block(&mut self, block: usize) -> Result<Bytes> {
        Ok(MockClassic::block_data(block))
    }
}

#[async_trait]
impl ClassicRawTechnology for MockCrypto1Card {
    async fn transceive_raw(&mut self, frame: &RawFrame) -> Result<RawFrame> {
        self.raw_frames += 1;
        self.clock = prng_successor(self.clock, Self::STEPS_PER_FRAME);
        let nt = self.clock;

        match self.phase {
            Crypto1Phase::Idle => {
                let Some((sector, key_type)) = Self::auth_target(&frame.data) else {
                    return Ok(RawFrame::default());
                };
                let Some(key) = self.key(sector, key_type) else {
                    return Ok(RawFrame::default());
                };
                self.phase = Crypto1Phase::Challenged {
                    cipher: Crypto1::for_session(&key, self.uid, nt),
                    nt,
                };
                Ok(RawFrame::plain(nt.to_be_bytes().to_vec()))
            }
            Crypto1Phase::Challenged {
                mut cipher,
                nt: challenge,
            } => {
                self.phase = Crypto1Phase::Idle;
                let (Some(nr), Some(ar)) = (
                    Self::word(&frame.data),
                    frame.data.get(4..).and_then(Self::word),
                ) else {
                    return Ok(RawFrame::default());
                };
                cipher.word(nr, true);
                if ar ^ cipher.word(0, false) != prng_successor(challenge, 64) {
                    return Ok(RawFrame::default());
                }
                let at = prng_successor(challenge, 96) ^ cipher.word(0, false);
                self.phase = Crypto1Phase::Authenticated { cipher };
                Ok(RawFrame::plain(at.to_be_bytes().to_vec()))
            }
            Crypto1Phase::Authenticated { mut cipher } => {
                let command = cipher.decrypt(&frame.data);
                let target = Self::auth_target(&command)
                    .and_then(|(sector, key_type)| self.key(sector, key_type));
                let Some(key) = target else {
                    self.phase = Crypto1Phase::Idle;
                    return Ok(RawFrame::default());
                };
                self.nested_auths += 1;
                let (cipher, answer) = self.encrypted_nonce(&key, nt);
                self.phase = Crypto1Phase::Challenged { cipher, nt };
                Ok(answer)
            }
        }
    }

    async fn reselect(&mut self) -> Result<()> {
        self.phase = Crypto1Phase::Idle;
        Ok(())
    }
}
