//! One read of one tag: connect, read, always disconnect
//!
//! [`read_tag`] owns the technology handle for the duration of the read.
//! The family-specific work is delegated to a [`TagReader`], which also
//! carries whatever the family needs besides the handle (Classic key
//! material, ISO 7816 application profiles, FeliCa options).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{
    Error, RawCard, Result, TagId,
    cepas::{self, RawCepasCard},
    classic::{self, ClassicReadOptions, NestedOptions, RawClassicCard},
    desfire::{self, RawDesfireCard},
    felica::{self, FelicaReadOptions, RawFelicaCard},
    iso7816::{self, Iso7816AppConfig},
    keys::ClassicKeyMaterial,
    technology::{
        CardTransceiver, ClassicRawTechnology, ClassicTechnology, FelicaTechnology, TagTechnology,
        UltralightTechnology, VicinityTechnology,
    },
    ultralight::{self, RawUltralightCard},
    vicinity::{self, RawVicinityCard},
};

/// Ties a chip family's reader to a technology
#[async_trait]
pub trait TagReader<T: TagTechnology + ?Sized>: Send + Sync {
    /// Raw card the reader produces
    type Raw: Into<RawCard> + Send;

    /// Read the card over an already connected technology
    async fn read(&self, tag_id: &TagId, tech: &mut T) -> Result<Self::Raw>;
}

/// Connect, read and disconnect
///
/// The disconnect is attempted exactly once whenever the connect succeeded,
/// whatever the outcome of the read, and its failure is only logged. When
/// `cancel` fires the connect or the read is dropped at its next suspension
/// point and [`Error::Cancelled`] is returned once the tag is closed. A
/// connect cancelled before the link came up is not closed.
#[instrument(skip_all, fields(tag_id = %tag_id))]
pub async fn read_tag<T, R>(tag_id: &TagId, tech: &mut T, reader: &R, cancel: &CancellationToken) -> Result<RawCard>
where
    T: TagTechnology + ?Sized,
    R: TagReader<T> + ?Sized,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let connected = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        result = tech.connect() => result,
    };
    if let Err(e) = connected {
        // A connect dropped half way may already hold the link
        if matches!(e, Error::Cancelled) && tech.is_connected() {
            close(tech).await;
        }
        return Err(e);
    }
    debug!("Connected");

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        result = reader.read(tag_id, tech) => result,
    };

    close(tech).await;

    match &outcome {
        Ok(_) => debug!("Read finished"),
        Err(e) => debug!(error = %e, "Read failed"),
    }
    outcome.map(Into::into)
}

async fn close<T: TagTechnology + ?Sized>(tech: &mut T) {
    if let Err(e) = tech.close().await {
        warn!(error = %e, "Failed to close tag");
    }
}

/// MIFARE Classic with key recovery
#[derive(Debug, Clone)]
pub struct ClassicReader {
    keys: ClassicKeyMaterial,
    options: ClassicReadOptions,
}

impl ClassicReader {
    /// Read with the given candidate keys
    pub fn new(keys: ClassicKeyMaterial) -> Self {
        Self {
            keys,
            options: ClassicReadOptions::default(),
        }
    }

    /// Set the read options
    pub const fn with_options(mut self, options: ClassicReadOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl<T> TagReader<T> for ClassicReader
where
    T: ClassicTechnology + ?Sized,
{
    type Raw = RawClassicCard;

    async fn read(&self, tag_id: &TagId, tech: &mut T) -> Result<RawClassicCard> {
        classic::read_card_with_options(tag_id, tech, &self.keys, &self.options).await
    }
}

/// MIFARE Classic with nested recovery of the keys the candidates miss
#[derive(Debug, Clone)]
pub struct NestedClassicReader {
    keys: ClassicKeyMaterial,
    options: ClassicReadOptions,
    nested: NestedOptions,
}

impl NestedClassicReader {
    /// Read with the given candidate keys and default tuning
    pub fn new(keys: ClassicKeyMaterial) -> Self {
        Self {
            keys,
            options: ClassicReadOptions::default(),
            nested: NestedOptions::default(),
        }
    }

    /// Set the nested recovery tuning
    pub const fn with_nested_options(mut self, nested: NestedOptions) -> Self {
        self.nested = nested;
        self
    }
}

#[async_trait]
impl<T> TagReader<T> for NestedClassicReader
where
    T: ClassicRawTechnology + ?Sized,
{
    type Raw = RawClassicCard;

    async fn read(&self, tag_id: &TagId, tech: &mut T) -> Result<RawClassicCard> {
        classic::read_card_with_nested(tag_id, tech, &self.keys, &self.options, &self.nested).await
    }
}

/// MIFARE Ultralight and NTAG
#[derive(Debug, Clone, Copy, Default)]
pub struct UltralightReader;

#[async_trait]
impl<T> TagReader<T> for UltralightReader
where
    T: UltralightTechnology + ?Sized,
{
    type Raw = RawUltralightCard;

    async fn read(&self, tag_id: &TagId, tech: &mut T) -> Result<RawUltralightCard> {
        ultralight::read_card(tag_id, tech).await
    }
}

/// ISO 15693
#[derive(Debug, Clone, Copy, Default)]
pub struct VicinityReader;

#[async_trait]
impl<T> TagReader<T> for VicinityReader
where
    T: VicinityTechnology + ?Sized,
{
    type Raw = RawVicinityCard;

    async fn read(&self, tag_id: &TagId, tech: &mut T) -> Result<RawVicinityCard> {
        vicinity::read_card(tag_id, tech).await
    }
}

/// DESFire only, without trying ISO 7816 applications first
#[derive(Debug, Clone, Copy, Default)]
pub struct DesfireReader;

#[async_trait]
impl<T> TagReader<T> for DesfireReader
where
    T: CardTransceiver + ?Sized,
{
    type Raw = RawDesfireCard;

    async fn read(&self, tag_id: &TagId, tech: &mut T) -> Result<RawDesfireCard> {
        desfire::read_card(tag_id, tech).await
    }
}

/// ISO-DEP: ISO 7816 applications, falling back to DESFire
#[derive(Debug, Clone)]
pub struct IsoDepReader {
    configs: Vec<Iso7816AppConfig>,
}

impl IsoDepReader {
    /// Try the given application profiles
    pub const fn new(configs: Vec<Iso7816AppConfig>) -> Self {
        Self { configs }
    }
}

impl Default for IsoDepReader {
    fn default() -> Self {
        Self::new(iso7816::default_app_configs())
    }
}

#[async_trait]
impl<T> TagReader<T> for IsoDepReader
where
    T: CardTransceiver + ?Sized,
{
    type Raw = RawCard;

    async fn read(&self, tag_id: &TagId, tech: &mut T) -> Result<RawCard> {
        iso7816::read_iso_dep(tag_id, tech, &self.configs).await
    }
}

/// CEPAS
#[derive(Debug, Clone, Copy, Default)]
pub struct CepasReader;

#[async_trait]
impl<T> TagReader<T> for CepasReader
where
    T: CardTransceiver + ?Sized,
{
    type Raw = RawCepasCard;

    async fn read(&self, tag_id: &TagId, tech: &mut T) -> Result<RawCepasCard> {
        cepas::read_card(tag_id, tech).await
    }
}

/// FeliCa
#[derive(Debug, Clone, Copy, Default)]
pub struct FelicaReader {
    options: FelicaReadOptions,
}

impl FelicaReader {
    /// Read with the given options
    pub const fn new(options: FelicaReadOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl<T> TagReader<T> for FelicaReader
where
    T: FelicaTechnology + ?Sized,
{
    type Raw = RawFelicaCard;

    async fn read(&self, tag_id: &TagId, tech: &mut T) -> Result<RawFelicaCard> {
        felica::read_card(tag_id, tech, &self.options).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use super::*;
    use crate::technology::mock::MockVicinity;

    /// Handle whose connect and close can be told to fail
    #[derive(Debug, Default)]
    struct Probe {
        connects: usize,
        closes: usize,
        fail_connect: bool,
        fail_close: bool,
        /// Never gets the link up
        stall_connect: bool,
        /// Link up, then stuck before connect returns
        hang_connect: bool,
    }

    #[async_trait]
    impl TagTechnology for Probe {
        async fn connect(&mut self) -> Result<()> {
            if self.stall_connect {
                std::future::pending::<()>().await;
            }
            self.connects += 1;
            if self.hang_connect {
                std::future::pending::<()>().await;
            }
            if self.fail_connect {
                return Err(Error::connection("wrong technology"));
            }
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closes += 1;
            if self.fail_close {
                return Err(Error::tag_lost("already gone"));
            }
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connects > self.closes
        }
    }

    enum Script {
        Succeed,
        Fail,
        Hang,
    }

    struct Scripted {
        script: Script,
        calls: AtomicUsize,
    }

    impl Scripted {
        const fn new(script: Script) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TagReader<Probe> for Scripted {
        type Raw = RawVicinityCard;

        async fn read(&self, tag_id: &TagId, _tech: &mut Probe) -> Result<RawVicinityCard> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script {
                Script::Succeed => Ok(RawVicinityCard {
                    tag_id: tag_id.clone(),
                    scanned_at: Utc::now(),
                    system_info: None,
                    pages: vec![],
                    is_partial_read: false,
                }),
                Script::Fail => Err(Error::unsupported_variant("unknown chip")),
                Script::Hang => std::future::pending().await,
            }
        }
    }

    fn tag() -> TagId {
        TagId::new(vec![0xE0, 0x04, 0x01])
    }

    #[tokio::test]
    async fn test_closes_after_success() {
        let mut tech = Probe::default();
        let card = read_tag(&tag(), &mut tech, &Scripted::new(Script::Succeed), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(card.tag_id(), &tag());
        assert_eq!((tech.connects, tech.closes), (1, 1));
    }

    #[tokio::test]
    async fn test_closes_after_failure() {
        let mut tech = Probe::default();
        let err = read_tag(&tag(), &mut tech, &Scripted::new(Script::Fail), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedVariant(_)));
        assert_eq!(tech.closes, 1);
    }

    #[tokio::test]
    async fn test_close_failure_does_not_mask_result() {
        let mut tech = Probe {
            fail_close: true,
            ..Default::default()
        };
        let result = read_tag(&tag(), &mut tech, &Scripted::new(Script::Succeed), &CancellationToken::new()).await;
        assert!(result.is_ok());
        assert_eq!(tech.closes, 1);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let mut tech = Probe {
            fail_connect: true,
            ..Default::default()
        };
        let reader = Scripted::new(Script::Succeed);
        let err = read_tag(&tag(), &mut tech, &reader, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert_eq!(reader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(tech.closes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_read() {
        let mut tech = Probe::default();
        let cancel = CancellationToken::new();
        let reader = Scripted::new(Script::Hang);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = read_tag(&tag(), &mut tech, &reader, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
        assert_eq!((tech.connects, tech.closes), (1, 1));
    }

    fn cancel_after(cancel: &CancellationToken, millis: u64) {
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
            trigger.cancel();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_connect_closes_open_link() {
        let mut tech = Probe {
            hang_connect: true,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let reader = Scripted::new(Script::Succeed);
        cancel_after(&cancel, 50);

        let err = read_tag(&tag(), &mut tech, &reader, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(reader.calls.load(Ordering::SeqCst), 0);
        assert_eq!((tech.connects, tech.closes), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_connect_without_link() {
        let mut tech = Probe {
            stall_connect: true,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel_after(&cancel, 50);

        let err = read_tag(&tag(), &mut tech, &Scripted::new(Script::Succeed), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!((tech.connects, tech.closes), (0, 0));
    }

    #[tokio::test]
    async fn test_cancelled_before_connect() {
        let mut tech = Probe::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = read_tag(&tag(), &mut tech, &Scripted::new(Script::Succeed), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(tech.connects, 0);
    }

    #[tokio::test]
    async fn test_family_reader() {
        let mut tech = MockVicinity {
            uid: vec![0xE0, 0x04, 0x01],
            blocks: vec![vec![0x01; 4], vec![0x02; 4]],
            ..Default::default()
        };
        let card = read_tag(&tag(), &mut tech, &VicinityReader, &CancellationToken::new())
            .await
            .unwrap();

        let RawCard::Vicinity(card) = card else {
            panic!("expected a vicinity card");
        };
        assert_eq!(card.pages.len(), 2);
        assert_eq!((tech.calls.connect, tech.calls.close), (1, 1));
        assert!(!tech.calls.connected);
    }

    #[tokio::test]
    async fn test_nested_reader_opens_locked_sector() {
        use crate::{
            classic::RawClassicSector,
            keys::{ClassicKey, ClassicSectorKey},
            technology::mock::MockCrypto1Card,
        };

        let uid = [0x9C, 0x59, 0x9B, 0x32];
        let locked = ClassicKey::new([0x4D, 0x3A, 0x99, 0xC3, 0x51, 0xDD]);
        let mut tech = MockCrypto1Card::new(
            u32::from_be_bytes(uid),
            vec![
                ClassicSectorKey::new(ClassicKey::DEFAULT, ClassicKey::DEFAULT),
                ClassicSectorKey::new(locked, locked),
            ],
        );
        let reader = NestedClassicReader::new(ClassicKeyMaterial::new(None, vec![ClassicKey::DEFAULT]))
            .with_nested_options(
                NestedOptions::default()
                    .with_calibration_rounds(4)
                    .with_samples(3)
                    .with_tolerance(2),
            );

        let card = read_tag(&TagId::new(uid.to_vec()), &mut tech, &reader, &CancellationToken::new())
            .await
            .unwrap();

        let RawCard::MifareClassic(card) = card else {
            panic!("expected a classic card");
        };
        assert!(matches!(&card.sectors[1], RawClassicSector::Data { key_a: Some(key), .. } if *key == locked));
        assert_eq!((tech.calls.connect, tech.calls.close), (1, 1));
    }
}
