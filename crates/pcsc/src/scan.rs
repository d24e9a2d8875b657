//! One read of the card in a PC/SC reader

use tapread_core::{
    CardType, RawCard, Result, TagId,
    classic::ClassicReadOptions,
    felica::FelicaReadOptions,
    iso7816::{self, Iso7816AppConfig},
    keys::ClassicKeyMaterial,
    lifecycle::{
        CepasReader, ClassicReader, DesfireReader, FelicaReader, IsoDepReader, UltralightReader, VicinityReader,
    },
    read_tag,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::{
    PcscConnection,
    atr::AtrInfo,
    tech::{PcscClassic, PcscFelica, PcscIsoDep, PcscUltralight, PcscVicinity},
};

/// Sector count assumed when the ATR does not name a Classic card
const DEFAULT_CLASSIC_SECTORS: usize = 16;

/// Everything a read needs besides the card
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Candidate keys for MIFARE Classic
    pub keys: ClassicKeyMaterial,
    /// MIFARE Classic read options
    pub classic: ClassicReadOptions,
    /// FeliCa read options
    pub felica: FelicaReadOptions,
    /// ISO 7816 application profiles to try on ISO-DEP cards
    pub iso7816: Vec<Iso7816AppConfig>,
    /// Read as this family whatever the ATR says
    pub family: Option<CardType>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            keys: ClassicKeyMaterial::default(),
            classic: ClassicReadOptions::default(),
            felica: FelicaReadOptions::default(),
            iso7816: iso7816::default_app_configs(),
            family: None,
        }
    }
}

impl ScanOptions {
    /// Use `keys` for MIFARE Classic
    pub fn with_keys(mut self, keys: ClassicKeyMaterial) -> Self {
        self.keys = keys;
        self
    }

    /// Override the family detected from the ATR
    pub const fn with_family(mut self, family: Option<CardType>) -> Self {
        self.family = family;
        self
    }

    /// Set the FeliCa read options
    pub const fn with_felica(mut self, felica: FelicaReadOptions) -> Self {
        self.felica = felica;
        self
    }
}

/// Read the card behind `connection`
///
/// The family comes from the ATR unless the options force one. CEPAS cards
/// look like any other ISO-DEP card to the reader and have to be asked for.
/// The connection is closed when the read ends, whatever the outcome.
#[instrument(skip_all, fields(reader = connection.reader_name()))]
pub async fn read_card(
    connection: PcscConnection,
    options: &ScanOptions,
    cancel: &CancellationToken,
) -> Result<RawCard> {
    let atr = connection.atr()?;
    let detected = AtrInfo::from_atr(&atr);
    let family = options.family.unwrap_or(detected.card_type);
    let tag_id = TagId::new(connection.uid()?);
    info!(atr = %hex::encode(&atr), %family, %tag_id, "Card detected");

    match family {
        CardType::MifareClassic => {
            let sectors = detected.classic_sectors.unwrap_or(DEFAULT_CLASSIC_SECTORS);
            let reader = ClassicReader::new(options.keys.clone()).with_options(options.classic);
            read_tag(&tag_id, &mut PcscClassic::new(connection, sectors), &reader, cancel).await
        }
        CardType::MifareUltralight => {
            read_tag(&tag_id, &mut PcscUltralight::new(connection), &UltralightReader, cancel).await
        }
        CardType::Vicinity => {
            let uid = tag_id.as_bytes().to_vec();
            read_tag(&tag_id, &mut PcscVicinity::new(connection, uid), &VicinityReader, cancel).await
        }
        CardType::Felica => {
            let reader = FelicaReader::new(options.felica);
            read_tag(&tag_id, &mut PcscFelica::new(connection), &reader, cancel).await
        }
        CardType::MifareDesfire => {
            read_tag(&tag_id, &mut PcscIsoDep::new(connection), &DesfireReader, cancel).await
        }
        CardType::Cepas => read_tag(&tag_id, &mut PcscIsoDep::new(connection), &CepasReader, cancel).await,
        CardType::Iso7816 => {
            let reader = IsoDepReader::new(options.iso7816.clone());
            read_tag(&tag_id, &mut PcscIsoDep::new(connection), &reader, cancel).await
        }
    }
}
