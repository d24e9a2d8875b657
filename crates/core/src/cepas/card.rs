use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use derive_more::Display;
use serde::Serialize;

use super::TRANSACTION_SIZE;
use crate::TagId;

/// 1995-01-01 00:00 in Singapore (UTC+8)
const CEPAS_EPOCH: i64 = 788_889_600;

/// Fixed part of a purse record before the issuer data
const PURSE_HEADER_LEN: usize = 62;

/// What a transaction log entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CepasTransactionType {
    /// Train fare
    #[display("MRT")]
    Mrt,
    /// Value added
    #[display("Top-up")]
    TopUp,
    /// Bus fare
    #[display("Bus")]
    Bus,
    /// Bus fare refund
    #[display("Bus refund")]
    BusRefund,
    /// Card issued
    #[display("Creation")]
    Creation,
    /// Service charge
    #[display("Service")]
    Service,
    /// Shop purchase
    #[display("Retail")]
    Retail,
    /// Anything else
    #[display("Unknown ({_0:#04x})")]
    Unknown(u8),
}

impl CepasTransactionType {
    /// Map the type byte
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x30 => Self::Mrt,
            0x75 | 0x03 => Self::TopUp,
            0x31 => Self::Bus,
            0x76 => Self::BusRefund,
            0xF0 | 0x05 => Self::Creation,
            0x04 => Self::Service,
            0x01 => Self::Retail,
            other => Self::Unknown(other),
        }
    }
}

/// One 16-byte transaction log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CepasTransaction {
    /// Transaction type
    pub kind: CepasTransactionType,
    /// Signed amount in cents
    pub amount: i32,
    /// When the transaction happened
    pub timestamp: Option<DateTime<Utc>>,
    /// ASCII reference left by the terminal
    pub user_data: String,
}

impl CepasTransaction {
    /// Decode one log entry
    pub fn parse(raw: &[u8; TRANSACTION_SIZE]) -> Self {
        let seconds = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        Self {
            kind: CepasTransactionType::from_byte(raw[0]),
            amount: signed_24(&raw[1..4]),
            timestamp: DateTime::from_timestamp(CEPAS_EPOCH + i64::from(seconds), 0),
            user_data: String::from_utf8_lossy(&raw[8..16])
                .trim_end_matches(['\0', ' '])
                .to_string(),
        }
    }
}

/// A decoded purse record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CepasPurse {
    /// Purse number
    pub id: u8,
    /// CEPAS version
    pub cepas_version: u8,
    /// Purse status byte
    pub purse_status: u8,
    /// Balance in cents
    pub balance: i32,
    /// Automatic top-up amount in cents
    pub auto_load_amount: i32,
    /// Card application number
    #[serde(with = "crate::serde_hex")]
    pub can: Vec<u8>,
    /// Card serial number
    #[serde(with = "crate::serde_hex")]
    pub csn: Vec<u8>,
    /// Purse expiry
    pub expiry_date: Option<DateTime<Utc>>,
    /// Purse creation
    pub creation_date: Option<DateTime<Utc>>,
    /// Terminal reference of the last top-up
    pub last_credit_trp: u32,
    /// Header of the last top-up
    #[serde(with = "crate::serde_hex")]
    pub last_credit_header: Vec<u8>,
    /// Number of entries in the transaction log
    pub log_record_count: u8,
    /// Terminal reference of the last transaction
    pub last_transaction_trp: u32,
    /// Last transaction, repeated from the log
    pub last_transaction: CepasTransaction,
    /// Issuer specific data
    #[serde(with = "crate::serde_hex")]
    pub issuer_data: Vec<u8>,
    /// Debit options of the last transaction
    pub last_transaction_debit_options: u8,
}

impl CepasPurse {
    /// Decode a READ PURSE answer
    pub fn parse(id: u8, data: &[u8]) -> Result<Self, String> {
        if data.len() < PURSE_HEADER_LEN {
            return Err(format!("purse record is {} bytes", data.len()));
        }
        let issuer_len = data[41] as usize;
        let debit_options = *data
            .get(PURSE_HEADER_LEN + issuer_len)
            .ok_or_else(|| format!("purse record is {} bytes with {issuer_len} bytes of issuer data", data.len()))?;

        let mut last_transaction = [0; TRANSACTION_SIZE];
        last_transaction.copy_from_slice(&data[46..62]);

        Ok(Self {
            id,
            cepas_version: data[0],
            purse_status: data[1],
            balance: signed_24(&data[2..5]),
            auto_load_amount: signed_24(&data[5..8]),
            can: data[8..16].to_vec(),
            csn: data[16..24].to_vec(),
            expiry_date: epoch_days(u16::from_be_bytes([data[24], data[25]])),
            creation_date: epoch_days(u16::from_be_bytes([data[26], data[27]])),
            last_credit_trp: u32::from_be_bytes([data[28], data[29], data[30], data[31]]),
            last_credit_header: data[32..40].to_vec(),
            log_record_count: data[40],
            last_transaction_trp: u32::from_be_bytes([data[42], data[43], data[44], data[45]]),
            last_transaction: CepasTransaction::parse(&last_transaction),
            issuer_data: data[PURSE_HEADER_LEN..PURSE_HEADER_LEN + issuer_len].to_vec(),
            last_transaction_debit_options: debit_options,
        })
    }
}

/// A parsed CEPAS card: readable purses and their logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CepasCard {
    /// Tag identifier
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// Purses that could be read, by id
    pub purses: BTreeMap<u8, CepasPurse>,
    /// Transaction logs that could be read, by purse id
    pub histories: BTreeMap<u8, Vec<CepasTransaction>>,
}

impl CepasCard {
    /// Purse by id
    pub fn purse(&self, id: u8) -> Option<&CepasPurse> {
        self.purses.get(&id)
    }

    /// Transaction log of a purse
    pub fn history(&self, id: u8) -> Option<&[CepasTransaction]> {
        self.histories.get(&id).map(Vec::as_slice)
    }
}

/// Split a transaction log into entries
pub(crate) fn parse_history(data: &[u8]) -> Result<Vec<CepasTransaction>, String> {
    if data.len() % TRANSACTION_SIZE != 0 {
        return Err(format!("history of {} bytes is not a whole number of entries", data.len()));
    }
    Ok(data
        .chunks_exact(TRANSACTION_SIZE)
        .filter_map(|chunk| chunk.try_into().ok())
        .map(CepasTransaction::parse)
        .collect())
}

fn signed_24(bytes: &[u8]) -> i32 {
    let fill = if bytes[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    i32::from_be_bytes([fill, bytes[0], bytes[1], bytes[2]])
}

fn epoch_days(days: u16) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(CEPAS_EPOCH, 0)?.checked_add_signed(TimeDelta::days(i64::from(days)))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, FixedOffset, TimeZone, Timelike};

    use super::*;

    fn purse_bytes(balance: i32, log_records: u8) -> Vec<u8> {
        let mut data = vec![0; 64];
        data[0] = 0x01;
        data[2..5].copy_from_slice(&balance.to_be_bytes()[1..]);
        data[8..16].copy_from_slice(&[0x80, 0x09, 0x00, 0x00, 0x12, 0x34, 0x56, 0x78]);
        data[24..26].copy_from_slice(&7305_u16.to_be_bytes());
        data[40] = log_records;
        data[41] = 1;
        data[46] = 0x30;
        data[47..50].copy_from_slice(&[0xFF, 0xFF, 0x9C]);
        data[62] = 0xAB;
        data[63] = 0x02;
        data
    }

    #[test]
    fn test_parse_purse() {
        let purse = CepasPurse::parse(3, &purse_bytes(1234, 5)).unwrap();
        assert_eq!(purse.balance, 1234);
        assert_eq!(purse.log_record_count, 5);
        assert_eq!(purse.issuer_data, vec![0xAB]);
        assert_eq!(purse.last_transaction_debit_options, 0x02);
        assert_eq!(purse.last_transaction.kind, CepasTransactionType::Mrt);
        assert_eq!(purse.last_transaction.amount, -100);

        // 7305 days after 1995-01-01 SGT
        let expiry = purse.expiry_date.unwrap();
        assert_eq!((expiry.year(), expiry.month(), expiry.day(), expiry.hour()), (2014, 12, 31, 16));
    }

    #[test]
    fn test_negative_balance() {
        let purse = CepasPurse::parse(0, &purse_bytes(-50, 0)).unwrap();
        assert_eq!(purse.balance, -50);
    }

    #[test]
    fn test_short_purse() {
        assert!(CepasPurse::parse(0, &[0; 40]).is_err());

        let mut data = purse_bytes(0, 0);
        data[41] = 10;
        assert!(CepasPurse::parse(0, &data).is_err());
    }

    #[test]
    fn test_parse_transaction() {
        let mut raw = [0; TRANSACTION_SIZE];
        raw[0] = 0x75;
        raw[1..4].copy_from_slice(&[0x00, 0x07, 0xD0]);
        raw[4..8].copy_from_slice(&86_400_u32.to_be_bytes());
        raw[8..16].copy_from_slice(b"TOPUP\0\0\0");

        let txn = CepasTransaction::parse(&raw);
        assert_eq!(txn.kind, CepasTransactionType::TopUp);
        assert_eq!(txn.amount, 2000);
        assert_eq!(txn.user_data, "TOPUP");
        assert_eq!(txn.timestamp.unwrap().day(), 1);
    }

    #[test]
    fn test_zero_lands_on_epoch() {
        let epoch = FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(1995, 1, 1, 0, 0, 0)
            .unwrap()
            .with_timezone(&Utc);

        let raw = [0; TRANSACTION_SIZE];
        assert_eq!(CepasTransaction::parse(&raw).timestamp, Some(epoch));
        assert_eq!(epoch_days(0), Some(epoch));
        assert_eq!(epoch.hour(), 16);
    }

    #[test]
    fn test_parse_history() {
        assert_eq!(parse_history(&[0; 48]).unwrap().len(), 3);
        assert!(parse_history(&[0; 20]).is_err());
        assert_eq!(CepasTransactionType::from_byte(0x99).to_string(), "Unknown (0x99)");
    }
}
