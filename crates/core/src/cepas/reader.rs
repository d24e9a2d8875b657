use chrono::Utc;
use tracing::{debug, instrument};

use super::{CepasError, CepasProtocol, PURSE_COUNT, RawCepasCard, RawCepasHistory, RawCepasPurse};
use crate::{Result, TagId, technology::CardTransceiver};

/// Read all sixteen purses, then the transaction log of each readable one
#[instrument(skip_all, fields(tag_id = %tag_id))]
pub async fn read_card<T>(tag_id: &TagId, tech: &mut T) -> Result<RawCepasCard>
where
    T: CardTransceiver + ?Sized,
{
    let mut protocol = CepasProtocol::new(tech);

    let mut purses = Vec::with_capacity(PURSE_COUNT);
    for id in 0..PURSE_COUNT as u8 {
        let purse = match protocol.purse(id).await {
            Ok(data) => RawCepasPurse::Data { id, data },
            Err(e) if e.is_tag_lost() => return Err(e.into()),
            Err(e) if e.is_unauthorized() => RawCepasPurse::Unauthorized { id },
            Err(e) => {
                debug!(purse = id, error = %e, "Purse not readable");
                RawCepasPurse::Invalid { id, error: e.to_string() }
            }
        };
        purses.push(purse);
    }

    let mut histories = Vec::with_capacity(PURSE_COUNT);
    for purse in &purses {
        let id = purse.id();
        let history = match purse.log_record_count() {
            Some(count) => read_history(&mut protocol, id, count).await?,
            None => RawCepasHistory::Invalid {
                id,
                error: "Invalid Purse".into(),
            },
        };
        histories.push(history);
    }

    Ok(RawCepasCard {
        tag_id: tag_id.clone(),
        scanned_at: Utc::now(),
        purses,
        histories,
    })
}

async fn read_history<T>(protocol: &mut CepasProtocol<'_, T>, id: u8, count: u8) -> Result<RawCepasHistory>
where
    T: CardTransceiver + ?Sized,
{
    match protocol.history(id, count).await {
        Ok(data) => Ok(RawCepasHistory::Data { id, data }),
        Err(e) if e.is_tag_lost() => Err(e.into()),
        Err(e) => Ok(history_error(id, &e)),
    }
}

fn history_error(id: u8, error: &CepasError) -> RawCepasHistory {
    debug!(purse = id, error = %error, "History not readable");
    RawCepasHistory::Invalid {
        id,
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::technology::mock::MockTransceiver;

    fn purse_reply(log_records: u8) -> Vec<u8> {
        let mut data = vec![0; 63];
        data[40] = log_records;
        data.extend_from_slice(&[0x90, 0x00]);
        data
    }

    #[tokio::test]
    async fn test_reads_sixteen_purses() {
        let mut tech = MockTransceiver::new(&[0x6B, 0x00])
            .reply(&[0x90, 0x32, 0x03, 0x00, 0x01, 0x00], &purse_reply(2))
            .reply(&[0x90, 0x32, 0x03, 0x00, 0x01, 0x00, 0x20], &[&[0x31; 32][..], &[0x90, 0x00]].concat())
            .reply(&[0x90, 0x32, 0x04, 0x00, 0x01, 0x00], &[0x90, 0x9D]);

        let card = read_card(&TagId::new(vec![1, 2, 3, 4]), &mut tech).await.unwrap();

        assert_eq!(card.purses.len(), 16);
        assert_eq!(card.histories.len(), 16);
        assert!(matches!(card.purses[3], RawCepasPurse::Data { id: 3, .. }));
        assert!(card.purses[4].is_unauthorized());
        assert!(matches!(
            &card.purses[0],
            RawCepasPurse::Invalid { error, .. } if error == "File 0 was an invalid file."
        ));
        assert!(matches!(&card.histories[3], RawCepasHistory::Data { data, .. } if data.len() == 32));
        assert!(matches!(
            &card.histories[4],
            RawCepasHistory::Invalid { error, .. } if error == "Invalid Purse"
        ));

        let parsed = card.parse().unwrap();
        assert_eq!(parsed.history(3).unwrap().len(), 2);
        assert!(parsed.purse(0).is_none());
    }

    #[tokio::test]
    async fn test_tag_lost_is_fatal() {
        let mut tech = MockTransceiver::new(&[0x6B, 0x00]).lose(&[0x90, 0x32, 0x02, 0x00, 0x01, 0x00]);
        let err = read_card(&TagId::new(vec![1]), &mut tech).await.unwrap_err();
        assert!(err.is_tag_lost());
    }
}
