use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, instrument};

use super::{
    FileSelector, Iso7816AppConfig, Iso7816Error, Iso7816File, Iso7816Profile, Iso7816Protocol,
    Iso7816Record, RawIso7816Application, RawIso7816Card,
    protocol::{CLASS_80, CLASS_90},
};
use crate::{Error, Result, TagId, technology::CardTransceiver};

/// Highest record number tried in a file
const MAX_RECORD: u8 = 255;

/// Select each configured application and read everything it exposes
///
/// Returns `None` when no application answered, so the caller can try
/// another protocol. Losing the tag is the only error that escapes; any
/// other failure just ends the file or command it happened in.
#[instrument(skip_all, fields(tag_id = %tag_id))]
pub async fn read_card<T>(
    tag_id: &TagId,
    tech: &mut T,
    configs: &[Iso7816AppConfig],
) -> Result<Option<RawIso7816Card>>
where
    T: CardTransceiver + ?Sized,
{
    let mut protocol = Iso7816Protocol::new(tech);
    let mut applications = Vec::new();

    for config in configs {
        let mut selected = None;
        for name in &config.app_names {
            if let Some(fci) = protocol.select_by_name_or_none(name).await {
                selected = Some((name.clone(), fci));
                break;
            }
        }
        let Some((app_name, fci)) = selected else {
            continue;
        };

        debug!(app_type = %config.app_type, app_name = %hex::encode(&app_name), "Selected application");
        applications.push(read_application(&mut protocol, config, app_name, fci).await?);
    }

    if applications.is_empty() {
        debug!("No ISO 7816 application answered");
        return Ok(None);
    }

    Ok(Some(RawIso7816Card {
        tag_id: tag_id.clone(),
        scanned_at: Utc::now(),
        applications,
    }))
}

async fn read_application<T>(
    protocol: &mut Iso7816Protocol<'_, T>,
    config: &Iso7816AppConfig,
    app_name: Vec<u8>,
    fci: Vec<u8>,
) -> Result<RawIso7816Application>
where
    T: CardTransceiver + ?Sized,
{
    let mut sfi_files = BTreeMap::new();
    for sfi in config.sfi_range.clone() {
        let file = read_sfi_file(protocol, sfi).await?;
        if !file.is_empty() {
            sfi_files.insert(sfi, file);
        }
    }

    let mut files = BTreeMap::new();
    for (purse, balance) in read_balances(protocol, config.profile).await? {
        files.insert(format!("balance/{purse}"), Iso7816File::binary(balance));
    }
    for selector in &config.file_selectors {
        match read_selected_file(protocol, &app_name, selector).await {
            Ok(Some(file)) => {
                files.insert(selector.to_string(), file);
            }
            Ok(None) => {}
            Err(e) => {
                let e = Error::from(e);
                if e.is_tag_lost() {
                    return Err(e);
                }
                debug!(file = %selector, error = %e, "Skipping file");
            }
        }
    }
    for (index, record) in read_extra_data(protocol, config.profile).await? {
        files.insert(format!("extra/{index}"), Iso7816File::binary(record));
    }

    Ok(RawIso7816Application {
        app_type: config.app_type.clone(),
        app_name,
        fci,
        files,
        sfi_files,
    })
}

async fn read_sfi_file<T>(protocol: &mut Iso7816Protocol<'_, T>, sfi: u8) -> Result<Iso7816File>
where
    T: CardTransceiver + ?Sized,
{
    let mut records = Vec::new();
    for index in 1..=MAX_RECORD {
        match protocol.read_record_sfi(sfi, index, 0).await {
            Ok(Some(data)) => records.push(Iso7816Record { index, data }),
            Ok(None) => break,
            Err(e) => {
                tolerate(e)?;
                break;
            }
        }
    }

    let binary = match protocol.read_binary_sfi(sfi).await {
        Ok(binary) => binary,
        Err(e) => {
            tolerate(e)?;
            None
        }
    };

    Ok(Iso7816File {
        binary,
        records,
        fci: None,
    })
}

async fn read_selected_file<T>(
    protocol: &mut Iso7816Protocol<'_, T>,
    app_name: &[u8],
    selector: &FileSelector,
) -> std::result::Result<Option<Iso7816File>, Iso7816Error>
where
    T: CardTransceiver + ?Sized,
{
    if let Some(parent) = selector.parent_df {
        protocol.select_by_name(app_name, false).await?;
        protocol.select_by_id(parent).await?;
    }
    if let Err(e) = protocol.unselect_file().await &&
        !e.is_card_error()
    {
        return Err(e);
    }
    let fci = protocol.select_by_id(selector.file_id).await?;

    let mut records = Vec::new();
    for index in 1..=MAX_RECORD {
        match protocol.read_record(index, 0).await {
            Ok(Some(data)) => records.push(Iso7816Record { index, data }),
            Ok(None) | Err(Iso7816Error::EndOfFile) => break,
            Err(e) => return Err(e),
        }
    }
    let binary = protocol.read_binary().await?;

    let file = Iso7816File {
        binary,
        records,
        fci: Some(fci),
    };
    Ok((!file.is_empty()).then_some(file))
}

async fn read_balances<T>(protocol: &mut Iso7816Protocol<'_, T>, profile: Iso7816Profile) -> Result<Vec<(u8, Vec<u8>)>>
where
    T: CardTransceiver + ?Sized,
{
    let mut balances = Vec::new();
    match profile {
        Iso7816Profile::Standard => {}
        Iso7816Profile::China => {
            for purse in 0..=3 {
                match protocol.send_request(CLASS_80, 0x5C, purse, 0x02, 0x04, &[]).await {
                    Ok(data) => balances.push((purse, data)),
                    Err(e) => tolerate(e)?,
                }
            }
        }
        Iso7816Profile::Ksx6924 => match protocol.send_request(CLASS_90, 0x4C, 0x00, 0x00, 0x04, &[]).await {
            Ok(data) => balances.push((0, data)),
            Err(e) => tolerate(e)?,
        },
    }
    Ok(balances)
}

async fn read_extra_data<T>(
    protocol: &mut Iso7816Protocol<'_, T>,
    profile: Iso7816Profile,
) -> Result<Vec<(u8, Vec<u8>)>>
where
    T: CardTransceiver + ?Sized,
{
    let mut records = Vec::new();
    if profile == Iso7816Profile::Ksx6924 {
        for index in 0..=0x0F {
            match protocol.send_request(CLASS_90, 0x78, index, 0x00, 0x10, &[]).await {
                Ok(data) => records.push((index, data)),
                Err(e) => {
                    tolerate(e)?;
                    break;
                }
            }
        }
    }
    Ok(records)
}

/// Swallow anything but a lost tag
fn tolerate(err: Iso7816Error) -> Result<()> {
    let err = Error::from(err);
    if err.is_tag_lost() {
        return Err(err);
    }
    debug!(error = %err, "Ignoring failed command");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::technology::mock::MockTransceiver;

    const OK: [u8; 2] = [0x90, 0x00];
    const NOT_FOUND: [u8; 2] = [0x6A, 0x82];

    fn tag() -> TagId {
        TagId::new(vec![0x08, 0x01, 0x02, 0x03])
    }

    fn select_name(name: &[u8]) -> Vec<u8> {
        [&[0x00, 0xA4, 0x04, 0x00, name.len() as u8][..], name, &[0x00]].concat()
    }

    fn select_id(id: u16) -> Vec<u8> {
        [&[0x00, 0xA4, 0x00, 0x00, 0x02][..], &id.to_be_bytes(), &[0x00]].concat()
    }

    fn with_ok(data: &[u8]) -> Vec<u8> {
        [data, &OK[..]].concat()
    }

    #[tokio::test]
    async fn test_no_application() {
        let mut tech = MockTransceiver::new(&NOT_FOUND);
        let card = read_card(&tag(), &mut tech, &super::super::default_app_configs())
            .await
            .unwrap();
        assert!(card.is_none());
    }

    #[tokio::test]
    async fn test_reads_sfi_files_and_selected_files() {
        let config = Iso7816AppConfig::new("test", vec![vec![0xA0, 0x01], vec![0xA0, 0x02]])
            .with_sfi_range(1..=2)
            .with_file_selectors(vec![FileSelector::new(0x15), FileSelector::new(0x16)]);

        let mut tech = MockTransceiver::new(&NOT_FOUND)
            .reply(&select_name(&[0xA0, 0x02]), &with_ok(&[0x6F, 0x00]))
            // SFI 1: two records then end of file, no binary
            .reply(&[0x00, 0xB2, 0x01, 0x0C, 0x00], &with_ok(&[0x11]))
            .reply(&[0x00, 0xB2, 0x02, 0x0C, 0x00], &with_ok(&[0x12]))
            .reply(&[0x00, 0xB2, 0x03, 0x0C, 0x00], &[0x6A, 0x83])
            // SFI 2: binary only
            .reply(&[0x00, 0xB0, 0x82, 0x00, 0x00], &with_ok(&[0x22, 0x22]))
            .reply(&[0x00, 0xA4, 0x00, 0x00, 0x00], &OK)
            .reply(&select_id(0x15), &with_ok(&[0x6F, 0x15]))
            .reply(&[0x00, 0xB2, 0x01, 0x04, 0x00], &[0x6A, 0x83])
            .reply(&[0x00, 0xB0, 0x00, 0x00, 0x00], &with_ok(&[0x15; 8]));

        let card = read_card(&tag(), &mut tech, &[config]).await.unwrap().unwrap();
        let app = &card.applications[0];

        assert_eq!(app.app_name, vec![0xA0, 0x02]);
        assert_eq!(app.fci, vec![0x6F, 0x00]);
        assert_eq!(app.sfi_files[&1].records.len(), 2);
        assert_eq!(app.sfi_files[&1].binary, None);
        assert_eq!(app.sfi_files[&2].binary, Some(vec![0x22, 0x22]));

        let file = &app.files["15"];
        assert_eq!(file.fci, Some(vec![0x6F, 0x15]));
        assert_eq!(file.binary, Some(vec![0x15; 8]));
        // 0x16 does not select
        assert!(!app.files.contains_key("16"));
    }

    #[tokio::test]
    async fn test_ksx6924_proprietary_commands() {
        let config = Iso7816AppConfig::ksx6924().with_sfi_range(1..=1).with_file_selectors(vec![]);
        let aid = config.app_names[0].clone();

        let mut tech = MockTransceiver::new(&NOT_FOUND)
            .reply(&select_name(&aid), &with_ok(&[0x6F, 0x01]))
            .reply(&[0x90, 0x4C, 0x00, 0x00, 0x04], &with_ok(&[0x00, 0x00, 0x27, 0x10]))
            .reply(&[0x90, 0x78, 0x00, 0x00, 0x10], &with_ok(&[0xE0; 16]))
            .reply(&[0x90, 0x78, 0x01, 0x00, 0x10], &with_ok(&[0xE1; 16]));

        let card = read_card(&tag(), &mut tech, &[config]).await.unwrap().unwrap();
        let app = &card.applications[0];
        assert_eq!(app.files["balance/0"].binary, Some(vec![0x00, 0x00, 0x27, 0x10]));
        assert!(app.files.contains_key("extra/1"));
        assert!(!app.files.contains_key("extra/2"));
        assert_eq!(tech.sent(&[0x90, 0x78, 0x03, 0x00, 0x10]), 0);

        let parsed = card.parse().unwrap();
        assert_eq!(parsed.application("ksx6924").unwrap().balance(0), Some(10_000));
    }

    #[tokio::test]
    async fn test_china_file_below_parent() {
        let aid = b"PAY.SZT".to_vec();
        let config = Iso7816AppConfig::new("china", vec![aid.clone()])
            .with_sfi_range(1..=1)
            .with_file_selectors(vec![FileSelector::under(0x1001, 0x05)])
            .with_profile(Iso7816Profile::China);

        let mut tech = MockTransceiver::new(&NOT_FOUND)
            .reply(&select_name(&aid), &with_ok(&[0x6F]))
            .reply(&[0x80, 0x5C, 0x00, 0x02, 0x04], &with_ok(&[0x00, 0x00, 0x00, 0x64]))
            .reply(&select_id(0x1001), &with_ok(&[]))
            .reply(&[0x00, 0xA4, 0x00, 0x00, 0x00], &OK)
            .reply(&select_id(0x05), &with_ok(&[]))
            .reply(&[0x00, 0xB2, 0x01, 0x04, 0x00], &with_ok(&[0x05, 0x01]))
            .reply(&[0x00, 0xB2, 0x02, 0x04, 0x00], &[0x6A, 0x83]);

        let card = read_card(&tag(), &mut tech, &[config]).await.unwrap().unwrap();
        let app = &card.applications[0];
        assert_eq!(app.files.len(), 2);
        assert_eq!(app.files["1001/5"].records[0].data, vec![0x05, 0x01]);
        assert_eq!(app.files["balance/0"].binary, Some(vec![0, 0, 0, 0x64]));
        assert_eq!(tech.sent(&select_name(&aid)), 2);
    }

    #[tokio::test]
    async fn test_tag_lost_escapes() {
        let config = Iso7816AppConfig::new("test", vec![vec![0xA0]]);
        let mut tech = MockTransceiver::new(&NOT_FOUND)
            .reply(&select_name(&[0xA0]), &with_ok(&[]))
            .lose(&[0x00, 0xB2, 0x01, 0x0C, 0x00]);

        let err = read_card(&tag(), &mut tech, &[config]).await.unwrap_err();
        assert!(err.is_tag_lost());
    }
}
