use chrono::Utc;
use tracing::{debug, instrument};

use super::{DesfireError, DesfireFileType, DesfireProtocol, RawDesfireApplication, RawDesfireCard, RawDesfireFile};
use crate::{Result, TagId, technology::CardTransceiver};

/// Number of file ids probed when the file directory is locked
const PROBED_FILE_IDS: u8 = 0x20;

/// Read manufacturing data and every application the card lists
///
/// Only a failure to read the manufacturing data is fatal. A locked
/// directory is recorded on the card or application and the read carries on.
#[instrument(skip_all, fields(tag_id = %tag_id))]
pub async fn read_card<T>(tag_id: &TagId, tech: &mut T) -> Result<RawDesfireCard>
where
    T: CardTransceiver + ?Sized,
{
    let mut protocol = DesfireProtocol::new(tech);
    let manufacturing_data = protocol.manufacturing_data().await?;

    let (app_ids, app_list_locked) = match protocol.app_list().await {
        Ok(ids) => (ids, false),
        Err(e) if e.is_unauthorized() => {
            debug!("Application directory is locked");
            (Vec::new(), true)
        }
        Err(e) => return Err(e.into()),
    };

    let mut applications = Vec::with_capacity(app_ids.len());
    for app_id in app_ids {
        match protocol.select_app(app_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(app_id = %format_args!("{app_id:06x}"), "Application vanished, skipping");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
        let (files, dir_list_locked) = read_files(&mut protocol).await?;
        applications.push(RawDesfireApplication {
            app_id,
            files,
            dir_list_locked,
        });
    }

    Ok(RawDesfireCard {
        tag_id: tag_id.clone(),
        scanned_at: Utc::now(),
        manufacturing_data,
        applications,
        app_list_locked,
    })
}

async fn read_files<T>(protocol: &mut DesfireProtocol<'_, T>) -> Result<(Vec<RawDesfireFile>, bool)>
where
    T: CardTransceiver + ?Sized,
{
    let (file_ids, dir_list_locked) = match protocol.file_list().await {
        Ok(ids) => (ids, false),
        Err(e) if e.is_unauthorized() => {
            debug!("File directory is locked, probing every file id");
            ((0..PROBED_FILE_IDS).collect(), true)
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::with_capacity(file_ids.len());
    for file_id in file_ids {
        match protocol.file_settings(file_id).await {
            Ok(settings) => files.push(read_file(protocol, file_id, settings).await),
            Err(e) if e.is_not_found() => continue,
            Err(e) if e.is_unauthorized() => files.push(read_file_without_settings(protocol, file_id).await),
            Err(e) => return Err(e.into()),
        }
    }

    Ok((files, dir_list_locked))
}

async fn read_file<T>(protocol: &mut DesfireProtocol<'_, T>, file_id: u8, settings: Vec<u8>) -> RawDesfireFile
where
    T: CardTransceiver + ?Sized,
{
    let result = match settings.first().copied().and_then(DesfireFileType::from_byte) {
        Some(DesfireFileType::Standard | DesfireFileType::Backup) => protocol.read_file(file_id).await,
        Some(DesfireFileType::Value) => protocol.get_value(file_id).await,
        Some(DesfireFileType::LinearRecord | DesfireFileType::CyclicRecord) => protocol.read_record(file_id).await,
        None => Err(DesfireError::InvalidResponse(format!(
            "unknown file type in settings {}",
            hex::encode(&settings)
        ))),
    };

    match result {
        Ok(data) => RawDesfireFile::Data {
            file_id,
            settings: Some(settings),
            data,
        },
        Err(e) if e.is_unauthorized() => RawDesfireFile::Unauthorized {
            file_id,
            settings: Some(settings),
            error: e.to_string(),
        },
        Err(e) => RawDesfireFile::Invalid {
            file_id,
            settings: Some(settings),
            error: e.to_string(),
        },
    }
}

/// Try every read command in turn; the last failure decides the outcome
async fn read_file_without_settings<T>(protocol: &mut DesfireProtocol<'_, T>, file_id: u8) -> RawDesfireFile
where
    T: CardTransceiver + ?Sized,
{
    if let Ok(data) = protocol.read_file(file_id).await {
        return data_without_settings(file_id, data);
    }
    if let Ok(data) = protocol.get_value(file_id).await {
        return data_without_settings(file_id, data);
    }
    let last_error = match protocol.read_record(file_id).await {
        Ok(data) => return data_without_settings(file_id, data),
        Err(e) => e,
    };

    if last_error.is_unauthorized() {
        RawDesfireFile::Unauthorized {
            file_id,
            settings: None,
            error: last_error.to_string(),
        }
    } else {
        RawDesfireFile::Invalid {
            file_id,
            settings: None,
            error: last_error.to_string(),
        }
    }
}

const fn data_without_settings(file_id: u8, data: Vec<u8>) -> RawDesfireFile {
    RawDesfireFile::Data {
        file_id,
        settings: None,
        data,
    }
}
