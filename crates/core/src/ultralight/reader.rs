use chrono::Utc;
use tracing::{debug, instrument, warn};

use super::{PAGE_SIZE, PAGES_PER_READ, RawUltralightCard, UltralightPage, detect_type};
use crate::{Error, Result, TagId, technology::UltralightTechnology};

/// Detect the sub-type, then read every page
///
/// A failed burst marks its pages unauthorized (security status) or invalid
/// and the read continues. Losing the tag marks the rest of the burst
/// invalid and ends the read as partial. An unknown sub-type is fatal.
#[instrument(skip_all, fields(tag_id = %tag_id))]
pub async fn read_card<T>(tag_id: &TagId, tech: &mut T) -> Result<RawUltralightCard>
where
    T: UltralightTechnology + ?Sized,
{
    let ultralight_type = detect_type(tech).await?;
    let page_count = ultralight_type.page_count();
    debug!(%ultralight_type, page_count, "Detected Ultralight type");

    let mut pages = Vec::with_capacity(page_count);
    let mut is_partial_read = false;

    for start in (0..page_count).step_by(PAGES_PER_READ) {
        let burst = start..(start + PAGES_PER_READ).min(page_count);

        // Page addresses top out at 230 on the largest part
        let address = u8::try_from(start)
            .map_err(|_| Error::protocol(format!("page {start} out of range")))?;

        match tech.read_pages(address).await {
            Ok(data) => {
                for (offset, page) in burst.enumerate() {
                    let at = offset * PAGE_SIZE;
                    match data.get(at..at + PAGE_SIZE) {
                        Some(chunk) => pages.push(UltralightPage::Data {
                            index: page,
                            data: chunk.to_vec(),
                        }),
                        None => pages.push(UltralightPage::invalid(
                            page,
                            format!("short read: {} bytes", data.len()),
                        )),
                    }
                }
            }
            Err(e) if e.is_tag_lost() => {
                warn!(page = start, error = %e, "Tag lost, stopping read");
                pages.extend(burst.map(|page| UltralightPage::invalid(page, e.to_string())));
                is_partial_read = true;
                break;
            }
            Err(Error::Status { status }) if status.is_security_condition_not_satisfied() => {
                debug!(page = start, "Pages are protected");
                pages.extend(burst.map(|index| UltralightPage::Unauthorized { index }));
            }
            Err(e) => {
                debug!(page = start, error = %e, "Page read failed");
                pages.extend(burst.map(|page| UltralightPage::invalid(page, e.to_string())));
            }
        }
    }

    Ok(RawUltralightCard {
        tag_id: tag_id.clone(),
        scanned_at: Utc::now(),
        ultralight_type,
        pages,
        is_partial_read,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{technology::mock::MockUltralight, ultralight::UltralightType};

    fn tag() -> TagId {
        TagId::new(vec![0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66])
    }

    #[tokio::test]
    async fn test_reads_ntag213_and_truncates() {
        let mut tech = MockUltralight::new(45);
        tech.version = Some(vec![0x00, 0x04, 0x04, 0x02, 0x01, 0x00, 0x0F, 0x03]);

        let card = read_card(&tag(), &mut tech).await.unwrap();

        assert_eq!(card.ultralight_type, UltralightType::Ntag213);
        assert_eq!(card.pages.len(), 45);
        assert!(!card.is_partial_read);
        for (index, page) in card.pages.iter().enumerate() {
            assert_eq!(page.index(), index);
            assert_eq!(page.data(), Some(&[index as u8; 4][..]));
        }
    }

    #[tokio::test]
    async fn test_original_ultralight() {
        let mut tech = MockUltralight::new(16);
        let card = read_card(&tag(), &mut tech).await.unwrap();
        assert_eq!(card.ultralight_type, UltralightType::Mf0icu1);
        assert_eq!(card.pages.len(), 16);
    }

    #[tokio::test]
    async fn test_unknown_variant_is_fatal() {
        let mut tech = MockUltralight::new(16);
        tech.version = Some(vec![0x00, 0x04, 0x05, 0x02, 0x01, 0x00, 0x0F, 0x03]);

        let err = read_card(&tag(), &mut tech).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedVariant(_)));
    }

    #[tokio::test]
    async fn test_tag_lost_is_partial() {
        let mut tech = MockUltralight::new(16);
        tech.lost_at_page = Some(8);

        let card = read_card(&tag(), &mut tech).await.unwrap();
        assert!(card.is_partial_read);
        assert_eq!(card.pages.len(), 12);
        assert!(card.pages[..8].iter().all(|p| p.data().is_some()));
        assert!(matches!(card.pages[8], UltralightPage::Invalid { index: 8, .. }));
    }
}
