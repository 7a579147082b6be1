//! Field and page extraction.
//!
//! Extraction is read-only. A field that matches nothing is `None`, and a
//! field whose read fails is also `None` (with a warning), so one bad field
//! never costs the rest of its record and one bad record never costs the page.

use std::time::Duration;

use tracing::{debug, warn};

use super::config::FieldSpec;
use super::driver::{DriverResult, ElementHandle, PageDriver};
use super::models::{FieldValue, Record};
use crate::error::{Result, ScrapeError};

/// Read an attribute or the text content, trimmed; blank becomes `None`.
async fn read_value(
    element: &dyn ElementHandle,
    attribute: Option<&str>,
) -> DriverResult<Option<String>> {
    let raw = match attribute {
        Some(name) => element.attribute(name).await?,
        None => element.text_content().await?,
    };
    Ok(raw
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}

/// Extract one field within `scope`.
///
/// Returns `Ok(None)` when the selector matches nothing. Driver faults are
/// returned to the caller, which decides how to isolate them.
pub async fn extract_field(
    scope: &dyn ElementHandle,
    field: &FieldSpec,
) -> DriverResult<Option<FieldValue>> {
    let matches = scope.locate_all(&field.selector).await?;
    let attribute = field.attribute.as_deref();

    if field.multiple {
        if matches.is_empty() {
            return Ok(None);
        }
        let mut values = Vec::with_capacity(matches.len());
        for element in &matches {
            values.push(read_value(element.as_ref(), attribute).await?);
        }
        return Ok(Some(FieldValue::List(values)));
    }

    match matches.first() {
        Some(element) => Ok(read_value(element.as_ref(), attribute)
            .await?
            .map(FieldValue::Text)),
        None => Ok(None),
    }
}

/// Extract every field within `scope` into a record with one entry per field.
pub async fn extract_fields(scope: &dyn ElementHandle, fields: &[FieldSpec]) -> Record {
    let mut record = Record::new();
    for field in fields {
        let value = match extract_field(scope, field).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to extract field [{}]: {}", field.name, e);
                None
            }
        };
        record.insert(field.name.clone(), value);
    }
    record
}

/// Extract one record per container on the current page.
///
/// Fails with `ContainerTimeout` if no container appears within `timeout`.
pub async fn try_extract_current_page<D>(
    page: &D,
    container_selector: &str,
    fields: &[FieldSpec],
    timeout: Duration,
) -> Result<Vec<Record>>
where
    D: PageDriver + ?Sized,
{
    page.wait_for_selector(container_selector, timeout)
        .await
        .map_err(|e| ScrapeError::ContainerTimeout {
            selector: container_selector.to_string(),
            reason: e.to_string(),
        })?;

    let containers = page.locate_all(container_selector).await?;
    debug!(
        "Found {} containers matching '{}'",
        containers.len(),
        container_selector
    );

    let mut records = Vec::with_capacity(containers.len());
    for container in &containers {
        records.push(extract_fields(container.as_ref(), fields).await);
    }
    Ok(records)
}

/// Like [`try_extract_current_page`], but a missing container or a failed
/// lookup yields an empty page.
pub async fn extract_current_page<D>(
    page: &D,
    container_selector: &str,
    fields: &[FieldSpec],
    timeout: Duration,
) -> Vec<Record>
where
    D: PageDriver + ?Sized,
{
    match try_extract_current_page(page, container_selector, fields, timeout).await {
        Ok(records) => records,
        Err(e) => {
            warn!("{}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::testing::{FakeElement, FakePage, FakeSite};

    const URL: &str = "https://example.test/";

    fn site() -> FakeSite {
        FakeSite::new()
            .page(
                FakePage::new(URL)
                    .with(
                        ".card",
                        FakeElement::new()
                            .child(".name", FakeElement::new().text("  Alpha  "))
                            .child("a", FakeElement::new().text("link").attr("href", "/a"))
                            .child(".tag", FakeElement::new().text("x"))
                            .child(".tag", FakeElement::new().text("   "))
                            .child(".tag", FakeElement::new().text("y")),
                    )
                    .with(
                        ".card",
                        FakeElement::new()
                            .child(".name", FakeElement::new().text("Beta"))
                            .child("a", FakeElement::new().broken()),
                    )
                    .with(
                        ".card",
                        FakeElement::new().child(".name", FakeElement::new().text("")),
                    ),
            )
            .start_at(URL)
    }

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("name", ".name"),
            FieldSpec::new("link", "a").attribute("href"),
            FieldSpec::new("tags", ".tag").multiple(),
        ]
    }

    #[tokio::test]
    async fn test_extract_one_record_per_container() {
        let site = site();
        let records =
            extract_current_page(&site, ".card", &fields(), Duration::from_secs(10)).await;

        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_text_trimmed_and_attribute_read() {
        let site = site();
        let records =
            extract_current_page(&site, ".card", &fields(), Duration::from_secs(10)).await;

        assert_eq!(
            records[0].get("name"),
            Some(&FieldValue::Text("Alpha".to_string()))
        );
        assert_eq!(
            records[0].get("link"),
            Some(&FieldValue::Text("/a".to_string()))
        );
        assert_eq!(
            records[0].get("tags"),
            Some(&FieldValue::List(vec![
                Some("x".to_string()),
                None,
                Some("y".to_string())
            ]))
        );
    }

    #[tokio::test]
    async fn test_field_failure_isolated_to_field() {
        let site = site();
        let records =
            extract_current_page(&site, ".card", &fields(), Duration::from_secs(10)).await;

        // Broken link read does not drop the record or its other fields
        assert_eq!(
            records[1].get("name"),
            Some(&FieldValue::Text("Beta".to_string()))
        );
        assert!(records[1].contains("link"));
        assert!(records[1].get("link").is_none());
        // No matches for a multiple field is null, not an empty list
        assert!(records[1].contains("tags"));
        assert!(records[1].get("tags").is_none());
        // Blank text becomes null
        assert!(records[2].get("name").is_none());
    }

    #[tokio::test]
    async fn test_missing_container_yields_empty_page() {
        let site = site();
        let records =
            extract_current_page(&site, ".missing", &fields(), Duration::from_secs(10)).await;
        assert!(records.is_empty());

        let err = try_extract_current_page(&site, ".missing", &fields(), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::ContainerTimeout { .. }));
    }

    #[tokio::test]
    async fn test_extract_fields_from_document() {
        let site = FakeSite::new()
            .page(
                FakePage::new(URL)
                    .with(".title", FakeElement::new().text("Doc"))
                    .with(".author", FakeElement::new().text("Ann")),
            )
            .start_at(URL);
        let doc = site.document().await.unwrap();
        let record = extract_fields(
            doc.as_ref(),
            &[
                FieldSpec::new("title", ".title"),
                FieldSpec::new("views", ".views"),
            ],
        )
        .await;

        assert_eq!(record.get("title").and_then(FieldValue::as_text), Some("Doc"));
        assert!(record.contains("views"));
        assert!(record.get("views").is_none());
    }
}
