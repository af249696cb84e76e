//! Normalization of provider-shaped records into canonical items.
//!
//! Both adapters decode row-by-row: one malformed record drops alone (with a
//! debug log) and never takes the batch down with it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::types::{CanonicalItem, ItemSource, TagRef};

/// Prefix for external ids. Local ids are UUIDs and can never start with
/// this, so merged result sets stay collision-free.
pub const EXTERNAL_ID_PREFIX: &str = "ext_";

/// Thumbnail size labels in preference order.
const SIZE_PREFERENCE: &[&str] = &["large", "feature", "medium", "display", "small", "preview"];

/// Path segments that name a downscaled render variant.
const THUMB_SIZE_SEGMENTS: &[&str] = &["small", "medium", "thumb", "thumbnail", "display"];

/// Query parameters that clamp image dimensions.
const THUMB_QUERY_KEYS: &[&str] = &["size", "width", "height"];

/// Row shape of the local catalog's search endpoint. Everything is optional
/// at the wire level; requiredness is enforced during canonicalization.
#[derive(Debug, Deserialize)]
pub struct LocalRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub download_count: Option<u64>,
    #[serde(default)]
    pub average_quality: Option<f32>,
    #[serde(default)]
    pub is_free: Option<bool>,
    #[serde(default)]
    pub tags: Vec<LocalTag>,
}

#[derive(Debug, Deserialize)]
pub struct LocalTag {
    #[serde(default)]
    pub name: String,
}

/// Hit shape of the external provider. Field names drift between endpoint
/// versions, hence the aliases.
#[derive(Debug, Deserialize)]
pub struct ExternalRecord {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(
        default,
        alias = "downloads",
        alias = "downloads_count",
        alias = "download_count_total"
    )]
    pub download_count: Option<u64>,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub added: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub preview_image: Option<String>,
    #[serde(default)]
    pub default_image: Option<ExternalImage>,
    #[serde(default)]
    pub tags: Vec<ExternalTag>,
}

#[derive(Debug, Deserialize)]
pub struct ExternalTag {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ExternalImage {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sizes: Vec<ExternalImageSize>,
}

#[derive(Debug, Deserialize)]
pub struct ExternalImageSize {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Decode and canonicalize a batch of local catalog rows.
pub fn decode_local_batch(values: Vec<Value>) -> Vec<CanonicalItem> {
    values.into_iter().filter_map(local_item).collect()
}

pub fn local_item(value: Value) -> Option<CanonicalItem> {
    let record: LocalRecord = match serde_json::from_value(value) {
        Ok(record) => record,
        Err(err) => {
            debug!(error = %err, "dropping malformed local record");
            return None;
        }
    };
    let id = required(record.id, "id")?;
    let name = required(record.name, "name")?;
    let created_at = required(record.created_at, "created_at")?;

    Some(CanonicalItem {
        id,
        source: ItemSource::Local,
        name,
        description: record.description.unwrap_or_default(),
        tags: tag_refs(record.tags.into_iter().map(|t| t.name)),
        thumbnail_url: record.thumbnail_url,
        download_count: record.download_count.unwrap_or(0),
        average_quality: record.average_quality,
        is_free: record.is_free.unwrap_or(false),
        created_at,
        source_external_url: None,
    })
}

/// Decode external hits without canonicalizing them yet; the adapter still
/// needs the native id to backfill download counts.
pub fn decode_external_batch(values: &[Value]) -> Vec<ExternalRecord> {
    values
        .iter()
        .filter_map(|value| match serde_json::from_value(value.clone()) {
            Ok(record) => Some(record),
            Err(err) => {
                debug!(error = %err, "dropping malformed external record");
                None
            }
        })
        .collect()
}

pub fn external_item(record: ExternalRecord) -> Option<CanonicalItem> {
    let id = required(record.id, "id")?;
    let thumbnail_url = pick_thumbnail(&record).map(|url| upgrade_thumbnail(&url));
    let name = match record.name {
        Some(name) if !name.trim().is_empty() => name,
        _ => {
            debug!("dropping external record without a usable name");
            return None;
        }
    };
    let created_at = record
        .added
        .as_deref()
        .and_then(parse_lenient_date)
        .unwrap_or_else(Utc::now);

    Some(CanonicalItem {
        id: format!("{EXTERNAL_ID_PREFIX}{id}"),
        source: ItemSource::External,
        name,
        description: record.description.unwrap_or_default(),
        tags: tag_refs(record.tags.into_iter().map(|t| t.name)),
        thumbnail_url,
        download_count: record.download_count.unwrap_or(0),
        average_quality: None,
        is_free: true,
        created_at,
        source_external_url: record.public_url,
    })
}

/// Pick the best thumbnail the record offers: preferred size labels first,
/// then the largest numeric size, then any flat image field.
fn pick_thumbnail(record: &ExternalRecord) -> Option<String> {
    if let Some(image) = &record.default_image {
        for &label in SIZE_PREFERENCE {
            let hit = image.sizes.iter().find(|entry| {
                entry.kind.as_deref() == Some(label) || entry.size.as_deref() == Some(label)
            });
            if let Some(url) = hit.and_then(|entry| entry.url.clone()) {
                return Some(url);
            }
        }
        let mut best: Option<(u64, &String)> = None;
        for entry in &image.sizes {
            let numeric = entry.size.as_deref().and_then(|s| s.parse::<u64>().ok());
            if let (Some(n), Some(url)) = (numeric, entry.url.as_ref()) {
                if best.map_or(true, |(current, _)| n > current) {
                    best = Some((n, url));
                }
            }
        }
        if let Some((_, url)) = best {
            return Some(url.clone());
        }
        if let Some(url) = &image.url {
            return Some(url.clone());
        }
    }
    record
        .preview_image
        .clone()
        .or_else(|| record.thumbnail.clone())
}

/// Rewrite a thumbnail URL to its full-size variant: the first downscaling
/// path segment becomes `large` and dimension-clamping query parameters are
/// dropped. Anything unparseable passes through unchanged.
pub fn upgrade_thumbnail(raw: &str) -> String {
    let mut url = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => return raw.to_string(),
    };
    let segments: Vec<String> = match url.path_segments() {
        Some(segments) => segments.map(str::to_string).collect(),
        None => return raw.to_string(),
    };

    let mut upgraded = segments.clone();
    for segment in upgraded.iter_mut() {
        if THUMB_SIZE_SEGMENTS.contains(&segment.to_lowercase().as_str()) {
            *segment = "large".to_string();
            break;
        }
    }
    if upgraded != segments {
        if let Ok(mut path) = url.path_segments_mut() {
            path.clear();
            path.extend(&upgraded);
        }
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !THUMB_QUERY_KEYS.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.set_query(None);
    if !kept.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
    }
    url.to_string()
}

fn tag_refs(names: impl Iterator<Item = String>) -> Vec<TagRef> {
    names
        .filter(|name| !name.trim().is_empty())
        .map(TagRef::new)
        .collect()
}

fn required<T>(value: Option<T>, field: &'static str) -> Option<T> {
    if value.is_none() {
        debug!(field, "dropping record missing a required field");
    }
    value
}

fn parse_lenient_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = day.and_hms_opt(0, 0, 0) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}
