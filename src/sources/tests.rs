use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use crate::sources::normalize::{
    decode_external_batch, decode_local_batch, external_item, local_item, upgrade_thumbnail,
    EXTERNAL_ID_PREFIX,
};
use crate::types::ItemSource;

fn local_row() -> Value {
    json!({
        "id": "0b7c9a4e-1111-2222-3333-444455556666",
        "name": "Dragon Statue",
        "description": "A big statue",
        "thumbnail_url": "https://cdn.local/statue.jpg",
        "created_at": "2024-03-01T12:00:00Z",
        "download_count": 500,
        "average_quality": 4.5,
        "is_free": true,
        "tags": [{"id": "t1", "name": "Dragon"}, {"id": "t2", "name": "Fantasy"}]
    })
}

fn external_hit() -> Value {
    json!({
        "id": 4217,
        "name": "Cool Dragon",
        "description": "External dragon",
        "public_url": "https://provider.example/thing:4217",
        "added": "2024-02-20T08:00:00+00:00",
        "download_count": 2000,
        "tags": [{"name": "dragon"}, {"name": ""}],
        "default_image": {
            "url": "https://cdn.provider/fallback.jpg",
            "sizes": [
                {"type": "thumb", "size": "small", "url": "https://cdn.provider/small.jpg"},
                {"type": "display", "size": "large", "url": "https://cdn.provider/big.jpg"}
            ]
        }
    })
}

#[test]
fn local_row_maps_every_field() {
    let item = local_item(local_row()).unwrap();
    assert_eq!(item.id, "0b7c9a4e-1111-2222-3333-444455556666");
    assert_eq!(item.source, ItemSource::Local);
    assert_eq!(item.name, "Dragon Statue");
    assert_eq!(item.description, "A big statue");
    assert_eq!(item.thumbnail_url.as_deref(), Some("https://cdn.local/statue.jpg"));
    assert_eq!(item.download_count, 500);
    assert_eq!(item.average_quality, Some(4.5));
    assert!(item.is_free);
    assert_eq!(item.created_at, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    assert_eq!(item.tag_text(), "dragon fantasy");
    assert!(item.source_external_url.is_none());
}

#[test]
fn local_row_defaults_optional_fields() {
    let item = local_item(json!({
        "id": "m2",
        "name": "Bare Model",
        "created_at": "2024-01-01T00:00:00Z"
    }))
    .unwrap();
    assert_eq!(item.description, "");
    assert_eq!(item.download_count, 0);
    assert_eq!(item.average_quality, None);
    assert!(!item.is_free);
    assert!(item.tags.is_empty());
}

#[test]
fn local_batch_drops_only_the_malformed_rows() {
    let batch = decode_local_batch(vec![
        local_row(),
        json!({"name": "no id", "created_at": "2024-01-01T00:00:00Z"}),
        json!({"id": "m3", "name": "bad date", "created_at": "yesterday-ish"}),
        json!("not even an object"),
    ]);
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].name, "Dragon Statue");
}

#[test]
fn external_hit_becomes_a_prefixed_free_item() {
    let records = decode_external_batch(&[external_hit()]);
    let item = external_item(records.into_iter().next().unwrap()).unwrap();
    assert_eq!(item.id, format!("{EXTERNAL_ID_PREFIX}4217"));
    assert_eq!(item.source, ItemSource::External);
    assert!(item.is_free);
    assert_eq!(item.download_count, 2000);
    assert_eq!(item.average_quality, None);
    assert_eq!(
        item.source_external_url.as_deref(),
        Some("https://provider.example/thing:4217")
    );
    // the empty tag name is dropped
    assert_eq!(item.tag_text(), "dragon");
}

#[test]
fn external_records_without_id_or_name_are_dropped() {
    let records = decode_external_batch(&[
        json!({"name": "no id"}),
        json!({"id": 8, "name": "   "}),
        json!({"id": 9, "name": "Keeper"}),
    ]);
    let items: Vec<_> = records.into_iter().filter_map(external_item).collect();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Keeper");
}

#[test]
fn download_count_survives_provider_field_renames() {
    // the provider has shipped every one of these names for the same field
    let hits = [
        json!({"id": 6, "name": "Benchy", "downloads": 500}),
        json!({"id": 6, "name": "Benchy", "downloads_count": 500}),
        json!({"id": 6, "name": "Benchy", "download_count_total": 500}),
    ];
    for hit in hits {
        let records = decode_external_batch(&[hit]);
        assert_eq!(records[0].download_count, Some(500));
        let item = external_item(records.into_iter().next().unwrap()).unwrap();
        assert_eq!(item.download_count, 500);
    }
}

#[test]
fn thumbnail_prefers_the_largest_labelled_size() {
    let records = decode_external_batch(&[external_hit()]);
    let item = external_item(records.into_iter().next().unwrap()).unwrap();
    // "large" beats "small" in the preference order, matched on either the
    // type or the size label
    assert_eq!(item.thumbnail_url.as_deref(), Some("https://cdn.provider/big.jpg"));
}

#[test]
fn thumbnail_falls_back_to_the_largest_numeric_size() {
    let records = decode_external_batch(&[json!({
        "id": 1,
        "name": "Numeric",
        "default_image": {
            "sizes": [
                {"size": "140", "url": "https://cdn.provider/140.jpg"},
                {"size": "640", "url": "https://cdn.provider/640.jpg"}
            ]
        }
    })]);
    let item = external_item(records.into_iter().next().unwrap()).unwrap();
    assert_eq!(item.thumbnail_url.as_deref(), Some("https://cdn.provider/640.jpg"));
}

#[test]
fn thumbnail_falls_back_to_flat_fields() {
    let records = decode_external_batch(&[json!({
        "id": 2,
        "name": "Flat",
        "preview_image": "https://cdn.provider/preview.jpg"
    })]);
    let item = external_item(records.into_iter().next().unwrap()).unwrap();
    assert_eq!(
        item.thumbnail_url.as_deref(),
        Some("https://cdn.provider/preview.jpg")
    );

    let records = decode_external_batch(&[json!({
        "id": 3,
        "name": "Flatter",
        "thumbnail": "https://cdn.provider/thumb/thing.jpg"
    })]);
    let item = external_item(records.into_iter().next().unwrap()).unwrap();
    // flat fields go through the same upgrade as picked sizes
    assert_eq!(
        item.thumbnail_url.as_deref(),
        Some("https://cdn.provider/large/thing.jpg")
    );
}

#[test]
fn unparseable_added_date_falls_back_to_now() {
    let before = Utc::now();
    let records = decode_external_batch(&[json!({"id": 4, "name": "Undated", "added": "???"})]);
    let item = external_item(records.into_iter().next().unwrap()).unwrap();
    assert!(item.created_at >= before);
}

#[test]
fn date_only_added_values_parse() {
    let records =
        decode_external_batch(&[json!({"id": 5, "name": "Dated", "added": "2023-06-15"})]);
    let item = external_item(records.into_iter().next().unwrap()).unwrap();
    assert_eq!(item.created_at, Utc.with_ymd_and_hms(2023, 6, 15, 0, 0, 0).unwrap());
}

#[test]
fn upgrade_rewrites_size_segment_and_strips_dimension_params() {
    assert_eq!(
        upgrade_thumbnail("https://cdn.provider/renders/ab/small/thing.jpg?size=med&width=320"),
        "https://cdn.provider/renders/ab/large/thing.jpg"
    );
    assert_eq!(
        upgrade_thumbnail("https://cdn.provider/display/thing.jpg?v=2&height=100"),
        "https://cdn.provider/large/thing.jpg?v=2"
    );
}

#[test]
fn upgrade_only_touches_the_first_size_segment() {
    assert_eq!(
        upgrade_thumbnail("https://cdn.provider/small/medium/thing.jpg"),
        "https://cdn.provider/large/medium/thing.jpg"
    );
}

#[test]
fn upgrade_passes_unparseable_urls_through() {
    assert_eq!(upgrade_thumbnail("not a url"), "not a url");
    assert_eq!(
        upgrade_thumbnail("/renders/small/thing.jpg"),
        "/renders/small/thing.jpg"
    );
}
