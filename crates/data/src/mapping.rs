//! Explicit record-to-row mapping for each dimension.
//!
//! Each mapper reads named source fields; anything it does not name is
//! ignored, and named fields that are missing or blank become `None`.
//! Records without a natural id map to `None`.

use std::collections::HashSet;

use market_warehouse_core::RawRecord;

use crate::clean::{clean_bool, clean_json, clean_numeric, clean_text, clean_timestamp, PRICE_BOUND};
use crate::models::{EventRow, MarketRow, SeriesRow, TagRow};

/// Source field holding the natural id of every entity.
pub const NATURAL_KEY_FIELD: &str = "id";

fn text(record: &RawRecord, field: &str) -> Option<String> {
    clean_text(record.get(field))
}

fn flag(record: &RawRecord, field: &str) -> Option<bool> {
    clean_bool(record.get(field))
}

fn timestamp(record: &RawRecord, field: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    clean_timestamp(record.get(field))
}

fn natural_id(record: &RawRecord) -> Option<String> {
    record.natural_key(NATURAL_KEY_FIELD)
}

#[must_use]
pub fn map_series(record: &RawRecord) -> Option<SeriesRow> {
    Some(SeriesRow {
        series_id: natural_id(record)?,
        slug: text(record, "slug"),
        title: text(record, "title"),
        description: text(record, "description"),
        image: text(record, "image"),
        icon: text(record, "icon"),
        series_type: text(record, "seriesType"),
        recurrence: text(record, "recurrence"),
        active: flag(record, "active"),
        closed: flag(record, "closed"),
        archived: flag(record, "archived"),
        restricted: flag(record, "restricted"),
        featured: flag(record, "featured"),
        layout: text(record, "layout"),
        start_date: timestamp(record, "startDate"),
        published_at: timestamp(record, "publishedAt"),
        created_at_source: timestamp(record, "createdAt"),
        updated_at_source: timestamp(record, "updatedAt"),
        created_by: text(record, "createdBy"),
        updated_by: text(record, "updatedBy"),
    })
}

#[must_use]
pub fn map_tag(record: &RawRecord) -> Option<TagRow> {
    let slug = text(record, "slug");
    Some(TagRow {
        tag_id: natural_id(record)?,
        label: text(record, "label"),
        path: slug.as_ref().map(|s| format!("/{s}")),
        slug,
        parent_tag_id: None,
        level: 1,
        force_show: flag(record, "forceShow"),
        force_hide: flag(record, "forceHide"),
        is_carousel: flag(record, "isCarousel"),
        requires_translation: flag(record, "requiresTranslation"),
        published_at: timestamp(record, "publishedAt"),
        created_at_source: timestamp(record, "createdAt"),
        updated_at_source: timestamp(record, "updatedAt"),
        created_by: text(record, "createdBy"),
        updated_by: text(record, "updatedBy"),
    })
}

#[must_use]
pub fn map_event(record: &RawRecord) -> Option<EventRow> {
    Some(EventRow {
        event_id: natural_id(record)?,
        ticker: text(record, "ticker"),
        slug: text(record, "slug"),
        title: text(record, "title"),
        description: text(record, "description"),
        category: text(record, "category"),
        subcategory: text(record, "subcategory"),
        image: text(record, "image"),
        icon: text(record, "icon"),
        resolution_source: text(record, "resolutionSource"),
        active: flag(record, "active"),
        closed: flag(record, "closed"),
        archived: flag(record, "archived"),
        new: flag(record, "new"),
        featured: flag(record, "featured"),
        restricted: flag(record, "restricted"),
        competitive: clean_numeric(record.get("competitive"), PRICE_BOUND),
        start_date: timestamp(record, "startDate"),
        creation_date: timestamp(record, "creationDate"),
        end_date: timestamp(record, "endDate"),
        closed_time: timestamp(record, "closedTime"),
        published_at: timestamp(record, "publishedAt"),
        created_at_source: timestamp(record, "createdAt"),
        updated_at_source: timestamp(record, "updatedAt"),
        enable_neg_risk: flag(record, "enableNegRisk"),
        enable_order_book: flag(record, "enableOrderBook"),
        comments_enabled: flag(record, "commentsEnabled"),
        series_slug: text(record, "seriesSlug"),
        parent_event_id: text(record, "parentEventId"),
    })
}

#[must_use]
pub fn map_market(record: &RawRecord) -> Option<MarketRow> {
    Some(MarketRow {
        market_id: natural_id(record)?,
        condition_id: text(record, "conditionId"),
        slug: text(record, "slug"),
        question: text(record, "question"),
        description: text(record, "description"),
        market_type: text(record, "marketType"),
        category: text(record, "category"),
        subcategory: text(record, "subcategory"),
        outcomes: clean_json(record.get("outcomes")),
        active: flag(record, "active"),
        closed: flag(record, "closed"),
        archived: flag(record, "archived"),
        restricted: flag(record, "restricted"),
        new: flag(record, "new"),
        featured: flag(record, "featured"),
        enable_order_book: flag(record, "enableOrderBook"),
        start_date: timestamp(record, "startDate"),
        end_date: timestamp(record, "endDate"),
        closed_time: timestamp(record, "closedTime"),
        created_at_source: timestamp(record, "createdAt"),
        updated_at_source: timestamp(record, "updatedAt"),
        image: text(record, "image"),
        icon: text(record, "icon"),
        resolution_source: text(record, "resolutionSource"),
        neg_risk: flag(record, "negRisk"),
        neg_risk_market_id: text(record, "negRiskMarketID"),
        format_type: text(record, "formatType"),
        lower_bound: text(record, "lowerBound"),
        upper_bound: text(record, "upperBound"),
        question_id: text(record, "questionID"),
        market_maker_address: text(record, "marketMakerAddress"),
    })
}

/// Keeps the first record per natural key in `key_field`.
///
/// Records without a key are dropped. Returns the kept records and the
/// number dropped.
#[must_use]
pub fn dedup_by_key<'a>(records: &'a [RawRecord], key_field: &str) -> (Vec<&'a RawRecord>, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    let kept: Vec<&RawRecord> = records
        .iter()
        .filter(|r| r.natural_key(key_field).is_some_and(|k| seen.insert(k)))
        .collect();
    let dropped = records.len() - kept.len();
    (kept, dropped)
}

/// Dedups `records` on `key_field`, then maps them.
///
/// Returns the rows and the number of records dropped, either by the
/// dedup or by the mapper.
pub fn map_unique<T, F>(records: &[RawRecord], key_field: &str, mapper: F) -> (Vec<T>, usize)
where
    F: Fn(&RawRecord) -> Option<T>,
{
    let (kept, _) = dedup_by_key(records, key_field);
    let rows: Vec<T> = kept.into_iter().filter_map(mapper).collect();
    let dropped = records.len() - rows.len();
    (rows, dropped)
}
