//! Market-tag links derived from event records.
//!
//! Events carry nested `tags`, `markets` and `series` arrays (possibly as
//! text). Every market of an event is linked to every tag of that event;
//! the same arrays also tell which event a market belongs to and which
//! series an event belongs to.

use std::collections::{HashMap, HashSet};

use market_warehouse_core::{RawRecord, RawValue};

use crate::mapping::NATURAL_KEY_FIELD;
use crate::models::BridgeRow;
use crate::relaxed_json::parse_field;

/// Everything derived from one pass over the events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLinks {
    /// Unique `(market_key, tag_key)` pairs in first-seen order.
    pub pairs: Vec<BridgeRow>,
    /// Market natural id to the first event listing it.
    pub market_events: HashMap<String, String>,
    /// Event natural id to its first series.
    pub event_series: HashMap<String, String>,
    pub events_with_tags: usize,
    pub events_with_markets: usize,
    pub events_with_both: usize,
}

impl EventLinks {
    /// Event id of a market, when some event lists it.
    #[must_use]
    pub fn event_of(&self, market_id: &str) -> Option<&str> {
        self.market_events.get(market_id).map(String::as_str)
    }

    #[must_use]
    pub fn series_of(&self, event_id: &str) -> Option<&str> {
        self.event_series.get(event_id).map(String::as_str)
    }
}

/// Natural id of a nested reference: a map with `id`, or a bare id.
#[must_use]
pub fn element_ref(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Map(map) => map.natural_key(NATURAL_KEY_FIELD),
        RawValue::List(_) | RawValue::Null => None,
        other => other.as_key(),
    }
}

/// Natural ids referenced by a nested array field.
#[must_use]
pub fn nested_refs(record: &RawRecord, field: &str) -> Vec<String> {
    match parse_field(record.get(field)) {
        Some(RawValue::List(items)) => items.iter().filter_map(element_ref).collect(),
        _ => Vec::new(),
    }
}

/// Derives bridge pairs and event links.
///
/// Pairs whose market or tag does not resolve through the key maps are
/// skipped; event and series links are kept by natural id regardless.
#[must_use]
pub fn derive_links(
    events: &[RawRecord],
    market_keys: &HashMap<String, i32>,
    tag_keys: &HashMap<String, i32>,
) -> EventLinks {
    let mut links = EventLinks::default();
    let mut seen: HashSet<BridgeRow> = HashSet::new();

    for event in events {
        let tags = nested_refs(event, "tags");
        let markets = nested_refs(event, "markets");
        let event_id = event.natural_key(NATURAL_KEY_FIELD);

        if let Some(event_id) = &event_id {
            for market_id in &markets {
                links
                    .market_events
                    .entry(market_id.clone())
                    .or_insert_with(|| event_id.clone());
            }
            if let Some(series_id) = nested_refs(event, "series").into_iter().next() {
                links.event_series.entry(event_id.clone()).or_insert(series_id);
            }
        }

        if !tags.is_empty() {
            links.events_with_tags += 1;
        }
        if !markets.is_empty() {
            links.events_with_markets += 1;
        }
        if tags.is_empty() || markets.is_empty() {
            continue;
        }
        links.events_with_both += 1;

        let tag_keys_of_event: Vec<i32> = tags.iter().filter_map(|t| tag_keys.get(t).copied()).collect();
        for market_key in markets.iter().filter_map(|m| market_keys.get(m).copied()) {
            for &tag_key in &tag_keys_of_event {
                let row = BridgeRow { market_key, tag_key };
                if seen.insert(row) {
                    links.pairs.push(row);
                }
            }
        }
    }

    tracing::debug!(
        events = events.len(),
        with_tags = links.events_with_tags,
        with_markets = links.events_with_markets,
        with_both = links.events_with_both,
        pairs = links.pairs.len(),
        "Derived event links"
    );
    links
}
