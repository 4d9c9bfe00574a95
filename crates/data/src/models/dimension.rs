//! Dimension rows mapped from extracted records.
//!
//! Surrogate keys are assigned by the database; these rows carry the
//! natural id and descriptive columns only.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The four entity dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Series,
    Tag,
    Event,
    Market,
}

impl Dimension {
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Series => "dim_series",
            Self::Tag => "dim_tag",
            Self::Event => "dim_event",
            Self::Market => "dim_market",
        }
    }

    /// Column holding the natural id.
    #[must_use]
    pub const fn id_column(&self) -> &'static str {
        match self {
            Self::Series => "series_id",
            Self::Tag => "tag_id",
            Self::Event => "event_id",
            Self::Market => "market_id",
        }
    }

    /// Column holding the surrogate key.
    #[must_use]
    pub const fn key_column(&self) -> &'static str {
        match self {
            Self::Series => "series_key",
            Self::Tag => "tag_key",
            Self::Event => "event_key",
            Self::Market => "market_key",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SeriesRow {
    pub series_id: String,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub icon: Option<String>,
    pub series_type: Option<String>,
    pub recurrence: Option<String>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
    pub archived: Option<bool>,
    pub restricted: Option<bool>,
    pub featured: Option<bool>,
    pub layout: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at_source: Option<DateTime<Utc>>,
    pub updated_at_source: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TagRow {
    pub tag_id: String,
    pub label: Option<String>,
    pub slug: Option<String>,
    pub parent_tag_id: Option<String>,
    /// Hierarchy depth; every tag is currently top level.
    pub level: i32,
    /// `/{slug}` when the slug is known.
    pub path: Option<String>,
    pub force_show: Option<bool>,
    pub force_hide: Option<bool>,
    pub is_carousel: Option<bool>,
    pub requires_translation: Option<bool>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at_source: Option<DateTime<Utc>>,
    pub updated_at_source: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventRow {
    pub event_id: String,
    pub ticker: Option<String>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub image: Option<String>,
    pub icon: Option<String>,
    pub resolution_source: Option<String>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
    pub archived: Option<bool>,
    pub new: Option<bool>,
    pub featured: Option<bool>,
    pub restricted: Option<bool>,
    pub competitive: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    pub creation_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub closed_time: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at_source: Option<DateTime<Utc>>,
    pub updated_at_source: Option<DateTime<Utc>>,
    pub enable_neg_risk: Option<bool>,
    pub enable_order_book: Option<bool>,
    pub comments_enabled: Option<bool>,
    pub series_slug: Option<String>,
    pub parent_event_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarketRow {
    pub market_id: String,
    pub condition_id: Option<String>,
    pub slug: Option<String>,
    pub question: Option<String>,
    pub description: Option<String>,
    pub market_type: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    /// Outcome labels as a JSON array.
    pub outcomes: Option<serde_json::Value>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
    pub archived: Option<bool>,
    pub restricted: Option<bool>,
    pub new: Option<bool>,
    pub featured: Option<bool>,
    pub enable_order_book: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub closed_time: Option<DateTime<Utc>>,
    pub created_at_source: Option<DateTime<Utc>>,
    pub updated_at_source: Option<DateTime<Utc>>,
    pub image: Option<String>,
    pub icon: Option<String>,
    pub resolution_source: Option<String>,
    pub neg_risk: Option<bool>,
    pub neg_risk_market_id: Option<String>,
    pub format_type: Option<String>,
    pub lower_bound: Option<String>,
    pub upper_bound: Option<String>,
    pub question_id: Option<String>,
    pub market_maker_address: Option<String>,
}

/// A row keyed by its natural id.
pub trait NaturalId {
    fn natural_id(&self) -> &str;
}

impl NaturalId for SeriesRow {
    fn natural_id(&self) -> &str {
        &self.series_id
    }
}

impl NaturalId for TagRow {
    fn natural_id(&self) -> &str {
        &self.tag_id
    }
}

impl NaturalId for EventRow {
    fn natural_id(&self) -> &str {
        &self.event_id
    }
}

impl NaturalId for MarketRow {
    fn natural_id(&self) -> &str {
        &self.market_id
    }
}
