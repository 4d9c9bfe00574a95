use serde::{Deserialize, Serialize};

/// The four Gamma API entity collections the pipeline extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Tags,
    Events,
    Series,
    Markets,
}

impl EntityKind {
    /// All kinds in extraction order.
    #[must_use]
    pub const fn all() -> &'static [EntityKind] {
        &[Self::Tags, Self::Events, Self::Series, Self::Markets]
    }

    /// API path segment, e.g. `/markets`.
    #[must_use]
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::Tags => "tags",
            Self::Events => "events",
            Self::Series => "series",
            Self::Markets => "markets",
        }
    }

    /// Name of the landed table in the columnar sink.
    #[must_use]
    pub const fn table_name(&self) -> &'static str {
        self.endpoint()
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.endpoint())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tags" | "tag" => Ok(Self::Tags),
            "events" | "event" => Ok(Self::Events),
            "series" => Ok(Self::Series),
            "markets" | "market" => Ok(Self::Markets),
            other => Err(format!("unknown entity '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_order() {
        assert_eq!(
            EntityKind::all(),
            &[
                EntityKind::Tags,
                EntityKind::Events,
                EntityKind::Series,
                EntityKind::Markets
            ]
        );
    }

    #[test]
    fn test_parse_and_display() {
        for kind in EntityKind::all() {
            assert_eq!(kind.to_string().parse::<EntityKind>(), Ok(*kind));
        }
        assert_eq!("Market".parse::<EntityKind>(), Ok(EntityKind::Markets));
        assert!("orders".parse::<EntityKind>().is_err());
    }
}
