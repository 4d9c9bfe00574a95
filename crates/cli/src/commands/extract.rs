//! `extract`: crawl the Gamma API and land each collection in the lake.

use std::fmt;

use anyhow::{Context, Result};
use clap::Args;
use market_warehouse_core::{EntityKind, PipelineConfig, WriteMode};
use market_warehouse_gamma::{Crawl, GammaClient};
use market_warehouse_lake::Lake;

#[derive(Args, Debug, Clone, Default)]
pub struct ExtractArgs {
    /// Entity to extract; repeatable (default: tags, events, series, markets)
    #[arg(long = "entity", value_name = "ENTITY")]
    pub entities: Vec<EntityKind>,

    /// Lake write mode (overwrite or append), overriding lake.write_mode
    #[arg(long)]
    pub mode: Option<WriteMode>,

    /// Stop each crawl after this many records (0 = no cap)
    #[arg(long)]
    pub max_records: Option<usize>,
}

impl ExtractArgs {
    fn kinds(&self) -> Vec<EntityKind> {
        if self.entities.is_empty() {
            return EntityKind::all().to_vec();
        }
        let mut kinds = Vec::new();
        for kind in EntityKind::all() {
            if self.entities.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStatus {
    Success,
    /// The crawl failed midway; the records gathered before it were landed.
    Partial,
    Failed,
}

impl fmt::Display for ExtractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "FAILED",
        })
    }
}

#[derive(Debug, Clone)]
pub struct EntityOutcome {
    pub kind: EntityKind,
    pub status: ExtractStatus,
    pub records: usize,
    pub pages: usize,
    pub version: Option<u64>,
    pub error: Option<String>,
}

impl EntityOutcome {
    fn failed(kind: EntityKind, pages: usize, error: String) -> Self {
        Self {
            kind,
            status: ExtractStatus::Failed,
            records: 0,
            pages,
            version: None,
            error: Some(error),
        }
    }
}

/// Writes one crawl to the lake and classifies the result.
pub async fn land(lake: &Lake, kind: EntityKind, crawl: Crawl, mode: WriteMode) -> EntityOutcome {
    let crawl_error = crawl.error().map(ToString::to_string);
    if crawl.records.is_empty() {
        let error = crawl_error.unwrap_or_else(|| "no records returned".to_string());
        tracing::error!(entity = %kind, %error, "Nothing to land");
        return EntityOutcome::failed(kind, crawl.pages_requested, error);
    }

    match lake.try_write(kind.table_name(), &crawl.records, mode).await {
        Ok(written) => {
            let status = if crawl_error.is_some() {
                ExtractStatus::Partial
            } else {
                ExtractStatus::Success
            };
            tracing::info!(
                entity = %kind,
                records = written.records,
                version = written.version,
                %status,
                "Landed crawl"
            );
            EntityOutcome {
                kind,
                status,
                records: written.records,
                pages: crawl.pages_requested,
                version: Some(written.version),
                error: crawl_error,
            }
        }
        Err(e) => {
            tracing::error!(entity = %kind, error = %e, "Lake write failed");
            EntityOutcome::failed(kind, crawl.pages_requested, e.to_string())
        }
    }
}

/// Extracts every requested entity in order. A failing entity does not
/// stop the ones after it.
///
/// # Errors
/// Returns an error only if the HTTP client cannot be built.
pub async fn run_extract(config: &PipelineConfig, args: &ExtractArgs) -> Result<Vec<EntityOutcome>> {
    let client = GammaClient::from_config(config).context("Failed to build Gamma API client")?;
    Ok(extract_with(&client, &Lake::new(&config.lake.base_dir), config, args).await)
}

/// [`run_extract`] against an explicit client and lake.
pub async fn extract_with(
    client: &GammaClient,
    lake: &Lake,
    config: &PipelineConfig,
    args: &ExtractArgs,
) -> Vec<EntityOutcome> {
    let mode = args.mode.unwrap_or(config.lake.write_mode);
    let mut extraction = config.extraction.clone();
    if let Some(max) = args.max_records {
        extraction.max_records = max;
    }

    let mut outcomes = Vec::new();
    for kind in args.kinds() {
        tracing::info!(entity = %kind, base_url = client.base_url(), "Extracting");
        let crawl = client.fetch_entity(kind, &extraction).await;
        outcomes.push(land(lake, kind, crawl, mode).await);
    }
    outcomes
}

pub fn print_extract_summary(outcomes: &[EntityOutcome]) {
    println!();
    println!("{}", "=".repeat(72));
    println!("EXTRACTION SUMMARY");
    println!("{}", "=".repeat(72));
    println!(
        "{:<10} {:>10} {:>10} {:>8} {:>10}  {}",
        "Entity", "Status", "Records", "Pages", "Version", "Error"
    );
    println!("{}", "-".repeat(72));
    for outcome in outcomes {
        println!(
            "{:<10} {:>10} {:>10} {:>8} {:>10}  {}",
            outcome.kind.to_string(),
            outcome.status.to_string(),
            outcome.records,
            outcome.pages,
            outcome
                .version
                .map_or_else(|| "-".to_string(), |v| v.to_string()),
            outcome.error.as_deref().unwrap_or("")
        );
    }
    println!("{}", "-".repeat(72));
    let total: usize = outcomes.iter().map(|o| o.records).sum();
    println!("{:<10} {:>21}", "TOTAL", total);
    println!("{}", "=".repeat(72));
}

/// True when every entity landed completely.
pub fn all_succeeded(outcomes: &[EntityOutcome]) -> bool {
    outcomes.iter().all(|o| o.status == ExtractStatus::Success)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use market_warehouse_gamma::RetryPolicy;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn mount(server: &MockServer, endpoint: &str, offset: &str, status: u16, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(query_param("offset", offset))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> GammaClient {
        GammaClient::new()
            .unwrap()
            .with_base_url(server.uri())
            .with_retry_policy(RetryPolicy::new(1, Duration::from_millis(1), 1.0))
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.extraction.page_limit = 2;
        config
    }

    #[test]
    fn test_kinds_keep_extraction_order() {
        let args = ExtractArgs {
            entities: vec![EntityKind::Markets, EntityKind::Tags],
            ..ExtractArgs::default()
        };
        assert_eq!(args.kinds(), vec![EntityKind::Tags, EntityKind::Markets]);
        assert_eq!(ExtractArgs::default().kinds().len(), 4);
    }

    #[tokio::test]
    async fn test_one_failing_entity_does_not_stop_the_rest() {
        let server = MockServer::start().await;
        mount(&server, "/tags", "0", 200, json!([{"id": "t1"}, {"id": "t2"}])).await;
        mount(&server, "/tags", "2", 500, json!({"error": "boom"})).await;
        mount(&server, "/events", "0", 500, json!({"error": "down"})).await;
        mount(&server, "/series", "0", 200, json!([])).await;
        mount(&server, "/markets", "0", 200, json!([{"id": "m1"}])).await;

        let dir = tempfile::tempdir().unwrap();
        let lake = Lake::new(dir.path());
        let outcomes = extract_with(&client(&server), &lake, &config(), &ExtractArgs::default()).await;

        let status: Vec<ExtractStatus> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            status,
            vec![
                ExtractStatus::Partial,
                ExtractStatus::Failed,
                ExtractStatus::Failed,
                ExtractStatus::Success
            ]
        );
        assert!(!all_succeeded(&outcomes));

        assert_eq!(lake.read("tags", None).await.unwrap().len(), 2);
        assert_eq!(lake.read("markets", None).await.unwrap().len(), 1);
        assert_eq!(lake.list_tables().unwrap(), vec!["markets", "tags"]);
    }

    #[tokio::test]
    async fn test_append_mode_adds_a_version() {
        let server = MockServer::start().await;
        mount(&server, "/markets", "0", 200, json!([{"id": "m1"}])).await;

        let dir = tempfile::tempdir().unwrap();
        let lake = Lake::new(dir.path());
        let args = ExtractArgs {
            entities: vec![EntityKind::Markets],
            mode: Some(WriteMode::Append),
            max_records: None,
        };
        extract_with(&client(&server), &lake, &config(), &args).await;
        let second = extract_with(&client(&server), &lake, &config(), &args).await;

        assert_eq!(second[0].version, Some(1));
        assert_eq!(lake.read("markets", None).await.unwrap().len(), 2);
        assert_eq!(lake.read("markets", Some(0)).await.unwrap().len(), 1);
    }
}
