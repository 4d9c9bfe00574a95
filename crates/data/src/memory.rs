//! In-process [`WarehouseStore`] with the same insert and checkpoint rules
//! as the Postgres store. Backs `load --dry-run` and the loader tests.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::error::{LoadError, Result};
use crate::models::{
    BridgeRow, Dimension, EventRow, FactRow, MarketRow, NaturalId, SeriesRow, TagRow, TimeRow,
};
use crate::store::{BatchStage, Checkpoint, StageRun, WarehouseStore};

/// Natural id to surrogate key plus insertion order.
#[derive(Debug, Default)]
struct KeyedTable {
    keys: HashMap<String, i32>,
    next_key: i32,
}

impl KeyedTable {
    fn insert_all<T: NaturalId>(&mut self, rows: &[T]) -> u64 {
        let mut inserted = 0;
        for row in rows {
            if !self.keys.contains_key(row.natural_id()) {
                self.next_key += 1;
                self.keys.insert(row.natural_id().to_string(), self.next_key);
                inserted += 1;
            }
        }
        inserted
    }
}

#[derive(Debug, Default)]
struct State {
    time: BTreeMap<NaiveDate, i32>,
    series: KeyedTable,
    tags: KeyedTable,
    events: KeyedTable,
    markets: KeyedTable,
    bridge: HashSet<BridgeRow>,
    facts: HashMap<(i32, i32), FactRow>,
    checkpoints: HashMap<BatchStage, Checkpoint>,
    fail_batch: Option<(BatchStage, usize)>,
    batch_calls: Vec<(BatchStage, usize)>,
}

impl State {
    fn table(&mut self, dimension: Dimension) -> &mut KeyedTable {
        match dimension {
            Dimension::Series => &mut self.series,
            Dimension::Tag => &mut self.tags,
            Dimension::Event => &mut self.events,
            Dimension::Market => &mut self.markets,
        }
    }

    fn check_injected_failure(&mut self, run: &StageRun, batch: usize) -> Result<()> {
        self.batch_calls.push((run.stage, batch));
        if self.fail_batch == Some((run.stage, batch)) {
            self.fail_batch = None;
            return Err(LoadError::Store(format!(
                "injected failure in {} batch {batch}",
                run.stage
            )));
        }
        Ok(())
    }

    fn advance(&mut self, run: &StageRun, batch: usize) {
        if let Some(checkpoint) = self.checkpoints.get_mut(&run.stage) {
            checkpoint.last_batch = i32::try_from(batch).unwrap_or(i32::MAX);
        }
    }
}

/// A warehouse held in memory.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
}

impl MemoryWarehouse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit of `batch` in `stage` fail once, leaving the
    /// batch and its checkpoint unapplied.
    pub async fn fail_batch_once(&self, stage: BatchStage, batch: usize) {
        self.state.lock().await.fail_batch = Some((stage, batch));
    }

    pub async fn row_count(&self, dimension: Dimension) -> usize {
        self.state.lock().await.table(dimension).keys.len()
    }

    pub async fn time_row_count(&self) -> usize {
        self.state.lock().await.time.len()
    }

    pub async fn bridge_rows(&self) -> Vec<BridgeRow> {
        let mut rows: Vec<BridgeRow> = self.state.lock().await.bridge.iter().copied().collect();
        rows.sort_by_key(|r| (r.market_key, r.tag_key));
        rows
    }

    pub async fn fact_rows(&self) -> Vec<FactRow> {
        let mut rows: Vec<FactRow> = self.state.lock().await.facts.values().cloned().collect();
        rows.sort_by_key(|r| (r.market_key, r.snapshot_date_key));
        rows
    }

    /// Every batch index passed to a commit, in call order.
    pub async fn batch_calls(&self) -> Vec<(BatchStage, usize)> {
        self.state.lock().await.batch_calls.clone()
    }

    pub async fn checkpoint(&self, stage: BatchStage) -> Option<Checkpoint> {
        self.state.lock().await.checkpoints.get(&stage).cloned()
    }
}

#[async_trait]
impl WarehouseStore for MemoryWarehouse {
    async fn insert_time_rows(&self, rows: &[TimeRow]) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut inserted = 0;
        for row in rows {
            let next = i32::try_from(state.time.len()).unwrap_or(i32::MAX) + 1;
            if let std::collections::btree_map::Entry::Vacant(slot) = state.time.entry(row.date_value) {
                slot.insert(next);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn insert_series(&self, rows: &[SeriesRow]) -> Result<u64> {
        Ok(self.state.lock().await.series.insert_all(rows))
    }

    async fn insert_tags(&self, rows: &[TagRow]) -> Result<u64> {
        Ok(self.state.lock().await.tags.insert_all(rows))
    }

    async fn insert_events(&self, rows: &[EventRow]) -> Result<u64> {
        Ok(self.state.lock().await.events.insert_all(rows))
    }

    async fn insert_markets(&self, rows: &[MarketRow]) -> Result<u64> {
        Ok(self.state.lock().await.markets.insert_all(rows))
    }

    async fn key_map(&self, dimension: Dimension) -> Result<HashMap<String, i32>> {
        Ok(self.state.lock().await.table(dimension).keys.clone())
    }

    async fn time_keys(&self) -> Result<HashMap<NaiveDate, i32>> {
        Ok(self
            .state
            .lock()
            .await
            .time
            .iter()
            .map(|(d, k)| (*d, *k))
            .collect())
    }

    async fn begin_stage(&self, run: &StageRun) -> Result<usize> {
        let mut state = self.state.lock().await;
        if let Some(resume) = state.checkpoints.get(&run.stage).and_then(|c| c.resume_point(run)) {
            return Ok(resume);
        }
        match run.stage {
            BatchStage::Bridge => state.bridge.clear(),
            BatchStage::Facts => state.facts.clear(),
        }
        state.checkpoints.insert(
            run.stage,
            Checkpoint {
                run_key: run.run_key,
                source_versions: run.source_versions.clone(),
                last_batch: -1,
                completed: false,
            },
        );
        Ok(0)
    }

    async fn commit_bridge_batch(&self, run: &StageRun, batch: usize, rows: &[BridgeRow]) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.check_injected_failure(run, batch)?;
        let inserted = rows.iter().filter(|r| state.bridge.insert(**r)).count();
        state.advance(run, batch);
        Ok(inserted as u64)
    }

    async fn commit_fact_batch(&self, run: &StageRun, batch: usize, rows: &[FactRow]) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.check_injected_failure(run, batch)?;
        let mut inserted = 0;
        for row in rows {
            let key = (row.market_key, row.snapshot_date_key);
            if !state.facts.contains_key(&key) {
                state.facts.insert(key, row.clone());
                inserted += 1;
            }
        }
        state.advance(run, batch);
        Ok(inserted)
    }

    async fn finish_stage(&self, run: &StageRun) -> Result<()> {
        if let Some(checkpoint) = self.state.lock().await.checkpoints.get_mut(&run.stage) {
            checkpoint.completed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(id: &str) -> TagRow {
        TagRow {
            tag_id: id.to_string(),
            level: 1,
            ..TagRow::default()
        }
    }

    #[tokio::test]
    async fn test_dimension_insert_skips_existing_ids() {
        let store = MemoryWarehouse::new();
        assert_eq!(store.insert_tags(&[tag("a"), tag("b")]).await.unwrap(), 2);
        assert_eq!(store.insert_tags(&[tag("b"), tag("c")]).await.unwrap(), 1);

        let keys = store.key_map(Dimension::Tag).await.unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys["a"], 1);
        assert_eq!(keys["c"], 3);
    }

    #[tokio::test]
    async fn test_fresh_stage_clears_table() {
        let store = MemoryWarehouse::new();
        let run = StageRun {
            stage: BatchStage::Bridge,
            run_key: 1,
            source_versions: "events@0,markets@0,tags@0".to_string(),
        };
        let row = BridgeRow {
            market_key: 1,
            tag_key: 1,
        };

        assert_eq!(store.begin_stage(&run).await.unwrap(), 0);
        store.commit_bridge_batch(&run, 0, &[row]).await.unwrap();
        store.finish_stage(&run).await.unwrap();
        assert_eq!(store.bridge_rows().await.len(), 1);

        // a completed run starts over
        assert_eq!(store.begin_stage(&run).await.unwrap(), 0);
        assert!(store.bridge_rows().await.is_empty());
    }
}
