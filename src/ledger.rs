use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::{EngineError, StoreError};
use crate::store::RowStore;
use crate::types::{MatchKey, ScoreSnapshot, Slot, MAX_INNINGS_LIMIT};

pub fn score_row_key(key: &MatchKey, slot: Slot) -> String {
    format!("score/{}/{:04}/{}", key.court, key.game_number, slot.key())
}

/// Per-inning runs for each half of every match. Index 0 holds inning 1.
pub struct ScoreLedger {
    store: Arc<dyn RowStore>,
    max_innings: u32,
}

impl ScoreLedger {
    pub fn new(store: Arc<dyn RowStore>, max_innings: u32) -> Self {
        ScoreLedger {
            store,
            max_innings: max_innings.clamp(1, MAX_INNINGS_LIMIT),
        }
    }

    pub fn max_innings(&self) -> u32 {
        self.max_innings
    }

    fn load(&self, key: &MatchKey, slot: Slot) -> Result<Vec<Option<u32>>, StoreError> {
        let row_key = score_row_key(key, slot);
        match self.store.get(&row_key)? {
            Some(row) => serde_json::from_value(row)
                .map_err(|source| StoreError::Serde { key: row_key, source }),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, key: &MatchKey, slot: Slot, cells: &[Option<u32>]) -> Result<(), StoreError> {
        let row = Value::Array(
            cells
                .iter()
                .map(|cell| cell.map(Value::from).unwrap_or(Value::Null))
                .collect(),
        );
        self.store.put(&score_row_key(key, slot), row)
    }

    /// Writes `runs` into one half-inning and returns what the cell held before.
    ///
    /// Every earlier inning of the same half that was never reported becomes 0.
    /// Reporting a bottom half also zero-fills the top half up to and including
    /// the same inning, since the top of an inning is always played first.
    pub fn record_score(
        &self,
        key: &MatchKey,
        slot: Slot,
        inning: u32,
        runs: u32,
    ) -> Result<Option<u32>, EngineError> {
        if inning == 0 || inning > self.max_innings {
            return Err(EngineError::InningOutOfRange {
                inning,
                max: self.max_innings,
            });
        }
        let index = (inning - 1) as usize;

        if slot == Slot::Bottom {
            let mut top = self.load(key, Slot::Top)?;
            if fill_unset(&mut top, inning as usize) {
                self.save(key, Slot::Top, &top)?;
            }
        }

        let mut cells = self.load(key, slot)?;
        fill_unset(&mut cells, index);
        if cells.len() <= index {
            cells.resize(index + 1, None);
        }
        let previous = cells[index].replace(runs);
        self.save(key, slot, &cells)?;

        debug!(
            "{key} inning {inning} {}: {:?} -> {runs}",
            slot.label(),
            previous
        );
        Ok(previous)
    }

    pub fn total(&self, key: &MatchKey, slot: Slot) -> Result<u32, StoreError> {
        Ok(sum(&self.load(key, slot)?))
    }

    pub fn snapshot(&self, key: &MatchKey) -> Result<ScoreSnapshot, StoreError> {
        let mut top = self.load(key, Slot::Top)?;
        let mut bottom = self.load(key, Slot::Bottom)?;
        let top_total = sum(&top);
        let bottom_total = sum(&bottom);
        let width = (self.max_innings as usize).max(top.len()).max(bottom.len());
        top.resize(width, None);
        bottom.resize(width, None);
        Ok(ScoreSnapshot {
            top,
            bottom,
            top_total,
            bottom_total,
        })
    }
}

/// Sets the first `count` cells to 0 where unset, growing the row as needed.
/// Returns whether anything changed.
fn fill_unset(cells: &mut Vec<Option<u32>>, count: usize) -> bool {
    if count == 0 {
        return false;
    }
    let mut changed = false;
    if cells.len() < count {
        cells.resize(count, None);
        changed = true;
    }
    for cell in cells.iter_mut().take(count) {
        if cell.is_none() {
            *cell = Some(0);
            changed = true;
        }
    }
    changed
}

fn sum(cells: &[Option<u32>]) -> u32 {
    cells.iter().map(|cell| cell.unwrap_or(0)).sum()
}
