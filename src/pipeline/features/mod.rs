//! Per-source feature aggregation
//!
//! Each source is reduced to one row per entity key and left-joined onto the
//! main table. Reductions are computed eagerly over the source columns and
//! keep first-seen key order, so results are reproducible run to run.

pub mod balances;
pub mod financial;
pub mod reboot;
pub mod risk;
pub mod transactions;

pub use balances::*;
pub use financial::*;
pub use reboot::*;
pub use risk::*;
pub use transactions::*;

use std::collections::HashMap;

/// Groups keyed rows while remembering first-seen key order.
///
/// Null keys are skipped: they can never match a main-table row.
pub(crate) struct KeyGroups<T> {
    index: HashMap<String, usize>,
    keys: Vec<String>,
    states: Vec<T>,
}

impl<T: Default> KeyGroups<T> {
    pub(crate) fn new() -> Self {
        Self {
            index: HashMap::new(),
            keys: Vec::new(),
            states: Vec::new(),
        }
    }

    /// Mutable state for `key`, created on first sight.
    pub(crate) fn entry(&mut self, key: &str) -> &mut T {
        let pos = match self.index.get(key) {
            Some(&pos) => pos,
            None => {
                let pos = self.keys.len();
                self.index.insert(key.to_string(), pos);
                self.keys.push(key.to_string());
                self.states.push(T::default());
                pos
            }
        };
        &mut self.states[pos]
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Vec<T>) {
        (self.keys, self.states)
    }
}

/// Add `value` to a running sum that stays `None` until a non-null value is seen.
pub(crate) fn add_nullable(acc: &mut Option<f64>, value: Option<f64>) {
    if let Some(v) = value {
        *acc = Some(acc.unwrap_or(0.0) + v);
    }
}
