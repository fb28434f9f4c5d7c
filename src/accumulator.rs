use crate::channel::{Channel, ChannelRegistry};
use crate::{Result, TallyError};
use serde::Serialize;

/// Running per-channel sums for one run, indexed by registry column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accumulator {
    totals: Vec<f64>,
}

impl Accumulator {
    pub fn new(channel_count: usize) -> Self {
        Self { totals: vec![0.0; channel_count] }
    }

    pub fn add(&mut self, registry: &ChannelRegistry, channel: Channel, value: f64) -> Result<()> {
        let column = registry.index_of(channel)?;
        let total = self.totals.get_mut(column).ok_or(TallyError::ChannelNotFound(channel))?;
        *total += value;
        Ok(())
    }

    pub(crate) fn add_at(&mut self, column: usize, value: f64) {
        self.totals[column] += value;
    }

    pub fn get(&self, registry: &ChannelRegistry, channel: Channel) -> Result<f64> {
        let column = registry.index_of(channel)?;
        self.totals.get(column).copied().ok_or(TallyError::ChannelNotFound(channel))
    }

    /// Totals in registry column order.
    pub fn totals(&self) -> &[f64] {
        &self.totals
    }

    /// Fold another worker's totals into this one.
    pub fn merge(&mut self, other: &Accumulator) {
        for (mine, theirs) in self.totals.iter_mut().zip(&other.totals) {
            *mine += theirs;
        }
    }
}
