use crate::geometry::LayerGeometry;
use crate::{Result, TallyError};
use itertools::Itertools;
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one accumulation bucket (a detector layer copy number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Channel(pub i32);

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for Channel {
    fn from(id: i32) -> Self {
        Channel(id)
    }
}

struct ChannelTable {
    order: Vec<Channel>,
    index: FxHashMap<Channel, usize>,
}

impl ChannelTable {
    fn build(channels: impl IntoIterator<Item = Channel>) -> Result<Self> {
        let mut order = Vec::new();
        let mut index = FxHashMap::default();
        for channel in channels {
            if index.insert(channel, order.len()).is_some() {
                return Err(TallyError::DuplicateChannel(channel));
            }
            order.push(channel);
        }
        Ok(Self { order, index })
    }
}

/// Ordered, process-wide set of channels every worker reports against.
///
/// Initialization is single-flight: concurrent callers block until the first
/// one finishes, and every later call is a no-op. Once set, the order never
/// changes for the lifetime of the registry.
pub struct ChannelRegistry {
    table: OnceCell<ChannelTable>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self { table: OnceCell::new() }
    }

    /// Initialize from the layer geometry. No-op if already initialized.
    pub fn initialize(&self, geometry: &LayerGeometry) -> Result<&[Channel]> {
        self.initialize_with(geometry.copy_numbers().into_iter().map(Channel))
    }

    /// Initialize from an explicit channel list. No-op if already initialized.
    pub fn initialize_with(&self, channels: impl IntoIterator<Item = Channel>) -> Result<&[Channel]> {
        let mut fresh = false;
        let table = self.table.get_or_try_init(|| {
            fresh = true;
            ChannelTable::build(channels)
        })?;
        if fresh {
            tracing::info!(channels = table.order.len(), "Channel registry initialized");
        }
        Ok(&table.order)
    }

    pub fn is_initialized(&self) -> bool {
        self.table.get().is_some()
    }

    pub fn channels(&self) -> Result<&[Channel]> {
        self.table
            .get()
            .map(|t| t.order.as_slice())
            .ok_or(TallyError::RegistryUninitialized)
    }

    pub fn len(&self) -> usize {
        self.table.get().map_or(0, |t| t.order.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column position of `channel` in every artifact.
    pub fn index_of(&self, channel: Channel) -> Result<usize> {
        let table = self.table.get().ok_or(TallyError::RegistryUninitialized)?;
        table
            .index
            .get(&channel)
            .copied()
            .ok_or(TallyError::ChannelNotFound(channel))
    }

    /// Header line shared by intermediate and final artifacts (no newline).
    pub fn header(&self) -> Result<String> {
        Ok(self.channels()?.iter().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn channels(ids: &[i32]) -> Vec<Channel> {
        ids.iter().copied().map(Channel).collect()
    }

    #[test]
    fn test_uninitialized_registry_fails() {
        let registry = ChannelRegistry::new();
        assert!(!registry.is_initialized());
        assert!(matches!(registry.channels(), Err(TallyError::RegistryUninitialized)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_initialize_preserves_order() {
        let registry = ChannelRegistry::new();
        registry.initialize_with(channels(&[102, 101, 7])).unwrap();
        assert_eq!(registry.channels().unwrap(), channels(&[102, 101, 7]).as_slice());
        assert_eq!(registry.header().unwrap(), "102,101,7");
        assert_eq!(registry.index_of(Channel(7)).unwrap(), 2);
    }

    #[test]
    fn test_second_initialize_is_noop() {
        let registry = ChannelRegistry::new();
        let first = registry.initialize_with(channels(&[1, 2])).unwrap().to_vec();
        let second = registry.initialize_with(channels(&[9, 8, 7])).unwrap().to_vec();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_channels_rejected_and_retryable() {
        let registry = ChannelRegistry::new();
        let err = registry.initialize_with(channels(&[1, 2, 1])).unwrap_err();
        assert!(matches!(err, TallyError::DuplicateChannel(Channel(1))));
        assert!(!registry.is_initialized());

        registry.initialize_with(channels(&[1, 2])).unwrap();
        assert!(registry.is_initialized());
    }

    #[test]
    fn test_unknown_channel() {
        let registry = ChannelRegistry::new();
        registry.initialize_with(channels(&[1])).unwrap();
        assert!(matches!(registry.index_of(Channel(5)), Err(TallyError::ChannelNotFound(Channel(5)))));
    }

    #[test]
    fn test_concurrent_initialize_single_winner() {
        let registry = Arc::new(ChannelRegistry::new());
        std::thread::scope(|s| {
            for i in 0..8 {
                let registry = registry.clone();
                s.spawn(move || {
                    registry.initialize_with(channels(&[i, i + 100])).unwrap();
                });
            }
        });
        let winner = registry.channels().unwrap();
        assert_eq!(winner.len(), 2);
        assert_eq!(winner[1].0, winner[0].0 + 100);
    }
}
