use crate::worker::WorkerIdentity;
use crate::{Result, TallyError};
use std::fs;
use std::path::Path;

/// Per-event energy values, one per channel in registry order.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub deposits: Vec<f64>,
    pub passing: Vec<f64>,
}

/// Events replayed by the CLI driver in place of a live simulation.
#[derive(Debug, Clone, Default)]
pub struct EventSource {
    events: Vec<EventRecord>,
}

impl EventSource {
    pub fn from_path(path: &Path, channel_count: usize) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| TallyError::Events(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&text, channel_count)
    }

    /// Each line holds `channel_count` deposits followed by `channel_count` passing values.
    pub fn parse(text: &str, channel_count: usize) -> Result<Self> {
        let mut events = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let values = line
                .split(',')
                .map(|v| {
                    v.trim().parse::<f64>().map_err(|_| {
                        TallyError::Events(format!("line {}: invalid value '{}'", idx + 1, v.trim()))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            if values.len() != 2 * channel_count {
                return Err(TallyError::Events(format!(
                    "line {}: expected {} values, found {}",
                    idx + 1,
                    2 * channel_count,
                    values.len()
                )));
            }
            let (deposits, passing) = values.split_at(channel_count);
            events.push(EventRecord {
                deposits: deposits.to_vec(),
                passing: passing.to_vec(),
            });
        }
        Ok(Self { events })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Round-robin share of the events for `identity`. The coordinator gets none.
    pub fn for_worker(&self, identity: WorkerIdentity, worker_count: u32) -> impl Iterator<Item = &EventRecord> {
        let (start, step) = match identity {
            WorkerIdentity::Worker(index) if index < worker_count => (index as usize, worker_count as usize),
            _ => (self.events.len(), 1),
        };
        self.events.iter().skip(start).step_by(step)
    }
}
