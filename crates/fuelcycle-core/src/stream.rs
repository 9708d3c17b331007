//! Fuel streams and the batch identity index.
//!
//! A fuel stream is the configured tuple {input commodity, output commodity,
//! input template, output template, preference}. Streams are indexed 0..N-1;
//! the stream id is the join key between the commodity a batch was acquired
//! under and its eventual output disposition.
//!
//! Batches themselves carry no commodity tag (see `resource.rs`), so the
//! facility keeps an external side table from batch id to stream id. An
//! entry is created when a batch is accepted from the exchange, copied to
//! split children, and removed the moment a batch is handed back to the
//! exchange — a stale entry would otherwise leak for the facility's
//! lifetime.

use crate::fixed::Fixed64;
use crate::id::{BatchId, StreamId};
use std::collections::HashMap;

/// Errors from stream and identity-index queries. All of these signal a
/// caller or integration bug and are not retried.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("received unsupported commodity '{0}'")]
    UnsupportedCommodity(String),
    #[error("no stream index entry for batch {0:?}")]
    NotIndexed(BatchId),
    #[error("stream {stream:?} out of range for {field} ({len} entries)")]
    IndexOutOfRange {
        stream: StreamId,
        field: &'static str,
        len: usize,
    },
}

/// One configured fuel stream, preference excluded (preferences live in a
/// separate, possibly shorter array — see [`StreamTable::preference`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuelStream {
    pub in_commodity: String,
    pub out_commodity: String,
    /// Template name resolved against the composition registry at use time,
    /// so scheduled template changes take effect by swapping the name.
    pub in_template: String,
    pub out_template: String,
}

/// The validated per-stream configuration table.
#[derive(Debug, Clone, Default)]
pub struct StreamTable {
    streams: Vec<FuelStream>,
    /// May be shorter than `streams`; unindexed entries default to zero.
    preferences: Vec<Fixed64>,
}

impl StreamTable {
    pub fn new(streams: Vec<FuelStream>, preferences: Vec<Fixed64>) -> Self {
        Self {
            streams,
            preferences,
        }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StreamId, &FuelStream)> {
        self.streams
            .iter()
            .enumerate()
            .map(|(i, s)| (StreamId(i as u32), s))
    }

    /// Find the stream whose input commodity matches (first match wins).
    pub fn stream_for_commodity(&self, commodity: &str) -> Option<StreamId> {
        self.streams
            .iter()
            .position(|s| s.in_commodity == commodity)
            .map(|i| StreamId(i as u32))
    }

    pub fn get(&self, id: StreamId) -> Result<&FuelStream, StreamError> {
        self.streams
            .get(id.0 as usize)
            .ok_or(StreamError::IndexOutOfRange {
                stream: id,
                field: "streams",
                len: self.streams.len(),
            })
    }

    /// Preference of a stream. A stream beyond the end of the preference
    /// array has the documented default of zero rather than being an error.
    pub fn preference(&self, id: StreamId) -> Fixed64 {
        self.preferences
            .get(id.0 as usize)
            .copied()
            .unwrap_or(Fixed64::ZERO)
    }

    pub fn set_preference(&mut self, id: StreamId, value: Fixed64) {
        let i = id.0 as usize;
        if i >= self.preferences.len() {
            self.preferences.resize(i + 1, Fixed64::ZERO);
        }
        self.preferences[i] = value;
    }

    pub fn set_templates(&mut self, id: StreamId, in_template: &str, out_template: &str) {
        if let Some(s) = self.streams.get_mut(id.0 as usize) {
            s.in_template = in_template.to_string();
            s.out_template = out_template.to_string();
        }
    }

    /// Stream id of the highest-preference stream (first maximum), used to
    /// label demand telemetry.
    pub fn highest_preference(&self) -> Option<StreamId> {
        let mut best: Option<(StreamId, Fixed64)> = None;
        for (id, _) in self.iter() {
            let p = self.preference(id);
            match best {
                Some((_, bp)) if bp >= p => {}
                _ => best = Some((id, p)),
            }
        }
        best.map(|(id, _)| id)
    }
}

/// Side table recovering the stream a batch was acquired under.
#[derive(Debug, Clone, Default)]
pub struct StreamIndex {
    entries: HashMap<BatchId, StreamId>,
}

impl StreamIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly accepted batch under the stream matching the
    /// commodity it was traded as.
    pub fn index(
        &mut self,
        batch: BatchId,
        commodity: &str,
        table: &StreamTable,
    ) -> Result<StreamId, StreamError> {
        let stream = table
            .stream_for_commodity(commodity)
            .ok_or_else(|| StreamError::UnsupportedCommodity(commodity.to_string()))?;
        self.entries.insert(batch, stream);
        Ok(stream)
    }

    /// Recover the stream of an indexed batch.
    pub fn get(&self, batch: BatchId) -> Result<StreamId, StreamError> {
        self.entries
            .get(&batch)
            .copied()
            .ok_or(StreamError::NotIndexed(batch))
    }

    /// Copy the parent's entry to a split child.
    pub fn inherit(&mut self, parent: BatchId, child: BatchId) -> Result<(), StreamError> {
        let stream = self.get(parent)?;
        self.entries.insert(child, stream);
        Ok(())
    }

    /// Drop the entry for a batch leaving the facility.
    pub fn forget(&mut self, batch: BatchId) -> Option<StreamId> {
        self.entries.remove(&batch)
    }

    pub fn contains(&self, batch: BatchId) -> bool {
        self.entries.contains_key(&batch)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
