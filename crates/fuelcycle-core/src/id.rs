use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies an agent (facility, source, sink) in a simulation.
    pub struct AgentId;
}

/// Globally unique identity of a resource batch. Assigned once at creation
/// and preserved while the batch moves between pools; a split assigns the
/// extracted piece a fresh id and leaves the remainder's id untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(pub u64);

/// Index of a configured fuel stream. The join key between a batch's
/// acquired commodity and its eventual output disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(pub u32);

/// Identifies a composition template in the registry. Cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompositionId(pub u32);
