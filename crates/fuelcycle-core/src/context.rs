//! Shared simulation context: the clock, the batch id source, the
//! composition-template registry and the event log.
//!
//! Exactly one context exists per simulation. Agents receive `&mut
//! SimContext` during their tick/settlement/tock phases; nothing in it is
//! agent-private.

use crate::composition::CompositionRegistry;
use crate::error::Error;
use crate::fixed::Step;
use crate::id::CompositionId;
use crate::record::EventLog;
use crate::resource::BatchIdGen;

#[derive(Debug, Default)]
pub struct SimContext {
    /// Current discrete time step. Monotonic; advanced once per step by the
    /// driving loop, never by agents.
    pub time: Step,
    pub ids: BatchIdGen,
    pub compositions: CompositionRegistry,
    pub log: EventLog,
}

impl SimContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by one step.
    pub fn advance(&mut self) {
        self.time += 1;
    }

    /// Resolve a template name, failing the way stream-template lookups do.
    pub fn template(&self, name: &str) -> Result<CompositionId, Error> {
        self.compositions
            .id_of(name)
            .ok_or_else(|| Error::UnknownTemplate(name.to_string()))
    }
}
