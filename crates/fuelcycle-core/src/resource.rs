//! Resource batches: the units of material that move between facilities.
//!
//! A batch carries a globally unique identity, a scalar quantity and a
//! composition template. It deliberately carries no commodity tag; the
//! facility recovers that through its identity index, because ownership of
//! a batch transfers to the exchange during a trade and the exchange must
//! not observe facility-private metadata.

use crate::fixed::Qty;
use crate::id::{BatchId, CompositionId};
use serde::{Deserialize, Serialize};

/// Hands out globally unique batch ids. One per simulation context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchIdGen {
    next: u64,
}

impl BatchIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> BatchId {
        let id = BatchId(self.next);
        self.next += 1;
        id
    }
}

/// A unit of resource. Immutable except through [`ResourceBatch::retag`]
/// (the composition transform) and [`ResourceBatch::extract`] (a split).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBatch {
    id: BatchId,
    quantity: Qty,
    composition: CompositionId,
}

impl ResourceBatch {
    pub fn new(id: BatchId, quantity: Qty, composition: CompositionId) -> Self {
        Self {
            id,
            quantity,
            composition,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn quantity(&self) -> Qty {
        self.quantity
    }

    pub fn composition(&self) -> CompositionId {
        self.composition
    }

    /// Apply a composition transform: retag this batch with a new template.
    pub fn retag(&mut self, composition: CompositionId) {
        self.composition = composition;
    }

    /// Split off `qty` into a new batch with a fresh id. The remainder keeps
    /// this batch's id, so any side table keyed on it stays valid. Callers
    /// must ensure `qty <= self.quantity()`.
    pub fn extract(&mut self, qty: Qty, ids: &mut BatchIdGen) -> ResourceBatch {
        debug_assert!(qty <= self.quantity);
        self.quantity -= qty;
        ResourceBatch {
            id: ids.next_id(),
            quantity: qty,
            composition: self.composition,
        }
    }
}
