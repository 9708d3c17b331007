//! Exchange interface types and the agent seam.
//!
//! Each step is a strict two-phase affair: every agent ticks (a local
//! decision phase ending in an immutable demand portfolio), the exchange
//! matches portfolios, settlement delivers confirmed transfers, and every
//! agent tocks. The matching algorithm itself is a collaborator; this
//! module only defines the shapes crossing the boundary.

use crate::error::Error;
use crate::fixed::{Fixed64, Qty};
use crate::id::{AgentId, BatchId, CompositionId};
use crate::context::SimContext;
use crate::resource::ResourceBatch;
use std::collections::BTreeMap;

/// A single request for fresh material.
#[derive(Debug, Clone)]
pub struct Request {
    pub requester: AgentId,
    pub commodity: String,
    pub quantity: Qty,
    /// Desired composition template, if the requester cares.
    pub template: Option<CompositionId>,
    pub preference: Fixed64,
}

/// A group of requests submitted together. When `mutual` is set the
/// requests are substitutable ways to fill one quantity-sized need and the
/// exchange should fill the group's target once, not once per member.
#[derive(Debug, Clone, Default)]
pub struct RequestPortfolio {
    pub requests: Vec<Request>,
    pub mutual: bool,
}

/// One offered batch answering one requester.
#[derive(Debug, Clone)]
pub struct Bid {
    pub requester: AgentId,
    pub batch: BatchId,
    pub quantity: Qty,
}

/// All bids for one output commodity, capped by an aggregate constraint so
/// the exchange cannot allocate beyond actual on-hand inventory across the
/// group's requesters.
#[derive(Debug, Clone)]
pub struct BidPortfolio {
    pub commodity: String,
    pub bids: Vec<Bid>,
    pub constraint: Qty,
}

/// A confirmed transfer, addressed to the supplier (pop this) and the
/// requester (accept the popped batches).
#[derive(Debug, Clone)]
pub struct Trade {
    pub commodity: String,
    pub quantity: Qty,
    pub requester: AgentId,
    pub supplier: AgentId,
}

/// Outstanding requests grouped by commodity, as presented to bidders.
/// BTreeMap keeps bidder iteration deterministic.
pub type CommodityRequests = BTreeMap<String, Vec<Request>>;

/// The seam every exchange participant implements. Invoked in strict
/// per-step order: `tick`, `material_requests`, `material_bids`, trade
/// settlement (`supply_trades` on suppliers, then `accept_trades` on
/// requesters), `tock`. No method may observe another agent's intra-step
/// state.
pub trait ExchangeAgent {
    fn id(&self) -> AgentId;

    fn tick(&mut self, _ctx: &mut SimContext) -> Result<(), Error> {
        Ok(())
    }

    /// Demand portfolios for this step. Called after `tick`.
    fn material_requests(&mut self, _ctx: &mut SimContext) -> Result<Vec<RequestPortfolio>, Error> {
        Ok(Vec::new())
    }

    /// Supply portfolios answering the step's outstanding requests.
    fn material_bids(
        &mut self,
        _ctx: &mut SimContext,
        _requests: &CommodityRequests,
    ) -> Result<Vec<BidPortfolio>, Error> {
        Ok(Vec::new())
    }

    /// Hand over material for trades this agent supplies. May return more
    /// than one batch per trade when the matched quantity spans batch
    /// boundaries.
    fn supply_trades(
        &mut self,
        _ctx: &mut SimContext,
        _trades: &[Trade],
    ) -> Result<Vec<(Trade, ResourceBatch)>, Error> {
        Ok(Vec::new())
    }

    /// Take ownership of material confirmed for this agent as requester.
    fn accept_trades(
        &mut self,
        _ctx: &mut SimContext,
        _deliveries: Vec<(Trade, ResourceBatch)>,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn tock(&mut self, _ctx: &mut SimContext) -> Result<(), Error> {
        Ok(())
    }
}
