//! Shared test helpers: a mock simulation with a greedy exchange.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so the helpers
//! are available to unit tests and, via the `test-utils` feature, to the
//! integration-test crate.
//!
//! `MockSim` drives the strict per-step pipeline (tick, requests, source
//! matching, bids, settlement, tock) over a facility under test plus
//! infinite sources and rate-limited sinks. The matcher is deliberately
//! simple: mutual request groups are filled once from the
//! highest-preference commodity an active source offers; bid portfolios are
//! allocated greedily in bid order under their capacity constraint. Every
//! confirmed transfer lands in `transactions` for the tests to query.

use crate::composition::Composition;
use crate::config::FacilityConfig;
use crate::context::SimContext;
use crate::error::Error;
use crate::exchange::{
    BidPortfolio, CommodityRequests, ExchangeAgent, Request, RequestPortfolio, Trade,
};
use crate::facility::BulkFacility;
use crate::fixed::{Fixed64, Qty, Step};
use crate::id::{AgentId, CompositionId};
use crate::resource::ResourceBatch;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::ops::Range;

pub fn qty(v: f64) -> Qty {
    Qty::from_num(v)
}

/// One confirmed transfer, as the tests observe it.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub time: Step,
    pub commodity: String,
    pub quantity: Qty,
    pub sender: AgentId,
    pub receiver: AgentId,
}

// ---------------------------------------------------------------------------
// Source and sink agents
// ---------------------------------------------------------------------------

/// Offers unlimited material of one commodity, shaped to the requested
/// template. Optionally offline for a window of steps.
#[derive(Debug)]
pub struct SourceAgent {
    id: AgentId,
    commodity: String,
    offline: Option<Range<Step>>,
}

impl SourceAgent {
    fn active(&self, time: Step) -> bool {
        !self.offline.as_ref().is_some_and(|w| w.contains(&time))
    }
}

impl ExchangeAgent for SourceAgent {
    fn id(&self) -> AgentId {
        self.id
    }
}

/// Requests up to a fixed quantity of one commodity per step and swallows
/// whatever it is granted.
#[derive(Debug)]
pub struct SinkAgent {
    id: AgentId,
    commodity: String,
    per_step: Qty,
    start: Step,
    pub received: Qty,
}

impl ExchangeAgent for SinkAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn material_requests(&mut self, ctx: &mut SimContext) -> Result<Vec<RequestPortfolio>, Error> {
        if ctx.time < self.start || self.per_step == Qty::ZERO {
            return Ok(Vec::new());
        }
        Ok(vec![RequestPortfolio {
            requests: vec![Request {
                requester: self.id,
                commodity: self.commodity.clone(),
                quantity: self.per_step,
                template: None,
                preference: Fixed64::from_num(1.0),
            }],
            mutual: false,
        }])
    }

    fn accept_trades(
        &mut self,
        _ctx: &mut SimContext,
        deliveries: Vec<(Trade, ResourceBatch)>,
    ) -> Result<(), Error> {
        for (_, batch) in deliveries {
            self.received += batch.quantity();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSim
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum AgentSlot {
    Facility(BulkFacility),
    Source(SourceAgent),
    Sink(SinkAgent),
}

impl AgentSlot {
    fn as_agent_mut(&mut self) -> &mut dyn ExchangeAgent {
        match self {
            AgentSlot::Facility(f) => f,
            AgentSlot::Source(s) => s,
            AgentSlot::Sink(s) => s,
        }
    }
}

/// A minimal simulation: one shared context, an agent arena and a greedy
/// matcher standing in for the exchange.
#[derive(Debug)]
pub struct MockSim {
    pub ctx: SimContext,
    agents: SlotMap<AgentId, AgentSlot>,
    order: Vec<AgentId>,
    pub transactions: Vec<Transaction>,
}

impl Default for MockSim {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSim {
    pub fn new() -> Self {
        Self {
            ctx: SimContext::new(),
            agents: SlotMap::with_key(),
            order: Vec::new(),
            transactions: Vec::new(),
        }
    }

    pub fn add_template(&mut self, name: &str, composition: Composition) -> CompositionId {
        self.ctx.compositions.register(name, composition)
    }

    pub fn add_facility(&mut self, config: &FacilityConfig) -> Result<AgentId, Error> {
        let ctx = &mut self.ctx;
        let key = self
            .agents
            .try_insert_with_key(|key| -> Result<AgentSlot, Error> {
                Ok(AgentSlot::Facility(BulkFacility::activate(key, config, ctx)?))
            })?;
        self.order.push(key);
        Ok(key)
    }

    pub fn add_source(&mut self, commodity: &str) -> AgentId {
        self.add_source_with_outage(commodity, None)
    }

    pub fn add_source_with_outage(
        &mut self,
        commodity: &str,
        offline: Option<Range<Step>>,
    ) -> AgentId {
        let commodity = commodity.to_string();
        let key = self.agents.insert_with_key(|id| {
            AgentSlot::Source(SourceAgent {
                id,
                commodity,
                offline,
            })
        });
        self.order.push(key);
        key
    }

    pub fn add_sink(&mut self, commodity: &str, per_step: f64) -> AgentId {
        self.add_sink_starting(commodity, per_step, 0)
    }

    pub fn add_sink_starting(&mut self, commodity: &str, per_step: f64, start: Step) -> AgentId {
        let commodity = commodity.to_string();
        let key = self.agents.insert_with_key(|id| {
            AgentSlot::Sink(SinkAgent {
                id,
                commodity,
                per_step: qty(per_step),
                start,
                received: Qty::ZERO,
            })
        });
        self.order.push(key);
        key
    }

    pub fn facility(&self, id: AgentId) -> &BulkFacility {
        match &self.agents[id] {
            AgentSlot::Facility(f) => f,
            other => panic!("agent is not a facility: {other:?}"),
        }
    }

    pub fn sink(&self, id: AgentId) -> &SinkAgent {
        match &self.agents[id] {
            AgentSlot::Sink(s) => s,
            other => panic!("agent is not a sink: {other:?}"),
        }
    }

    /// Acquisitions a given agent made, as (time, quantity) pairs.
    pub fn acquisitions(&self, receiver: AgentId) -> Vec<(Step, Qty)> {
        self.transactions
            .iter()
            .filter(|t| t.receiver == receiver)
            .map(|t| (t.time, t.quantity))
            .collect()
    }

    pub fn run(&mut self, steps: Step) -> Result<(), Error> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    /// One full time step: tick, requests, source matching, bids,
    /// settlement, tock, clock advance.
    pub fn step(&mut self) -> Result<(), Error> {
        let order = self.order.clone();

        // Phase 1: tick.
        for &key in &order {
            let ctx = &mut self.ctx;
            self.agents[key].as_agent_mut().tick(ctx)?;
        }

        // Phase 2: gather demand portfolios.
        let mut portfolios: Vec<RequestPortfolio> = Vec::new();
        for &key in &order {
            let ctx = &mut self.ctx;
            portfolios.extend(self.agents[key].as_agent_mut().material_requests(ctx)?);
        }

        // Phase 2a: fill from sources. A mutual group is one need: it is
        // filled at most once, from the highest-preference member commodity
        // an active source currently offers.
        let mut unmatched: CommodityRequests = CommodityRequests::new();
        for portfolio in portfolios {
            if portfolio.mutual {
                let mut indices: Vec<usize> = (0..portfolio.requests.len()).collect();
                indices.sort_by(|&a, &b| {
                    portfolio.requests[b]
                        .preference
                        .cmp(&portfolio.requests[a].preference)
                });
                let filled = indices
                    .into_iter()
                    .find_map(|i| self.try_fill_from_source(&portfolio.requests[i]).transpose())
                    .transpose()?;
                if filled.is_none() {
                    for request in portfolio.requests {
                        unmatched.entry(request.commodity.clone()).or_default().push(request);
                    }
                }
            } else {
                for request in portfolio.requests {
                    if self.try_fill_from_source(&request)?.is_none() {
                        unmatched.entry(request.commodity.clone()).or_default().push(request);
                    }
                }
            }
        }

        // Phase 3: bids against the unmatched requests, allocated greedily
        // under each portfolio's capacity constraint.
        for &key in &order {
            let bids = {
                let ctx = &mut self.ctx;
                self.agents[key].as_agent_mut().material_bids(ctx, &unmatched)?
            };
            for portfolio in bids {
                self.settle_bid_portfolio(key, portfolio, &mut unmatched)?;
            }
        }

        // Phase 4: tock and advance.
        for &key in &order {
            let ctx = &mut self.ctx;
            self.agents[key].as_agent_mut().tock(ctx)?;
        }
        self.ctx.advance();
        Ok(())
    }

    /// Fill one request from an active source, if any. Returns the trade
    /// that happened.
    fn try_fill_from_source(&mut self, request: &Request) -> Result<Option<Trade>, Error> {
        let Some(template) = request.template else {
            return Ok(None);
        };
        if request.quantity == Qty::ZERO {
            return Ok(None);
        }
        let time = self.ctx.time;
        let Some(source_key) = self.order.iter().copied().find(|&k| {
            matches!(&self.agents[k], AgentSlot::Source(s)
                if s.commodity == request.commodity && s.active(time))
        }) else {
            return Ok(None);
        };

        let batch = ResourceBatch::new(self.ctx.ids.next_id(), request.quantity, template);
        let trade = Trade {
            commodity: request.commodity.clone(),
            quantity: request.quantity,
            requester: request.requester,
            supplier: source_key,
        };
        self.transactions.push(Transaction {
            time,
            commodity: trade.commodity.clone(),
            quantity: trade.quantity,
            sender: source_key,
            receiver: request.requester,
        });
        let ctx = &mut self.ctx;
        self.agents[request.requester]
            .as_agent_mut()
            .accept_trades(ctx, vec![(trade.clone(), batch)])?;
        Ok(Some(trade))
    }

    fn settle_bid_portfolio(
        &mut self,
        supplier: AgentId,
        portfolio: BidPortfolio,
        unmatched: &mut CommodityRequests,
    ) -> Result<(), Error> {
        let Some(requests) = unmatched.get_mut(&portfolio.commodity) else {
            return Ok(());
        };
        let mut need: HashMap<AgentId, Qty> = HashMap::new();
        for request in requests.iter() {
            *need.entry(request.requester).or_insert(Qty::ZERO) += request.quantity;
        }

        let mut constraint = portfolio.constraint;
        let mut granted: Vec<(AgentId, Qty)> = Vec::new();
        for bid in &portfolio.bids {
            let Some(remaining) = need.get_mut(&bid.requester) else {
                continue;
            };
            let amount = bid.quantity.min(*remaining).min(constraint);
            if amount == Qty::ZERO {
                continue;
            }
            *remaining -= amount;
            constraint -= amount;
            match granted.iter_mut().find(|(r, _)| *r == bid.requester) {
                Some((_, total)) => *total += amount,
                None => granted.push((bid.requester, amount)),
            }
        }

        for (requester, quantity) in granted {
            let trade = Trade {
                commodity: portfolio.commodity.clone(),
                quantity,
                requester,
                supplier,
            };
            let responses = {
                let ctx = &mut self.ctx;
                self.agents[supplier]
                    .as_agent_mut()
                    .supply_trades(ctx, std::slice::from_ref(&trade))?
            };
            self.transactions.push(Transaction {
                time: self.ctx.time,
                commodity: trade.commodity.clone(),
                quantity,
                sender: supplier,
                receiver: requester,
            });
            let ctx = &mut self.ctx;
            self.agents[requester].as_agent_mut().accept_trades(ctx, responses)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixture compositions and configs
// ---------------------------------------------------------------------------

pub fn c_fresh_uox() -> Composition {
    Composition::from_mass([("u235", 4.0), ("u238", 96.0)])
}

pub fn c_spent_uox() -> Composition {
    Composition::from_mass([("u235", 0.8), ("u238", 100.0), ("pu239", 1.0)])
}

pub fn c_fresh_mox() -> Composition {
    Composition::from_mass([("u235", 0.7), ("u238", 100.0), ("pu239", 3.3)])
}

pub fn c_spent_mox() -> Composition {
    Composition::from_mass([("u235", 0.2), ("u238", 100.0), ("pu239", 0.9)])
}

/// Single-stream config: uox in, waste out, working capacity 300,
/// discharge 10, just-in-time staging.
pub fn uox_config(cycle_time: Step, refuel_time: Step) -> FacilityConfig {
    FacilityConfig {
        prototype: "bulk_cell".into(),
        in_commodities: vec!["uox".into()],
        in_templates: vec!["fresh_uox".into()],
        out_commodities: vec!["waste".into()],
        out_templates: vec!["spent_uox".into()],
        preferences: vec![],
        working_capacity: 300.0,
        discharge_mass: 10.0,
        staging_capacity: 0.0,
        output_capacity: None,
        cycle_time,
        refuel_time,
        lifetime: None,
        transmute_all_at_retirement: true,
        power_capacity: 1000.0,
        power_name: "power".into(),
        side_products: vec![],
        side_product_quantities: vec![],
        pref_change_times: vec![],
        pref_change_commodities: vec![],
        pref_change_values: vec![],
        template_change_times: vec![],
        template_change_commodities: vec![],
        template_change_in: vec![],
        template_change_out: vec![],
        latitude: 0.0,
        longitude: 0.0,
    }
}

/// Register the standard uox templates on a sim.
pub fn register_uox(sim: &mut MockSim) {
    sim.add_template("fresh_uox", c_fresh_uox());
    sim.add_template("spent_uox", c_spent_uox());
}
