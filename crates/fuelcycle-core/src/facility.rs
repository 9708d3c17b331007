//! The bulk-processing facility: a capacity-bounded production cell inside
//! a discrete-step resource exchange.
//!
//! The facility consumes batches of input commodities on a schedule, holds
//! them through an irradiation cycle in the working pool, transforms their
//! composition at discharge and offers the result from the output pool. It
//! owns three pools:
//!
//! - **staging** ("fresh"): pre-load buffer, filled by trade overflow
//! - **working** ("core"): the processing inventory, `cycle_step` only
//!   advances while it has been filled
//! - **output** ("spent"): post-process buffer the exchange draws from
//!
//! # Per-step sequence
//!
//! `tick` (decision phase): retirement handling, cycle-end recording,
//! discharge attempt, reload from staging, scheduled parameter changes.
//! The demand portfolio goes out afterwards via `material_requests`. After
//! exchange settlement (`supply_trades`/`accept_trades`), `tock` detects
//! cycle rollover, records power and side products and advances the cycle
//! clock.
//!
//! Discharge blocked by a full output pool is not an error: the facility
//! stays put and retries every step until an external consumer frees space.

use crate::config::FacilityConfig;
use crate::context::SimContext;
use crate::error::Error;
use crate::exchange::{
    Bid, BidPortfolio, CommodityRequests, ExchangeAgent, Request, RequestPortfolio, Trade,
};
use crate::fixed::{Fixed64, Qty, Step, f64_to_qty};
use crate::id::{AgentId, BatchId};
use crate::pool::{Popped, ResourcePool};
use crate::record::FacilityEvent;
use crate::resource::ResourceBatch;
use crate::stream::{StreamIndex, StreamTable};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Derived operating state
// ---------------------------------------------------------------------------

/// Observable phase of the facility, derived from the numeric cycle fields.
/// Never stored; provided for telemetry and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingState {
    /// Working pool never yet filled; the cycle clock has not started.
    RampingUp,
    /// Working pool full, within the irradiation window.
    Irradiating,
    /// Cycle elapsed, discharge not yet successful (output backpressure).
    AwaitingDischarge,
    /// Discharge done, working pool refilling within the refuel window.
    Refueling,
    /// Past the configured exit time.
    Retired,
    /// Terminal: retired with both working and output pools drained.
    Decommissioned,
}

// ---------------------------------------------------------------------------
// Scheduled parameter changes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct PrefChange {
    time: Step,
    commodity: String,
    value: Fixed64,
}

#[derive(Debug, Clone)]
struct TemplateChange {
    time: Step,
    commodity: String,
    in_template: String,
    out_template: String,
}

// ---------------------------------------------------------------------------
// Facility
// ---------------------------------------------------------------------------

/// The facility state machine plus its exchange-participation logic.
#[derive(Debug)]
pub struct BulkFacility {
    id: AgentId,
    prototype: String,

    // -- configured streams --
    streams: StreamTable,
    index: StreamIndex,

    // -- pools --
    staging: ResourcePool,
    working: ResourcePool,
    output: ResourcePool,

    // -- cycle parameters --
    discharge_mass: Qty,
    cycle_time: Step,
    refuel_time: Step,
    lifetime: Option<Step>,
    transmute_all: bool,
    enter_time: Step,

    // -- reported output --
    power_capacity: Qty,
    power_name: String,
    side_products: Vec<(String, Qty)>,

    // -- schedules --
    pref_changes: Vec<PrefChange>,
    template_changes: Vec<TemplateChange>,

    // -- cycle state (mutated only here) --
    cycle_step: Step,
    discharged: bool,
    decommissioned: bool,
}

impl BulkFacility {
    /// Activate a facility from configuration. Re-validates array
    /// cardinality (fatal on mismatch) and records the position row.
    pub fn activate(
        id: AgentId,
        config: &FacilityConfig,
        ctx: &mut SimContext,
    ) -> Result<Self, Error> {
        config.validate()?;

        let pref_changes = config
            .pref_change_times
            .iter()
            .zip(&config.pref_change_commodities)
            .zip(&config.pref_change_values)
            .map(|((&time, commodity), &value)| PrefChange {
                time,
                commodity: commodity.clone(),
                value: Fixed64::from_num(value),
            })
            .collect();
        let template_changes = config
            .template_change_times
            .iter()
            .zip(&config.template_change_commodities)
            .zip(&config.template_change_in)
            .zip(&config.template_change_out)
            .map(|(((&time, commodity), tin), tout)| TemplateChange {
                time,
                commodity: commodity.clone(),
                in_template: tin.clone(),
                out_template: tout.clone(),
            })
            .collect();
        let side_products = config
            .side_products
            .iter()
            .zip(&config.side_product_quantities)
            .map(|(name, &qty)| (name.clone(), f64_to_qty(qty)))
            .collect();

        ctx.log
            .position(id, &config.prototype, config.latitude, config.longitude);

        Ok(Self {
            id,
            prototype: config.prototype.clone(),
            streams: config.stream_table(),
            index: StreamIndex::new(),
            staging: ResourcePool::new(f64_to_qty(config.staging_capacity)),
            working: ResourcePool::new(f64_to_qty(config.working_capacity)),
            output: ResourcePool::new(config.output_capacity_qty()),
            discharge_mass: f64_to_qty(config.discharge_mass),
            cycle_time: config.cycle_time,
            refuel_time: config.refuel_time,
            lifetime: config.lifetime,
            transmute_all: config.transmute_all_at_retirement,
            enter_time: ctx.time,
            power_capacity: f64_to_qty(config.power_capacity),
            power_name: config.power_name.clone(),
            side_products,
            pref_changes,
            template_changes,
            cycle_step: 0,
            discharged: false,
            decommissioned: false,
        })
    }

    // -- observers --

    pub fn prototype(&self) -> &str {
        &self.prototype
    }

    pub fn staging(&self) -> &ResourcePool {
        &self.staging
    }

    pub fn working(&self) -> &ResourcePool {
        &self.working
    }

    pub fn output(&self) -> &ResourcePool {
        &self.output
    }

    pub fn streams(&self) -> &StreamTable {
        &self.streams
    }

    pub fn stream_index(&self) -> &StreamIndex {
        &self.index
    }

    pub fn cycle_step(&self) -> Step {
        self.cycle_step
    }

    pub fn decommissioned(&self) -> bool {
        self.decommissioned
    }

    /// The last step the facility operates; `None` never retires.
    pub fn exit_time(&self) -> Option<Step> {
        self.lifetime.map(|l| self.enter_time + l)
    }

    pub fn retired(&self, time: Step) -> bool {
        self.exit_time().is_some_and(|exit| time > exit)
    }

    /// True exactly when both the working and output pools are empty.
    pub fn ready_to_decommission(&self) -> bool {
        self.working.is_empty() && self.output.is_empty()
    }

    fn working_full(&self) -> bool {
        self.working.quantity() == self.working.capacity()
    }

    pub fn state(&self, time: Step) -> OperatingState {
        if self.decommissioned {
            OperatingState::Decommissioned
        } else if self.retired(time) {
            OperatingState::Retired
        } else if self.cycle_step < self.cycle_time {
            if self.working_full() || self.cycle_step > 0 {
                OperatingState::Irradiating
            } else {
                OperatingState::RampingUp
            }
        } else if !self.discharged {
            OperatingState::AwaitingDischarge
        } else {
            OperatingState::Refueling
        }
    }

    // -- discharge --

    /// Routine discharge: pop `qty` from the working pool, transform each
    /// popped batch to its stream's output template and relocate it to the
    /// output pool. Returns `false` without mutating anything when the
    /// output pool lacks the space; the caller retries next step.
    fn discharge(&mut self, ctx: &mut SimContext, qty: Qty) -> Result<bool, Error> {
        if self.output.space() < qty {
            ctx.log
                .event(self.id, ctx.time, FacilityEvent::Discharge, "failed");
            return Ok(false);
        }
        let popped = self.working.pop(qty, &mut ctx.ids)?;
        self.adopt_splits(&popped)?;
        for mut batch in popped.batches {
            let stream = self.index.get(batch.id())?;
            let template = &self.streams.get(stream)?.out_template;
            batch.retag(ctx.template(template)?);
            self.output.push(batch)?;
        }
        Ok(true)
    }

    /// End-of-life split discharge: transform `transmute_qty`, move the
    /// remaining `total - transmute_qty` untransformed. The capacity check
    /// covers the full `total` before either pop, so failure leaves the
    /// working pool untouched.
    fn discharge_split(
        &mut self,
        ctx: &mut SimContext,
        total: Qty,
        transmute_qty: Qty,
    ) -> Result<bool, Error> {
        if self.output.space() < total {
            ctx.log
                .event(self.id, ctx.time, FacilityEvent::Discharge, "failed");
            return Ok(false);
        }
        let transformed = self.working.pop(transmute_qty, &mut ctx.ids)?;
        self.adopt_splits(&transformed)?;
        for mut batch in transformed.batches {
            let stream = self.index.get(batch.id())?;
            let template = &self.streams.get(stream)?.out_template;
            batch.retag(ctx.template(template)?);
            self.output.push(batch)?;
        }
        let rest = self.working.pop(total - transmute_qty, &mut ctx.ids)?;
        self.adopt_splits(&rest)?;
        for batch in rest.batches {
            self.output.push(batch)?;
        }
        Ok(true)
    }

    /// Top up the working pool from staging, transferring the smaller of
    /// the staging quantity and the working free capacity.
    fn load(&mut self, ctx: &mut SimContext) -> Result<(), Error> {
        let qty = self.working.space().min(self.staging.quantity());
        if qty == Qty::ZERO {
            return Ok(());
        }
        let popped = self.staging.pop(qty, &mut ctx.ids)?;
        self.adopt_splits(&popped)?;
        for batch in popped.batches {
            self.working.push(batch)?;
        }
        Ok(())
    }

    fn adopt_splits(&mut self, popped: &Popped) -> Result<(), Error> {
        for split in &popped.splits {
            self.index.inherit(split.parent, split.child)?;
        }
        Ok(())
    }

    fn apply_scheduled_changes(&mut self, time: Step) {
        for change in &self.pref_changes {
            if change.time != time {
                continue;
            }
            if let Some(stream) = self.streams.stream_for_commodity(&change.commodity) {
                self.streams.set_preference(stream, change.value);
            }
        }
        for change in &self.template_changes {
            if change.time != time {
                continue;
            }
            if let Some(stream) = self.streams.stream_for_commodity(&change.commodity) {
                self.streams
                    .set_templates(stream, &change.in_template, &change.out_template);
            }
        }
    }

    /// Non-mutating snapshot of the output pool grouped by each batch's
    /// recovered output commodity.
    fn peek_output(&self) -> Result<Vec<(String, Vec<(BatchId, Qty)>)>, Error> {
        let mut grouped: Vec<(String, Vec<(BatchId, Qty)>)> = Vec::new();
        for batch in self.output.iter() {
            let stream = self.index.get(batch.id())?;
            let commodity = &self.streams.get(stream)?.out_commodity;
            match grouped.iter_mut().find(|(c, _)| c == commodity) {
                Some((_, mats)) => mats.push((batch.id(), batch.quantity())),
                None => grouped.push((commodity.clone(), vec![(batch.id(), batch.quantity())])),
            }
        }
        Ok(grouped)
    }

    fn record_side_products(&self, ctx: &mut SimContext, produce: bool) {
        for (product, quantity) in &self.side_products {
            let value = if produce { *quantity } else { Qty::ZERO };
            ctx.log.side_product(self.id, ctx.time, product, value);
        }
    }
}

// ---------------------------------------------------------------------------
// Exchange participation
// ---------------------------------------------------------------------------

impl ExchangeAgent for BulkFacility {
    fn id(&self) -> AgentId {
        self.id
    }

    fn tick(&mut self, ctx: &mut SimContext) -> Result<(), Error> {
        if self.decommissioned {
            return Ok(());
        }
        let time = ctx.time;

        // Retirement handling runs in the tick so the exchange still gets a
        // chance to draw from the output pool on the same step.
        if self.retired(time) {
            ctx.log.event(self.id, time, FacilityEvent::Retired, "");
            if self.exit_time().map(|exit| exit + 1) == Some(time) {
                let total = self.working.quantity();
                let transmute = if self.transmute_all {
                    total
                } else {
                    total / Qty::from_num(2)
                };
                self.discharge_split(ctx, total, transmute)?;
            }
            if self.ready_to_decommission() {
                self.decommissioned = true;
            }
            return Ok(());
        }

        if self.cycle_step == self.cycle_time {
            ctx.log.event(self.id, time, FacilityEvent::CycleEnd, "");
        }
        if self.cycle_step >= self.cycle_time && !self.discharged {
            self.discharged = self.discharge(ctx, self.discharge_mass)?;
        }
        if self.cycle_step >= self.cycle_time {
            self.load(ctx)?;
        }

        self.apply_scheduled_changes(time);
        Ok(())
    }

    /// One request per configured stream, all mutually exclusive
    /// alternatives for the same working-pool gap.
    fn material_requests(&mut self, ctx: &mut SimContext) -> Result<Vec<RequestPortfolio>, Error> {
        let order_mass = self.working.space();
        if order_mass == Qty::ZERO || self.retired(ctx.time) || self.decommissioned {
            return Ok(Vec::new());
        }

        let mut requests = Vec::with_capacity(self.streams.len());
        for (stream, fuel) in self.streams.iter() {
            requests.push(Request {
                requester: self.id,
                commodity: fuel.in_commodity.clone(),
                quantity: order_mass,
                template: Some(ctx.template(&fuel.in_template)?),
                preference: self.streams.preference(stream),
            });
        }

        // Heuristic demand label: the fill may come from any stream, but
        // telemetry tags the highest-preference one.
        if let Some(best) = self.streams.highest_preference() {
            let commodity = &self.streams.get(best)?.in_commodity;
            ctx.log.time_series(
                &format!("demand_{commodity}"),
                self.id,
                ctx.time,
                order_mass,
            );
        }

        Ok(vec![RequestPortfolio {
            requests,
            mutual: true,
        }])
    }

    /// Greedy first-fit supply portfolio per output commodity: bids
    /// accumulate per requester until the requested quantity is covered (the
    /// final bid is not trimmed; exact reconciliation is the exchange's
    /// job), constrained by total on-hand inventory for the commodity.
    fn material_bids(
        &mut self,
        _ctx: &mut SimContext,
        requests: &CommodityRequests,
    ) -> Result<Vec<BidPortfolio>, Error> {
        let commodities: BTreeSet<&str> = self
            .streams
            .iter()
            .map(|(_, s)| s.out_commodity.as_str())
            .collect();

        let mut portfolios = Vec::new();
        let mut grouped: Vec<(String, Vec<(BatchId, Qty)>)> = Vec::new();
        let mut peeked = false;
        for commodity in commodities {
            let Some(reqs) = requests.get(commodity) else {
                continue;
            };
            if reqs.is_empty() {
                continue;
            }
            if !peeked {
                grouped = self.peek_output()?;
                peeked = true;
            }
            let Some((_, mats)) = grouped.iter().find(|(c, _)| c == commodity) else {
                continue;
            };

            let mut bids = Vec::new();
            for req in reqs {
                let mut offered = Qty::ZERO;
                for &(batch, quantity) in mats {
                    offered += quantity;
                    bids.push(Bid {
                        requester: req.requester,
                        batch,
                        quantity,
                    });
                    if offered >= req.quantity {
                        break;
                    }
                }
            }
            let constraint = mats.iter().map(|&(_, q)| q).sum();
            portfolios.push(BidPortfolio {
                commodity: commodity.to_string(),
                bids,
                constraint,
            });
        }
        Ok(portfolios)
    }

    /// Pop the matched quantity per trade from the output pool and hand it
    /// over, dropping identity entries as batches leave the facility.
    fn supply_trades(
        &mut self,
        ctx: &mut SimContext,
        trades: &[Trade],
    ) -> Result<Vec<(Trade, ResourceBatch)>, Error> {
        let mut responses = Vec::new();
        for trade in trades {
            let popped = self.output.pop(trade.quantity, &mut ctx.ids)?;
            self.adopt_splits(&popped)?;
            for batch in popped.batches {
                self.index.forget(batch.id());
                responses.push((trade.clone(), batch));
            }
        }
        Ok(responses)
    }

    /// Index each accepted batch under its traded commodity; fill the
    /// working pool while below capacity, overflow goes to staging.
    fn accept_trades(
        &mut self,
        _ctx: &mut SimContext,
        deliveries: Vec<(Trade, ResourceBatch)>,
    ) -> Result<(), Error> {
        for (trade, batch) in deliveries {
            self.index.index(batch.id(), &trade.commodity, &self.streams)?;
            if self.working.quantity() < self.working.capacity() {
                self.working.push(batch)?;
            } else {
                self.staging.push(batch)?;
            }
        }
        Ok(())
    }

    fn tock(&mut self, ctx: &mut SimContext) -> Result<(), Error> {
        if self.decommissioned || self.retired(ctx.time) {
            return Ok(());
        }

        // Rollover: irradiation and refuel windows elapsed, working pool
        // refilled, and this cycle's output actually made it out.
        if self.cycle_step >= self.cycle_time + self.refuel_time
            && self.working_full()
            && self.discharged
        {
            self.discharged = false;
            self.cycle_step = 0;
        }

        if self.cycle_step == 0 && self.working_full() {
            ctx.log.event(self.id, ctx.time, FacilityEvent::CycleStart, "");
        }

        let at_power = self.working_full() && self.cycle_step < self.cycle_time;
        let power = if at_power { self.power_capacity } else { Qty::ZERO };
        ctx.log
            .time_series(&self.power_name, self.id, ctx.time, power);
        ctx.log
            .time_series("supply_power", self.id, ctx.time, power);
        self.record_side_products(ctx, at_power);

        // Gate: the cycle clock never starts before the first full fill.
        if self.cycle_step > 0 || self.working_full() {
            self.cycle_step += 1;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::Composition;
    use crate::config::FacilityConfig;
    use crate::fixed::f64_to_qty;
    use crate::record::FacilityEvent;

    fn base_config() -> FacilityConfig {
        FacilityConfig {
            prototype: "cell".into(),
            in_commodities: vec!["uox".into()],
            in_templates: vec!["fresh_uox".into()],
            out_commodities: vec!["waste".into()],
            out_templates: vec!["spent_uox".into()],
            preferences: vec![],
            working_capacity: 300.0,
            discharge_mass: 10.0,
            staging_capacity: 0.0,
            output_capacity: None,
            cycle_time: 4,
            refuel_time: 3,
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

    fn context() -> SimContext {
        let mut ctx = SimContext::new();
        ctx.compositions
            .register("fresh_uox", Composition::from_mass([("u235", 4.0), ("u238", 96.0)]));
        ctx.compositions
            .register("spent_uox", Composition::from_mass([("u235", 1.0), ("u238", 99.0)]));
        ctx
    }

    fn deliver(
        facility: &mut BulkFacility,
        ctx: &mut SimContext,
        commodity: &str,
        qty: f64,
    ) {
        let template = ctx.template("fresh_uox").unwrap();
        let batch = ResourceBatch::new(ctx.ids.next_id(), f64_to_qty(qty), template);
        let trade = Trade {
            commodity: commodity.to_string(),
            quantity: f64_to_qty(qty),
            requester: facility.id(),
            supplier: AgentId::default(),
        };
        facility.accept_trades(ctx, vec![(trade, batch)]).unwrap();
    }

    fn step(facility: &mut BulkFacility, ctx: &mut SimContext, supply: bool) {
        facility.tick(ctx).unwrap();
        if supply {
            let ports = facility.material_requests(ctx).unwrap();
            if let Some(port) = ports.first() {
                let req = &port.requests[0];
                let (commodity, qty) = (req.commodity.clone(), crate::fixed::qty_to_f64(req.quantity));
                deliver(facility, ctx, &commodity, qty);
            }
        }
        facility.tock(ctx).unwrap();
        ctx.advance();
    }

    #[test]
    fn activation_rejects_mismatched_arrays() {
        let mut cfg = base_config();
        cfg.out_templates.push("extra".into());
        let mut ctx = context();
        assert!(BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).is_err());
    }

    #[test]
    fn activation_records_position() {
        let mut cfg = base_config();
        cfg.latitude = 35.0;
        let mut ctx = context();
        let _f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();
        assert_eq!(ctx.log.positions.len(), 1);
        assert_eq!(ctx.log.positions[0].latitude, 35.0);
        assert_eq!(ctx.log.positions[0].prototype, "cell");
    }

    #[test]
    fn cycle_clock_gated_on_first_fill() {
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &base_config(), &mut ctx).unwrap();

        assert_eq!(f.state(ctx.time), OperatingState::RampingUp);
        step(&mut f, &mut ctx, false);
        step(&mut f, &mut ctx, false);
        assert_eq!(f.cycle_step(), 0);
        assert_eq!(f.state(ctx.time), OperatingState::RampingUp);

        step(&mut f, &mut ctx, true);
        assert_eq!(f.cycle_step(), 1);
        assert_eq!(f.state(ctx.time), OperatingState::Irradiating);
        assert_eq!(ctx.log.events_of(FacilityEvent::CycleStart).count(), 1);
    }

    #[test]
    fn no_demand_when_full_or_retired() {
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &base_config(), &mut ctx).unwrap();
        deliver(&mut f, &mut ctx, "uox", 300.0);
        assert!(f.material_requests(&mut ctx).unwrap().is_empty());

        let mut cfg = base_config();
        cfg.lifetime = Some(0);
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();
        ctx.advance(); // now past exit time
        assert!(f.material_requests(&mut ctx).unwrap().is_empty());
    }

    #[test]
    fn demand_is_one_mutual_portfolio_per_gap() {
        let mut cfg = base_config();
        cfg.in_commodities.push("mox".into());
        cfg.in_templates.push("fresh_uox".into());
        cfg.out_commodities.push("waste".into());
        cfg.out_templates.push("spent_uox".into());
        cfg.preferences = vec![1.0, 2.0];
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();

        let ports = f.material_requests(&mut ctx).unwrap();
        assert_eq!(ports.len(), 1);
        assert!(ports[0].mutual);
        assert_eq!(ports[0].requests.len(), 2);
        assert!(ports[0].requests.iter().all(|r| r.quantity == f64_to_qty(300.0)));

        // Telemetry labeled by the highest-preference stream.
        assert_eq!(ctx.log.series("demand_mox").len(), 1);
        assert!(ctx.log.series("demand_uox").is_empty());
    }

    #[test]
    fn discharge_backpressure_is_idempotent() {
        let mut cfg = base_config();
        cfg.cycle_time = 1;
        cfg.refuel_time = 0;
        cfg.output_capacity = Some(5.0); // smaller than discharge_mass
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();
        deliver(&mut f, &mut ctx, "uox", 300.0);
        f.tock(&mut ctx).unwrap();
        ctx.advance();

        for _ in 0..3 {
            f.tick(&mut ctx).unwrap();
            assert_eq!(f.working().quantity(), f64_to_qty(300.0));
            assert!(f.output().is_empty());
            assert_eq!(f.state(ctx.time), OperatingState::AwaitingDischarge);
            f.tock(&mut ctx).unwrap();
            ctx.advance();
        }
        assert_eq!(ctx.log.events_of(FacilityEvent::Discharge).count(), 3);
        assert!(
            ctx.log
                .events_of(FacilityEvent::Discharge)
                .all(|r| r.value == "failed")
        );
    }

    #[test]
    fn routine_discharge_transforms_composition() {
        let mut cfg = base_config();
        cfg.cycle_time = 1;
        cfg.refuel_time = 0;
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();
        deliver(&mut f, &mut ctx, "uox", 300.0);
        f.tock(&mut ctx).unwrap();
        ctx.advance();

        f.tick(&mut ctx).unwrap();
        assert_eq!(f.output().quantity(), f64_to_qty(10.0));
        assert_eq!(f.working().quantity(), f64_to_qty(290.0));
        let spent = ctx.template("spent_uox").unwrap();
        assert!(f.output().iter().all(|b| b.composition() == spent));
        // The split child inherited an identity entry; the remainder in the
        // working pool kept its own.
        for b in f.output().iter().chain(f.working().iter()) {
            assert!(f.stream_index().contains(b.id()));
        }
    }

    #[test]
    fn working_overflow_routes_to_staging() {
        let mut cfg = base_config();
        cfg.working_capacity = 10.0;
        cfg.staging_capacity = 20.0;
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();
        deliver(&mut f, &mut ctx, "uox", 10.0);
        deliver(&mut f, &mut ctx, "uox", 5.0);
        assert_eq!(f.working().quantity(), f64_to_qty(10.0));
        assert_eq!(f.staging().quantity(), f64_to_qty(5.0));
        assert_eq!(f.stream_index().len(), 2);
    }

    #[test]
    fn reload_from_staging_after_discharge() {
        let mut cfg = base_config();
        cfg.working_capacity = 10.0;
        cfg.staging_capacity = 20.0;
        cfg.cycle_time = 1;
        cfg.refuel_time = 0;
        cfg.discharge_mass = 4.0;
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();
        deliver(&mut f, &mut ctx, "uox", 10.0);
        deliver(&mut f, &mut ctx, "uox", 6.0);
        f.tock(&mut ctx).unwrap();
        ctx.advance();

        f.tick(&mut ctx).unwrap();
        // 4 discharged, 4 reloaded from staging.
        assert_eq!(f.working().quantity(), f64_to_qty(10.0));
        assert_eq!(f.staging().quantity(), f64_to_qty(2.0));
        assert_eq!(f.output().quantity(), f64_to_qty(4.0));
    }

    #[test]
    fn scheduled_preference_and_template_changes_apply() {
        let mut cfg = base_config();
        cfg.pref_change_times = vec![2];
        cfg.pref_change_commodities = vec!["uox".into()];
        cfg.pref_change_values = vec![9.0];
        cfg.template_change_times = vec![2];
        cfg.template_change_commodities = vec!["uox".into()];
        cfg.template_change_in = vec!["fresh_uox".into()];
        cfg.template_change_out = vec!["spent_uox".into()];
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();

        step(&mut f, &mut ctx, false);
        assert_eq!(
            f.streams().preference(crate::id::StreamId(0)),
            Fixed64::from_num(1.0)
        );
        step(&mut f, &mut ctx, false);
        step(&mut f, &mut ctx, false); // t=2 applied here
        assert_eq!(
            f.streams().preference(crate::id::StreamId(0)),
            Fixed64::from_num(9.0)
        );
    }

    #[test]
    fn bids_are_greedy_first_fit_with_constraint() {
        let mut cfg = base_config();
        cfg.cycle_time = 1;
        cfg.refuel_time = 0;
        cfg.discharge_mass = 6.0;
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();
        deliver(&mut f, &mut ctx, "uox", 300.0);
        f.tock(&mut ctx).unwrap();
        ctx.advance();
        // Two cycles' worth of discharge into the output pool.
        f.tick(&mut ctx).unwrap();
        f.discharged = false;
        f.tick(&mut ctx).unwrap();
        assert_eq!(f.output().quantity(), f64_to_qty(12.0));
        assert_eq!(f.output().count(), 2);

        let mut requests = CommodityRequests::new();
        requests.insert(
            "waste".into(),
            vec![
                Request {
                    requester: AgentId::default(),
                    commodity: "waste".into(),
                    quantity: f64_to_qty(5.0),
                    template: None,
                    preference: Fixed64::from_num(1.0),
                },
                Request {
                    requester: AgentId::default(),
                    commodity: "waste".into(),
                    quantity: f64_to_qty(10.0),
                    template: None,
                    preference: Fixed64::from_num(1.0),
                },
            ],
        );
        let ports = f.material_bids(&mut ctx, &requests).unwrap();
        assert_eq!(ports.len(), 1);
        let port = &ports[0];
        assert_eq!(port.constraint, f64_to_qty(12.0));
        // First requester covered by one 6.0 batch (not trimmed to 5.0);
        // second needs both batches.
        assert_eq!(port.bids.len(), 3);
        assert_eq!(port.bids[0].quantity, f64_to_qty(6.0));
    }

    #[test]
    fn no_bids_without_requests_or_inventory() {
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &base_config(), &mut ctx).unwrap();
        // Empty output pool: requests present but nothing on hand.
        let mut requests = CommodityRequests::new();
        requests.insert(
            "waste".into(),
            vec![Request {
                requester: AgentId::default(),
                commodity: "waste".into(),
                quantity: f64_to_qty(5.0),
                template: None,
                preference: Fixed64::ZERO,
            }],
        );
        assert!(f.material_bids(&mut ctx, &requests).unwrap().is_empty());
        // No outstanding requests at all.
        assert!(
            f.material_bids(&mut ctx, &CommodityRequests::new())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn supply_trades_forget_identity_entries() {
        let mut cfg = base_config();
        cfg.cycle_time = 1;
        cfg.refuel_time = 0;
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();
        deliver(&mut f, &mut ctx, "uox", 300.0);
        f.tock(&mut ctx).unwrap();
        ctx.advance();
        f.tick(&mut ctx).unwrap();
        assert_eq!(f.output().quantity(), f64_to_qty(10.0));

        let trade = Trade {
            commodity: "waste".into(),
            quantity: f64_to_qty(4.0),
            requester: AgentId::default(),
            supplier: f.id(),
        };
        let responses = f.supply_trades(&mut ctx, &[trade]).unwrap();
        let handed: Qty = responses.iter().map(|(_, b)| b.quantity()).sum();
        assert_eq!(handed, f64_to_qty(4.0));
        for (_, batch) in &responses {
            assert!(!f.stream_index().contains(batch.id()));
        }
        // Remainder in the output pool is still indexed.
        for batch in f.output().iter() {
            assert!(f.stream_index().contains(batch.id()));
        }
    }

    #[test]
    fn split_discharge_half_policy() {
        let mut cfg = base_config();
        cfg.lifetime = Some(1);
        cfg.transmute_all_at_retirement = false;
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();
        deliver(&mut f, &mut ctx, "uox", 300.0);
        f.tock(&mut ctx).unwrap();
        ctx.advance(); // t=1, exit time
        f.tick(&mut ctx).unwrap();
        f.tock(&mut ctx).unwrap();
        ctx.advance(); // t=2 == exit + 1

        f.tick(&mut ctx).unwrap();
        assert!(f.working().is_empty());
        assert_eq!(f.output().quantity(), f64_to_qty(300.0));
        let spent = ctx.template("spent_uox").unwrap();
        let fresh = ctx.template("fresh_uox").unwrap();
        let transformed: Qty = f
            .output()
            .iter()
            .filter(|b| b.composition() == spent)
            .map(|b| b.quantity())
            .sum();
        let untouched: Qty = f
            .output()
            .iter()
            .filter(|b| b.composition() == fresh)
            .map(|b| b.quantity())
            .sum();
        assert_eq!(transformed, f64_to_qty(150.0));
        assert_eq!(untouched, f64_to_qty(150.0));

        // Only fires once: later retired ticks record RETIRED but move
        // nothing.
        ctx.advance();
        f.tick(&mut ctx).unwrap();
        assert_eq!(f.output().quantity(), f64_to_qty(300.0));
        assert!(ctx.log.events_of(FacilityEvent::Retired).count() >= 2);
    }

    #[test]
    fn decommission_waits_for_empty_pools() {
        let mut cfg = base_config();
        cfg.lifetime = Some(0);
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();
        deliver(&mut f, &mut ctx, "uox", 50.0);
        f.tock(&mut ctx).unwrap();
        ctx.advance(); // t=1 == exit + 1

        f.tick(&mut ctx).unwrap();
        assert!(!f.decommissioned());
        assert_eq!(f.state(ctx.time), OperatingState::Retired);
        assert_eq!(f.output().quantity(), f64_to_qty(50.0));

        // Drain the output pool, then the next tick decommissions.
        let trade = Trade {
            commodity: "waste".into(),
            quantity: f64_to_qty(50.0),
            requester: AgentId::default(),
            supplier: f.id(),
        };
        f.supply_trades(&mut ctx, &[trade]).unwrap();
        ctx.advance();
        f.tick(&mut ctx).unwrap();
        assert!(f.decommissioned());
        assert!(f.stream_index().is_empty());
        assert_eq!(f.state(ctx.time), OperatingState::Decommissioned);
    }

    #[test]
    fn side_products_active_only_at_full_power() {
        let mut cfg = base_config();
        cfg.cycle_time = 2;
        cfg.side_products = vec!["hydrogen".into()];
        cfg.side_product_quantities = vec![3.0];
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();

        // Idle step: zero side product.
        step(&mut f, &mut ctx, false);
        assert_eq!(ctx.log.side_products[0].value, Qty::ZERO);
        // Filled: active.
        step(&mut f, &mut ctx, true);
        assert_eq!(ctx.log.side_products[1].value, f64_to_qty(3.0));
        assert_eq!(ctx.log.series("power")[1].1, f64_to_qty(1000.0));
    }

    #[test]
    fn unknown_template_surfaces_at_request_time() {
        let mut cfg = base_config();
        cfg.in_templates = vec!["never_registered".into()];
        let mut ctx = context();
        let mut f = BulkFacility::activate(AgentId::default(), &cfg, &mut ctx).unwrap();
        assert!(matches!(
            f.material_requests(&mut ctx),
            Err(Error::UnknownTemplate(_))
        ));
    }
}
