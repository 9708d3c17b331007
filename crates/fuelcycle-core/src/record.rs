//! Append-only structured event log.
//!
//! The facility reports into named tables with fixed columns; downstream
//! sinks (and the tests) query them after the fact. Table shapes are an
//! output contract: `FacilityEvents` rows carry one of the four event kinds
//! plus a free-text value, `SideProducts` and `TimeSeries` carry per-step
//! quantities, `AgentPosition` is written once at activation.

use crate::fixed::{Qty, Step};
use crate::id::AgentId;

/// Event kinds recorded in the `FacilityEvents` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacilityEvent {
    Retired,
    CycleEnd,
    Discharge,
    CycleStart,
}

impl FacilityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityEvent::Retired => "RETIRED",
            FacilityEvent::CycleEnd => "CYCLE_END",
            FacilityEvent::Discharge => "DISCHARGE",
            FacilityEvent::CycleStart => "CYCLE_START",
        }
    }
}

/// One row of the `FacilityEvents` table.
#[derive(Debug, Clone)]
pub struct FacilityEventRow {
    pub agent: AgentId,
    pub time: Step,
    pub event: FacilityEvent,
    pub value: String,
}

/// One row of the `SideProducts` table.
#[derive(Debug, Clone)]
pub struct SideProductRow {
    pub agent: AgentId,
    pub time: Step,
    pub product: String,
    pub value: Qty,
}

/// One row of the `AgentPosition` table.
#[derive(Debug, Clone)]
pub struct PositionRow {
    pub agent: AgentId,
    pub prototype: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One row of the `TimeSeries` table.
#[derive(Debug, Clone)]
pub struct TimeSeriesRow {
    pub series: String,
    pub agent: AgentId,
    pub time: Step,
    pub value: Qty,
}

/// The in-memory event sink.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    pub facility_events: Vec<FacilityEventRow>,
    pub side_products: Vec<SideProductRow>,
    pub positions: Vec<PositionRow>,
    pub time_series: Vec<TimeSeriesRow>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(&mut self, agent: AgentId, time: Step, event: FacilityEvent, value: &str) {
        self.facility_events.push(FacilityEventRow {
            agent,
            time,
            event,
            value: value.to_string(),
        });
    }

    pub fn side_product(&mut self, agent: AgentId, time: Step, product: &str, value: Qty) {
        self.side_products.push(SideProductRow {
            agent,
            time,
            product: product.to_string(),
            value,
        });
    }

    pub fn position(&mut self, agent: AgentId, prototype: &str, latitude: f64, longitude: f64) {
        self.positions.push(PositionRow {
            agent,
            prototype: prototype.to_string(),
            latitude,
            longitude,
        });
    }

    pub fn time_series(&mut self, series: &str, agent: AgentId, time: Step, value: Qty) {
        self.time_series.push(TimeSeriesRow {
            series: series.to_string(),
            agent,
            time,
            value,
        });
    }

    // -- query helpers (used by tests and telemetry consumers) --

    pub fn events_of(&self, event: FacilityEvent) -> impl Iterator<Item = &FacilityEventRow> {
        self.facility_events.iter().filter(move |r| r.event == event)
    }

    pub fn series(&self, name: &str) -> Vec<(Step, Qty)> {
        self.time_series
            .iter()
            .filter(|r| r.series == name)
            .map(|r| (r.time, r.value))
            .collect()
    }
}
