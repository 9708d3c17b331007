//! Fuelcycle Core -- a bulk-processing facility for discrete-step resource
//! exchange simulations.
//!
//! The facility consumes batches of input commodities on a schedule, holds
//! them through an irradiation cycle, transforms their composition at
//! discharge and offers the result back to the exchange, reporting power
//! and side products along the way.
//!
//! # Per-Step Pipeline
//!
//! Every global time step runs three strictly ordered phases:
//!
//! 1. **Tick** -- each agent's local decision phase: retirement handling,
//!    discharge attempt, reload from staging, scheduled parameter changes.
//! 2. **Settlement** -- the exchange matches demand portfolios
//!    ([`exchange::RequestPortfolio`]) against supply portfolios
//!    ([`exchange::BidPortfolio`]) and delivers confirmed [`exchange::Trade`]s.
//! 3. **Tock** -- cycle-rollover detection, power/side-product recording,
//!    cycle-clock advancement.
//!
//! # Key Types
//!
//! - [`facility::BulkFacility`] -- the cycle state machine and exchange
//!   participant.
//! - [`pool::ResourcePool`] -- capacity-bounded, order-preserving batch
//!   buffer (staging, working and output pools).
//! - [`stream::StreamTable`] / [`stream::StreamIndex`] -- per-stream
//!   configuration and the batch-identity side table.
//! - [`context::SimContext`] -- clock, batch-id source, composition
//!   registry and event log shared by all agents.
//! - [`record::EventLog`] -- append-only named-table event sink.
//! - [`fixed::Qty`] -- Q32.32 fixed-point quantity for deterministic
//!   inventory arithmetic.

pub mod composition;
pub mod config;
pub mod context;
#[cfg(feature = "data-loader")]
pub mod data_loader;
pub mod error;
pub mod exchange;
pub mod facility;
pub mod fixed;
pub mod id;
pub mod pool;
pub mod record;
pub mod resource;
pub mod stream;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
