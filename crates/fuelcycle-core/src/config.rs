//! Facility configuration and activation-time validation.
//!
//! Configuration arrives as parallel per-stream arrays (and parallel
//! schedule arrays for preference/template changes). Types are assumed
//! already validated by whatever loaded the file; cardinality is
//! re-validated here because a mismatched array silently mis-joins streams.
//! Every offending field is reported in one aggregated fatal error.

use crate::fixed::{Fixed64, Qty, Step, f64_to_qty};
use crate::stream::{FuelStream, StreamTable};
use serde::{Deserialize, Serialize};

/// Preference assigned to every stream when the user omits the preference
/// array entirely. A *shorter* array instead defaults the missing tail to
/// zero at lookup time (see `StreamTable::preference`).
pub const DEFAULT_PREFERENCE: f64 = 1.0;

/// Fatal configuration errors, detected at facility activation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("prototype '{prototype}' has mismatched array lengths:\n{detail}")]
    Cardinality { prototype: String, detail: String },
}

fn default_power_name() -> String {
    "power".to_string()
}

fn default_transmute_all() -> bool {
    true
}

/// Declarative facility configuration. All quantities are plain numbers
/// here; they become fixed-point at activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityConfig {
    pub prototype: String,

    // -- fuel streams (parallel arrays, indexed 0..N-1) --
    pub in_commodities: Vec<String>,
    pub in_templates: Vec<String>,
    pub out_commodities: Vec<String>,
    pub out_templates: Vec<String>,
    /// Optional; empty means "default preference for every stream".
    #[serde(default)]
    pub preferences: Vec<f64>,

    // -- capacities --
    /// Working ("core") pool capacity.
    pub working_capacity: f64,
    /// Quantity moved per routine discharge.
    pub discharge_mass: f64,
    /// Staging ("fresh") pool capacity. Zero means just-in-time ordering.
    #[serde(default)]
    pub staging_capacity: f64,
    /// Output ("spent") pool capacity. `None` means effectively unbounded.
    #[serde(default)]
    pub output_capacity: Option<f64>,

    // -- cycle timing --
    pub cycle_time: Step,
    pub refuel_time: Step,
    /// Steps from activation to the facility's exit time. `None` never
    /// retires.
    #[serde(default)]
    pub lifetime: Option<Step>,
    /// End-of-life policy: transform the whole remaining working inventory
    /// (true) or half of it (false).
    #[serde(default = "default_transmute_all")]
    pub transmute_all_at_retirement: bool,

    // -- reported output --
    #[serde(default)]
    pub power_capacity: f64,
    #[serde(default = "default_power_name")]
    pub power_name: String,
    #[serde(default)]
    pub side_products: Vec<String>,
    #[serde(default)]
    pub side_product_quantities: Vec<f64>,

    // -- scheduled parameter changes (parallel arrays) --
    #[serde(default)]
    pub pref_change_times: Vec<Step>,
    #[serde(default)]
    pub pref_change_commodities: Vec<String>,
    #[serde(default)]
    pub pref_change_values: Vec<f64>,
    #[serde(default)]
    pub template_change_times: Vec<Step>,
    #[serde(default)]
    pub template_change_commodities: Vec<String>,
    #[serde(default)]
    pub template_change_in: Vec<String>,
    #[serde(default)]
    pub template_change_out: Vec<String>,

    // -- position --
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

impl FacilityConfig {
    /// Re-validate array cardinality. Aggregates every mismatch into one
    /// fatal error, like the activation check it models.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut detail = String::new();
        let n = self.in_commodities.len();
        let stream_fields: [(&str, usize); 3] = [
            ("in_templates", self.in_templates.len()),
            ("out_commodities", self.out_commodities.len()),
            ("out_templates", self.out_templates.len()),
        ];
        for (field, len) in stream_fields {
            if len != n {
                detail.push_str(&format!("{field} has {len} vals, expected {n}\n"));
            }
        }
        if self.preferences.len() > n {
            detail.push_str(&format!(
                "preferences has {} vals, expected at most {n}\n",
                self.preferences.len()
            ));
        }

        if self.side_product_quantities.len() != self.side_products.len() {
            detail.push_str(&format!(
                "side_product_quantities has {} vals, expected {}\n",
                self.side_product_quantities.len(),
                self.side_products.len()
            ));
        }

        let np = self.pref_change_times.len();
        for (field, len) in [
            ("pref_change_commodities", self.pref_change_commodities.len()),
            ("pref_change_values", self.pref_change_values.len()),
        ] {
            if len != np {
                detail.push_str(&format!("{field} has {len} vals, expected {np}\n"));
            }
        }

        let nt = self.template_change_times.len();
        for (field, len) in [
            (
                "template_change_commodities",
                self.template_change_commodities.len(),
            ),
            ("template_change_in", self.template_change_in.len()),
            ("template_change_out", self.template_change_out.len()),
        ] {
            if len != nt {
                detail.push_str(&format!("{field} has {len} vals, expected {nt}\n"));
            }
        }

        if detail.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Cardinality {
                prototype: self.prototype.clone(),
                detail,
            })
        }
    }

    /// Build the validated stream table. An entirely omitted preference
    /// array is normalized to [`DEFAULT_PREFERENCE`] per stream.
    pub fn stream_table(&self) -> StreamTable {
        let streams: Vec<FuelStream> = (0..self.in_commodities.len())
            .map(|i| FuelStream {
                in_commodity: self.in_commodities[i].clone(),
                out_commodity: self.out_commodities[i].clone(),
                in_template: self.in_templates[i].clone(),
                out_template: self.out_templates[i].clone(),
            })
            .collect();
        let preferences: Vec<Fixed64> = if self.preferences.is_empty() {
            streams
                .iter()
                .map(|_| Fixed64::from_num(DEFAULT_PREFERENCE))
                .collect()
        } else {
            self.preferences.iter().map(|&p| Fixed64::from_num(p)).collect()
        };
        StreamTable::new(streams, preferences)
    }

    pub fn output_capacity_qty(&self) -> Qty {
        match self.output_capacity {
            Some(c) => f64_to_qty(c),
            None => Qty::MAX,
        }
    }
}
