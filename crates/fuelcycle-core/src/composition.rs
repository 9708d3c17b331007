//! Composition templates and the name-to-template registry.
//!
//! A composition is a named target makeup assigned to a resource batch,
//! either at creation or via a transform. The numerics of composition
//! transforms are outside the facility core; a transform simply retags a
//! batch with a different template id. The registry is the collaborator
//! that resolves the template names carried in configuration.

use crate::fixed::Fixed64;
use crate::id::CompositionId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A target makeup: component name to mass fraction, normalized to sum 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
    mass_fractions: BTreeMap<String, Fixed64>,
}

impl Composition {
    /// Build a composition from (component, mass) pairs, normalizing the
    /// masses into fractions. Zero or negative totals yield an empty
    /// composition.
    pub fn from_mass<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let raw: Vec<(String, f64)> = pairs.into_iter().map(|(n, m)| (n.into(), m)).collect();
        let total: f64 = raw.iter().map(|(_, m)| m).sum();
        let mut mass_fractions = BTreeMap::new();
        if total > 0.0 {
            for (name, mass) in raw {
                mass_fractions.insert(name, Fixed64::from_num(mass / total));
            }
        }
        Self { mass_fractions }
    }

    /// Mass fraction of a component, zero if absent.
    pub fn fraction(&self, component: &str) -> Fixed64 {
        self.mass_fractions
            .get(component)
            .copied()
            .unwrap_or(Fixed64::ZERO)
    }

    pub fn components(&self) -> impl Iterator<Item = (&str, Fixed64)> {
        self.mass_fractions.iter().map(|(n, f)| (n.as_str(), *f))
    }
}

/// Registry resolving a template name to a concrete composition. Templates
/// are registered by the simulation setup; re-registering a name points it
/// at the new composition.
#[derive(Debug, Clone, Default)]
pub struct CompositionRegistry {
    templates: Vec<(String, Composition)>,
    by_name: HashMap<String, CompositionId>,
}

impl CompositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template under a name. Returns its id.
    pub fn register(&mut self, name: &str, composition: Composition) -> CompositionId {
        let id = CompositionId(self.templates.len() as u32);
        self.templates.push((name.to_string(), composition));
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Lookup a template id by name.
    pub fn id_of(&self, name: &str) -> Option<CompositionId> {
        self.by_name.get(name).copied()
    }

    /// Returns the composition for a template id.
    pub fn get(&self, id: CompositionId) -> Option<&Composition> {
        self.templates.get(id.0 as usize).map(|(_, c)| c)
    }

    /// Returns the name a template id was registered under.
    pub fn name_of(&self, id: CompositionId) -> Option<&str> {
        self.templates.get(id.0 as usize).map(|(n, _)| n.as_str())
    }
}
