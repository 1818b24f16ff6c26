//! Entity Catalog Resolver
//!
//! Picks the class identifier to spawn in the destination engine. Exact
//! identifier matches win; otherwise a candidate sharing the semantic vehicle
//! class is chosen by the injected [`CandidatePicker`].

use std::collections::BTreeSet;

use contracts::{VehicleCatalog, VehicleClass};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Prefix shared by every mirrorable world class identifier
pub const VEHICLE_PREFIX: &str = "vehicle.";

/// Selection strategy among same-class candidates
pub trait CandidatePicker: Send + Sync {
    /// `candidates` is non-empty and sorted
    fn pick(&mut self, candidates: &[String]) -> usize;
}

/// Always the first (lexicographically smallest) candidate
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstCandidate;

impl CandidatePicker for FirstCandidate {
    fn pick(&mut self, _candidates: &[String]) -> usize {
        0
    }
}

/// Uniform random choice
#[derive(Debug, Clone)]
pub struct RandomPicker {
    rng: StdRng,
}

impl RandomPicker {
    /// Reproducible sequence
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl CandidatePicker for RandomPicker {
    fn pick(&mut self, candidates: &[String]) -> usize {
        self.rng.random_range(0..candidates.len())
    }
}

/// Resolved destination class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub type_id: String,
    pub vehicle_class: VehicleClass,
}

/// Class resolver for both directions
pub struct ClassResolver {
    catalog: VehicleCatalog,
    /// Class identifiers the world engine can spawn
    world_classes: BTreeSet<String>,
    picker: Box<dyn CandidatePicker>,
}

impl ClassResolver {
    pub fn new(
        catalog: VehicleCatalog,
        world_classes: BTreeSet<String>,
        picker: Box<dyn CandidatePicker>,
    ) -> Self {
        Self {
            catalog,
            world_classes,
            picker,
        }
    }

    pub fn catalog(&self) -> &VehicleCatalog {
        &self.catalog
    }

    /// Traffic type -> world class identifier
    ///
    /// `reported_class` is the semantic class the traffic engine gave the
    /// entity; without it the class table decides.
    pub fn resolve_world_class(
        &mut self,
        traffic_type_id: &str,
        reported_class: Option<VehicleClass>,
    ) -> Option<Resolution> {
        let known_class = reported_class.or_else(|| self.catalog.class_of(traffic_type_id));

        if self.world_classes.contains(traffic_type_id) {
            return Some(Resolution {
                type_id: traffic_type_id.to_string(),
                vehicle_class: known_class.unwrap_or(VehicleClass::Ignoring),
            });
        }

        let class = known_class?;
        let candidates: Vec<String> = self
            .catalog
            .ids_with_class(class)
            .filter(|id| self.world_classes.contains(*id))
            .map(str::to_string)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let index = self.picker.pick(&candidates).min(candidates.len() - 1);
        Some(Resolution {
            type_id: candidates[index].clone(),
            vehicle_class: class,
        })
    }

    /// World class identifier -> traffic type
    ///
    /// The traffic type reuses the world identifier; only vehicle classes mirror.
    pub fn traffic_type_for(&self, world_type_id: &str) -> Option<Resolution> {
        if !world_type_id.starts_with(VEHICLE_PREFIX) {
            return None;
        }
        Some(Resolution {
            type_id: world_type_id.to_string(),
            vehicle_class: self
                .catalog
                .class_of(world_type_id)
                .unwrap_or(VehicleClass::Ignoring),
        })
    }
}

impl std::fmt::Debug for ClassResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassResolver")
            .field("catalog_size", &self.catalog.len())
            .field("world_classes", &self.world_classes.len())
            .finish()
    }
}
