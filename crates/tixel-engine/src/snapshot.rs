//! Serializable capture of simulation state with a BLAKE3 digest.
//!
//! A [`SimSnapshot`] holds the counters and every entity's components in slot
//! order. Behaviors and hooks are code and are not captured. The digest is
//! taken over the canonical JSON encoding, so two runs that end in the same
//! state produce the same hash bit for bit.

use serde::{Deserialize, Serialize};
use tixel_ecs::prelude::*;

use crate::sim::Simulation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub tick: u64,
    pub frame: u64,
    pub fixed_dt: f64,
    pub entities: Vec<(EntityId, EntityRecord)>,
}

impl SimSnapshot {
    pub fn capture(sim: &Simulation) -> Self {
        Self {
            tick: sim.tick_count(),
            frame: sim.frame_count(),
            fixed_dt: sim.fixed_dt(),
            entities: sim
                .world()
                .iter()
                .map(|(id, record)| (id, record.clone()))
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// BLAKE3 hex digest (64 lowercase hex chars) of the JSON encoding.
    pub fn hash(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

impl Simulation {
    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot::capture(self)
    }

    /// Digest of the current state. See [`SimSnapshot::hash`].
    pub fn state_hash(&self) -> Result<String, serde_json::Error> {
        self.snapshot().hash()
    }
}
