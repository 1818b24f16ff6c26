//! TrafficAdapter: the remote traffic engine behind the uniform adapter contract
//!
//! Reads and writes the [`TrafficLink`] table. Mutations aimed at the traffic
//! engine are applied to the table immediately and reach the peer through the
//! step result.

use std::collections::BTreeSet;

use contracts::{
    AdapterError, Churn, DevicePhase, EngineAdapter, EngineSide, EntityDescriptor,
    EntitySnapshot, NativeId, SpawnSpec, TrafficPhase, Transform,
};
use tracing::{debug, info, instrument};

use crate::traffic_link::TrafficLink;

/// Route assigned to vehicles mirrored from the world engine
pub const MIRROR_ROUTE: &str = "carla_route";

/// Prefix of traffic IDs assigned to world-originated mirrors
pub const MIRROR_ID_PREFIX: &str = "carla";

/// Traffic engine adapter
pub struct TrafficAdapter {
    link: TrafficLink,
    churn: Churn,
    next_mirror: u64,
}

impl TrafficAdapter {
    pub fn new(link: TrafficLink) -> Self {
        Self {
            link,
            churn: Churn::default(),
            next_mirror: 0,
        }
    }

    pub fn link(&self) -> &TrafficLink {
        &self.link
    }

    fn ensure_open(&self) -> Result<(), AdapterError> {
        if self.link.is_closed() {
            Err(AdapterError::session(
                EngineSide::Traffic,
                "traffic session closed",
            ))
        } else {
            Ok(())
        }
    }

    fn traffic_phase(phase: DevicePhase) -> Result<TrafficPhase, AdapterError> {
        match phase {
            DevicePhase::Traffic(phase) => Ok(phase),
            other => Err(AdapterError::UnsupportedPhase {
                side: EngineSide::Traffic,
                phase: other.to_string(),
            }),
        }
    }
}

impl EngineAdapter for TrafficAdapter {
    fn side(&self) -> EngineSide {
        EngineSide::Traffic
    }

    #[instrument(name = "traffic_adapter_tick", skip(self))]
    async fn tick(&mut self) -> Result<(), AdapterError> {
        self.ensure_open()?;
        self.churn = self.link.drain_churn();
        debug!(
            departed = self.churn.spawned.len(),
            arrived = self.churn.destroyed.len(),
            "traffic tick"
        );
        Ok(())
    }

    fn churn(&self) -> &Churn {
        &self.churn
    }

    async fn get_entity(&self, id: &str) -> Result<EntitySnapshot, AdapterError> {
        self.link
            .entity(id)
            .map(|descriptor| descriptor.to_snapshot())
            .ok_or_else(|| AdapterError::entity_not_found(EngineSide::Traffic, id))
    }

    /// Register the mirror as departed so the next tick reports it
    #[instrument(
        name = "traffic_adapter_spawn",
        skip(self, spec),
        fields(type_id = %spec.type_id)
    )]
    async fn spawn_entity(&mut self, spec: &SpawnSpec) -> Result<NativeId, AdapterError> {
        self.ensure_open()?;
        let id = format!("{MIRROR_ID_PREFIX}{}", self.next_mirror);
        self.next_mirror += 1;

        self.link
            .add_entity(EntityDescriptor::from_spawn(id.clone(), spec, MIRROR_ROUTE));
        info!(traffic_id = %id, "traffic mirror spawned");
        Ok(id)
    }

    async fn destroy_entity(&mut self, id: &str) -> Result<(), AdapterError> {
        if self.link.forget_entity(id) {
            Ok(())
        } else {
            Err(AdapterError::entity_not_found(EngineSide::Traffic, id))
        }
    }

    async fn update_entity(
        &mut self,
        id: &str,
        transform: Transform,
        signals: Option<u32>,
    ) -> Result<(), AdapterError> {
        if self.link.apply_pose(id, transform, signals) {
            Ok(())
        } else {
            Err(AdapterError::entity_not_found(EngineSide::Traffic, id))
        }
    }

    async fn list_control_devices(&self) -> Result<BTreeSet<String>, AdapterError> {
        Ok(self.link.control_device_ids())
    }

    async fn get_control_device_state(
        &self,
        landmark_id: &str,
    ) -> Result<DevicePhase, AdapterError> {
        self.link
            .control_device(landmark_id)
            .map(DevicePhase::Traffic)
            .ok_or_else(|| AdapterError::control_device_not_found(EngineSide::Traffic, landmark_id))
    }

    async fn set_control_device_state(
        &mut self,
        landmark_id: &str,
        phase: DevicePhase,
    ) -> Result<(), AdapterError> {
        let phase = Self::traffic_phase(phase)?;
        if self.link.set_control_device(landmark_id, phase) {
            Ok(())
        } else {
            Err(AdapterError::control_device_not_found(
                EngineSide::Traffic,
                landmark_id,
            ))
        }
    }

    async fn yield_control_devices(&mut self) -> Result<(), AdapterError> {
        self.link.yield_control_devices();
        info!("traffic lights handed to the bridge");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), AdapterError> {
        self.link.close();
        Ok(())
    }
}
