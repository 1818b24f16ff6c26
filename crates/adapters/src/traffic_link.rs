//! TrafficLink: the bridge's view of the remote traffic engine
//!
//! The traffic peer pushes entity and control-device descriptors over the step
//! transport; this table keeps the last-known descriptor per ID together with
//! the departed/arrived IDs not yet collected by a tick. It is a cache, not a
//! source of truth.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{
    Churn, ControlDeviceDescriptor, EntityDescriptor, Heading, NativeId, TrafficPhase, Transform,
};

#[derive(Debug, Default)]
struct LinkTable {
    entities: BTreeMap<NativeId, EntityDescriptor>,
    departed: Vec<NativeId>,
    arrived: Vec<NativeId>,
    control_devices: BTreeMap<String, TrafficPhase>,
    /// Bridge drives the peer's traffic lights
    devices_yielded: bool,
    closed: bool,
}

/// Shared link table, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct TrafficLink {
    inner: Arc<Mutex<LinkTable>>,
}

impl TrafficLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LinkTable> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== Peer-facing (AddEntity / RemoveEntity / UpdateEntity) =====

    /// Insert or overwrite a descriptor and report it as departed
    pub fn add_entity(&self, descriptor: EntityDescriptor) {
        let mut table = self.lock();
        table.departed.push(descriptor.id.clone());
        table.entities.insert(descriptor.id.clone(), descriptor);
    }

    /// Delete a descriptor and report it as arrived; `false` if it was unknown
    pub fn remove_entity(&self, id: &str) -> bool {
        let mut table = self.lock();
        let known = table.entities.remove(id).is_some();
        table.arrived.push(id.to_string());
        known
    }

    /// Overwrite a descriptor without churn
    pub fn update_entity(&self, descriptor: EntityDescriptor) {
        self.lock()
            .entities
            .insert(descriptor.id.clone(), descriptor);
    }

    /// Insert or overwrite a control-device phase
    pub fn update_control_device(&self, device: ControlDeviceDescriptor) {
        self.lock()
            .control_devices
            .insert(device.landmark_id, device.phase);
    }

    // ===== Bridge-facing =====

    pub fn entity(&self, id: &str) -> Option<EntityDescriptor> {
        self.lock().entities.get(id).cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.lock().entities.len()
    }

    /// Move a known entity; `false` if it is unknown
    pub fn apply_pose(&self, id: &str, transform: Transform, signals: Option<u32>) -> bool {
        let mut table = self.lock();
        let Some(descriptor) = table.entities.get_mut(id) else {
            return false;
        };
        descriptor.location = transform.location;
        descriptor.heading = Heading {
            slope: transform.rotation.pitch,
            angle: transform.rotation.yaw,
        };
        if let Some(signals) = signals {
            descriptor.signals = signals;
        }
        true
    }

    /// Remove a bridge-owned descriptor without reporting it as arrived
    pub fn forget_entity(&self, id: &str) -> bool {
        self.lock().entities.remove(id).is_some()
    }

    /// Take the departed/arrived IDs accumulated since the last call
    pub fn drain_churn(&self) -> Churn {
        let mut table = self.lock();
        Churn {
            spawned: table.departed.drain(..).collect(),
            destroyed: table.arrived.drain(..).collect(),
        }
    }

    pub fn control_device(&self, landmark_id: &str) -> Option<TrafficPhase> {
        self.lock().control_devices.get(landmark_id).copied()
    }

    pub fn control_device_ids(&self) -> BTreeSet<String> {
        self.lock().control_devices.keys().cloned().collect()
    }

    /// Overwrite the phase of a known device; `false` if it is unknown
    pub fn set_control_device(&self, landmark_id: &str, phase: TrafficPhase) -> bool {
        match self.lock().control_devices.get_mut(landmark_id) {
            Some(current) => {
                *current = phase;
                true
            }
            None => false,
        }
    }

    pub fn yield_control_devices(&self) {
        self.lock().devices_yielded = true;
    }

    pub fn control_devices_yielded(&self) -> bool {
        self.lock().devices_yielded
    }

    /// Mark the peer session as ended; later ticks fail
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
