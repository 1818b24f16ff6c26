//! WorldAdapter: the world engine behind the uniform adapter contract
//!
//! Churn is derived by diffing the live vehicle set after each engine tick
//! against the previous one.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use contracts::{
    AdapterError, Churn, DevicePhase, EngineAdapter, EngineSide, EntitySnapshot, Heading,
    Location, NativeId, ObservationCallback, Rotation, SensorDescriptor, SensorHost,
    SensorObservation, SpawnSpec, Transform,
};
use tracing::{debug, info, instrument, warn};

use crate::world_client::{
    ActorId, ActorSpawn, LidarMeasurement, SensorMount, TrafficLightInfo, WorldClient,
    LIDAR_BLUEPRINT,
};

/// Role name given to vehicles mirrored from the traffic engine
pub const MIRROR_ROLE_NAME: &str = "traffic_driver";

/// Sensor kinds accepted by `attach_sensor`
pub const LIDAR_SENSOR_TYPE: &str = "LiDAR";

const LIDAR_DEFAULT_RANGE: &str = "100";
const LIDAR_DROPOFF_ATTRIBUTES: [&str; 3] = [
    "dropoff_general_rate",
    "dropoff_intensity_limit",
    "dropoff_zero_intensity",
];
const LIDAR_DEFAULT_MOUNT: Location = Location {
    x: 0.0,
    y: 0.0,
    z: 2.4,
};

/// Sensor ID shared with a measurement callback
///
/// The engine assigns the ID only when the spawn call returns; sweeps that
/// arrive earlier are held back and replayed, in order, by `assign`.
struct SensorIdSlot {
    state: Mutex<SlotState>,
    on_observation: ObservationCallback,
}

enum SlotState {
    Pending(Vec<LidarMeasurement>),
    Assigned(String),
}

impl SensorIdSlot {
    fn new(on_observation: ObservationCallback) -> Self {
        Self {
            state: Mutex::new(SlotState::Pending(Vec::new())),
            on_observation,
        }
    }

    fn observe(sensor_id: String, measurement: LidarMeasurement) -> SensorObservation {
        SensorObservation {
            sensor_id,
            frame: measurement.frame,
            timestamp: measurement.timestamp,
            points: measurement.points,
        }
    }

    fn deliver(&self, measurement: LidarMeasurement) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *state {
            SlotState::Pending(held) => held.push(measurement),
            SlotState::Assigned(sensor_id) => {
                (self.on_observation)(Self::observe(sensor_id.clone(), measurement));
            }
        }
    }

    fn assign(&self, sensor_id: String) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *state, SlotState::Assigned(sensor_id.clone()));
        if let SlotState::Pending(held) = previous {
            for measurement in held {
                (self.on_observation)(Self::observe(sensor_id.clone(), measurement));
            }
        }
    }
}

/// World engine adapter
pub struct WorldAdapter<C: WorldClient> {
    client: C,
    step_length: f64,
    /// Vehicles seen after the previous tick
    live: BTreeSet<ActorId>,
    churn: Churn,
    /// sensor ID -> sensor actor
    sensors: BTreeMap<String, ActorId>,
}

impl<C: WorldClient> WorldAdapter<C> {
    /// Connect and switch the engine into fixed-step synchronous mode
    #[instrument(name = "world_adapter_connect", skip(client), fields(host = %host, port))]
    pub async fn connect(
        mut client: C,
        host: &str,
        port: u16,
        step_length: f64,
    ) -> Result<Self, AdapterError> {
        client.connect(host, port).await?;
        client.set_synchronous(Some(step_length)).await?;
        info!(step_length, "world engine in synchronous mode");

        Ok(Self {
            client,
            step_length,
            live: BTreeSet::new(),
            churn: Churn::default(),
            sensors: BTreeMap::new(),
        })
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn step_length(&self) -> f64 {
        self.step_length
    }

    /// Traffic lights of the loaded map, for landmark correlation
    pub async fn traffic_lights(&self) -> Result<Vec<TrafficLightInfo>, AdapterError> {
        Ok(self.client.traffic_lights().await?)
    }

    /// Vehicle blueprints offered by the engine
    pub async fn vehicle_blueprints(&self) -> Result<BTreeSet<String>, AdapterError> {
        Ok(self
            .client
            .blueprint_ids()
            .await?
            .into_iter()
            .filter(|id| id.starts_with("vehicle."))
            .collect())
    }

    fn actor_id(id: &str) -> Result<ActorId, AdapterError> {
        id.parse()
            .map_err(|_| AdapterError::entity_not_found(EngineSide::World, id))
    }

    fn world_phase(phase: DevicePhase) -> Result<contracts::WorldPhase, AdapterError> {
        match phase {
            DevicePhase::World(phase) => Ok(phase),
            other => Err(AdapterError::UnsupportedPhase {
                side: EngineSide::World,
                phase: other.to_string(),
            }),
        }
    }

    /// Fill in LiDAR defaults that the request leaves open
    async fn resolve_lidar(
        &self,
        mut request: SensorDescriptor,
    ) -> Result<SensorDescriptor, AdapterError> {
        request
            .attributes
            .entry("range".to_string())
            .or_insert_with(|| LIDAR_DEFAULT_RANGE.to_string());

        for attribute in LIDAR_DROPOFF_ATTRIBUTES {
            if request.attributes.contains_key(attribute) {
                continue;
            }
            let recommended = self
                .client
                .recommended_values(LIDAR_BLUEPRINT, attribute)
                .await?;
            if let Some(value) = recommended.into_iter().next() {
                request.attributes.insert(attribute.to_string(), value);
            }
        }

        request.location.get_or_insert(LIDAR_DEFAULT_MOUNT);
        request.heading.get_or_insert(Heading::default());
        Ok(request)
    }
}

impl<C: WorldClient> EngineAdapter for WorldAdapter<C> {
    fn side(&self) -> EngineSide {
        EngineSide::World
    }

    #[instrument(name = "world_adapter_tick", skip(self))]
    async fn tick(&mut self) -> Result<(), AdapterError> {
        let frame = self.client.tick().await?;
        let current = self.client.vehicle_ids().await?;

        self.churn = Churn {
            spawned: current
                .difference(&self.live)
                .map(|id| id.to_string())
                .collect(),
            destroyed: self
                .live
                .difference(&current)
                .map(|id| id.to_string())
                .collect(),
        };
        self.live = current;

        debug!(
            frame,
            spawned = self.churn.spawned.len(),
            destroyed = self.churn.destroyed.len(),
            "world tick"
        );
        Ok(())
    }

    fn churn(&self) -> &Churn {
        &self.churn
    }

    async fn get_entity(&self, id: &str) -> Result<EntitySnapshot, AdapterError> {
        let actor = self.client.actor(Self::actor_id(id)?).await?;
        Ok(EntitySnapshot {
            id: actor.id.to_string(),
            type_id: actor.blueprint,
            vehicle_class: None,
            transform: actor.transform,
            extent: actor.extent,
            signals: Some(actor.light_state),
            color: actor.color,
        })
    }

    #[instrument(
        name = "world_adapter_spawn",
        skip(self, spec),
        fields(blueprint = %spec.type_id)
    )]
    async fn spawn_entity(&mut self, spec: &SpawnSpec) -> Result<NativeId, AdapterError> {
        let spawn = ActorSpawn {
            blueprint: spec.type_id.clone(),
            transform: spec.transform,
            color: spec.color,
            role_name: MIRROR_ROLE_NAME.to_string(),
        };
        let actor_id = self.client.spawn_vehicle(&spawn).await?;
        info!(actor_id, "world mirror spawned");
        Ok(actor_id.to_string())
    }

    async fn destroy_entity(&mut self, id: &str) -> Result<(), AdapterError> {
        self.client.destroy_actor(Self::actor_id(id)?).await?;
        Ok(())
    }

    async fn update_entity(
        &mut self,
        id: &str,
        transform: Transform,
        signals: Option<u32>,
    ) -> Result<(), AdapterError> {
        self.client
            .apply_vehicle_state(Self::actor_id(id)?, transform, signals)
            .await?;
        Ok(())
    }

    async fn list_control_devices(&self) -> Result<BTreeSet<String>, AdapterError> {
        Ok(self
            .client
            .traffic_lights()
            .await?
            .into_iter()
            .map(|light| light.landmark_id)
            .collect())
    }

    async fn get_control_device_state(
        &self,
        landmark_id: &str,
    ) -> Result<DevicePhase, AdapterError> {
        let phase = self.client.traffic_light_state(landmark_id).await?;
        Ok(DevicePhase::World(phase))
    }

    async fn set_control_device_state(
        &mut self,
        landmark_id: &str,
        phase: DevicePhase,
    ) -> Result<(), AdapterError> {
        let phase = Self::world_phase(phase)?;
        self.client
            .set_traffic_light_state(landmark_id, phase)
            .await?;
        Ok(())
    }

    async fn yield_control_devices(&mut self) -> Result<(), AdapterError> {
        self.client.freeze_traffic_lights(true).await?;
        info!("world traffic lights frozen");
        Ok(())
    }

    /// Destroy sensors, release the lights and restore asynchronous mode
    #[instrument(name = "world_adapter_close", skip(self), fields(sensors = self.sensors.len()))]
    async fn close(&mut self) -> Result<(), AdapterError> {
        let sensor_ids: Vec<String> = self.sensors.keys().cloned().collect();
        for sensor_id in sensor_ids {
            if let Err(e) = self.detach_sensor(&sensor_id).await {
                warn!(sensor_id = %sensor_id, error = %e, "failed to destroy sensor");
            }
        }

        self.client.freeze_traffic_lights(false).await?;
        self.client.set_synchronous(None).await?;
        info!("world engine released");
        Ok(())
    }
}

impl<C: WorldClient> SensorHost for WorldAdapter<C> {
    #[instrument(
        name = "world_adapter_attach_sensor",
        skip(self, request, on_observation),
        fields(parent_id = %parent_id, sensor_type = %request.type_id)
    )]
    async fn attach_sensor(
        &mut self,
        parent_id: &str,
        request: SensorDescriptor,
        on_observation: ObservationCallback,
    ) -> Result<SensorDescriptor, AdapterError> {
        if request.type_id != LIDAR_SENSOR_TYPE {
            return Err(AdapterError::sensor_rejected(format!(
                "unsupported sensor type '{}'",
                request.type_id
            )));
        }
        let parent = parent_id.parse::<ActorId>().map_err(|_| {
            AdapterError::sensor_rejected(format!("unknown attach target '{parent_id}'"))
        })?;

        let mut resolved = self.resolve_lidar(request).await?;
        let location = resolved.location.unwrap_or(LIDAR_DEFAULT_MOUNT);
        let heading = resolved.heading.unwrap_or_default();
        let mount = SensorMount {
            blueprint: LIDAR_BLUEPRINT.to_string(),
            transform: Transform::new(location, Rotation::new(heading.slope, heading.angle, 0.0)),
            attributes: resolved.attributes.clone(),
        };

        let slot = Arc::new(SensorIdSlot::new(on_observation));
        let callback_slot = slot.clone();
        let callback = Arc::new(move |measurement: LidarMeasurement| {
            callback_slot.deliver(measurement);
        });

        let actor_id = self.client.spawn_sensor(&mount, parent, callback).await?;
        let sensor_id = actor_id.to_string();
        slot.assign(sensor_id.clone());

        self.sensors.insert(sensor_id.clone(), actor_id);
        resolved.id = Some(sensor_id);
        info!(actor_id, "lidar attached");
        Ok(resolved)
    }

    async fn detach_sensor(&mut self, sensor_id: &str) -> Result<bool, AdapterError> {
        let Some(actor_id) = self.sensors.remove(sensor_id) else {
            debug!(sensor_id, "detach of unknown sensor ignored");
            return Ok(false);
        };
        match self.client.destroy_actor(actor_id).await {
            Ok(()) => Ok(true),
            // 已被引擎销毁
            Err(crate::WorldClientError::ActorNotFound { .. }) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    fn attached_sensors(&self) -> Vec<String> {
        self.sensors.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryWorld;
    use contracts::{Color, Extent, LidarPoint, VehicleClass, WorldPhase};

    async fn adapter() -> WorldAdapter<InMemoryWorld> {
        WorldAdapter::connect(InMemoryWorld::new(), "localhost", 2000, 0.05)
            .await
            .unwrap()
    }

    fn spec(type_id: &str) -> SpawnSpec {
        SpawnSpec {
            type_id: type_id.to_string(),
            vehicle_class: VehicleClass::Passenger,
            transform: Transform::default(),
            extent: Extent::DEFAULT_VEHICLE,
            color: Some(Color::rgb(1, 2, 3)),
        }
    }

    #[tokio::test]
    async fn test_connect_enables_synchronous_mode() {
        let mut adapter = adapter().await;
        assert_eq!(adapter.client().synchronous_step(), Some(0.05));

        adapter.close().await.unwrap();
        assert_eq!(adapter.client().synchronous_step(), None);
    }

    #[tokio::test]
    async fn test_churn_is_diff_of_live_vehicles() {
        let mut adapter = adapter().await;
        let a = adapter
            .client()
            .inject_vehicle("vehicle.audi.a2", Transform::default(), None);

        adapter.tick().await.unwrap();
        assert!(adapter.churn().spawned.contains(&a.to_string()));
        // 再次读取结果不变
        assert!(adapter.churn().spawned.contains(&a.to_string()));

        adapter.tick().await.unwrap();
        assert!(adapter.churn().is_empty());

        adapter.client().remove_vehicle(a);
        adapter.tick().await.unwrap();
        assert!(adapter.churn().destroyed.contains(&a.to_string()));
        assert!(adapter.churn().spawned.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_uses_mirror_role_and_color() {
        let mut adapter = adapter().await;
        let id = adapter.spawn_entity(&spec("vehicle.audi.a2")).await.unwrap();

        let actor_id: ActorId = id.parse().unwrap();
        assert_eq!(
            adapter.client().role_name(actor_id).as_deref(),
            Some(MIRROR_ROLE_NAME)
        );
        let snapshot = adapter.get_entity(&id).await.unwrap();
        assert_eq!(snapshot.color, Some(Color::rgb(1, 2, 3)));
    }

    #[tokio::test]
    async fn test_unknown_entity_is_not_found() {
        let mut adapter = adapter().await;
        assert!(matches!(
            adapter.get_entity("4242").await,
            Err(AdapterError::EntityNotFound { .. })
        ));
        assert!(matches!(
            adapter.destroy_entity("not-a-number").await,
            Err(AdapterError::EntityNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_disconnect_is_fatal() {
        let mut adapter = adapter().await;
        adapter.client().disconnect();
        let err = adapter.tick().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_control_devices() {
        let mut adapter = adapter().await;
        adapter.client().add_traffic_light(
            TrafficLightInfo {
                actor_id: 7,
                landmark_id: "tl_3".into(),
                pole_index: 0,
                group_id: 0,
                location: Location::default(),
            },
            WorldPhase::Green,
        );

        assert!(adapter.list_control_devices().await.unwrap().contains("tl_3"));
        adapter
            .set_control_device_state("tl_3", DevicePhase::World(WorldPhase::Red))
            .await
            .unwrap();
        assert_eq!(
            adapter.get_control_device_state("tl_3").await.unwrap(),
            DevicePhase::World(WorldPhase::Red)
        );
        assert!(matches!(
            adapter
                .set_control_device_state("tl_9", DevicePhase::World(WorldPhase::Red))
                .await,
            Err(AdapterError::ControlDeviceNotFound { .. })
        ));

        adapter.yield_control_devices().await.unwrap();
        assert!(adapter.client().lights_frozen());
    }

    #[tokio::test]
    async fn test_attach_lidar_resolves_defaults() {
        let mut adapter = adapter().await;
        let parent = adapter
            .client()
            .inject_vehicle("vehicle.audi.a2", Transform::default(), None);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let resolved = adapter
            .attach_sensor(
                &parent.to_string(),
                SensorDescriptor::lidar(parent.to_string()),
                Arc::new(move |obs| sink.lock().unwrap().push(obs)),
            )
            .await
            .unwrap();

        let sensor_id = resolved.id.clone().unwrap();
        assert_eq!(resolved.attributes["range"], "100");
        assert_eq!(resolved.attributes["dropoff_general_rate"], "0.45");
        assert_eq!(resolved.attributes["dropoff_intensity_limit"], "0.8");
        assert_eq!(resolved.attributes["dropoff_zero_intensity"], "0.4");
        assert_eq!(resolved.location, Some(Location::new(0.0, 0.0, 2.4)));
        assert_eq!(resolved.heading, Some(Heading::default()));

        let point = LidarPoint {
            x: 1.0,
            y: 0.0,
            z: 0.0,
            intensity: 1.0,
        };
        adapter.client().emit_lidar(vec![point]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].sensor_id, sensor_id);
    }

    #[test]
    fn test_sweeps_before_sensor_id_are_replayed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let slot = SensorIdSlot::new(Arc::new(move |obs| sink.lock().unwrap().push(obs)));
        let sweep = |frame| LidarMeasurement {
            frame,
            timestamp: 0.0,
            points: Vec::new(),
        };

        slot.deliver(sweep(1));
        slot.deliver(sweep(2));
        assert!(seen.lock().unwrap().is_empty());

        slot.assign("1003".to_string());
        slot.deliver(sweep(3));

        let seen = seen.lock().unwrap();
        let frames: Vec<u64> = seen.iter().map(|obs| obs.frame).collect();
        assert_eq!(frames, vec![1, 2, 3]);
        assert!(seen.iter().all(|obs| obs.sensor_id == "1003"));
    }

    #[tokio::test]
    async fn test_attach_rejects_non_lidar() {
        let mut adapter = adapter().await;
        let mut request = SensorDescriptor::lidar("1000");
        request.type_id = "Camera".into();
        let result = adapter.attach_sensor("1000", request, Arc::new(|_| {})).await;
        assert!(matches!(result, Err(AdapterError::SensorRejected { .. })));
    }

    #[tokio::test]
    async fn test_close_destroys_sensors() {
        let mut adapter = adapter().await;
        let parent = adapter
            .client()
            .inject_vehicle("vehicle.audi.a2", Transform::default(), None);
        let resolved = adapter
            .attach_sensor(
                &parent.to_string(),
                SensorDescriptor::lidar(parent.to_string()),
                Arc::new(|_| {}),
            )
            .await
            .unwrap();
        assert_eq!(adapter.attached_sensors(), vec![resolved.id.clone().unwrap()]);

        adapter.close().await.unwrap();
        assert_eq!(adapter.client().sensor_count(), 0);
        assert!(adapter.attached_sensors().is_empty());
        assert!(!adapter.detach_sensor("missing").await.unwrap());
    }
}
