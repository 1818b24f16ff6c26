//! Real world engine client
//!
//! Connects to a CARLA server through the carla-rust crate.
//! Only compiled when the `real-carla` feature is enabled.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use carla::client::{ActorBase, Client, Sensor, TrafficLight, Vehicle, World};
use carla::geom::{Location as CarlaLocation, Rotation as CarlaRotation, Transform as CarlaTransform};
use carla::rpc::{TrafficLightState, VehicleLightState};
use carla::sensor::data::LidarMeasurement as CarlaLidar;
use carla::sensor::SensorDataBase;
use contracts::{Color, Extent, LidarPoint, Location, Rotation, Transform, WorldPhase};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, WorldClientError};
use crate::world_client::{
    ActorId, ActorSpawn, ActorState, LidarMeasurement, MeasurementCallback, SensorMount,
    TrafficLightInfo, WorldClient,
};

/// apply_settings 等待服务器确认的超时
const SETTINGS_TIMEOUT: Duration = Duration::from_secs(10);

/// Real world engine client
///
/// Wraps carla-rust's `World`; `Mutex` gives `&self` methods mutable access.
#[derive(Default, Clone)]
pub struct CarlaWorld {
    client: Arc<Mutex<Option<Client>>>,
    world: Arc<Mutex<Option<World>>>,
    /// Sensors spawned by this client, kept alive while listening
    sensors: Arc<Mutex<HashMap<ActorId, Sensor>>>,
    /// landmark ID -> traffic light actor
    lights: Arc<Mutex<HashMap<String, TrafficLight>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CarlaWorld {
    /// Create new client (disconnected state)
    pub fn new() -> Self {
        Self::default()
    }

    fn with_world<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut World) -> Result<R>,
    {
        let mut guard = lock(&self.world);
        let world = guard
            .as_mut()
            .ok_or_else(|| WorldClientError::connection("not connected to world engine"))?;
        f(world)
    }

    fn vehicle(world: &World, actor_id: ActorId) -> Result<Vehicle> {
        let actor = world
            .actor(actor_id)
            .ok_or(WorldClientError::ActorNotFound { actor_id })?;
        Vehicle::try_from(actor).map_err(|_| WorldClientError::ActorNotFound { actor_id })
    }

    fn to_carla_transform(transform: &Transform) -> CarlaTransform {
        CarlaTransform {
            location: CarlaLocation {
                x: transform.location.x as f32,
                y: transform.location.y as f32,
                z: transform.location.z as f32,
            },
            rotation: CarlaRotation {
                pitch: transform.rotation.pitch as f32,
                yaw: transform.rotation.yaw as f32,
                roll: transform.rotation.roll as f32,
            },
        }
    }

    fn from_carla_transform(transform: &CarlaTransform) -> Transform {
        Transform::new(
            Location::new(
                transform.location.x as f64,
                transform.location.y as f64,
                transform.location.z as f64,
            ),
            Rotation::new(
                transform.rotation.pitch as f64,
                transform.rotation.yaw as f64,
                transform.rotation.roll as f64,
            ),
        )
    }

    fn to_world_phase(state: TrafficLightState) -> WorldPhase {
        match state {
            TrafficLightState::Red => WorldPhase::Red,
            TrafficLightState::Yellow => WorldPhase::Yellow,
            TrafficLightState::Green => WorldPhase::Green,
            TrafficLightState::Off => WorldPhase::Off,
            _ => WorldPhase::Unknown,
        }
    }

    fn to_light_state(phase: WorldPhase) -> TrafficLightState {
        match phase {
            WorldPhase::Red => TrafficLightState::Red,
            WorldPhase::Yellow => TrafficLightState::Yellow,
            WorldPhase::Green => TrafficLightState::Green,
            WorldPhase::Off => TrafficLightState::Off,
            WorldPhase::Unknown => TrafficLightState::Unknown,
        }
    }

    /// 扫描地图中的信号灯并刷新缓存
    fn refresh_lights(&self, world: &World) -> Vec<TrafficLightInfo> {
        let mut lights = lock(&self.lights);
        lights.clear();

        let mut infos = Vec::new();
        for actor in world.actors().filter("traffic.traffic_light*").iter() {
            let location = actor.location();
            let Ok(light) = TrafficLight::try_from(actor) else {
                continue;
            };
            // group leader = smallest actor ID of the group
            let group_id = light
                .group_traffic_lights()
                .iter()
                .map(|member| member.id())
                .min()
                .unwrap_or_else(|| light.id());
            let landmark_id = light.opendrive_id();
            infos.push(TrafficLightInfo {
                actor_id: light.id(),
                landmark_id: landmark_id.clone(),
                pole_index: light.pole_index(),
                group_id,
                location: Location::new(location.x as f64, location.y as f64, location.z as f64),
            });
            lights.insert(landmark_id, light);
        }
        infos
    }

    fn traffic_light(&self, landmark_id: &str) -> Result<TrafficLight> {
        if let Some(light) = lock(&self.lights).get(landmark_id) {
            return Ok(light.clone());
        }
        self.with_world(|world| {
            self.refresh_lights(world);
            Ok(())
        })?;
        lock(&self.lights)
            .get(landmark_id)
            .cloned()
            .ok_or_else(|| WorldClientError::TrafficLightNotFound {
                landmark_id: landmark_id.to_string(),
            })
    }

    fn actor_color(vehicle: &Vehicle) -> Option<Color> {
        vehicle
            .attributes()
            .iter()
            .find(|attribute| attribute.id() == "color")
            .and_then(|attribute| attribute.value_string().parse().ok())
    }

    fn to_measurement(lidar: &CarlaLidar) -> LidarMeasurement {
        LidarMeasurement {
            frame: lidar.frame() as u64,
            timestamp: lidar.timestamp(),
            points: lidar
                .as_slice()
                .iter()
                .map(|detection| LidarPoint {
                    x: detection.point.x,
                    y: detection.point.y,
                    z: detection.point.z,
                    intensity: detection.intensity,
                })
                .collect(),
        }
    }
}

impl WorldClient for CarlaWorld {
    #[instrument(name = "carla_world_connect", skip(self), fields(host = %host, port))]
    async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let client = Client::connect(host, port, None);
        let world = client.world();

        info!(map = %world.map().name(), "connected to world engine");

        *lock(&self.client) = Some(client);
        *lock(&self.world) = Some(world);
        Ok(())
    }

    async fn set_synchronous(&self, fixed_delta_seconds: Option<f64>) -> Result<()> {
        self.with_world(|world| {
            let mut settings = world.settings();
            settings.synchronous_mode = fixed_delta_seconds.is_some();
            settings.fixed_delta_seconds = fixed_delta_seconds;
            world.apply_settings(&settings, SETTINGS_TIMEOUT);
            Ok(())
        })
    }

    async fn tick(&self) -> Result<u64> {
        self.with_world(|world| Ok(world.tick()))
    }

    async fn vehicle_ids(&self) -> Result<BTreeSet<ActorId>> {
        self.with_world(|world| {
            Ok(world
                .actors()
                .filter("vehicle.*")
                .iter()
                .map(|actor| actor.id())
                .collect())
        })
    }

    async fn actor(&self, actor_id: ActorId) -> Result<ActorState> {
        self.with_world(|world| {
            let vehicle = Self::vehicle(world, actor_id)?;
            let extent = vehicle.bounding_box().extent;
            Ok(ActorState {
                id: actor_id,
                blueprint: vehicle.type_id(),
                transform: Self::from_carla_transform(&vehicle.transform()),
                extent: Some(Extent {
                    x: extent.x as f64,
                    y: extent.y as f64,
                    z: extent.z as f64,
                }),
                light_state: vehicle.light_state().bits(),
                color: Self::actor_color(&vehicle),
            })
        })
    }

    async fn blueprint_ids(&self) -> Result<Vec<String>> {
        self.with_world(|world| {
            Ok(world
                .blueprint_library()
                .iter()
                .map(|blueprint| blueprint.id())
                .collect())
        })
    }

    async fn recommended_values(&self, blueprint: &str, attribute: &str) -> Result<Vec<String>> {
        self.with_world(|world| {
            Ok(world
                .blueprint_library()
                .find(blueprint)
                .and_then(|bp| bp.attribute_by_id(attribute))
                .map(|attr| attr.recommended_values())
                .unwrap_or_default())
        })
    }

    #[instrument(
        name = "carla_world_spawn_vehicle",
        skip(self, spawn),
        fields(blueprint = %spawn.blueprint)
    )]
    async fn spawn_vehicle(&self, spawn: &ActorSpawn) -> Result<ActorId> {
        self.with_world(|world| {
            let mut vehicle_bp = world
                .blueprint_library()
                .find(&spawn.blueprint)
                .ok_or_else(|| WorldClientError::spawn(&spawn.blueprint, "blueprint not found"))?;

            if let Some(color) = spawn.color {
                if vehicle_bp.contains_attribute("color")
                    && !vehicle_bp.set_attribute("color", &color.to_string())
                {
                    warn!(color = %color, "failed to set vehicle color");
                }
            }
            vehicle_bp.set_attribute("role_name", &spawn.role_name);

            let actor = world
                .spawn_actor(&vehicle_bp, &Self::to_carla_transform(&spawn.transform))
                .map_err(|e| WorldClientError::spawn(&spawn.blueprint, e.to_string()))?;
            let vehicle = Vehicle::try_from(actor).map_err(|_| {
                WorldClientError::spawn(&spawn.blueprint, "spawned actor is not a vehicle")
            })?;

            // 镜像车辆由桥接驱动，关闭物理仿真
            vehicle.set_simulate_physics(false);
            debug!(actor_id = vehicle.id(), "vehicle spawned");
            Ok(vehicle.id())
        })
    }

    async fn apply_vehicle_state(
        &self,
        actor_id: ActorId,
        transform: Transform,
        light_state: Option<u32>,
    ) -> Result<()> {
        self.with_world(|world| {
            let vehicle = Self::vehicle(world, actor_id)?;
            vehicle.set_transform(&Self::to_carla_transform(&transform));
            if let Some(lights) = light_state {
                vehicle.set_light_state(VehicleLightState::from_bits_truncate(lights));
            }
            Ok(())
        })
    }

    #[instrument(name = "carla_world_destroy_actor", skip(self), fields(actor_id))]
    async fn destroy_actor(&self, actor_id: ActorId) -> Result<()> {
        if let Some(sensor) = lock(&self.sensors).remove(&actor_id) {
            if sensor.is_listening() {
                sensor.stop();
            }
        }

        self.with_world(|world| {
            let actor = world
                .actor(actor_id)
                .ok_or(WorldClientError::ActorNotFound { actor_id })?;
            if !actor.destroy() {
                warn!(actor_id, "destroy actor returned false");
            }
            Ok(())
        })
    }

    async fn traffic_lights(&self) -> Result<Vec<TrafficLightInfo>> {
        self.with_world(|world| Ok(self.refresh_lights(world)))
    }

    async fn traffic_light_state(&self, landmark_id: &str) -> Result<WorldPhase> {
        let light = self.traffic_light(landmark_id)?;
        Ok(Self::to_world_phase(light.state()))
    }

    async fn set_traffic_light_state(&self, landmark_id: &str, phase: WorldPhase) -> Result<()> {
        let light = self.traffic_light(landmark_id)?;
        light.set_state(Self::to_light_state(phase));
        Ok(())
    }

    async fn freeze_traffic_lights(&self, frozen: bool) -> Result<()> {
        self.with_world(|world| {
            world.freeze_all_traffic_lights(frozen);
            Ok(())
        })
    }

    #[instrument(
        name = "carla_world_spawn_sensor",
        skip(self, mount, on_measurement),
        fields(blueprint = %mount.blueprint, parent_id)
    )]
    async fn spawn_sensor(
        &self,
        mount: &SensorMount,
        parent_id: ActorId,
        on_measurement: MeasurementCallback,
    ) -> Result<ActorId> {
        let sensor = self.with_world(|world| {
            let parent = Self::vehicle(world, parent_id).map_err(|_| {
                WorldClientError::SensorSpawnFailed {
                    parent_id,
                    message: "parent actor not found".into(),
                }
            })?;
            let mut sensor_bp = world
                .blueprint_library()
                .find(&mount.blueprint)
                .ok_or_else(|| WorldClientError::SensorSpawnFailed {
                    parent_id,
                    message: format!("blueprint '{}' not found", mount.blueprint),
                })?;

            for (key, value) in &mount.attributes {
                if !sensor_bp.set_attribute(key, value) {
                    warn!(key, value, "failed to set sensor attribute");
                }
            }

            let actor = world
                .spawn_actor_attached(
                    &sensor_bp,
                    &Self::to_carla_transform(&mount.transform),
                    &parent,
                    None,
                )
                .map_err(|e| WorldClientError::SensorSpawnFailed {
                    parent_id,
                    message: e.to_string(),
                })?;
            Sensor::try_from(actor).map_err(|_| WorldClientError::SensorSpawnFailed {
                parent_id,
                message: "spawned actor is not a sensor".into(),
            })
        })?;

        let actor_id = sensor.id();
        sensor.listen(move |data| match CarlaLidar::try_from(data) {
            Ok(lidar) => on_measurement(Self::to_measurement(&lidar)),
            Err(_) => debug!(actor_id, "non-lidar measurement dropped"),
        });
        debug!(actor_id, parent_id, "sensor spawned and listening");
        lock(&self.sensors).insert(actor_id, sensor);
        Ok(actor_id)
    }
}
