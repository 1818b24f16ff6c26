//! 内存版 World 引擎
//!
//! 无需真实引擎即可运行桥接与测试，支持注入 world 原生车辆、LiDAR 数据和故障场景。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::{Color, Extent, LidarPoint, Transform, WorldPhase};
use tracing::{debug, instrument};

use crate::error::{Result, WorldClientError};
use crate::world_client::{
    ActorId, ActorSpawn, ActorState, LidarMeasurement, MeasurementCallback, SensorMount,
    TrafficLightInfo, WorldClient, LIDAR_BLUEPRINT,
};

/// 默认步长（未进入同步模式时）
const DEFAULT_DELTA_SECONDS: f64 = 0.05;

/// 内存引擎配置
#[derive(Debug, Clone)]
pub struct InMemoryWorldConfig {
    /// 可用车辆 blueprint
    pub vehicle_blueprints: Vec<String>,
    /// 车辆颜色推荐值
    pub vehicle_colors: Vec<String>,
    /// spawn 必然失败的 blueprint（模拟生成点被占用）
    pub fail_blueprints: Vec<String>,
}

impl Default for InMemoryWorldConfig {
    fn default() -> Self {
        Self {
            vehicle_blueprints: [
                "vehicle.audi.a2",
                "vehicle.tesla.model3",
                "vehicle.lincoln.mkz_2020",
                "vehicle.carlamotors.carlacola",
                "vehicle.yamaha.yzf",
                "vehicle.diamondback.century",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            vehicle_colors: vec!["255,255,255".into(), "0,0,0".into(), "200,30,30".into()],
            fail_blueprints: Vec::new(),
        }
    }
}

struct VehicleActor {
    state: ActorState,
    role_name: String,
}

struct SensorActor {
    parent_id: ActorId,
    mount: SensorMount,
    callback: MeasurementCallback,
}

struct TrafficLightActor {
    info: TrafficLightInfo,
    phase: WorldPhase,
}

#[derive(Default)]
struct WorldState {
    connected: bool,
    synchronous: Option<f64>,
    frame: u64,
    elapsed: f64,
    vehicles: BTreeMap<ActorId, VehicleActor>,
    sensors: BTreeMap<ActorId, SensorActor>,
    lights: BTreeMap<String, TrafficLightActor>,
    lights_frozen: bool,
    /// destroy 调用返回会话错误
    destroy_fault: bool,
}

/// In-memory world engine
pub struct InMemoryWorld {
    config: InMemoryWorldConfig,
    /// Actor ID 计数器
    next_actor_id: AtomicU32,
    state: Mutex<WorldState>,
}

impl InMemoryWorld {
    pub fn new() -> Self {
        Self::with_config(InMemoryWorldConfig::default())
    }

    pub fn with_config(config: InMemoryWorldConfig) -> Self {
        Self {
            config,
            next_actor_id: AtomicU32::new(1000), // 从 1000 开始，便于识别
            state: Mutex::new(WorldState::default()),
        }
    }

    /// Add extra vehicle blueprints (e.g. every ID of the class table)
    pub fn with_blueprints<I, S>(mut self, blueprints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for blueprint in blueprints {
            let blueprint = blueprint.into();
            if !self.config.vehicle_blueprints.contains(&blueprint) {
                self.config.vehicle_blueprints.push(blueprint);
            }
        }
        self
    }

    /// Place a world-native vehicle (e.g. an ego vehicle driven by the engine)
    pub fn inject_vehicle(
        &self,
        blueprint: &str,
        transform: Transform,
        extent: Option<Extent>,
    ) -> ActorId {
        let actor_id = self.allocate_actor_id();
        self.lock().vehicles.insert(
            actor_id,
            VehicleActor {
                state: ActorState {
                    id: actor_id,
                    blueprint: blueprint.to_string(),
                    transform,
                    extent,
                    light_state: 0,
                    color: None,
                },
                role_name: "hero".to_string(),
            },
        );
        actor_id
    }

    /// Remove a vehicle without going through the bridge
    pub fn remove_vehicle(&self, actor_id: ActorId) -> bool {
        self.lock().vehicles.remove(&actor_id).is_some()
    }

    /// Overwrite a vehicle's light state as the engine would
    pub fn set_light_state(&self, actor_id: ActorId, light_state: u32) -> bool {
        match self.lock().vehicles.get_mut(&actor_id) {
            Some(vehicle) => {
                vehicle.state.light_state = light_state;
                true
            }
            None => false,
        }
    }

    pub fn add_traffic_light(&self, info: TrafficLightInfo, phase: WorldPhase) {
        self.lock()
            .lights
            .insert(info.landmark_id.clone(), TrafficLightActor { info, phase });
    }

    /// 模拟连接断开
    pub fn disconnect(&self) {
        self.lock().connected = false;
    }

    /// Make every destroy call fail with a session error until reset
    pub fn fail_destroys(&self, enabled: bool) {
        self.lock().destroy_fault = enabled;
    }

    /// Deliver one LiDAR sweep to every attached LiDAR; returns the number of sensors reached
    pub fn emit_lidar(&self, points: Vec<LidarPoint>) -> usize {
        let (callbacks, frame, timestamp) = {
            let state = self.lock();
            let callbacks: Vec<MeasurementCallback> = state
                .sensors
                .values()
                .filter(|s| s.mount.blueprint == LIDAR_BLUEPRINT)
                .map(|s| s.callback.clone())
                .collect();
            (callbacks, state.frame, state.elapsed)
        };

        // 回调在锁外执行
        for callback in &callbacks {
            callback(LidarMeasurement {
                frame,
                timestamp,
                points: points.clone(),
            });
        }
        callbacks.len()
    }

    pub fn vehicle_count(&self) -> usize {
        self.lock().vehicles.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.lock().sensors.len()
    }

    pub fn role_name(&self, actor_id: ActorId) -> Option<String> {
        self.lock()
            .vehicles
            .get(&actor_id)
            .map(|v| v.role_name.clone())
    }

    pub fn sensor_mount(&self, actor_id: ActorId) -> Option<(ActorId, SensorMount)> {
        self.lock()
            .sensors
            .get(&actor_id)
            .map(|s| (s.parent_id, s.mount.clone()))
    }

    /// Fixed step in use, `None` in asynchronous mode
    pub fn synchronous_step(&self) -> Option<f64> {
        self.lock().synchronous
    }

    pub fn lights_frozen(&self) -> bool {
        self.lock().lights_frozen
    }

    pub fn frame(&self) -> u64 {
        self.lock().frame
    }

    fn allocate_actor_id(&self) -> ActorId {
        self.next_actor_id.fetch_add(1, Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connected(&self) -> Result<MutexGuard<'_, WorldState>> {
        let state = self.lock();
        if state.connected {
            Ok(state)
        } else {
            Err(WorldClientError::connection("not connected"))
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        self.connected().map(drop)
    }

    fn default_color(&self) -> Option<Color> {
        self.config
            .vehicle_colors
            .first()
            .and_then(|c| c.parse().ok())
    }
}

impl Default for InMemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldClient for InMemoryWorld {
    #[instrument(name = "memory_world_connect", skip(self), fields(host = %host, port))]
    async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        debug!(host, port, "in-memory world, no server contacted");
        self.lock().connected = true;
        Ok(())
    }

    async fn set_synchronous(&self, fixed_delta_seconds: Option<f64>) -> Result<()> {
        self.connected()?.synchronous = fixed_delta_seconds;
        Ok(())
    }

    async fn tick(&self) -> Result<u64> {
        let mut state = self.connected()?;
        state.frame += 1;
        state.elapsed += state.synchronous.unwrap_or(DEFAULT_DELTA_SECONDS);
        Ok(state.frame)
    }

    async fn vehicle_ids(&self) -> Result<BTreeSet<ActorId>> {
        Ok(self.connected()?.vehicles.keys().copied().collect())
    }

    async fn actor(&self, actor_id: ActorId) -> Result<ActorState> {
        self.connected()?
            .vehicles
            .get(&actor_id)
            .map(|v| v.state.clone())
            .ok_or(WorldClientError::ActorNotFound { actor_id })
    }

    async fn blueprint_ids(&self) -> Result<Vec<String>> {
        self.ensure_connected()?;
        let mut ids = self.config.vehicle_blueprints.clone();
        ids.push(LIDAR_BLUEPRINT.to_string());
        Ok(ids)
    }

    async fn recommended_values(&self, blueprint: &str, attribute: &str) -> Result<Vec<String>> {
        self.ensure_connected()?;
        let values: &[&str] = match (blueprint, attribute) {
            (LIDAR_BLUEPRINT, "dropoff_general_rate") => &["0.45"],
            (LIDAR_BLUEPRINT, "dropoff_intensity_limit") => &["0.8"],
            (LIDAR_BLUEPRINT, "dropoff_zero_intensity") => &["0.4"],
            (_, "color") if blueprint.starts_with("vehicle.") => {
                return Ok(self.config.vehicle_colors.clone());
            }
            _ => &[],
        };
        Ok(values.iter().map(|v| v.to_string()).collect())
    }

    #[instrument(
        name = "memory_world_spawn_vehicle",
        skip(self, spawn),
        fields(blueprint = %spawn.blueprint)
    )]
    async fn spawn_vehicle(&self, spawn: &ActorSpawn) -> Result<ActorId> {
        let mut state = self.connected()?;

        if !self.config.vehicle_blueprints.contains(&spawn.blueprint) {
            return Err(WorldClientError::spawn(&spawn.blueprint, "unknown blueprint"));
        }
        if self.config.fail_blueprints.contains(&spawn.blueprint) {
            return Err(WorldClientError::spawn(&spawn.blueprint, "spawn point blocked"));
        }

        let actor_id = self.allocate_actor_id();
        state.vehicles.insert(
            actor_id,
            VehicleActor {
                state: ActorState {
                    id: actor_id,
                    blueprint: spawn.blueprint.clone(),
                    transform: spawn.transform,
                    extent: Some(Extent::DEFAULT_VEHICLE),
                    light_state: 0,
                    color: spawn.color.or_else(|| self.default_color()),
                },
                role_name: spawn.role_name.clone(),
            },
        );
        Ok(actor_id)
    }

    async fn apply_vehicle_state(
        &self,
        actor_id: ActorId,
        transform: Transform,
        light_state: Option<u32>,
    ) -> Result<()> {
        let mut state = self.connected()?;
        let vehicle = state
            .vehicles
            .get_mut(&actor_id)
            .ok_or(WorldClientError::ActorNotFound { actor_id })?;
        vehicle.state.transform = transform;
        if let Some(lights) = light_state {
            vehicle.state.light_state = lights;
        }
        Ok(())
    }

    #[instrument(name = "memory_world_destroy_actor", skip(self), fields(actor_id))]
    async fn destroy_actor(&self, actor_id: ActorId) -> Result<()> {
        let mut state = self.connected()?;
        if state.destroy_fault {
            return Err(WorldClientError::connection("destroy rejected"));
        }
        let removed =
            state.vehicles.remove(&actor_id).is_some() || state.sensors.remove(&actor_id).is_some();
        if removed {
            Ok(())
        } else {
            Err(WorldClientError::ActorNotFound { actor_id })
        }
    }

    async fn traffic_lights(&self) -> Result<Vec<TrafficLightInfo>> {
        Ok(self
            .connected()?
            .lights
            .values()
            .map(|l| l.info.clone())
            .collect())
    }

    async fn traffic_light_state(&self, landmark_id: &str) -> Result<WorldPhase> {
        self.connected()?
            .lights
            .get(landmark_id)
            .map(|l| l.phase)
            .ok_or_else(|| WorldClientError::TrafficLightNotFound {
                landmark_id: landmark_id.to_string(),
            })
    }

    async fn set_traffic_light_state(&self, landmark_id: &str, phase: WorldPhase) -> Result<()> {
        let mut state = self.connected()?;
        let light = state.lights.get_mut(landmark_id).ok_or_else(|| {
            WorldClientError::TrafficLightNotFound {
                landmark_id: landmark_id.to_string(),
            }
        })?;
        light.phase = phase;
        Ok(())
    }

    async fn freeze_traffic_lights(&self, frozen: bool) -> Result<()> {
        self.connected()?.lights_frozen = frozen;
        Ok(())
    }

    #[instrument(
        name = "memory_world_spawn_sensor",
        skip(self, mount, on_measurement),
        fields(blueprint = %mount.blueprint, parent_id)
    )]
    async fn spawn_sensor(
        &self,
        mount: &SensorMount,
        parent_id: ActorId,
        on_measurement: MeasurementCallback,
    ) -> Result<ActorId> {
        let mut state = self.connected()?;

        // 验证 parent 存在
        if !state.vehicles.contains_key(&parent_id) {
            return Err(WorldClientError::SensorSpawnFailed {
                parent_id,
                message: "parent actor not found".into(),
            });
        }

        let actor_id = self.allocate_actor_id();
        state.sensors.insert(
            actor_id,
            SensorActor {
                parent_id,
                mount: mount.clone(),
                callback: on_measurement,
            },
        );
        Ok(actor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn spawn_request(blueprint: &str) -> ActorSpawn {
        ActorSpawn {
            blueprint: blueprint.to_string(),
            transform: Transform::default(),
            color: None,
            role_name: "traffic_driver".to_string(),
        }
    }

    async fn connected_world(config: InMemoryWorldConfig) -> InMemoryWorld {
        let mut world = InMemoryWorld::with_config(config);
        world.connect("localhost", 2000).await.unwrap();
        world
    }

    #[tokio::test]
    async fn test_spawn_vehicle_picks_recommended_color() {
        let world = connected_world(InMemoryWorldConfig::default()).await;

        let actor_id = world
            .spawn_vehicle(&spawn_request("vehicle.audi.a2"))
            .await
            .unwrap();
        assert!(actor_id >= 1000);

        let actor = world.actor(actor_id).await.unwrap();
        assert_eq!(actor.color, Some(Color::rgb(255, 255, 255)));
        assert_eq!(world.role_name(actor_id).as_deref(), Some("traffic_driver"));
    }

    #[tokio::test]
    async fn test_spawn_failures() {
        let world = connected_world(InMemoryWorldConfig {
            fail_blueprints: vec!["vehicle.audi.a2".into()],
            ..Default::default()
        })
        .await;

        assert!(matches!(
            world.spawn_vehicle(&spawn_request("vehicle.audi.a2")).await,
            Err(WorldClientError::SpawnFailed { .. })
        ));
        assert!(matches!(
            world.spawn_vehicle(&spawn_request("vehicle.unknown")).await,
            Err(WorldClientError::SpawnFailed { .. })
        ));
        assert_eq!(world.vehicle_count(), 0);
    }

    #[tokio::test]
    async fn test_calls_fail_after_disconnect() {
        let world = connected_world(InMemoryWorldConfig::default()).await;
        world.tick().await.unwrap();
        world.disconnect();

        assert!(matches!(
            world.tick().await,
            Err(WorldClientError::ConnectionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_destroy_unknown_actor() {
        let world = connected_world(InMemoryWorldConfig::default()).await;
        let actor_id = world.inject_vehicle("vehicle.audi.a2", Transform::default(), None);

        world.destroy_actor(actor_id).await.unwrap();
        assert!(matches!(
            world.destroy_actor(actor_id).await,
            Err(WorldClientError::ActorNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_destroy_fault_keeps_actor() {
        let world = connected_world(InMemoryWorldConfig::default()).await;
        let actor_id = world.inject_vehicle("vehicle.audi.a2", Transform::default(), None);

        world.fail_destroys(true);
        assert!(matches!(
            world.destroy_actor(actor_id).await,
            Err(WorldClientError::ConnectionFailed { .. })
        ));
        assert_eq!(world.vehicle_count(), 1);

        world.fail_destroys(false);
        world.destroy_actor(actor_id).await.unwrap();
        assert_eq!(world.vehicle_count(), 0);
    }

    #[tokio::test]
    async fn test_emit_lidar_reaches_attached_sensor() {
        let world = connected_world(InMemoryWorldConfig::default()).await;
        let parent = world.inject_vehicle("vehicle.audi.a2", Transform::default(), None);

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let mount = SensorMount {
            blueprint: LIDAR_BLUEPRINT.to_string(),
            transform: Transform::default(),
            attributes: BTreeMap::new(),
        };
        world
            .spawn_sensor(
                &mount,
                parent,
                Arc::new(move |m: LidarMeasurement| sink.lock().unwrap().push(m)),
            )
            .await
            .unwrap();

        world.tick().await.unwrap();
        let point = LidarPoint {
            x: 1.0,
            y: 2.0,
            z: 0.5,
            intensity: 0.9,
        };
        assert_eq!(world.emit_lidar(vec![point]), 1);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].frame, 1);
        assert_eq!(received[0].points, vec![point]);
    }
}
