//! Bidirectional reconciliation engine.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use adapters::MIRROR_ROUTE;
use contracts::{
    AdapterError, BridgeConfig, ControlAuthority, ControlDeviceUpdate, DestroyRequest,
    DevicePhase, EngineAdapter, EngineSide, Extent, MoveRequest, NativeId, NetOffset,
    ObservationCallback, SensorDescriptor, SensorHost, SensorObservation, SpawnRequest,
    SpawnSpec, StepResult, Transform,
};
use tracing::{debug, error, info, instrument, warn};

use crate::bridge;
use crate::catalog::ClassResolver;
use crate::error::{Result, SyncError};

/// Reconciliation behavior switches
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineSettings {
    pub control_devices: ControlAuthority,
    pub sync_vehicle_color: bool,
    pub sync_vehicle_lights: bool,
    pub net_offset: NetOffset,
}

impl From<&BridgeConfig> for EngineSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            control_devices: config.sync.control_devices,
            sync_vehicle_color: config.sync.sync_vehicle_color,
            sync_vehicle_lights: config.sync.sync_vehicle_lights,
            net_offset: config.traffic.net_offset,
        }
    }
}

/// Pending StepResult shared with sensor callbacks
///
/// The lock is held per entry, never across an engine call.
#[derive(Debug, Clone, Default)]
pub struct StepRecorder {
    pending: Arc<Mutex<StepResult>>,
}

impl StepRecorder {
    fn lock(&self) -> MutexGuard<'_, StepResult> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_spawn(&self, request: SpawnRequest) {
        self.lock().spawn_requests.push(request);
    }

    pub fn record_destroy(&self, request: DestroyRequest) {
        self.lock().destroy_requests.push(request);
    }

    pub fn record_move(&self, request: MoveRequest) {
        self.lock().move_requests.push(request);
    }

    pub fn record_device_update(&self, update: ControlDeviceUpdate) {
        self.lock().control_device_updates.push(update);
    }

    pub fn record_observation(&self, observation: SensorObservation) {
        self.lock().sensor_observations.push(observation);
    }

    /// Hand out everything recorded so far and start a fresh batch
    pub fn take(&self) -> StepResult {
        std::mem::take(&mut *self.lock())
    }

    /// Callback appending observations to the pending batch
    pub fn observation_callback(&self) -> ObservationCallback {
        let recorder = self.clone();
        Arc::new(move |observation| recorder.record_observation(observation))
    }
}

/// Synchronization Engine
///
/// Owns both adapters and the two cross-reference maps:
/// - `traffic_map`: traffic-native ID -> world mirror ID
/// - `world_map`: world-native ID -> traffic mirror ID
pub struct SynchronizationEngine<T, W> {
    traffic: T,
    world: W,
    resolver: ClassResolver,
    settings: EngineSettings,
    traffic_map: BTreeMap<NativeId, NativeId>,
    world_map: BTreeMap<NativeId, NativeId>,
    recorder: StepRecorder,
}

impl<T: EngineAdapter, W: EngineAdapter> SynchronizationEngine<T, W> {
    pub fn new(traffic: T, world: W, resolver: ClassResolver, settings: EngineSettings) -> Self {
        Self {
            traffic,
            world,
            resolver,
            settings,
            traffic_map: BTreeMap::new(),
            world_map: BTreeMap::new(),
            recorder: StepRecorder::default(),
        }
    }

    /// Hand the controlled side's traffic lights to the bridge
    #[instrument(name = "sync_engine_initialize", skip(self), fields(authority = ?self.settings.control_devices))]
    pub async fn initialize(&mut self) -> Result<()> {
        match self.settings.control_devices.controlled_side() {
            Some(EngineSide::World) => self.world.yield_control_devices().await?,
            Some(EngineSide::Traffic) => self.traffic.yield_control_devices().await?,
            None => {}
        }
        Ok(())
    }

    pub fn traffic(&self) -> &T {
        &self.traffic
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Traffic-originated cross-references (traffic ID -> world mirror)
    pub fn traffic_mirrors(&self) -> &BTreeMap<NativeId, NativeId> {
        &self.traffic_map
    }

    /// World-originated cross-references (world ID -> traffic mirror)
    pub fn world_mirrors(&self) -> &BTreeMap<NativeId, NativeId> {
        &self.world_map
    }

    pub fn recorder(&self) -> &StepRecorder {
        &self.recorder
    }

    /// Run one reconciliation step
    ///
    /// # Errors
    /// Only fatal adapter failures; per-entity failures are logged and skipped.
    #[instrument(name = "sync_engine_tick", skip(self))]
    pub async fn tick(&mut self) -> Result<StepResult> {
        let started = Instant::now();

        // Traffic -> World
        self.traffic.tick().await?;
        self.spawn_world_mirrors().await?;
        self.destroy_world_mirrors().await?;
        self.update_world_mirrors().await?;
        if self.settings.control_devices == ControlAuthority::Traffic {
            self.push_traffic_phases().await?;
        }

        // World -> Traffic
        self.world.tick().await?;
        self.spawn_traffic_mirrors().await?;
        self.destroy_traffic_mirrors().await?;
        self.update_traffic_mirrors().await?;
        if self.settings.control_devices == ControlAuthority::World {
            self.push_world_phases().await?;
        }

        let result = self.recorder.take();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        observability::record_step_metrics(&result, elapsed_ms);
        observability::record_mirror_count(EngineSide::Traffic, self.traffic_map.len());
        observability::record_mirror_count(EngineSide::World, self.world_map.len());

        debug!(
            spawns = result.spawn_requests.len(),
            destroys = result.destroy_requests.len(),
            moves = result.move_requests.len(),
            devices = result.control_device_updates.len(),
            elapsed_ms,
            "tick completed"
        );
        Ok(result)
    }

    /// Destroy every mirror this bridge created, then release both sessions
    #[instrument(
        name = "sync_engine_close",
        skip(self),
        fields(traffic_mirrors = self.traffic_map.len(), world_mirrors = self.world_map.len())
    )]
    pub async fn close(&mut self) -> Result<()> {
        for (traffic_id, world_id) in std::mem::take(&mut self.traffic_map) {
            if let Err(e) = self.world.destroy_entity(&world_id).await {
                warn!(traffic_id = %traffic_id, world_id = %world_id, error = %e, "failed to destroy world mirror");
            }
        }
        for (world_id, traffic_id) in std::mem::take(&mut self.world_map) {
            if let Err(e) = self.traffic.destroy_entity(&traffic_id).await {
                warn!(world_id = %world_id, traffic_id = %traffic_id, error = %e, "failed to destroy traffic mirror");
            }
        }

        let world = self.world.close().await;
        let traffic = self.traffic.close().await;
        info!("co-simulation closed");
        world?;
        traffic?;
        Ok(())
    }

    /// Recover from a per-entity failure, propagate a fatal one
    fn tolerate(err: AdapterError, side: EngineSide, id: &str) -> Result<()> {
        if err.is_fatal() {
            error!(side = %side, id, error = %err, "adapter session failure");
            return Err(SyncError::Adapter(err));
        }
        match err {
            AdapterError::EntityNotFound { .. } => {
                debug!(side = %side, id, "entity vanished during step, skipped");
                observability::record_entity_race(side);
            }
            other => warn!(side = %side, id, error = %other, "entity operation failed, skipped"),
        }
        Ok(())
    }

    fn mirror_targets(map: &BTreeMap<NativeId, NativeId>) -> BTreeSet<NativeId> {
        map.values().cloned().collect()
    }

    /// Drop cross-references whose mirror was removed by the engine hosting it
    ///
    /// The source entity stays unmirrored; only churn-reported spawns create mirrors.
    fn forget_lost_mirrors(
        map: &mut BTreeMap<NativeId, NativeId>,
        destroyed: &[NativeId],
        host: EngineSide,
    ) {
        map.retain(|source_id, mirror_id| {
            if !destroyed.contains(mirror_id) {
                return true;
            }
            warn!(
                side = %host,
                source_id = %source_id,
                mirror_id = %mirror_id,
                "mirror removed outside the bridge, source left unmirrored"
            );
            observability::record_lost_mirror(host);
            false
        });
    }

    // ===== Traffic -> World =====

    async fn spawn_world_mirrors(&mut self) -> Result<()> {
        let mirrors = Self::mirror_targets(&self.world_map);
        let spawned: Vec<NativeId> = self
            .traffic
            .churn()
            .spawned
            .iter()
            .filter(|id| !mirrors.contains(*id) && !self.traffic_map.contains_key(*id))
            .cloned()
            .collect();

        for traffic_id in spawned {
            let snapshot = match self.traffic.get_entity(&traffic_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    Self::tolerate(e, EngineSide::Traffic, &traffic_id)?;
                    continue;
                }
            };

            let Some(resolution) = self
                .resolver
                .resolve_world_class(&snapshot.type_id, snapshot.vehicle_class)
            else {
                warn!(
                    traffic_id = %traffic_id,
                    type_id = %snapshot.type_id,
                    vehicle_class = ?snapshot.vehicle_class,
                    "no compatible world class, entity left unmirrored"
                );
                observability::record_resolution_failure(EngineSide::Traffic);
                continue;
            };

            let extent = snapshot.extent.unwrap_or_default();
            let color = snapshot.color.filter(|_| self.settings.sync_vehicle_color);
            let transform =
                bridge::world_transform(&snapshot.transform, &extent, &self.settings.net_offset);
            let spec = SpawnSpec {
                type_id: resolution.type_id,
                vehicle_class: resolution.vehicle_class,
                transform,
                extent,
                color,
            };

            match self.world.spawn_entity(&spec).await {
                Ok(world_id) => {
                    info!(traffic_id = %traffic_id, world_id = %world_id, type_id = %spec.type_id, "world mirror created");
                    self.traffic_map.insert(traffic_id.clone(), world_id.clone());
                    self.recorder.record_spawn(SpawnRequest {
                        target: EngineSide::World,
                        source_id: traffic_id,
                        entity_id: world_id,
                        type_id: spec.type_id,
                        vehicle_class: spec.vehicle_class,
                        route: None,
                        color,
                        transform,
                    });
                }
                Err(e) => Self::tolerate(e, EngineSide::World, &traffic_id)?,
            }
        }
        Ok(())
    }

    async fn destroy_world_mirrors(&mut self) -> Result<()> {
        let destroyed: Vec<NativeId> = self.traffic.churn().destroyed.iter().cloned().collect();
        Self::forget_lost_mirrors(&mut self.world_map, &destroyed, EngineSide::Traffic);

        for traffic_id in destroyed {
            let Some(world_id) = self.traffic_map.get(&traffic_id).cloned() else {
                continue;
            };
            // 失败且致命时保留映射，留给 close() 清理
            match self.world.destroy_entity(&world_id).await {
                Ok(()) => {
                    info!(traffic_id = %traffic_id, world_id = %world_id, "world mirror destroyed");
                    self.recorder.record_destroy(DestroyRequest {
                        target: EngineSide::World,
                        entity_id: world_id,
                    });
                }
                Err(e) => Self::tolerate(e, EngineSide::World, &world_id)?,
            }
            self.traffic_map.remove(&traffic_id);
        }
        Ok(())
    }

    async fn update_world_mirrors(&mut self) -> Result<()> {
        let pairs: Vec<(NativeId, NativeId)> = self
            .traffic_map
            .iter()
            .map(|(t, w)| (t.clone(), w.clone()))
            .collect();

        for (traffic_id, world_id) in pairs {
            let source = match self.traffic.get_entity(&traffic_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    Self::tolerate(e, EngineSide::Traffic, &traffic_id)?;
                    continue;
                }
            };
            let mirror = match self.world.get_entity(&world_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    Self::tolerate(e, EngineSide::World, &world_id)?;
                    continue;
                }
            };

            // World bounding box is authoritative for the mirror's size
            let extent = mirror.extent.or(source.extent).unwrap_or_default();
            let transform =
                bridge::world_transform(&source.transform, &extent, &self.settings.net_offset);
            let signals = if self.settings.sync_vehicle_lights {
                source
                    .signals
                    .map(|s| bridge::world_lights(s, mirror.signals.unwrap_or(0)))
            } else {
                None
            };

            self.apply_move(EngineSide::World, world_id, transform, signals)
                .await?;
        }
        Ok(())
    }

    async fn push_traffic_phases(&mut self) -> Result<()> {
        let traffic_devices = self.traffic.list_control_devices().await?;
        let world_devices = self.world.list_control_devices().await?;

        for landmark_id in traffic_devices.intersection(&world_devices) {
            let phase = match self.traffic.get_control_device_state(landmark_id).await {
                Ok(phase) => phase,
                Err(e) => {
                    Self::tolerate(e, EngineSide::Traffic, landmark_id)?;
                    continue;
                }
            };
            self.apply_phase(EngineSide::World, landmark_id, bridge::convert_phase(phase))
                .await?;
        }
        Ok(())
    }

    // ===== World -> Traffic =====

    async fn spawn_traffic_mirrors(&mut self) -> Result<()> {
        let mirrors = Self::mirror_targets(&self.traffic_map);
        let spawned: Vec<NativeId> = self
            .world
            .churn()
            .spawned
            .iter()
            .filter(|id| !mirrors.contains(*id) && !self.world_map.contains_key(*id))
            .cloned()
            .collect();

        for world_id in spawned {
            let snapshot = match self.world.get_entity(&world_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    Self::tolerate(e, EngineSide::World, &world_id)?;
                    continue;
                }
            };

            let Some(resolution) = self.resolver.traffic_type_for(&snapshot.type_id) else {
                warn!(
                    world_id = %world_id,
                    type_id = %snapshot.type_id,
                    "world class has no traffic counterpart, entity left unmirrored"
                );
                observability::record_resolution_failure(EngineSide::World);
                continue;
            };

            let extent = snapshot.extent.unwrap_or(Extent::DEFAULT_VEHICLE);
            let color = snapshot.color.filter(|_| self.settings.sync_vehicle_color);
            let transform =
                bridge::traffic_transform(&snapshot.transform, &extent, &self.settings.net_offset);
            let spec = SpawnSpec {
                type_id: resolution.type_id,
                vehicle_class: resolution.vehicle_class,
                transform,
                extent,
                color,
            };

            match self.traffic.spawn_entity(&spec).await {
                Ok(traffic_id) => {
                    info!(world_id = %world_id, traffic_id = %traffic_id, type_id = %spec.type_id, "traffic mirror created");
                    self.world_map.insert(world_id.clone(), traffic_id.clone());
                    self.recorder.record_spawn(SpawnRequest {
                        target: EngineSide::Traffic,
                        source_id: world_id,
                        entity_id: traffic_id,
                        type_id: spec.type_id,
                        vehicle_class: spec.vehicle_class,
                        route: Some(MIRROR_ROUTE.to_string()),
                        color,
                        transform,
                    });
                }
                Err(e) => Self::tolerate(e, EngineSide::Traffic, &world_id)?,
            }
        }
        Ok(())
    }

    async fn destroy_traffic_mirrors(&mut self) -> Result<()> {
        let destroyed: Vec<NativeId> = self.world.churn().destroyed.iter().cloned().collect();
        Self::forget_lost_mirrors(&mut self.traffic_map, &destroyed, EngineSide::World);

        for world_id in destroyed {
            let Some(traffic_id) = self.world_map.get(&world_id).cloned() else {
                continue;
            };
            match self.traffic.destroy_entity(&traffic_id).await {
                Ok(()) => {
                    info!(world_id = %world_id, traffic_id = %traffic_id, "traffic mirror destroyed");
                    self.recorder.record_destroy(DestroyRequest {
                        target: EngineSide::Traffic,
                        entity_id: traffic_id,
                    });
                }
                Err(e) => Self::tolerate(e, EngineSide::Traffic, &traffic_id)?,
            }
            self.world_map.remove(&world_id);
        }
        Ok(())
    }

    async fn update_traffic_mirrors(&mut self) -> Result<()> {
        let pairs: Vec<(NativeId, NativeId)> = self
            .world_map
            .iter()
            .map(|(w, t)| (w.clone(), t.clone()))
            .collect();

        for (world_id, traffic_id) in pairs {
            let source = match self.world.get_entity(&world_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    Self::tolerate(e, EngineSide::World, &world_id)?;
                    continue;
                }
            };
            let mirror = match self.traffic.get_entity(&traffic_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    Self::tolerate(e, EngineSide::Traffic, &traffic_id)?;
                    continue;
                }
            };

            let extent = source.extent.unwrap_or(Extent::DEFAULT_VEHICLE);
            let transform =
                bridge::traffic_transform(&source.transform, &extent, &self.settings.net_offset);
            let signals = if self.settings.sync_vehicle_lights {
                source
                    .signals
                    .map(|l| bridge::traffic_signals(l, mirror.signals.unwrap_or(0)))
            } else {
                None
            };

            self.apply_move(EngineSide::Traffic, traffic_id, transform, signals)
                .await?;
        }
        Ok(())
    }

    /// Every world device is pushed; devices unknown to traffic are ignored
    async fn push_world_phases(&mut self) -> Result<()> {
        let world_devices = self.world.list_control_devices().await?;

        for landmark_id in &world_devices {
            let phase = match self.world.get_control_device_state(landmark_id).await {
                Ok(phase) => phase,
                Err(e) => {
                    Self::tolerate(e, EngineSide::World, landmark_id)?;
                    continue;
                }
            };
            self.apply_phase(EngineSide::Traffic, landmark_id, bridge::convert_phase(phase))
                .await?;
        }
        Ok(())
    }

    // ===== Shared =====

    async fn apply_move(
        &mut self,
        target: EngineSide,
        entity_id: NativeId,
        transform: Transform,
        signals: Option<u32>,
    ) -> Result<()> {
        let outcome = match target {
            EngineSide::World => {
                self.world
                    .update_entity(&entity_id, transform, signals)
                    .await
            }
            EngineSide::Traffic => {
                self.traffic
                    .update_entity(&entity_id, transform, signals)
                    .await
            }
        };
        match outcome {
            Ok(()) => {
                self.recorder.record_move(MoveRequest {
                    target,
                    entity_id,
                    transform,
                    signals,
                });
                Ok(())
            }
            Err(e) => Self::tolerate(e, target, &entity_id),
        }
    }

    async fn apply_phase(
        &mut self,
        target: EngineSide,
        landmark_id: &str,
        phase: DevicePhase,
    ) -> Result<()> {
        let outcome = match target {
            EngineSide::World => self.world.set_control_device_state(landmark_id, phase).await,
            EngineSide::Traffic => {
                self.traffic
                    .set_control_device_state(landmark_id, phase)
                    .await
            }
        };
        match outcome {
            Ok(()) => {
                self.recorder.record_device_update(ControlDeviceUpdate {
                    landmark_id: landmark_id.to_string(),
                    phase,
                });
                Ok(())
            }
            Err(AdapterError::ControlDeviceNotFound { .. }) => {
                debug!(side = %target, landmark_id, "control device unknown to target, ignored");
                Ok(())
            }
            Err(e) => Self::tolerate(e, target, landmark_id),
        }
    }
}

impl<T: EngineAdapter, W: EngineAdapter + SensorHost> SynchronizationEngine<T, W> {
    /// Attach a sensor to a world entity
    ///
    /// `request.attached` is a traffic ID with a world mirror or a raw world ID.
    /// Observations land in the next StepResult.
    #[instrument(
        name = "sync_engine_attach_sensor",
        skip(self, request),
        fields(attached = %request.attached, sensor_type = %request.type_id)
    )]
    pub async fn attach_sensor(
        &mut self,
        request: SensorDescriptor,
    ) -> std::result::Result<SensorDescriptor, AdapterError> {
        let parent = self
            .traffic_map
            .get(&request.attached)
            .cloned()
            .unwrap_or_else(|| request.attached.clone());
        let callback = self.recorder.observation_callback();
        self.world.attach_sensor(&parent, request, callback).await
    }

    /// `Ok(false)` for an unknown sensor ID
    pub async fn detach_sensor(&mut self, sensor_id: &str) -> std::result::Result<bool, AdapterError> {
        self.world.detach_sensor(sensor_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FirstCandidate;
    use adapters::{InMemoryWorld, TrafficAdapter, TrafficLink, TrafficLightInfo, WorldAdapter};
    use contracts::{
        ControlDeviceDescriptor, EntityDescriptor, Heading, LidarPoint, Location, TrafficPhase,
        TrafficSignals, VehicleCatalog, VehicleClass, WorldLights, WorldPhase,
    };

    type Engine = SynchronizationEngine<TrafficAdapter, WorldAdapter<InMemoryWorld>>;

    fn catalog() -> VehicleCatalog {
        [
            ("vehicle.audi.a2", VehicleClass::Passenger),
            ("vehicle.tesla.model3", VehicleClass::Passenger),
            ("vehicle.yamaha.yzf", VehicleClass::Motorcycle),
        ]
        .into_iter()
        .map(|(id, class)| (id.to_string(), class))
        .collect()
    }

    async fn engine_with(settings: EngineSettings) -> (Engine, TrafficLink) {
        let link = TrafficLink::new();
        let traffic = TrafficAdapter::new(link.clone());
        let world = WorldAdapter::connect(InMemoryWorld::new(), "localhost", 2000, 0.05)
            .await
            .unwrap();
        let world_classes = world.vehicle_blueprints().await.unwrap();
        let resolver = ClassResolver::new(catalog(), world_classes, Box::new(FirstCandidate));
        let mut engine = SynchronizationEngine::new(traffic, world, resolver, settings);
        engine.initialize().await.unwrap();
        (engine, link)
    }

    async fn engine() -> (Engine, TrafficLink) {
        engine_with(EngineSettings::default()).await
    }

    fn vehicle(id: &str, type_id: &str, class: Option<VehicleClass>) -> EntityDescriptor {
        let mut descriptor = EntityDescriptor::new(id, type_id);
        descriptor.vehicle_class = class;
        descriptor.length = 4.0;
        descriptor.width = 1.8;
        descriptor.height = 1.5;
        descriptor.location = Location::new(10.0, 20.0, 0.0);
        descriptor.heading = Heading {
            slope: 0.0,
            angle: 90.0,
        };
        descriptor
    }

    fn assert_invariants(engine: &Engine) {
        let traffic_targets: BTreeSet<_> = engine.traffic_mirrors().values().collect();
        let world_natives: BTreeSet<_> = engine.world_mirrors().keys().collect();
        assert!(traffic_targets.is_disjoint(&world_natives));

        for world_id in engine.traffic_mirrors().values() {
            let actor_id: u32 = world_id.parse().unwrap();
            assert!(engine.world().client().role_name(actor_id).is_some());
        }
        for traffic_id in engine.world_mirrors().values() {
            assert!(engine.traffic().link().entity(traffic_id).is_some());
        }
    }

    #[tokio::test]
    async fn test_traffic_spawn_creates_one_mirror_then_updates() {
        let (mut engine, link) = engine().await;
        link.add_entity(vehicle("v1", "vehicle.audi.a2", Some(VehicleClass::Passenger)));

        let result = engine.tick().await.unwrap();
        assert_eq!(result.spawn_requests.len(), 1);
        assert_eq!(result.spawn_requests[0].source_id, "v1");
        assert_eq!(result.spawn_requests[0].target, EngineSide::World);
        assert_eq!(engine.traffic_mirrors().len(), 1);
        assert_invariants(&engine);

        let result = engine.tick().await.unwrap();
        assert_eq!(result.spawn_requests.len(), 0);
        assert_eq!(result.destroy_requests.len(), 0);
        let world_moves: Vec<_> = result.moves_for(EngineSide::World).collect();
        assert_eq!(world_moves.len(), 1);
        assert_eq!(&world_moves[0].entity_id, &engine.traffic_mirrors()["v1"]);
    }

    #[tokio::test]
    async fn test_mirror_of_world_mirror_is_not_reflected_back() {
        let (mut engine, link) = engine().await;
        link.add_entity(vehicle("v1", "vehicle.audi.a2", None));

        engine.tick().await.unwrap();
        engine.tick().await.unwrap();

        // the world reports the mirror as new; it must not come back as a traffic mirror
        assert!(engine.world_mirrors().is_empty());
        assert_eq!(engine.world().client().vehicle_count(), 1);
        assert_invariants(&engine);
    }

    #[tokio::test]
    async fn test_traffic_arrival_destroys_mirror_once() {
        let (mut engine, link) = engine().await;
        link.add_entity(vehicle("v1", "vehicle.audi.a2", None));
        engine.tick().await.unwrap();
        let world_id = engine.traffic_mirrors()["v1"].clone();

        link.remove_entity("v1");
        let result = engine.tick().await.unwrap();
        assert_eq!(result.destroy_requests.len(), 1);
        assert_eq!(result.destroy_requests[0].entity_id, world_id);
        assert!(engine.traffic_mirrors().is_empty());
        assert_eq!(engine.world().client().vehicle_count(), 0);

        let result = engine.tick().await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_class_is_skipped() {
        let (mut engine, link) = engine().await;
        // no catalogued world type has the bicycle class
        link.add_entity(vehicle("v1", "bike_type", Some(VehicleClass::Bicycle)));

        let result = engine.tick().await.unwrap();
        assert!(result.spawn_requests.is_empty());
        assert!(engine.traffic_mirrors().is_empty());

        // later ticks keep working and do not retry
        let result = engine.tick().await.unwrap();
        assert!(result.spawn_requests.is_empty());
    }

    #[tokio::test]
    async fn test_class_fallback_uses_picker() {
        let (mut engine, link) = engine().await;
        link.add_entity(vehicle("v1", "DEFAULT_VEHTYPE", Some(VehicleClass::Passenger)));

        let result = engine.tick().await.unwrap();
        assert_eq!(result.spawn_requests[0].type_id, "vehicle.audi.a2");
    }

    #[tokio::test]
    async fn test_world_spawn_creates_traffic_mirror() {
        let (mut engine, _link) = engine().await;
        let ego = engine.world().client().inject_vehicle(
            "vehicle.yamaha.yzf",
            Transform::default(),
            None,
        );

        let result = engine.tick().await.unwrap();
        let spawns: Vec<_> = result.spawns_for(EngineSide::Traffic).collect();
        assert_eq!(spawns.len(), 1);
        assert_eq!(spawns[0].entity_id, "carla0");
        assert_eq!(spawns[0].route.as_deref(), Some("carla_route"));
        assert_eq!(spawns[0].vehicle_class, VehicleClass::Motorcycle);
        assert_eq!(engine.world_mirrors()[&ego.to_string()], "carla0");

        // echoed departure of carla0 is not mirrored back into the world
        let result = engine.tick().await.unwrap();
        assert!(result.spawn_requests.is_empty());
        assert_eq!(result.moves_for(EngineSide::Traffic).count(), 1);
        assert_eq!(engine.world().client().vehicle_count(), 1);
        assert_invariants(&engine);

        engine.world().client().remove_vehicle(ego);
        let result = engine.tick().await.unwrap();
        let destroys: Vec<_> = result.destroys_for(EngineSide::Traffic).collect();
        assert_eq!(destroys.len(), 1);
        assert_eq!(destroys[0].entity_id, "carla0");
        assert!(engine.traffic().link().entity("carla0").is_none());
    }

    #[tokio::test]
    async fn test_world_mirror_uses_default_extent() {
        let (mut engine, _link) = engine().await;
        engine
            .world()
            .client()
            .inject_vehicle("vehicle.audi.a2", Transform::default(), None);

        engine.tick().await.unwrap();
        let mirror = engine.traffic().link().entity("carla0").unwrap();
        assert_eq!(mirror.length, 5.0);
        assert_eq!(mirror.width, 1.8);
        assert_eq!(mirror.height, 1.5);
    }

    #[tokio::test]
    async fn test_non_vehicle_world_class_is_not_mirrored() {
        let (mut engine, _link) = engine().await;
        engine
            .world()
            .client()
            .inject_vehicle("static.prop.box", Transform::default(), None);

        let result = engine.tick().await.unwrap();
        assert!(result.spawn_requests.is_empty());
        assert!(engine.world_mirrors().is_empty());
    }

    #[tokio::test]
    async fn test_entity_race_is_skipped() {
        let (mut engine, link) = engine().await;
        link.add_entity(vehicle("v1", "vehicle.audi.a2", None));
        engine.tick().await.unwrap();

        // mirror vanishes in the world without churn reaching the engine yet
        let world_id: u32 = engine.traffic_mirrors()["v1"].parse().unwrap();
        engine.world().client().remove_vehicle(world_id);

        link.add_entity(vehicle("v2", "vehicle.audi.a2", None));
        let result = engine.tick().await.unwrap();
        assert_eq!(result.spawn_requests.len(), 1);
        assert_eq!(result.spawn_requests[0].source_id, "v2");
    }

    #[tokio::test]
    async fn test_world_removed_mirror_is_forgotten() {
        let (mut engine, link) = engine().await;
        link.add_entity(vehicle("v1", "vehicle.audi.a2", None));
        engine.tick().await.unwrap();
        let world_id: u32 = engine.traffic_mirrors()["v1"].parse().unwrap();

        engine.world().client().remove_vehicle(world_id);
        let result = engine.tick().await.unwrap();
        assert!(engine.traffic_mirrors().is_empty());
        assert!(result.destroy_requests.is_empty());
        assert_invariants(&engine);

        // v1 is still driving in traffic but no longer mirrored or re-spawned
        let result = engine.tick().await.unwrap();
        assert!(result.is_empty());
        assert!(link.entity("v1").is_some());
        assert_eq!(engine.world().client().vehicle_count(), 0);
    }

    #[tokio::test]
    async fn test_traffic_removed_mirror_is_forgotten() {
        let (mut engine, link) = engine().await;
        let ego = engine.world().client().inject_vehicle(
            "vehicle.audi.a2",
            Transform::default(),
            None,
        );
        engine.tick().await.unwrap();
        assert_eq!(engine.world_mirrors()[&ego.to_string()], "carla0");

        link.remove_entity("carla0");
        let result = engine.tick().await.unwrap();
        assert!(engine.world_mirrors().is_empty());
        assert_eq!(result.moves_for(EngineSide::Traffic).count(), 0);
        assert_eq!(engine.world().client().vehicle_count(), 1);
        assert_invariants(&engine);
    }

    #[tokio::test]
    async fn test_failed_destroy_leaves_mirror_for_close() {
        let (mut engine, link) = engine().await;
        link.add_entity(vehicle("v1", "vehicle.audi.a2", None));
        engine.tick().await.unwrap();
        let world_id = engine.traffic_mirrors()["v1"].clone();

        engine.world().client().fail_destroys(true);
        link.remove_entity("v1");
        let err = engine.tick().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(engine.traffic_mirrors().get("v1"), Some(&world_id));
        assert_eq!(engine.world().client().vehicle_count(), 1);

        engine.world().client().fail_destroys(false);
        engine.close().await.unwrap();
        assert_eq!(engine.world().client().vehicle_count(), 0);
        assert!(engine.traffic_mirrors().is_empty());
    }

    #[tokio::test]
    async fn test_lights_synced_when_enabled() {
        let (mut engine, link) = engine_with(EngineSettings {
            sync_vehicle_lights: true,
            ..Default::default()
        })
        .await;
        let mut descriptor = vehicle("v1", "vehicle.audi.a2", None);
        descriptor.signals = TrafficSignals::BLINKER_EMERGENCY | TrafficSignals::BRAKELIGHT;
        link.add_entity(descriptor);

        engine.tick().await.unwrap();
        let result = engine.tick().await.unwrap();
        let lights = result.move_requests[0].signals.unwrap();
        assert!(WorldLights(lights).contains(WorldLights::LEFT_BLINKER));
        assert!(WorldLights(lights).contains(WorldLights::RIGHT_BLINKER));
        assert!(WorldLights(lights).contains(WorldLights::BRAKE));

        // unchanged source: same lights again
        let again = engine.tick().await.unwrap();
        assert_eq!(again.move_requests[0].signals, Some(lights));
    }

    #[tokio::test]
    async fn test_lights_untouched_when_disabled() {
        let (mut engine, link) = engine().await;
        let mut descriptor = vehicle("v1", "vehicle.audi.a2", None);
        descriptor.signals = TrafficSignals::BRAKELIGHT;
        link.add_entity(descriptor);

        engine.tick().await.unwrap();
        let result = engine.tick().await.unwrap();
        assert_eq!(result.move_requests[0].signals, None);
    }

    #[tokio::test]
    async fn test_color_synced_only_when_enabled() {
        let (mut engine, link) = engine_with(EngineSettings {
            sync_vehicle_color: true,
            ..Default::default()
        })
        .await;
        let mut descriptor = vehicle("v1", "vehicle.audi.a2", None);
        descriptor.color = Some(contracts::Color::rgb(9, 8, 7));
        link.add_entity(descriptor.clone());
        let result = engine.tick().await.unwrap();
        assert_eq!(result.spawn_requests[0].color, Some(contracts::Color::rgb(9, 8, 7)));

        let (mut plain, plain_link) = self::engine().await;
        plain_link.add_entity(descriptor);
        let result = plain.tick().await.unwrap();
        assert_eq!(result.spawn_requests[0].color, None);
    }

    fn add_light(engine: &Engine, landmark: &str, phase: WorldPhase) {
        engine.world().client().add_traffic_light(
            TrafficLightInfo {
                actor_id: 1,
                landmark_id: landmark.to_string(),
                pole_index: 0,
                group_id: 0,
                location: Location::default(),
            },
            phase,
        );
    }

    #[tokio::test]
    async fn test_traffic_authoritative_phase_push() {
        let (mut engine, link) = engine_with(EngineSettings {
            control_devices: ControlAuthority::Traffic,
            ..Default::default()
        })
        .await;
        add_light(&engine, "tl_3", WorldPhase::Green);
        add_light(&engine, "tl_world_only", WorldPhase::Green);
        link.update_control_device(ControlDeviceDescriptor {
            landmark_id: "tl_3".into(),
            phase: TrafficPhase::RedYellow,
        });

        let result = engine.tick().await.unwrap();
        assert_eq!(
            result.control_device_updates,
            vec![ControlDeviceUpdate {
                landmark_id: "tl_3".into(),
                phase: DevicePhase::World(WorldPhase::Red),
            }]
        );
        assert!(engine.world().client().lights_frozen());
    }

    #[tokio::test]
    async fn test_world_authoritative_pushes_all_and_ignores_unknown() {
        let (mut engine, link) = engine_with(EngineSettings {
            control_devices: ControlAuthority::World,
            ..Default::default()
        })
        .await;
        add_light(&engine, "tl_1", WorldPhase::Yellow);
        add_light(&engine, "tl_2", WorldPhase::Green);
        link.update_control_device(ControlDeviceDescriptor {
            landmark_id: "tl_1".into(),
            phase: TrafficPhase::Green,
        });

        let result = engine.tick().await.unwrap();
        assert_eq!(result.control_device_updates.len(), 1);
        assert_eq!(link.control_device("tl_1"), Some(TrafficPhase::Yellow));
        assert!(link.control_devices_yielded());
    }

    #[tokio::test]
    async fn test_no_authority_pushes_nothing() {
        let (mut engine, link) = engine().await;
        add_light(&engine, "tl_3", WorldPhase::Green);
        link.update_control_device(ControlDeviceDescriptor {
            landmark_id: "tl_3".into(),
            phase: TrafficPhase::Red,
        });
        let result = engine.tick().await.unwrap();
        assert!(result.control_device_updates.is_empty());
    }

    #[tokio::test]
    async fn test_session_failure_is_fatal() {
        let (mut engine, _link) = engine().await;
        engine.world().client().disconnect();

        let err = engine.tick().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, SyncError::Adapter(AdapterError::Session { .. })));
    }

    #[tokio::test]
    async fn test_close_destroys_all_mirrors() {
        let (mut engine, link) = engine().await;
        link.add_entity(vehicle("v1", "vehicle.audi.a2", None));
        link.add_entity(vehicle("v2", "vehicle.tesla.model3", None));
        engine
            .world()
            .client()
            .inject_vehicle("vehicle.yamaha.yzf", Transform::default(), None);
        engine.tick().await.unwrap();
        assert_eq!(engine.world().client().vehicle_count(), 3);

        engine.close().await.unwrap();
        // only the world-native vehicle survives
        assert_eq!(engine.world().client().vehicle_count(), 1);
        assert!(engine.traffic().link().entity("carla0").is_none());
        assert!(engine.traffic_mirrors().is_empty());
        assert!(engine.world_mirrors().is_empty());
        assert_eq!(engine.world().client().synchronous_step(), None);
    }

    #[tokio::test]
    async fn test_sensor_observations_land_in_next_step() {
        let (mut engine, link) = engine().await;
        link.add_entity(vehicle("v1", "vehicle.audi.a2", None));
        engine.tick().await.unwrap();

        let resolved = engine
            .attach_sensor(SensorDescriptor::lidar("v1"))
            .await
            .unwrap();
        let point = LidarPoint {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            intensity: 0.5,
        };
        engine.world().client().emit_lidar(vec![point]);

        let result = engine.tick().await.unwrap();
        assert_eq!(result.sensor_observations.len(), 1);
        assert_eq!(
            Some(&result.sensor_observations[0].sensor_id),
            resolved.id.as_ref()
        );

        // cleared after the step
        let result = engine.tick().await.unwrap();
        assert!(result.sensor_observations.is_empty());

        let sensor_id = resolved.id.unwrap();
        assert!(engine.detach_sensor(&sensor_id).await.unwrap());
        assert!(!engine.detach_sensor(&sensor_id).await.unwrap());
    }
}
