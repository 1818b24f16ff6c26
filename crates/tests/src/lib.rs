//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 步进链路 e2e 测试（traffic 端经 TCP 驱动，world 端为内存引擎）

#[cfg(test)]
mod contract_tests {
    use contracts::{ControlAuthority, EngineSide};

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_authority_yields_opposite_side() {
        assert_eq!(
            ControlAuthority::Traffic.controlled_side(),
            Some(EngineSide::World)
        );
        assert_eq!(
            ControlAuthority::World.controlled_side(),
            Some(EngineSide::Traffic)
        );
        assert_eq!(ControlAuthority::None.controlled_side(), None);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use adapters::{
        InMemoryWorld, TrafficAdapter, TrafficLightInfo, TrafficLink, WorldAdapter, WorldClient,
        MIRROR_ROUTE,
    };
    use contracts::{
        BridgeConfig, ControlAuthority, ControlDeviceDescriptor, DevicePhase, EngineSide,
        EntityDescriptor, LidarPoint, Location, SensorDescriptor, TrafficPhase, Transform,
        VehicleCatalog, VehicleClass, WireFormat, WorldPhase,
    };
    use sync_engine::{ClassResolver, EngineSettings, FirstCandidate, SynchronizationEngine};
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use transport::{LinkClient, LinkServer, LinkService, TransportError};

    type WorldSide = WorldAdapter<InMemoryWorld>;

    /// Bridge served on an ephemeral port
    struct Harness {
        service: Arc<LinkService<WorldSide>>,
        addr: SocketAddr,
        format: WireFormat,
        stop: Option<oneshot::Sender<()>>,
        server: JoinHandle<transport::Result<()>>,
    }

    impl Harness {
        async fn start(settings: EngineSettings, format: WireFormat) -> Self {
            let world = WorldAdapter::connect(InMemoryWorld::new(), "localhost", 2000, 0.05)
                .await
                .unwrap();
            let catalog: VehicleCatalog = [
                ("vehicle.audi.a2".to_string(), VehicleClass::Passenger),
                ("vehicle.tesla.model3".to_string(), VehicleClass::Passenger),
                ("vehicle.yamaha.yzf".to_string(), VehicleClass::Motorcycle),
            ]
            .into_iter()
            .collect();
            let resolver = ClassResolver::new(
                catalog,
                world.vehicle_blueprints().await.unwrap(),
                Box::new(FirstCandidate),
            );

            let mut engine = SynchronizationEngine::new(
                TrafficAdapter::new(TrafficLink::new()),
                world,
                resolver,
                settings,
            );
            engine.initialize().await.unwrap();

            let service = Arc::new(LinkService::new(engine));
            let server = LinkServer::bind("127.0.0.1:0", format, 4).await.unwrap();
            let addr = server.local_addr().unwrap();

            let (stop, stop_rx) = oneshot::channel::<()>();
            let server = tokio::spawn(server.serve(Arc::clone(&service), async {
                let _ = stop_rx.await;
            }));

            Self {
                service,
                addr,
                format,
                stop: Some(stop),
                server,
            }
        }

        async fn peer(&self) -> LinkClient {
            LinkClient::connect(self.addr, self.format).await.unwrap()
        }

        /// Run `f` against the in-memory world engine
        async fn with_world<R>(&self, f: impl FnOnce(&InMemoryWorld) -> R) -> R {
            let engine = self.service.engine();
            let engine = engine.lock().await;
            f(engine.world().client())
        }

        async fn shutdown(mut self) {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            tokio::time::timeout(Duration::from_secs(5), self.server)
                .await
                .expect("server did not stop")
                .unwrap()
                .unwrap();
        }
    }

    fn vehicle(id: &str, type_id: &str, class: Option<VehicleClass>) -> EntityDescriptor {
        let mut descriptor = EntityDescriptor::new(id, type_id);
        descriptor.vehicle_class = class;
        descriptor.length = 4.0;
        descriptor.width = 1.8;
        descriptor.height = 1.5;
        descriptor.location = Location::new(100.0, 50.0, 0.0);
        descriptor
    }

    fn light(landmark: &str) -> TrafficLightInfo {
        TrafficLightInfo {
            actor_id: 1,
            landmark_id: landmark.to_string(),
            pole_index: 0,
            group_id: 0,
            location: Location::default(),
        }
    }

    /// Departure mirrors into the world, the next quiet step only moves it
    #[tokio::test]
    async fn test_e2e_traffic_departure_then_update() {
        let harness = Harness::start(EngineSettings::default(), WireFormat::Bincode).await;
        let mut peer = harness.peer().await;

        peer.add_entity(vehicle("v1", "vehicle.audi.a2", Some(VehicleClass::Passenger)))
            .await
            .unwrap();
        let result = peer.simulation_step().await.unwrap();
        let spawns: Vec<_> = result.spawns_for(EngineSide::World).collect();
        assert_eq!(spawns.len(), 1);
        assert_eq!(spawns[0].source_id, "v1");
        assert_eq!(spawns[0].type_id, "vehicle.audi.a2");
        assert_eq!(harness.with_world(|w| w.vehicle_count()).await, 1);

        let mut moved = vehicle("v1", "vehicle.audi.a2", Some(VehicleClass::Passenger));
        moved.location = Location::new(110.0, 50.0, 0.0);
        peer.update_entity(moved).await.unwrap();

        let result = peer.simulation_step().await.unwrap();
        assert!(result.spawn_requests.is_empty());
        assert!(result.destroy_requests.is_empty());
        assert_eq!(result.moves_for(EngineSide::World).count(), 1);

        drop(peer);
        harness.shutdown().await;
    }

    /// Arrival destroys the mirror exactly once
    #[tokio::test]
    async fn test_e2e_arrival_destroys_mirror() {
        let harness = Harness::start(EngineSettings::default(), WireFormat::Json).await;
        let mut peer = harness.peer().await;

        peer.add_entity(vehicle("v1", "vehicle.audi.a2", Some(VehicleClass::Passenger)))
            .await
            .unwrap();
        let spawned = peer.simulation_step().await.unwrap();
        let mirror = spawned.spawn_requests[0].entity_id.clone();

        peer.remove_entity(vehicle("v1", "vehicle.audi.a2", Some(VehicleClass::Passenger)))
            .await
            .unwrap();
        let result = peer.simulation_step().await.unwrap();
        assert_eq!(result.destroy_requests.len(), 1);
        assert_eq!(result.destroy_requests[0].target, EngineSide::World);
        assert_eq!(result.destroy_requests[0].entity_id, mirror);
        assert_eq!(harness.with_world(|w| w.vehicle_count()).await, 0);

        let result = peer.simulation_step().await.unwrap();
        assert!(result.is_empty());

        drop(peer);
        harness.shutdown().await;
    }

    /// Traffic drives the lights: RedYellow shows as Red in the world
    #[tokio::test]
    async fn test_e2e_traffic_authority_light_push() {
        let settings = EngineSettings {
            control_devices: ControlAuthority::Traffic,
            ..Default::default()
        };
        let harness = Harness::start(settings, WireFormat::Bincode).await;
        harness
            .with_world(|w| w.add_traffic_light(light("tl_3"), WorldPhase::Green))
            .await;
        assert!(harness.with_world(|w| w.lights_frozen()).await);

        let mut peer = harness.peer().await;
        peer.update_control_device(ControlDeviceDescriptor {
            landmark_id: "tl_3".into(),
            phase: TrafficPhase::RedYellow,
        })
        .await
        .unwrap();

        let result = peer.simulation_step().await.unwrap();
        let updates: Vec<_> = result.device_updates_for(EngineSide::World).collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].landmark_id, "tl_3");
        assert_eq!(updates[0].phase, DevicePhase::World(WorldPhase::Red));

        let engine = harness.service.engine();
        let phase = engine
            .lock()
            .await
            .world()
            .client()
            .traffic_light_state("tl_3")
            .await
            .unwrap();
        assert_eq!(phase, WorldPhase::Red);

        drop(peer);
        harness.shutdown().await;
    }

    /// World drives the lights: the peer reads the converted phase back
    #[tokio::test]
    async fn test_e2e_world_authority_light_push() {
        let settings = EngineSettings {
            control_devices: ControlAuthority::World,
            ..Default::default()
        };
        let harness = Harness::start(settings, WireFormat::Json).await;
        harness
            .with_world(|w| {
                w.add_traffic_light(light("tl_1"), WorldPhase::Yellow);
                w.add_traffic_light(light("tl_world_only"), WorldPhase::Green);
            })
            .await;
        assert!(harness.service.link().control_devices_yielded());

        let mut peer = harness.peer().await;
        peer.update_control_device(ControlDeviceDescriptor {
            landmark_id: "tl_1".into(),
            phase: TrafficPhase::Green,
        })
        .await
        .unwrap();

        let result = peer.simulation_step().await.unwrap();
        assert_eq!(result.device_updates_for(EngineSide::Traffic).count(), 1);

        let device = peer.get_control_device("tl_1").await.unwrap().unwrap();
        assert_eq!(device.phase, TrafficPhase::Yellow);
        assert!(peer.get_control_device("tl_world_only").await.unwrap().is_none());
        assert_eq!(peer.list_control_device_ids().await.unwrap(), vec!["tl_1"]);

        drop(peer);
        harness.shutdown().await;
    }

    /// No compatible class: the step succeeds without a mirror
    #[tokio::test]
    async fn test_e2e_unresolvable_class_is_skipped() {
        let harness = Harness::start(EngineSettings::default(), WireFormat::Bincode).await;
        let mut peer = harness.peer().await;

        peer.add_entity(vehicle("bike", "DEFAULT_BIKETYPE", Some(VehicleClass::Bicycle)))
            .await
            .unwrap();
        let result = peer.simulation_step().await.unwrap();
        assert!(result.spawn_requests.is_empty());
        assert_eq!(harness.with_world(|w| w.vehicle_count()).await, 0);

        // later steps keep working
        peer.add_entity(vehicle("v2", "DEFAULT_VEHTYPE", Some(VehicleClass::Passenger)))
            .await
            .unwrap();
        let result = peer.simulation_step().await.unwrap();
        assert_eq!(result.spawn_requests.len(), 1);
        assert_eq!(result.spawn_requests[0].type_id, "vehicle.audi.a2");

        drop(peer);
        harness.shutdown().await;
    }

    /// World-native vehicles appear in the traffic table, never reflected back
    #[tokio::test]
    async fn test_e2e_world_vehicle_mirrored_into_traffic() {
        let harness = Harness::start(EngineSettings::default(), WireFormat::Json).await;
        let actor = harness
            .with_world(|w| w.inject_vehicle("vehicle.yamaha.yzf", Transform::default(), None))
            .await;

        let mut peer = harness.peer().await;
        let result = peer.simulation_step().await.unwrap();
        let spawns: Vec<_> = result.spawns_for(EngineSide::Traffic).collect();
        assert_eq!(spawns.len(), 1);
        assert_eq!(spawns[0].source_id, actor.to_string());
        assert_eq!(spawns[0].entity_id, "carla0");
        assert_eq!(spawns[0].route.as_deref(), Some(MIRROR_ROUTE));
        assert_eq!(spawns[0].vehicle_class, VehicleClass::Motorcycle);

        let mirror = peer.get_entity("carla0").await.unwrap().unwrap();
        assert_eq!(mirror.type_id, "vehicle.yamaha.yzf");

        // the mirror's own appearance is not mirrored back into the world
        let result = peer.simulation_step().await.unwrap();
        assert!(result.spawn_requests.is_empty());
        assert_eq!(result.moves_for(EngineSide::Traffic).count(), 1);
        assert_eq!(harness.with_world(|w| w.vehicle_count()).await, 1);

        drop(peer);
        harness.shutdown().await;
    }

    /// LiDAR attached through the link reports into the next step
    #[tokio::test]
    async fn test_e2e_lidar_observations() {
        let harness = Harness::start(EngineSettings::default(), WireFormat::Bincode).await;
        let mut peer = harness.peer().await;

        peer.add_entity(vehicle("v1", "vehicle.audi.a2", Some(VehicleClass::Passenger)))
            .await
            .unwrap();
        peer.simulation_step().await.unwrap();

        let resolved = peer.add_sensor(SensorDescriptor::lidar("v1")).await.unwrap();
        let sensor_id = resolved.id.clone().unwrap();
        assert!(resolved.location.is_some());

        let mut camera = SensorDescriptor::lidar("v1");
        camera.type_id = "Camera".into();
        let err = peer.add_sensor(camera).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected { .. }));

        let point = LidarPoint {
            x: 1.0,
            y: 2.0,
            z: 0.5,
            intensity: 0.9,
        };
        assert_eq!(harness.with_world(|w| w.emit_lidar(vec![point])).await, 1);

        let result = peer.simulation_step().await.unwrap();
        assert_eq!(result.sensor_observations.len(), 1);
        assert_eq!(result.sensor_observations[0].sensor_id, sensor_id);
        assert_eq!(result.sensor_observations[0].points, vec![point]);

        peer.remove_sensor(sensor_id).await.unwrap();
        assert_eq!(harness.with_world(|w| w.sensor_count()).await, 0);

        drop(peer);
        harness.shutdown().await;
    }

    /// Lost world session: the step fails fatally and every later step is refused
    #[tokio::test]
    async fn test_e2e_fatal_step_stops_co_simulation() {
        let harness = Harness::start(EngineSettings::default(), WireFormat::Json).await;
        let mut fatal = harness.service.fatal_signal();
        harness.with_world(|w| w.disconnect()).await;

        let mut peer = harness.peer().await;
        let err = peer.simulation_step().await.unwrap_err();
        assert!(err.is_fatal());

        tokio::time::timeout(Duration::from_secs(1), fatal.wait_for(|r| r.is_some()))
            .await
            .unwrap()
            .unwrap();
        assert!(harness.service.is_stopped());

        let err = peer.simulation_step().await.unwrap_err();
        assert!(matches!(err, TransportError::Remote { fatal: true, .. }));

        let summary = harness.service.stats_summary();
        assert_eq!(summary.failed_ticks, 1);

        drop(peer);
        harness.shutdown().await;
    }

    /// Checked-in configuration files load and validate
    #[test]
    fn test_shipped_config_loads() {
        let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let config: BridgeConfig =
            config_loader::ConfigLoader::load_from_path(&root.join("config/bridge.toml"))
                .unwrap();
        let catalog = config_loader::CatalogLoader::load_from_path(&root.join("data/vtypes.json"))
            .unwrap();

        assert_eq!(config.sync.control_devices, ControlAuthority::None);
        assert!(catalog.contains("vehicle.audi.a2"));
        assert_eq!(catalog.class_of("vehicle.yamaha.yzf"), Some(VehicleClass::Motorcycle));
    }
}
