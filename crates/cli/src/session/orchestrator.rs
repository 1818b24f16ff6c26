//! Bridge session orchestration
//!
//! Startup order: catalog, world engine, landmark file, engine, step link.
//! Shutdown (interrupt or fatal step) always destroys mirrors before the
//! engine sessions are released.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "real-carla")]
use adapters::CarlaWorld;
use adapters::{InMemoryWorld, TrafficAdapter, TrafficLink, WorldAdapter, WorldClient};
use config_loader::CatalogLoader;
use contracts::{BridgeConfig, VehicleCatalog};
use sync_engine::{
    correlate_landmarks, write_landmark_mapping, CandidatePicker, ClassResolver, EngineSettings,
    RandomPicker, SyncError, SynchronizationEngine,
};
use tracing::{info, instrument, warn};
use transport::{LinkServer, LinkService};

use super::SessionOutcome;
use crate::error::{CliError, Result};

/// A started bridge: engines connected, step link bound
pub struct BridgeSession<C: WorldClient> {
    service: Arc<LinkService<WorldAdapter<C>>>,
    server: LinkServer,
    landmark_groups: usize,
}

impl BridgeSession<InMemoryWorld> {
    /// Run against an in-memory world offering every type of the class table
    pub async fn start_offline(config: &BridgeConfig, metrics_port: Option<u16>) -> Result<Self> {
        Self::start(config, metrics_port, |catalog| {
            InMemoryWorld::new().with_blueprints(catalog.iter().map(|(id, _)| id.to_string()))
        })
        .await
    }
}

#[cfg(feature = "real-carla")]
impl BridgeSession<CarlaWorld> {
    /// Run against the CARLA server named in `config.world`
    pub async fn start_engine(config: &BridgeConfig, metrics_port: Option<u16>) -> Result<Self> {
        Self::start(config, metrics_port, |_| CarlaWorld::new()).await
    }
}

impl<C: WorldClient + 'static> BridgeSession<C> {
    /// Connect both sides and bind the step link
    #[instrument(
        name = "bridge_session_start",
        skip(config, make_client),
        fields(world = %format!("{}:{}", config.world.host, config.world.port))
    )]
    pub async fn start<F>(
        config: &BridgeConfig,
        metrics_port: Option<u16>,
        make_client: F,
    ) -> Result<Self>
    where
        F: FnOnce(&VehicleCatalog) -> C,
    {
        if let Some(port) = metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let catalog = CatalogLoader::load_from_path(&config.catalog.vehicle_types)?;
        info!(
            path = %config.catalog.vehicle_types.display(),
            classes = catalog.len(),
            "Vehicle-class table loaded"
        );

        let client = make_client(&catalog);
        let world = WorldAdapter::connect(
            client,
            &config.world.host,
            config.world.port,
            config.sync.step_length,
        )
        .await
        .map_err(|e| CliError::world_connection(&config.world.host, config.world.port, e.to_string()))?;
        info!(map = %config.world.map, "Connected to world engine");

        let lights = world.traffic_lights().await.map_err(SyncError::from)?;
        let mapping = correlate_landmarks(&lights, &config.traffic.net_offset);
        write_landmark_mapping(&config.catalog.landmark_mapping, &mapping)?;

        let world_classes = world.vehicle_blueprints().await.map_err(SyncError::from)?;
        let picker: Box<dyn CandidatePicker> = match config.catalog.seed {
            Some(seed) => Box::new(RandomPicker::seeded(seed)),
            None => Box::new(RandomPicker::from_entropy()),
        };
        let resolver = ClassResolver::new(catalog, world_classes, picker);

        let traffic = TrafficAdapter::new(TrafficLink::new());
        let mut engine =
            SynchronizationEngine::new(traffic, world, resolver, EngineSettings::from(config));
        engine.initialize().await?;

        let addr = format!("{}:{}", config.link.listen_host, config.link.listen_port);
        let server = LinkServer::bind(&addr, config.link.format, config.link.max_workers).await?;

        Ok(Self {
            service: Arc::new(LinkService::new(engine)),
            server,
            landmark_groups: mapping.groups.len(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.local_addr()?)
    }

    /// Serve the traffic peer until `shutdown` resolves or a step fails fatally
    #[instrument(name = "bridge_session_run", skip_all)]
    pub async fn run<F>(self, shutdown: F) -> Result<SessionOutcome>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let mut fatal = self.service.fatal_signal();
        let stop = async move {
            tokio::select! {
                _ = shutdown => info!("Shutdown requested"),
                _ = fatal.wait_for(|reason| reason.is_some()) => {
                    warn!("Fatal step failure, shutting down");
                }
            }
        };

        info!("Waiting for the traffic peer...");
        self.server.serve(Arc::clone(&self.service), stop).await?;

        let engine = self.service.engine();
        let mut engine = engine.lock().await;
        if let Err(e) = engine.close().await {
            warn!(error = %e, "Cleanup incomplete");
        }

        Ok(SessionOutcome {
            summary: self.service.stats_summary(),
            fatal: self.service.fatal_reason(),
            duration: started.elapsed(),
            landmark_groups: self.landmark_groups,
        })
    }
}
