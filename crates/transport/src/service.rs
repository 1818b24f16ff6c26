//! LinkService: dispatches link requests onto the engine and the link table
//!
//! Entity and control-device pushes only touch the [`TrafficLink`] table;
//! ticks and sensor calls go through the engine lock. A fatal tick stops the
//! service and is broadcast on the fatal channel.
//!
//! The engine lock covers a whole tick, since each step mutates both adapters
//! and the cross-reference maps in a fixed order. `AddSensor` and
//! `RemoveSensor` therefore queue behind a running step. Entity pushes,
//! lookups and sensor observations never take the engine lock: the link
//! table and the pending step result carry their own per-entry locks.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Instant;

use adapters::{TrafficAdapter, TrafficLink};
use contracts::{AdapterError, ControlDeviceDescriptor, EngineAdapter, SensorHost};
use metrics::counter;
use observability::{TickStatsAggregator, TickSummary};
use sync_engine::SynchronizationEngine;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, instrument, warn};

use crate::protocol::{LinkRequest, LinkResponse};

/// Engine driven by the link: traffic side is always the pushed link table
pub type LinkedEngine<W> = SynchronizationEngine<TrafficAdapter, W>;

pub struct LinkService<W> {
    engine: Arc<Mutex<LinkedEngine<W>>>,
    link: TrafficLink,
    stats: StdMutex<TickStatsAggregator>,
    fatal: watch::Sender<Option<String>>,
}

impl<W> LinkService<W>
where
    W: EngineAdapter + SensorHost + Send + Sync + 'static,
{
    pub fn new(engine: LinkedEngine<W>) -> Self {
        let link = engine.traffic().link().clone();
        let (fatal, _) = watch::channel(None);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            link,
            stats: StdMutex::new(TickStatsAggregator::new()),
            fatal,
        }
    }

    /// Shared engine handle, e.g. for shutdown cleanup
    pub fn engine(&self) -> Arc<Mutex<LinkedEngine<W>>> {
        Arc::clone(&self.engine)
    }

    pub fn link(&self) -> &TrafficLink {
        &self.link
    }

    /// Resolves with the reason once a tick failed fatally
    pub fn fatal_signal(&self) -> watch::Receiver<Option<String>> {
        self.fatal.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        self.fatal.borrow().is_some()
    }

    /// Why the service stopped, if it did
    pub fn fatal_reason(&self) -> Option<String> {
        self.fatal.borrow().clone()
    }

    pub fn stats_summary(&self) -> TickSummary {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary()
    }

    #[instrument(name = "link_service_handle", skip(self, request), fields(kind = request.kind()))]
    pub async fn handle(&self, request: LinkRequest) -> LinkResponse {
        counter!("cosim_bridge_link_requests_total", "kind" => request.kind()).increment(1);

        match request {
            LinkRequest::SimulationStep => self.simulation_step().await,

            LinkRequest::AddEntity(descriptor) => {
                debug!(id = %descriptor.id, type_id = %descriptor.type_id, "entity departed");
                self.link.add_entity(descriptor);
                LinkResponse::Ack
            }
            LinkRequest::RemoveEntity(descriptor) => {
                if !self.link.remove_entity(&descriptor.id) {
                    debug!(id = %descriptor.id, "remove of unknown entity");
                }
                LinkResponse::Ack
            }
            LinkRequest::UpdateEntity(descriptor) => {
                self.link.update_entity(descriptor);
                LinkResponse::Ack
            }
            LinkRequest::GetEntity { id } => LinkResponse::Entity(self.link.entity(&id)),

            LinkRequest::GetControlDevice { landmark_id } => {
                let device = self
                    .link
                    .control_device(&landmark_id)
                    .map(|phase| ControlDeviceDescriptor { landmark_id, phase });
                LinkResponse::ControlDevice(device)
            }
            LinkRequest::ListControlDeviceIds => {
                LinkResponse::ControlDeviceIds(self.link.control_device_ids().into_iter().collect())
            }
            LinkRequest::UpdateControlDevice(device) => {
                self.link.update_control_device(device);
                LinkResponse::Ack
            }

            LinkRequest::AddSensor(descriptor) => {
                let mut engine = self.engine.lock().await;
                match engine.attach_sensor(descriptor).await {
                    Ok(resolved) => LinkResponse::Sensor(resolved),
                    Err(AdapterError::SensorRejected { message }) => {
                        warn!(message = %message, "sensor rejected");
                        LinkResponse::SensorRejected { message }
                    }
                    Err(e) => LinkResponse::Error {
                        fatal: e.is_fatal(),
                        message: e.to_string(),
                    },
                }
            }
            LinkRequest::RemoveSensor { sensor_id } => {
                let mut engine = self.engine.lock().await;
                match engine.detach_sensor(&sensor_id).await {
                    Ok(true) => {}
                    Ok(false) => debug!(sensor_id = %sensor_id, "remove of unknown sensor"),
                    Err(e) => warn!(sensor_id = %sensor_id, error = %e, "sensor removal failed"),
                }
                LinkResponse::Ack
            }
        }
    }

    async fn simulation_step(&self) -> LinkResponse {
        if let Some(reason) = self.fatal_reason() {
            return LinkResponse::Error {
                message: reason,
                fatal: true,
            };
        }

        let started = Instant::now();
        let outcome = self.engine.lock().await.tick().await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(result) => {
                stats.update(&result, elapsed_ms);
                LinkResponse::Step(result)
            }
            Err(e) => {
                stats.record_failure();
                let message = e.to_string();
                let fatal = e.is_fatal();
                if fatal {
                    error!(error = %message, "simulation step failed, stopping co-simulation");
                    self.fatal.send_replace(Some(message.clone()));
                } else {
                    warn!(error = %message, "simulation step failed");
                }
                LinkResponse::Error { message, fatal }
            }
        }
    }
}
