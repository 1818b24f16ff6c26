//! LinkClient - the traffic peer's side of the step link

use std::net::SocketAddr;

use contracts::{
    ControlDeviceDescriptor, EntityDescriptor, SensorDescriptor, StepResult, WireFormat,
};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, instrument};

use crate::codec::{read_frame, write_frame};
use crate::error::{Result, TransportError};
use crate::protocol::{LinkRequest, LinkResponse};

/// One connection, calls are strictly sequential
pub struct LinkClient {
    stream: TcpStream,
    format: WireFormat,
}

impl LinkClient {
    #[instrument(name = "link_client_connect", skip(addr))]
    pub async fn connect(addr: impl ToSocketAddrs, format: WireFormat) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "connected to step link");
        Ok(Self { stream, format })
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Send one request and wait for its response
    ///
    /// Error responses are turned into [`TransportError::Remote`].
    pub async fn call(&mut self, request: &LinkRequest) -> Result<LinkResponse> {
        write_frame(&mut self.stream, request, self.format).await?;
        match read_frame(&mut self.stream, self.format).await? {
            Some(LinkResponse::Error { message, fatal }) => {
                Err(TransportError::Remote { message, fatal })
            }
            Some(response) => Ok(response),
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn ack(&mut self, request: &LinkRequest) -> Result<()> {
        match self.call(request).await? {
            LinkResponse::Ack => Ok(()),
            _ => Err(TransportError::UnexpectedResponse { expected: "Ack" }),
        }
    }

    /// Block until the bridge finished this step's reconciliation
    pub async fn simulation_step(&mut self) -> Result<StepResult> {
        match self.call(&LinkRequest::SimulationStep).await? {
            LinkResponse::Step(result) => Ok(result),
            _ => Err(TransportError::UnexpectedResponse { expected: "Step" }),
        }
    }

    pub async fn add_entity(&mut self, descriptor: EntityDescriptor) -> Result<()> {
        self.ack(&LinkRequest::AddEntity(descriptor)).await
    }

    pub async fn remove_entity(&mut self, descriptor: EntityDescriptor) -> Result<()> {
        self.ack(&LinkRequest::RemoveEntity(descriptor)).await
    }

    pub async fn update_entity(&mut self, descriptor: EntityDescriptor) -> Result<()> {
        self.ack(&LinkRequest::UpdateEntity(descriptor)).await
    }

    pub async fn get_entity(&mut self, id: impl Into<String>) -> Result<Option<EntityDescriptor>> {
        match self.call(&LinkRequest::GetEntity { id: id.into() }).await? {
            LinkResponse::Entity(entity) => Ok(entity),
            _ => Err(TransportError::UnexpectedResponse { expected: "Entity" }),
        }
    }

    pub async fn get_control_device(
        &mut self,
        landmark_id: impl Into<String>,
    ) -> Result<Option<ControlDeviceDescriptor>> {
        let request = LinkRequest::GetControlDevice {
            landmark_id: landmark_id.into(),
        };
        match self.call(&request).await? {
            LinkResponse::ControlDevice(device) => Ok(device),
            _ => Err(TransportError::UnexpectedResponse {
                expected: "ControlDevice",
            }),
        }
    }

    pub async fn list_control_device_ids(&mut self) -> Result<Vec<String>> {
        match self.call(&LinkRequest::ListControlDeviceIds).await? {
            LinkResponse::ControlDeviceIds(ids) => Ok(ids),
            _ => Err(TransportError::UnexpectedResponse {
                expected: "ControlDeviceIds",
            }),
        }
    }

    pub async fn update_control_device(&mut self, device: ControlDeviceDescriptor) -> Result<()> {
        self.ack(&LinkRequest::UpdateControlDevice(device)).await
    }

    /// Attach a sensor; the reply carries the assigned ID and resolved defaults
    pub async fn add_sensor(&mut self, descriptor: SensorDescriptor) -> Result<SensorDescriptor> {
        match self.call(&LinkRequest::AddSensor(descriptor)).await? {
            LinkResponse::Sensor(resolved) => Ok(resolved),
            LinkResponse::SensorRejected { message } => Err(TransportError::Rejected { message }),
            _ => Err(TransportError::UnexpectedResponse { expected: "Sensor" }),
        }
    }

    pub async fn remove_sensor(&mut self, sensor_id: impl Into<String>) -> Result<()> {
        self.ack(&LinkRequest::RemoveSensor {
            sensor_id: sensor_id.into(),
        })
        .await
    }
}
