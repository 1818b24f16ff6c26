//! LinkServer - TCP step endpoint
//!
//! Each connection is served on its own task; at most `max_workers`
//! connections are served at once, further peers wait in the accept queue.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use contracts::{EngineAdapter, SensorHost, WireFormat};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::codec::{read_frame, write_frame};
use crate::error::{Result, TransportError};
use crate::protocol::{LinkRequest, LinkResponse};
use crate::service::LinkService;

/// Bound listener waiting to serve
pub struct LinkServer {
    listener: TcpListener,
    format: WireFormat,
    max_workers: usize,
}

impl LinkServer {
    #[instrument(name = "link_server_bind", skip(addr), fields(addr = %addr))]
    pub async fn bind(addr: &str, format: WireFormat, max_workers: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(
            local_addr = %listener.local_addr()?,
            ?format,
            max_workers,
            "step link listening"
        );
        Ok(Self {
            listener,
            format,
            max_workers: max_workers.max(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve connections until `shutdown` resolves
    ///
    /// Open connections are aborted on shutdown.
    #[instrument(name = "link_server_serve", skip_all, fields(max_workers = self.max_workers))]
    pub async fn serve<W, F>(self, service: Arc<LinkService<W>>, shutdown: F) -> Result<()>
    where
        W: EngineAdapter + SensorHost + Send + Sync + 'static,
        F: Future<Output = ()>,
    {
        let workers = Arc::new(Semaphore::new(self.max_workers));
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&workers).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };

            debug!(peer = %peer, "peer connected");
            let service = Arc::clone(&service);
            let format = self.format;
            connections.spawn(async move {
                if let Err(e) = serve_connection(stream, service, format).await {
                    warn!(peer = %peer, error = %e, "connection ended with error");
                }
                debug!(peer = %peer, "peer disconnected");
                drop(permit);
            });

            // 回收已结束的连接任务
            while let Some(joined) = connections.try_join_next() {
                if let Err(e) = joined {
                    error!(error = ?e, "connection task panicked");
                }
            }
        }

        info!(open = connections.len(), "step link shutting down");
        connections.shutdown().await;
        Ok(())
    }
}

/// Request/response loop of one peer
async fn serve_connection<W>(
    mut stream: TcpStream,
    service: Arc<LinkService<W>>,
    format: WireFormat,
) -> Result<()>
where
    W: EngineAdapter + SensorHost + Send + Sync + 'static,
{
    stream.set_nodelay(true)?;

    loop {
        let request: LinkRequest = match read_frame(&mut stream, format).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(TransportError::Codec { message }) => {
                // 格式错误的请求不关闭连接
                debug!(message = %message, "malformed request");
                let response = LinkResponse::Error {
                    message: format!("malformed request: {message}"),
                    fatal: false,
                };
                write_frame(&mut stream, &response, format).await?;
                continue;
            }
            Err(e) => return Err(e),
        };

        let response = service.handle(request).await;
        write_frame(&mut stream, &response, format).await?;
    }
}
