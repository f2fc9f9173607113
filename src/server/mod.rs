// Query server: exposes ArticleServices to the web layer over a Unix socket

mod ipc;
mod signals;

pub use ipc::{read_message, write_response, IpcClient, IpcMessage, IpcResponse, IpcServer};
pub use signals::{SignalAction, SignalHandler};

use crate::error::{ArticleCraftError, Result};
use crate::service::ArticleServices;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UnixStream;
use tokio::sync::{watch, Semaphore};
use tokio::task;

pub struct QueryServer {
    services: Arc<ArticleServices>,
    socket_path: PathBuf,
    max_connections: usize,
}

impl QueryServer {
    pub fn new(services: Arc<ArticleServices>, socket_path: PathBuf, max_connections: usize) -> Self {
        Self {
            services,
            socket_path,
            max_connections: max_connections.max(1),
        }
    }

    /// Serve until SIGTERM, SIGINT, SIGHUP or a `stop` request; SIGUSR1 reloads
    pub async fn run(self) -> Result<()> {
        let mut signal_handler = SignalHandler::new()?;
        let services = self.services.clone();

        let signals = async move {
            loop {
                match signal_handler.wait().await {
                    SignalAction::Shutdown => break,
                    SignalAction::Reload => {
                        let services = services.clone();
                        let availability =
                            task::spawn_blocking(move || services.initialize()).await;
                        if let Err(e) = availability {
                            tracing::error!("Reload failed: {}", e);
                        }
                    }
                }
            }
        };

        self.run_until(signals).await
    }

    /// Serve until `shutdown` completes or a client sends `stop`
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut server = IpcServer::new(self.socket_path.clone());
        server.bind().await?;

        let permits = Arc::new(Semaphore::new(self.max_connections));
        let (stop_tx, mut stop_rx) = watch::channel(false);
        tokio::pin!(shutdown);

        tracing::info!("Query server started");

        loop {
            tokio::select! {
                accepted = server.accept() => {
                    let stream = match accepted {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::error!("Accept failed: {}", e);
                            continue;
                        }
                    };

                    let permit = match permits.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!("Connection limit reached; rejecting client");
                            task::spawn(reject_busy(stream));
                            continue;
                        }
                    };

                    let services = self.services.clone();
                    let stop_tx = stop_tx.clone();
                    task::spawn(async move {
                        if let Err(e) = handle_client(stream, services, stop_tx).await {
                            tracing::error!("Client handler error: {}", e);
                        }
                        drop(permit);
                    });
                }

                _ = stop_rx.changed() => {
                    tracing::info!("Stop requested by client");
                    break;
                }

                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        server.shutdown()?;
        tracing::info!("Query server stopped");
        Ok(())
    }
}

async fn reject_busy(mut stream: UnixStream) {
    let response = IpcResponse::error("Server busy");
    if let Err(e) = write_response(&mut stream, &response).await {
        tracing::debug!("Failed to notify rejected client: {}", e);
    }
}

async fn handle_client(
    mut stream: UnixStream,
    services: Arc<ArticleServices>,
    stop_tx: watch::Sender<bool>,
) -> Result<()> {
    let message = read_message(&mut stream).await?;
    tracing::debug!("Received request: {:?}", message);

    let stop = matches!(message, IpcMessage::Stop);
    let response = handle_message(&services, message).await;
    write_response(&mut stream, &response).await?;

    if stop {
        let _ = stop_tx.send(true);
    }
    Ok(())
}

/// Dispatch one request against the services
pub async fn handle_message(services: &Arc<ArticleServices>, message: IpcMessage) -> IpcResponse {
    let outcome = match message {
        IpcMessage::Recommend { query, top_k } => {
            let services = services.clone();
            blocking(move || services.recommend(&query, top_k)).await
        }
        IpcMessage::Similar { title, top_k } => {
            let services = services.clone();
            blocking(move || services.recommend_by_existing_title(&title, top_k)).await
        }
        IpcMessage::Generate { title, num_similar } => services
            .generate_article(&title, num_similar)
            .await
            .and_then(to_value),
        IpcMessage::Status => to_value(services.availability()),
        IpcMessage::Reload => {
            let services = services.clone();
            task::spawn_blocking(move || services.initialize())
                .await
                .map_err(|e| ArticleCraftError::Server(format!("Reload task failed: {}", e)))
                .and_then(to_value)
        }
        IpcMessage::Stop => return IpcResponse::success("Stopping"),
    };

    match outcome {
        Ok(data) => IpcResponse::success_with_data(data),
        Err(e) => {
            tracing::debug!("Request failed: {}", e);
            IpcResponse::from_error(&e)
        }
    }
}

/// Run a CPU-bound query off the async workers
async fn blocking<T, F>(f: F) -> Result<serde_json::Value>
where
    T: serde::Serialize + Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| ArticleCraftError::Server(format!("Query task failed: {}", e)))?
        .and_then(to_value)
}

fn to_value<T: serde::Serialize>(value: T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ArticleCraftError::json(e, "Failed to encode response"))
}
