// Query socket: Unix domain socket carrying length-prefixed JSON

use crate::error::{ArticleCraftError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

/// Maximum message size (10MB)
const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024;

/// Requests from the web layer or the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IpcMessage {
    /// Articles similar to free text
    Recommend {
        query: String,
        #[serde(default)]
        top_k: Option<usize>,
    },
    /// Articles similar to an existing article
    Similar {
        title: String,
        #[serde(default)]
        top_k: Option<usize>,
    },
    /// Generate an article for a new title
    Generate {
        title: String,
        #[serde(default)]
        num_similar: Option<usize>,
    },
    /// Capability report
    Status,
    /// Reload persisted artifacts
    Reload,
    /// Stop the server
    Stop,
}

/// Reply to one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error code such as `not_found` or `index_unavailable`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl IpcResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            kind: None,
            data: None,
        }
    }

    pub fn success_with_data(data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: None,
            kind: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            kind: None,
            data: None,
        }
    }

    pub fn from_error(error: &ArticleCraftError) -> Self {
        Self {
            kind: Some(error.kind().to_string()),
            ..Self::error(error.to_string())
        }
    }
}

pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            listener: None,
        }
    }

    /// Bind to the socket path, replacing a stale socket file
    pub async fn bind(&mut self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| {
                ArticleCraftError::io(
                    e,
                    format!("Failed to remove existing socket: {:?}", self.socket_path),
                )
            })?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ArticleCraftError::io(e, format!("Failed to create socket directory: {:?}", parent))
            })?;
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| {
            ArticleCraftError::io(e, format!("Failed to bind to socket: {:?}", self.socket_path))
        })?;
        self.listener = Some(listener);

        tracing::info!("Query server listening on {:?}", self.socket_path);
        Ok(())
    }

    pub async fn accept(&self) -> Result<UnixStream> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| ArticleCraftError::Server("Server not bound".to_string()))?;

        let (stream, _addr) = listener
            .accept()
            .await
            .map_err(|e| ArticleCraftError::io(e, "Failed to accept connection"))?;
        Ok(stream)
    }

    /// Remove the socket file
    pub fn shutdown(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| {
                ArticleCraftError::io(e, format!("Failed to remove socket: {:?}", self.socket_path))
            })?;
        }
        Ok(())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S, what: &str) -> Result<Vec<u8>> {
    let length = stream
        .read_u32()
        .await
        .map_err(|e| ArticleCraftError::io(e, format!("Failed to read {} length", what)))?;

    if length > MAX_MESSAGE_SIZE {
        return Err(ArticleCraftError::Server(format!(
            "{} too large: {} bytes (max: {})",
            what, length, MAX_MESSAGE_SIZE
        )));
    }

    let mut buffer = vec![0u8; length as usize];
    stream
        .read_exact(&mut buffer)
        .await
        .map_err(|e| ArticleCraftError::io(e, format!("Failed to read {} payload", what)))?;
    Ok(buffer)
}

async fn write_frame<S: AsyncWrite + Unpin>(stream: &mut S, payload: &[u8], what: &str) -> Result<()> {
    if payload.len() > MAX_MESSAGE_SIZE as usize {
        return Err(ArticleCraftError::Server(format!(
            "{} too large: {} bytes (max: {})",
            what,
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    // 4-byte big-endian length prefix
    stream
        .write_u32(payload.len() as u32)
        .await
        .map_err(|e| ArticleCraftError::io(e, format!("Failed to write {} length", what)))?;
    stream
        .write_all(payload)
        .await
        .map_err(|e| ArticleCraftError::io(e, format!("Failed to write {} payload", what)))?;
    stream
        .flush()
        .await
        .map_err(|e| ArticleCraftError::io(e, format!("Failed to flush {}", what)))?;
    Ok(())
}

pub async fn read_message<S: AsyncRead + Unpin>(stream: &mut S) -> Result<IpcMessage> {
    let buffer = read_frame(stream, "message").await?;
    serde_json::from_slice(&buffer)
        .map_err(|e| ArticleCraftError::json(e, "Failed to deserialize request"))
}

pub async fn write_response<S: AsyncWrite + Unpin>(
    stream: &mut S,
    response: &IpcResponse,
) -> Result<()> {
    let payload = serde_json::to_vec(response)
        .map_err(|e| ArticleCraftError::json(e, "Failed to serialize response"))?;
    write_frame(stream, &payload, "response").await
}

/// Client for the query socket
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Send one request and wait for its response
    pub async fn send(&self, message: &IpcMessage) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            ArticleCraftError::io(
                e,
                format!("Failed to connect to server at {:?}", self.socket_path),
            )
        })?;

        let payload = serde_json::to_vec(message)
            .map_err(|e| ArticleCraftError::json(e, "Failed to serialize request"))?;
        write_frame(&mut stream, &payload, "message").await?;

        let buffer = read_frame(&mut stream, "response").await?;
        serde_json::from_slice(&buffer)
            .map_err(|e| ArticleCraftError::json(e, "Failed to deserialize response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let json = r#"{"type":"similar","title":"Cats"}"#;
        let message: IpcMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            message,
            IpcMessage::Similar {
                title: "Cats".to_string(),
                top_k: None
            }
        );

        let status = serde_json::to_string(&IpcMessage::Status).unwrap();
        assert_eq!(status, r#"{"type":"status"}"#);
    }

    #[test]
    fn test_error_response_carries_kind() {
        let error = ArticleCraftError::NotFound {
            what: "title",
            key: "Z".to_string(),
        };
        let response = IpcResponse::from_error(&error);
        assert!(!response.success);
        assert_eq!(response.kind.as_deref(), Some("not_found"));
    }

    #[tokio::test]
    async fn test_frame_roundtrip_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let response = IpcResponse::success("pong");

        write_response(&mut server, &response).await.unwrap();
        let buffer = read_frame(&mut client, "response").await.unwrap();
        let decoded: IpcResponse = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(decoded.message.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_u32(MAX_MESSAGE_SIZE + 1).await.unwrap();
        assert!(read_message(&mut client).await.is_err());
    }
}
