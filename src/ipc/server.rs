//! IPC Server - Unix socket server for local clients
//!
//! Handles incoming connections and dispatches commands to the bridge.

use anyhow::{Context, Result};
use base64::Engine;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use crate::bridge::{Bridge, BridgeError};
use crate::ipc::protocol::{
    parse_command, serialize_response, CacheStats, Command, MappingInfo, Response,
    PROTOCOL_VERSION,
};
use crate::mapping::paths;

/// IPC Server that listens for commands from local clients
pub struct IpcServer {
    bridge: Arc<Bridge>,
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    /// Active connections counter
    connection_count: Arc<AtomicU32>,
}

impl IpcServer {
    pub fn new(bridge: Arc<Bridge>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            bridge,
            socket_path: socket_path.into(),
            listener: None,
            connection_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket, replacing a stale socket file
    pub async fn start(&mut self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .context("Failed to remove existing socket file")?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind {}", self.socket_path.display()))?;

        info!(socket_path = %self.socket_path.display(), "IPC server started");

        self.listener = Some(listener);
        Ok(())
    }

    /// Run the server loop, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("Server not started")?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let bridge = Arc::clone(&self.bridge);
                    let connection_count = Arc::clone(&self.connection_count);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, bridge, connection_count).await
                        {
                            error!(error = %e, "Connection handler error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Remove the socket file
    pub async fn stop(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).context("Failed to remove socket file")?;
        }
        info!("IPC server stopped");
        Ok(())
    }
}

async fn handle_connection(
    stream: UnixStream,
    bridge: Arc<Bridge>,
    connection_count: Arc<AtomicU32>,
) -> Result<()> {
    let count = connection_count.fetch_add(1, Ordering::Relaxed) + 1;
    debug!(count = count, "New connection");

    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Connection closed by client");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let response = match parse_command(trimmed.as_bytes()) {
                    Ok(command) => process_command(command, &bridge).await,
                    Err(e) => {
                        warn!(error = %e, "Failed to parse command");
                        error_response(format!("Invalid command: {}", e), false)
                    }
                };

                match serialize_response(&response) {
                    Ok(json) => {
                        if let Err(e) = writer.write_all(&json).await {
                            error!(error = %e, "Failed to write response");
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to serialize response");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to read from socket");
                break;
            }
        }
    }

    let count = connection_count.fetch_sub(1, Ordering::Relaxed) - 1;
    debug!(count = count, "Connection ended");

    Ok(())
}

fn error_response(error: String, not_found: bool) -> Response {
    Response::Error { error, not_found }
}

fn bridge_error(e: BridgeError) -> Response {
    error_response(e.to_string(), e.is_not_found())
}

/// Process a command and return a response
pub(crate) async fn process_command(command: Command, bridge: &Bridge) -> Response {
    match command {
        Command::Sync { dir } => {
            let target = paths::normalize(dir.as_deref().unwrap_or(&bridge.settings().sync_root));
            info!(dir = %target, "Processing sync command");

            match bridge.sync_directory(Some(&target)).await {
                Ok(report) => Response::Synced {
                    dir: target,
                    synced: report.synced,
                    skipped: report.skipped,
                    errors: report.errors,
                },
                Err(e) => bridge_error(e),
            }
        }

        Command::Download { path } => {
            debug!(path = %path, "Processing download command");

            match bridge.download(&path).await {
                Ok(file) => Response::File {
                    path: paths::normalize(&path),
                    size: file.bytes.len() as u64,
                    data: base64::engine::general_purpose::STANDARD.encode(&file.bytes),
                    file_name: file.file_name,
                    mime_type: file.mime_type,
                    source: file.source.to_string(),
                },
                Err(e) => bridge_error(e),
            }
        }

        Command::Import(request) => {
            info!(file_name = %request.file_name, "Processing import command");

            match bridge.import_file(&request).await {
                Ok(outcome) => Response::Imported {
                    path: outcome.path,
                    secondary_id: outcome.secondary_id,
                    link: outcome.link,
                    already_present: outcome.already_present,
                },
                Err(e) => bridge_error(e),
            }
        }

        Command::Evict => {
            info!("Processing evict command");

            match bridge.run_eviction_pass().await {
                Ok(report) => Response::Evicted {
                    evicted: report.evicted,
                    errors: report.errors,
                },
                Err(e) => bridge_error(e),
            }
        }

        Command::GetStatus => match bridge.stats() {
            Ok(stats) => Response::Status {
                version: PROTOCOL_VERSION,
                healthy: stats.primary_health == "healthy",
                primary_health: stats.primary_health.to_string(),
                mappings: stats.mappings,
                cached: stats.cached,
                eviction_running: stats.eviction_running,
                sync_running: stats.sync_running,
                locked_paths: stats.locked_paths,
                file_path_cache: stats.secondary_lookups.map(CacheStats::from),
            },
            Err(e) => error_response(format!("Failed to read status: {}", e), false),
        },

        Command::ListMappings { limit, offset } => {
            let store = bridge.store();
            let listed = store.count().and_then(|total| {
                store
                    .list(limit, offset)
                    .map(|rows| (total, rows.iter().map(MappingInfo::from).collect::<Vec<_>>()))
            });
            match listed {
                Ok((total, mappings)) => Response::Mappings { total, mappings },
                Err(e) => error_response(format!("Failed to list mappings: {}", e), false),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::harness;
    use crate::bridge::ImportRequest;

    #[tokio::test]
    async fn test_download_returns_base64_payload() {
        let h = harness();
        h.primary.put("/inbox/a.txt", b"hello", "text/plain");
        h.bridge.sync_directory(Some("/inbox")).await.unwrap();

        let response = process_command(
            Command::Download {
                path: "/inbox/a.txt".to_string(),
            },
            &h.bridge,
        )
        .await;
        match response {
            Response::File {
                data,
                size,
                source,
                ..
            } => {
                assert_eq!(data, "aGVsbG8=");
                assert_eq!(size, 5);
                assert_eq!(source, "primary");
            }
            other => panic!("Expected File response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_path_flags_not_found() {
        let h = harness();
        let response = process_command(
            Command::Download {
                path: "/missing".to_string(),
            },
            &h.bridge,
        )
        .await;
        assert!(matches!(response, Response::Error { not_found: true, .. }));
    }

    #[tokio::test]
    async fn test_import_then_list() {
        let h = harness();
        h.secondary.put("tg-1", b"doc", "application/pdf");
        let request = ImportRequest {
            secondary_id: "tg-1".to_string(),
            secondary_ref: None,
            file_name: "a.pdf".to_string(),
            mime_type: None,
            file_size: None,
        };
        let response = process_command(Command::Import(request), &h.bridge).await;
        assert!(matches!(
            response,
            Response::Imported {
                already_present: false,
                ..
            }
        ));

        let response = process_command(
            Command::ListMappings {
                limit: 10,
                offset: 0,
            },
            &h.bridge,
        )
        .await;
        match response {
            Response::Mappings { total, mappings } => {
                assert_eq!(total, 1);
                assert_eq!(mappings[0].path, "/inbox/a.pdf");
            }
            other => panic!("Expected Mappings response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_reports_counts() {
        let h = harness();
        let response = process_command(Command::GetStatus, &h.bridge).await;
        match response {
            Response::Status {
                healthy, mappings, ..
            } => {
                assert!(healthy);
                assert_eq!(mappings, 0);
            }
            other => panic!("Expected Status response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_socket_round_trip() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("bridge.sock");

        let mut server = IpcServer::new(Arc::new(h.bridge), &socket);
        server.start().await.unwrap();
        let server = Arc::new(server);
        let running = Arc::clone(&server);
        let task = tokio::spawn(async move { running.run().await });

        let stream = UnixStream::connect(&socket).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{\"type\":\"getStatus\"}\n").await.unwrap();
        let mut reply = String::new();
        BufReader::new(reader).read_line(&mut reply).await.unwrap();
        assert!(reply.contains(r#""type":"status""#));

        task.abort();
        server.stop().await.unwrap();
        assert!(!socket.exists());
    }
}
