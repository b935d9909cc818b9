//! tierbridge daemon - cache proxy between a B2 bucket and a Telegram archive
//!
//! Files live durably in a Telegram chat; the B2 bucket holds browsable,
//! shareable copies that are evicted when idle and restored on demand.

mod b2;
mod bridge;
mod config;
mod ipc;
mod mapping;
mod remote;
mod scheduler;
mod telegram;

use anyhow::{anyhow, Context as _, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use b2::B2Client;
use bridge::{Bridge, Context, ImportRequest};
use config::Config;
use ipc::IpcServer;
use mapping::MappingStore;
use remote::{PrimaryStore, SecondaryStore};
use scheduler::Scheduler;
use telegram::TelegramClient;

/// CLI command
#[derive(Debug)]
enum Command {
    /// Run the IPC server and scheduler (default)
    Serve,
    /// Back up one directory and exit
    Sync { dir: Option<String> },
    /// Run one eviction pass and exit
    Evict,
    /// Import a file from the secondary store
    Import {
        secondary_id: String,
        file_name: String,
        mime_type: Option<String>,
    },
    /// Download a logical path to a local file
    Get { path: String, output: PathBuf },
    /// List mappings from the local database
    List { limit: u32 },
    Help,
}

fn print_help() {
    eprintln!(
        r#"tierbridge daemon - keep a B2 bucket and a Telegram archive in sync

USAGE:
    tierbridge-daemon                                # Run daemon (default)
    tierbridge-daemon serve
    tierbridge-daemon sync [dir]
    tierbridge-daemon evict
    tierbridge-daemon import <file_id> <file_name> [mime_type]
    tierbridge-daemon get <path> <output_file>
    tierbridge-daemon list [limit]
    tierbridge-daemon help

COMMANDS:
    serve   Run the IPC server with scheduled eviction (and sync, if enabled)
    sync    Back up new files in a bucket directory to Telegram
    evict   Drop idle bucket copies now
    import  Copy a Telegram document into the inbox and print its link
    get     Fetch a file by path, restoring it to the bucket if evicted
    list    Show mappings, newest first
    help    Show this help message

ENVIRONMENT:
    B2_KEY_ID, B2_KEY, B2_BUCKET        B2 credentials (required for network commands)
    B2_PUBLIC_URL                       Share link base URL
    TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID
                                        Telegram archive (required for network commands)
    TELEGRAM_API_URL                    Bot API base URL
    TIERBRIDGE_DB                       Mapping database path
    TIERBRIDGE_INBOX                    Bucket directory for imports (default /inbox)
    TIERBRIDGE_SYNC_DIR                 Directory synced by default (default /)
    TIERBRIDGE_IDLE_SECS                Idle time before eviction (default 604800)
    TIERBRIDGE_EVICT_INTERVAL_SECS      Eviction period (default 86400)
    TIERBRIDGE_SYNC_INTERVAL_SECS       Periodic sync period (unset = off)
    TIERBRIDGE_SOCKET                   IPC socket path (default /tmp/tierbridge.sock)
    RUST_LOG                            Log filter (default info)
"#
    );
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(name) = args.get(1) else {
        return Ok(Command::Serve);
    };

    match name.as_str() {
        "serve" => Ok(Command::Serve),
        "sync" => Ok(Command::Sync {
            dir: args.get(2).cloned(),
        }),
        "evict" => Ok(Command::Evict),
        "import" => {
            if args.len() < 4 {
                return Err(anyhow!(
                    "Usage: tierbridge-daemon import <file_id> <file_name> [mime_type]"
                ));
            }
            Ok(Command::Import {
                secondary_id: args[2].clone(),
                file_name: args[3].clone(),
                mime_type: args.get(4).cloned(),
            })
        }
        "get" => {
            if args.len() < 4 {
                return Err(anyhow!("Usage: tierbridge-daemon get <path> <output_file>"));
            }
            Ok(Command::Get {
                path: args[2].clone(),
                output: PathBuf::from(&args[3]),
            })
        }
        "list" => {
            let limit = match args.get(2) {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("Invalid limit: {}", raw))?,
                None => ipc::protocol::DEFAULT_LIST_LIMIT,
            };
            Ok(Command::List { limit })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(anyhow!("Unknown command: {}", other)),
    }
}

/// Connect both stores and open the mapping database
async fn build_bridge(config: &Config) -> Result<Arc<Bridge>> {
    let b2 = config.b2_credentials()?;
    let primary = B2Client::authorize(b2.key_id, b2.key, b2.bucket, config.b2_public_url.clone())
        .await
        .context("Failed to connect to B2")?;

    let tg = config.telegram_credentials()?;
    let secondary = TelegramClient::connect(tg.api_url, tg.token, tg.chat_id)
        .await
        .context("Failed to connect to Telegram")?;

    let store = MappingStore::open(&config.db_path)
        .with_context(|| format!("Failed to open {}", config.db_path.display()))?;

    let ctx = Context::new(
        Arc::new(store),
        Arc::new(primary) as Arc<dyn PrimaryStore>,
        Arc::new(secondary) as Arc<dyn SecondaryStore>,
    );
    Ok(Arc::new(Bridge::new(ctx, config.bridge_settings())))
}

async fn serve(config: &Config) -> Result<()> {
    info!("Starting tierbridge daemon");
    let bridge = build_bridge(config).await?;

    let mut ipc_server = IpcServer::new(Arc::clone(&bridge), config.socket_path.clone());
    ipc_server.start().await?;
    let ipc_server = Arc::new(ipc_server);

    let scheduler = Scheduler::new(
        Arc::clone(&bridge),
        config.evict_interval,
        config.sync_interval,
    );
    scheduler.start().await;

    info!(socket = %ipc_server.socket_path().display(), "Daemon ready");

    let server = Arc::clone(&ipc_server);
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "IPC server error");
        }
    });

    tokio::signal::ctrl_c().await?;

    info!("Received shutdown signal, stopping background passes...");
    ipc_handle.abort();
    scheduler.stop().await;
    ipc_server.stop().await?;

    info!("Shutdown complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let command = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let config = Config::from_env();

    match command {
        Command::Serve => serve(&config).await?,
        Command::Sync { dir } => {
            let bridge = build_bridge(&config).await?;
            let report = bridge.sync_directory(dir.as_deref()).await?;
            println!(
                "Synced {} file(s), {} already backed up, {} error(s)",
                report.synced, report.skipped, report.errors
            );
        }
        Command::Evict => {
            let bridge = build_bridge(&config).await?;
            let report = bridge.run_eviction_pass().await?;
            println!(
                "Evicted {} file(s), {} error(s)",
                report.evicted, report.errors
            );
        }
        Command::Import {
            secondary_id,
            file_name,
            mime_type,
        } => {
            let bridge = build_bridge(&config).await?;
            let outcome = bridge
                .import_file(&ImportRequest {
                    secondary_id,
                    secondary_ref: None,
                    file_name,
                    mime_type,
                    file_size: None,
                })
                .await?;
            if outcome.already_present {
                println!("Already imported: {}", outcome.path);
            } else {
                println!("Imported: {}", outcome.path);
            }
            println!("{}", outcome.link);
        }
        Command::Get { path, output } => {
            let bridge = build_bridge(&config).await?;
            let file = bridge.download(&path).await?;
            tokio::fs::write(&output, &file.bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "{} ({}, {} bytes, from {}) -> {}",
                file.file_name,
                file.mime_type,
                file.bytes.len(),
                file.source,
                output.display()
            );
        }
        Command::List { limit } => {
            let store = MappingStore::open(&config.db_path)
                .with_context(|| format!("Failed to open {}", config.db_path.display()))?;
            let mappings = store.list(limit, 0)?;
            if mappings.is_empty() {
                println!("No mappings yet.");
            } else {
                println!("Mappings ({} total):", store.count()?);
                for m in mappings {
                    println!(
                        "  {} [{}] {} bytes",
                        m.path,
                        if m.cached { "cached" } else { "evicted" },
                        m.file_size
                    );
                }
            }
        }
        Command::Help => print_help(),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_args_serves() {
        assert!(matches!(parse_args(&args(&["bin"])).unwrap(), Command::Serve));
    }

    #[test]
    fn test_parse_sync_with_and_without_dir() {
        match parse_args(&args(&["bin", "sync", "/photos"])).unwrap() {
            Command::Sync { dir } => assert_eq!(dir.as_deref(), Some("/photos")),
            other => panic!("Expected Sync, got {:?}", other),
        }
        assert!(matches!(
            parse_args(&args(&["bin", "sync"])).unwrap(),
            Command::Sync { dir: None }
        ));
    }

    #[test]
    fn test_parse_import_requires_name() {
        assert!(parse_args(&args(&["bin", "import", "abc"])).is_err());
        match parse_args(&args(&["bin", "import", "abc", "a.pdf", "application/pdf"])).unwrap() {
            Command::Import {
                secondary_id,
                file_name,
                mime_type,
            } => {
                assert_eq!(secondary_id, "abc");
                assert_eq!(file_name, "a.pdf");
                assert_eq!(mime_type.as_deref(), Some("application/pdf"));
            }
            other => panic!("Expected Import, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_limit() {
        assert!(matches!(
            parse_args(&args(&["bin", "list", "5"])).unwrap(),
            Command::List { limit: 5 }
        ));
        assert!(parse_args(&args(&["bin", "list", "many"])).is_err());
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        assert!(parse_args(&args(&["bin", "mount"])).is_err());
    }
}
