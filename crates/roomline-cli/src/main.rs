//! Roomline terminal client.
//!
//! # Usage
//!
//! ```bash
//! ROOMLINE_TOKEN=... roomline --username alice \
//!     --server 127.0.0.1:4433 --api http://127.0.0.1:5000/
//! ```

use std::{sync::Arc, time::Duration};

use clap::Parser;
use roomline_app::{ChatSession, Runtime, RuntimeConfig};
use roomline_cli::TerminalDriver;
use roomline_client::{
    SystemEnv,
    http::{HttpDirectory, HttpDirectoryConfig, Url},
};
use roomline_core::{ConnectionConfig, Credential, ReconnectPolicy, SessionContext};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Roomline terminal client
#[derive(Parser, Debug)]
#[command(name = "roomline")]
#[command(about = "Terminal client for Roomline chat")]
#[command(version)]
struct Args {
    /// Username to log in as
    #[arg(short, long)]
    username: String,

    /// Access token issued by the login service
    #[arg(long, env = "ROOMLINE_TOKEN", hide_env_values = true)]
    token: String,

    /// Real-time server address
    #[arg(short, long, default_value = "127.0.0.1:4433")]
    server: String,

    /// Directory API root
    #[arg(long, default_value = "http://127.0.0.1:5000/")]
    api: Url,

    /// Reconnect attempts before giving up
    #[arg(long, default_value = "5")]
    max_reconnect_attempts: u32,

    /// Session tick interval in milliseconds
    #[arg(long, default_value = "250")]
    tick_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout belongs to the chat view
    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    let credential = Credential::new(args.token).ok_or("token must not be blank")?;
    let directory = HttpDirectory::new(HttpDirectoryConfig::new(args.api), credential.clone())?;

    let config = ConnectionConfig {
        reconnect: ReconnectPolicy {
            max_attempts: args.max_reconnect_attempts,
            ..ReconnectPolicy::default()
        },
        ..ConnectionConfig::default()
    };
    let context = SessionContext::new(args.username, Some(credential));
    let session = ChatSession::new(SystemEnv::new(), context, config);

    tracing::info!(server = %args.server, "Roomline client starting");

    let driver = TerminalDriver::stdio(args.server);
    let runtime_config = RuntimeConfig { tick_interval: Duration::from_millis(args.tick_ms) };
    let mut runtime = Runtime::new(driver, session, Arc::new(directory), runtime_config);

    Ok(runtime.run().await?)
}
