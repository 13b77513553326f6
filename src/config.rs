use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const MEMORY_DATABASE: &str = "memory";

/// Server settings, read from `HUNT_*` environment variables or flags.
#[derive(Debug, Clone, Parser)]
#[command(name = "server", version, about = "Scavenger hunt race server")]
pub struct ServerConfig {
    /// Address the HTTP and WebSocket server listens on
    #[arg(long, env = "HUNT_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// SQLite database path, or `memory` for a volatile in-process store
    #[arg(long, env = "HUNT_DATABASE", default_value = "hunt.sqlite3")]
    pub database: String,

    /// Bearer token required on organizer routes
    #[arg(long, env = "HUNT_ORGANIZER_TOKEN")]
    pub organizer_token: Option<String>,

    /// Directory photo uploads are written to
    #[arg(long, env = "HUNT_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    #[arg(long, env = "HUNT_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Outgoing queue length per live connection
    #[arg(long, env = "HUNT_CHANNEL_CAPACITY", default_value_t = 32)]
    pub channel_capacity: usize,

    #[arg(long, env = "HUNT_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::parse()
    }

    pub fn uses_memory_storage(&self) -> bool {
        self.database.eq_ignore_ascii_case(MEMORY_DATABASE)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database: MEMORY_DATABASE.to_string(),
            organizer_token: None,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 10 * 1024 * 1024,
            channel_capacity: 32,
            log_json: false,
        }
    }
}
