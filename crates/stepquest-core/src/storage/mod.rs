mod config;
pub mod database;
pub mod device_id;
pub mod journal;
pub mod kv;
pub mod migrations;

pub use config::{Config, GeneratorConfig, MissionConfig, StepsConfig, SyncConfig};
pub use database::Database;
pub use device_id::{get_or_create_device_id, get_or_create_device_id_at, DeviceId};
pub use journal::{Journal, LifetimeStats, MergeSummary};
pub use kv::{KvStore, MemoryStore};

use std::path::PathBuf;

/// Returns the Stepquest data directory.
///
/// `STEPQUEST_DATA_DIR` wins when set. Otherwise `~/.config/stepquest[-dev]/`
/// based on STEPQUEST_ENV; set STEPQUEST_ENV=dev to use the development
/// data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("STEPQUEST_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env =
                std::env::var("STEPQUEST_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("stepquest-dev")
            } else {
                base_dir.join("stepquest")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
