pub mod config;
pub mod history;
pub mod merge;
pub mod reset;
pub mod simulate;
pub mod stats;

use stepquest_core::{Database, Journal};

/// Journal over the database in the data directory.
pub fn open_journal() -> Result<Journal, Box<dyn std::error::Error>> {
    let db = Database::open()?;
    Ok(Journal::new(std::sync::Arc::new(db)))
}
