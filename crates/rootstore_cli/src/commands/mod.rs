//! CLI command implementations.

pub mod dump_wal;
pub mod get;
pub mod inspect;
pub mod json;
pub mod verify;

use rootstore_core::{Config, PersistentStore};
use std::path::Path;
use std::sync::Arc;

/// Opens an existing store; never creates one.
pub fn open_existing(path: &Path) -> Result<Arc<PersistentStore>, Box<dyn std::error::Error>> {
    if !path.join("MANIFEST").exists() {
        return Err(format!("No store found at {}", path.display()).into());
    }
    let config = Config::default().create_if_missing(false);
    Ok(PersistentStore::open_with_config(path, config)?)
}
