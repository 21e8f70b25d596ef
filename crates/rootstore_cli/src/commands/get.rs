//! Get command implementation.

use super::json::value_to_json;
use rootstore_core::{inspect, RecursionGuard};
use std::path::Path;

/// Runs the get command.
pub fn run(path: &Path, key: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render(path, key, format)?);
    Ok(())
}

/// Renders the committed value of root `key`.
fn render(path: &Path, key: &str, format: &str) -> Result<String, Box<dyn std::error::Error>> {
    let store = super::open_existing(path)?;
    let session = store.session()?;
    let key = key.strip_prefix(':').unwrap_or(key);

    let value = session
        .read(key)
        .ok_or_else(|| format!("root :{key} is not defined"))?;

    Ok(match format {
        "json" => {
            let rendered = value_to_json(&value, &mut RecursionGuard::new());
            serde_json::to_string_pretty(&rendered)?
        }
        _ => inspect(&value),
    })
}
