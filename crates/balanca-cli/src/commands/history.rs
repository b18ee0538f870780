//! History command implementation.

use std::path::Path;

use anyhow::{Context, Result};

use balanca_store::Store;

use crate::cli::{HistoryKind, OutputFormat};
use crate::format::{format_heart_rates_text, format_json, format_weights_text};

pub fn cmd_history(
    db_path: &Path,
    user: &str,
    kind: HistoryKind,
    limit: u32,
    format: OutputFormat,
) -> Result<()> {
    let store = Store::open(db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    let content = match kind {
        HistoryKind::Weight => {
            let records = store.list_weights(user, limit)?;
            match format {
                OutputFormat::Text => format_weights_text(&records),
                OutputFormat::Json => format_json(&records)?,
            }
        }
        HistoryKind::HeartRate => {
            let records = store.list_heart_rates(user, limit)?;
            match format {
                OutputFormat::Text => format_heart_rates_text(&records),
                OutputFormat::Json => format_json(&records)?,
            }
        }
    };
    print!("{content}");

    Ok(())
}
