//! `genguard extract`

use anyhow::{Context, Result};
use std::fs;
use std::io::Read;
use std::path::PathBuf;

use genguard_core::{extract_json, GeneratedItem};

pub fn run(file: Option<PathBuf>, item: bool) -> Result<()> {
    let text = match file {
        Some(path) => fs::read_to_string(&path)
            .with_context(|| format!("Failed to read reply: {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };

    let value = extract_json(&text).context("No JSON found in reply")?;

    if item {
        let candidate = value.get("item").cloned().unwrap_or_else(|| value.clone());
        let parsed = GeneratedItem::from_value(candidate).context("JSON is not a worksheet item")?;
        tracing::info!(kind = %parsed.kind, fields = parsed.body.len(), "Item extracted");
        println!("{}", serde_json::to_string_pretty(&parsed.to_value())?);
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
