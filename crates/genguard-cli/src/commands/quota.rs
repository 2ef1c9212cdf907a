//! `genguard quota-reset`

use anyhow::{bail, Result};
use chrono::{FixedOffset, Utc};
use std::path::PathBuf;

use genguard_core::seconds_until_next_midnight;

use super::load_config;

pub fn reset_horizon(offset_minutes: Option<i32>, config_path: Option<PathBuf>) -> Result<()> {
    let offset = match offset_minutes {
        Some(minutes) => match FixedOffset::east_opt(minutes.saturating_mul(60)) {
            Some(offset) => offset,
            None => bail!("Offset out of range: {} minutes", minutes),
        },
        None => load_config(config_path)?.daily_quota.offset(),
    };

    let now = Utc::now();
    let seconds = seconds_until_next_midnight(now, offset);
    let resets_at = now + chrono::Duration::seconds(seconds as i64);

    println!("Daily quota resets in {}s", seconds);
    println!("   at {} (UTC{})", resets_at.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S"), offset);

    Ok(())
}
