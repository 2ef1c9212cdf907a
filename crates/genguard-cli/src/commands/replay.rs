//! `genguard replay`
//!
//! Feeds a recorded outcome log through a fresh health monitor on a manual
//! clock, so alert thresholds and cooldowns can be checked against real
//! traffic. One JSON object per line:
//!
//! ```text
//! {"event": "generation", "at": "2025-03-10T09:00:00Z", "success": false}
//! {"event": "ai_call", "at": "2025-03-10T09:00:01Z", "success": false, "timeout": true}
//! {"event": "quality", "at": "2025-03-10T09:00:02Z", "score": 6.5, "topic": "Fractions", "subject": "math", "grade": 5}
//! ```

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use genguard_core::{
    AiCallOutcome, AlertDecision, GenerationHealthMonitor, ManualClock, QualityScoreEvent,
};

use super::load_config;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ReplayEvent {
    Generation {
        at: DateTime<Utc>,
        success: bool,
    },
    AiCall {
        at: DateTime<Utc>,
        success: bool,
        #[serde(default)]
        timeout: bool,
    },
    Quality {
        at: DateTime<Utc>,
        score: f64,
        topic: String,
        subject: String,
        grade: u8,
    },
}

impl ReplayEvent {
    fn at(&self) -> DateTime<Utc> {
        match self {
            ReplayEvent::Generation { at, .. }
            | ReplayEvent::AiCall { at, .. }
            | ReplayEvent::Quality { at, .. } => *at,
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    events: usize,
    fired: usize,
    suppressed: usize,
}

pub fn run(file: PathBuf, all: bool, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let contents = fs::read_to_string(&file)
        .with_context(|| format!("Failed to read outcome log: {}", file.display()))?;

    let events = parse_events(&contents)?;
    let Some(first) = events.first() else {
        println!("No events in {}", file.display());
        return Ok(());
    };

    let clock = ManualClock::new(first.at());
    let monitor = GenerationHealthMonitor::with_clock(config.health, Arc::new(clock.clone()));
    let mut tally = Tally::default();

    for event in &events {
        clock.set(event.at());
        let decision = apply(&monitor, event);
        tally.events += 1;

        match &decision {
            AlertDecision::Fire(alert) => {
                tally.fired += 1;
                println!("{}  FIRE  [{}] {}", alert.raised_at.to_rfc3339(), alert.severity, alert.message);
            }
            AlertDecision::Suppressed { kind, remaining } => {
                tally.suppressed += 1;
                if all {
                    println!(
                        "{}  SUPPRESSED  {} ({}s of cooldown left)",
                        event.at().to_rfc3339(),
                        kind,
                        remaining.as_secs()
                    );
                }
            }
            AlertDecision::NotTriggered => {
                if all {
                    println!("{}  ok", event.at().to_rfc3339());
                }
            }
        }
    }

    println!();
    println!(
        "Replayed {} events: {} alerts fired, {} suppressed",
        tally.events, tally.fired, tally.suppressed
    );
    println!("{}", serde_json::to_string_pretty(&monitor.metrics())?);

    Ok(())
}

fn parse_events(contents: &str) -> Result<Vec<ReplayEvent>> {
    let mut events: Vec<ReplayEvent> = Vec::new();

    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event: ReplayEvent = serde_json::from_str(line)
            .with_context(|| format!("Invalid event on line {}", number + 1))?;

        if let Some(previous) = events.last() {
            if event.at() < previous.at() {
                bail!("Events must be in time order (line {})", number + 1);
            }
        }
        events.push(event);
    }

    Ok(events)
}

fn apply(monitor: &GenerationHealthMonitor, event: &ReplayEvent) -> AlertDecision {
    match event {
        ReplayEvent::Generation { success, .. } => monitor.record_generation_outcome(*success),
        ReplayEvent::AiCall {
            success, timeout, ..
        } => monitor.record_ai_call_outcome(AiCallOutcome {
            success: *success && !*timeout,
            is_timeout: *timeout,
        }),
        ReplayEvent::Quality {
            score,
            topic,
            subject,
            grade,
            ..
        } => monitor.check_low_quality_score(&QualityScoreEvent {
            score: *score,
            topic: topic.clone(),
            subject: subject.clone(),
            grade: *grade,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_events_skips_blanks_and_comments() {
        let log = r#"
# morning traffic
{"event": "generation", "at": "2025-03-10T09:00:00Z", "success": true}

{"event": "ai_call", "at": "2025-03-10T09:00:01Z", "success": false, "timeout": true}
"#;
        let events = parse_events(log).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ReplayEvent::AiCall { timeout: true, .. }));
    }

    #[test]
    fn test_parse_events_rejects_out_of_order() {
        let log = r#"{"event": "generation", "at": "2025-03-10T09:00:05Z", "success": true}
{"event": "generation", "at": "2025-03-10T09:00:00Z", "success": true}"#;
        let err = parse_events(log).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_replayed_timeouts_fire_once() {
        let log = (0..5)
            .map(|i| {
                format!(
                    r#"{{"event": "ai_call", "at": "2025-03-10T09:00:0{}Z", "success": false, "timeout": true}}"#,
                    i
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let events = parse_events(&log).unwrap();

        let clock = ManualClock::new(events[0].at());
        let monitor = GenerationHealthMonitor::with_clock(Default::default(), Arc::new(clock.clone()));
        let fired = events
            .iter()
            .filter(|event| {
                clock.set(event.at());
                apply(&monitor, event).is_fire()
            })
            .count();

        assert_eq!(fired, 1);
    }
}
