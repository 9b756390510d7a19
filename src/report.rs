// 📊 Report - Annotated view of the store for presentation
//
// Periods are recomputed here on every call; ongoing durations are as of `now`.

use crate::entities::Status;
use crate::store::HistoryStore;
use crate::temporal::{reconstruct_periods, ClosurePeriod, ClosureStats};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::io::Write;

// ============================================================================
// VIEWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodView {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub ongoing: bool,
    pub duration_seconds: i64,

    // Human-formatted
    pub start_display: String,
    pub end_display: String,
    pub duration_display: String,
}

impl PeriodView {
    fn from_period(period: &ClosurePeriod) -> Self {
        PeriodView {
            start: period.start,
            end: period.end_time(),
            ongoing: period.is_ongoing(),
            duration_seconds: period.duration.num_seconds(),
            start_display: format_timestamp(period.start),
            end_display: period
                .end_time()
                .map(format_timestamp)
                .unwrap_or_else(|| "ongoing".to_string()),
            duration_display: format_duration(period.duration),
        }
    }
}

/// One location as handed to presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityView {
    pub key: String,
    pub name: String,
    pub identifier: Option<String>,
    pub current_status: Status,
    pub event_count: usize,
    pub periods: Vec<PeriodView>,
    pub closures: usize,
    pub total_closed_seconds: i64,
    pub longest_closure_seconds: Option<i64>,
}

/// Every record with its closure periods, in key order
pub fn annotate(store: &HistoryStore, now: DateTime<Utc>) -> Vec<EntityView> {
    store
        .iter()
        .map(|(key, record)| {
            let periods = reconstruct_periods(&record.events, now);
            let stats = ClosureStats::from_periods(&periods);

            EntityView {
                key: key.to_string(),
                name: record.name.clone(),
                identifier: record.identifier.clone(),
                current_status: record.current_status,
                event_count: record.event_count(),
                periods: periods.iter().map(PeriodView::from_period).collect(),
                closures: stats.closures,
                total_closed_seconds: stats.total_closed.num_seconds(),
                longest_closure_seconds: stats.longest.map(|d| d.num_seconds()),
            }
        })
        .collect()
}

// ============================================================================
// FORMATTING
// ============================================================================

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// "1 d 2 h 5 min", "3 h 0 min", "12 min"
pub fn format_duration(duration: Duration) -> String {
    let total_minutes = duration.num_minutes().max(0);
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;

    if days > 0 {
        format!("{} d {} h {} min", days, hours, minutes)
    } else if hours > 0 {
        format!("{} h {} min", hours, minutes)
    } else {
        format!("{} min", minutes)
    }
}

/// Plain-text report of all locations
pub fn render_text(views: &[EntityView]) -> String {
    if views.is_empty() {
        return "No data yet: the store has no locations.\n".to_string();
    }

    let mut out = String::new();
    for view in views {
        let marker = match view.current_status {
            Status::Closed => "🔴",
            Status::Open => "🟢",
        };
        out.push_str(&format!(
            "{} {} [{}] - {} ({} closures, {} events)\n",
            marker,
            view.name,
            view.key,
            view.current_status,
            view.closures,
            view.event_count
        ));
        for period in &view.periods {
            out.push_str(&format!(
                "    {} → {}  ({})\n",
                period.start_display, period.end_display, period.duration_display
            ));
        }
    }
    out
}

#[derive(Debug, Serialize)]
struct PeriodRow<'a> {
    key: &'a str,
    name: &'a str,
    start: String,
    end: String,
    ongoing: bool,
    duration_seconds: i64,
}

/// All closure periods as CSV, one row per period
pub fn write_periods_csv<W: Write>(views: &[EntityView], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for view in views {
        for period in &view.periods {
            csv_writer
                .serialize(PeriodRow {
                    key: &view.key,
                    name: &view.name,
                    start: period.start.to_rfc3339(),
                    end: period.end.map(|e| e.to_rfc3339()).unwrap_or_default(),
                    ongoing: period.ongoing,
                    duration_seconds: period.duration_seconds,
                })
                .with_context(|| format!("Failed to write CSV row for {}", view.key))?;
        }
    }

    csv_writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
