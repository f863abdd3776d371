//! CSV report and operator summary table

use crate::atomic_write_bytes;
use crate::trial::TrialResult;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::Path;

/// One report line. Failed trials leave avg/messages empty and carry
/// `p99_latency_ms = inf`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub protocol: &'static str,
    pub config: String,
    pub rate_rps: u32,
    pub avg_latency_ms: Option<f64>,
    pub p99_latency_ms: f64,
    pub messages_received: Option<usize>,
}

impl From<&TrialResult> for ReportRow {
    fn from(result: &TrialResult) -> Self {
        Self {
            protocol: result.protocol.as_str(),
            config: result.config.clone(),
            rate_rps: result.rate,
            avg_latency_ms: result.avg_latency_ms(),
            p99_latency_ms: result.p99_latency_ms(),
            messages_received: result.messages_received(),
        }
    }
}

pub fn render_csv(results: &[TrialResult]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    if results.is_empty() {
        wtr.write_record([
            "protocol",
            "config",
            "rate_rps",
            "avg_latency_ms",
            "p99_latency_ms",
            "messages_received",
        ])?;
    }
    for result in results {
        wtr.serialize(ReportRow::from(result))?;
    }
    wtr.into_inner()
        .map_err(|e| anyhow!("failed to flush report: {}", e.error()))
}

pub fn write_report(path: &Path, results: &[TrialResult]) -> Result<()> {
    let bytes = render_csv(results)?;
    atomic_write_bytes(path, &bytes)
}

/// Fixed-width table for the terminal.
pub fn format_table(results: &[TrialResult]) -> String {
    let header = [
        "protocol",
        "config",
        "rate_rps",
        "avg_latency_ms",
        "p99_latency_ms",
        "messages_received",
    ];
    let rows: Vec<[String; 6]> = results
        .iter()
        .map(ReportRow::from)
        .map(|row| {
            [
                row.protocol.to_string(),
                row.config,
                row.rate_rps.to_string(),
                row.avg_latency_ms
                    .map(|v| format!("{:.3}", v))
                    .unwrap_or_else(|| "-".to_string()),
                format_ms(row.p99_latency_ms),
                row.messages_received
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    let line = |cells: &[&str]| -> String {
        cells
            .iter()
            .zip(widths.iter())
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    out.push_str(&line(&header));
    out.push('\n');
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push_str(&line(&cells));
        out.push('\n');
    }
    out
}

fn format_ms(value: f64) -> String {
    if value.is_infinite() {
        "inf".to_string()
    } else {
        format!("{:.3}", value)
    }
}
