//! Latency extraction from subscriber logs
//!
//! A record looks like
//! `[recv_time, size]:[<ns>, <bytes>]  sender_addr:<ip>  [send_time, size]:[<ns>, <bytes>]`.
//! Anything else on a line, and lines without a record, are ignored.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

const NANOS_PER_MILLI: f64 = 1_000_000.0;

fn record_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"\[recv_time, size\]:\[(\d+), \d+\]\s+sender_addr:[\d\.]+\s+\[send_time, size\]:\[(\d+), \d+\]",
        )
        .expect("latency record pattern must compile")
    })
}

/// One-way latency in milliseconds for a single line, if the line holds a
/// record with a strictly positive recv - send difference.
pub fn parse_line(line: &str) -> Option<f64> {
    let caps = record_pattern().captures(line)?;
    let recv_ns: u64 = caps.get(1)?.as_str().parse().ok()?;
    let send_ns: u64 = caps.get(2)?.as_str().parse().ok()?;
    let latency_ns = recv_ns.checked_sub(send_ns)?;
    if latency_ns == 0 {
        return None;
    }
    Some(latency_ns as f64 / NANOS_PER_MILLI)
}

/// Streaming iterator of latency samples (ms) over a line reader.
pub struct LatencySamples<R> {
    lines: io::Lines<R>,
}

impl<R: BufRead> LatencySamples<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

impl<R: BufRead> Iterator for LatencySamples<R> {
    type Item = io::Result<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        for line in self.lines.by_ref() {
            match line {
                Ok(line) => {
                    if let Some(ms) = parse_line(&line) {
                        return Some(Ok(ms));
                    }
                }
                // Subscriber output may contain stray non-UTF-8 bytes.
                Err(e) if e.kind() == io::ErrorKind::InvalidData => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

/// Reads every latency sample from `path`.
///
/// A missing file is not an error: it is logged and yields no samples, so the
/// trial degrades to a failed measurement instead of aborting the campaign.
pub fn parse_log_file(path: &Path) -> Result<Vec<f64>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Log file not found, skipping");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to open log {}", path.display()))
        }
    };
    let samples = LatencySamples::new(BufReader::new(file))
        .collect::<io::Result<Vec<f64>>>()
        .with_context(|| format!("failed to read log {}", path.display()))?;
    debug!(path = %path.display(), samples = samples.len(), "Parsed latency log");
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_dir;
    use std::fs;
    use std::io::Cursor;

    fn record(recv: u64, send: u64) -> String {
        format!(
            "[recv_time, size]:[{}, 512]\tsender_addr:10.0.0.7\t[send_time, size]:[{}, 512]",
            recv, send
        )
    }

    #[test]
    fn matching_line_yields_millis() {
        let line = record(1_700_000_003_500_000, 1_700_000_000_000_000);
        assert_eq!(parse_line(&line), Some(3.5));
    }

    #[test]
    fn record_may_be_embedded_in_other_output() {
        let line = format!(
            "2024-05-01T10:00:00Z INFO got message {} extra",
            record(2_000_000, 1_000_000)
        );
        assert_eq!(parse_line(&line), Some(1.0));
    }

    #[test]
    fn non_positive_latency_is_dropped() {
        assert_eq!(parse_line(&record(1_000, 1_000)), None);
        assert_eq!(parse_line(&record(1_000, 5_000)), None);
    }

    #[test]
    fn unrelated_lines_are_skipped() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("subscribed to topic demo"), None);
        assert_eq!(
            parse_line("[recv_time, size]:[12, 3] [send_time, size]:[1, 3]"),
            None,
            "sender address is part of the record"
        );
        assert_eq!(
            parse_line("[recv_time, size]:[99999999999999999999999, 8] sender_addr:1.2.3.4 [send_time, size]:[1, 8]"),
            None,
            "timestamps beyond u64 are not records"
        );
    }

    #[test]
    fn iterator_skips_noise_between_records() {
        let log = format!(
            "connecting...\n{}\nnoise\n{}\n{}\n",
            record(3_000_000, 1_000_000),
            record(1, 2),
            record(10_000_000, 5_000_000)
        );
        let samples: Vec<f64> = LatencySamples::new(Cursor::new(log))
            .collect::<io::Result<_>>()
            .expect("in-memory read");
        assert_eq!(samples, vec![2.0, 5.0]);
    }

    #[test]
    fn missing_file_yields_no_samples() {
        let root = test_dir("missing_log");
        let samples = parse_log_file(&root.join("does_not_exist.log")).expect("no error");
        assert!(samples.is_empty());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn parses_file_from_disk() {
        let root = test_dir("log_file");
        let path = root.join("gossipsub_10rps.log");
        let body = (1..=4u64)
            .map(|i| record(i * 2_000_000, i * 1_000_000))
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(&path, body).expect("write log");
        let samples = parse_log_file(&path).expect("parse");
        assert_eq!(samples, vec![1.0, 2.0, 3.0, 4.0]);
        let _ = fs::remove_dir_all(root);
    }
}
