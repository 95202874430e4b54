//! Offline analysis of CSV event logs.
//!
//! Reads every `smartcam_log_*.csv` in a directory and summarizes detection,
//! motion and alarm activity.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::Timelike;

use crate::error::{Result, SmartcamError};
use crate::event::EventType;
use crate::event_log::LogRow;

#[derive(Debug, Clone, Default)]
pub struct LogReport {
    pub files: usize,
    pub records: usize,
    pub skipped_rows: usize,
    pub face_detections: usize,
    pub known_detections: usize,
    pub unknown_detections: usize,
    pub average_confidence: Option<f64>,
    /// Hour of day with the most face detections, with its count.
    pub peak_hour: Option<(u32, usize)>,
    pub motion_events: usize,
    /// (average, min, max) over non-zero motion scores.
    pub motion_scores: Option<(f64, u64, u64)>,
    pub alarm_activations: usize,
    pub alarm_deactivations: usize,
    pub average_alarm_secs: Option<f64>,
}

impl LogReport {
    /// Load and analyze every CSV log in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(SmartcamError::Other(format!(
                "logs directory '{}' not found",
                dir.display()
            )));
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("smartcam_log_") && n.ends_with(".csv"))
            })
            .collect();
        paths.sort();

        let mut rows = Vec::new();
        let mut skipped = 0;
        for path in &paths {
            let mut reader = csv::Reader::from_path(path)?;
            for result in reader.deserialize::<LogRow>() {
                match result {
                    Ok(row) => rows.push(row),
                    Err(e) => {
                        skipped += 1;
                        tracing::debug!(path = %path.display(), error = %e, "skipping malformed log row");
                    }
                }
            }
        }

        let mut report = Self::from_rows(&rows);
        report.files = paths.len();
        report.skipped_rows = skipped;
        Ok(report)
    }

    /// Analyze already-parsed rows.
    pub fn from_rows(rows: &[LogRow]) -> Self {
        let mut report = LogReport {
            records: rows.len(),
            ..Self::default()
        };

        let mut by_hour: BTreeMap<u32, usize> = BTreeMap::new();
        let mut confidences = Vec::new();
        for row in rows.iter().filter(|r| r.event_type == EventType::FaceDetection) {
            report.face_detections += 1;
            *by_hour.entry(row.timestamp.hour()).or_default() += 1;
            match row.label.as_str() {
                "unknown" => report.unknown_detections += 1,
                "none" => {}
                _ => report.known_detections += 1,
            }
            if row.confidence > 0.0 {
                confidences.push(row.confidence);
            }
        }
        report.average_confidence = mean(&confidences);
        report.peak_hour = by_hour
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(h, c)| (*h, *c));

        let motion: Vec<u64> = rows
            .iter()
            .filter(|r| r.event_type == EventType::Motion)
            .map(|r| r.motion_score)
            .collect();
        report.motion_events = motion.len();
        let nonzero: Vec<u64> = motion.into_iter().filter(|s| *s > 0).collect();
        if let (Some(min), Some(max)) = (nonzero.iter().min(), nonzero.iter().max()) {
            let avg = nonzero.iter().sum::<u64>() as f64 / nonzero.len() as f64;
            report.motion_scores = Some((avg, *min, *max));
        }

        let alarms: Vec<&LogRow> = rows.iter().filter(|r| r.event_type == EventType::Alarm).collect();
        let on_times: Vec<_> = alarms.iter().filter(|r| r.label == "ON").map(|r| r.timestamp).collect();
        let off_times: Vec<_> = alarms.iter().filter(|r| r.label == "OFF").map(|r| r.timestamp).collect();
        report.alarm_activations = on_times.len();
        report.alarm_deactivations = off_times.len();

        // Pair each activation with the first deactivation after it.
        let durations: Vec<f64> = on_times
            .iter()
            .filter_map(|on| {
                off_times
                    .iter()
                    .filter(|off| *off > on)
                    .min()
                    .map(|off| (*off - *on).num_milliseconds() as f64 / 1000.0)
            })
            .collect();
        report.average_alarm_secs = mean(&durations);

        report
    }
}

impl fmt::Display for LogReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SMARTCAM DATA ANALYSIS REPORT")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "LOG FILES: {}", self.files)?;
        writeln!(f, "CSV RECORDS: {}", self.records)?;
        if self.skipped_rows > 0 {
            writeln!(f, "SKIPPED ROWS: {}", self.skipped_rows)?;
        }
        writeln!(f)?;
        writeln!(f, "=== DETECTION ANALYSIS ===")?;
        writeln!(f, "Total face detections: {}", self.face_detections)?;
        writeln!(f, "Known person detections: {}", self.known_detections)?;
        writeln!(f, "Unknown person detections: {}", self.unknown_detections)?;
        if let Some(avg) = self.average_confidence {
            writeln!(f, "Average confidence score: {avg:.1}")?;
        }
        if let Some((hour, count)) = self.peak_hour {
            writeln!(f, "Peak activity hour: {hour}:00 ({count} detections)")?;
        }
        writeln!(f)?;
        writeln!(f, "=== MOTION ANALYSIS ===")?;
        writeln!(f, "Total motion events: {}", self.motion_events)?;
        if let Some((avg, min, max)) = self.motion_scores {
            writeln!(f, "Average motion score: {avg:.1}")?;
            writeln!(f, "Max motion score: {max}")?;
            writeln!(f, "Min motion score: {min}")?;
        }
        writeln!(f)?;
        writeln!(f, "=== ALARM ANALYSIS ===")?;
        writeln!(f, "Total alarm activations: {}", self.alarm_activations)?;
        writeln!(f, "Total alarm deactivations: {}", self.alarm_deactivations)?;
        if let Some(secs) = self.average_alarm_secs {
            writeln!(f, "Average alarm duration: {secs:.1} seconds")?;
        }
        Ok(())
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}
