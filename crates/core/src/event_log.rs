//! Append-only event log.
//!
//! The tick loop calls [`EventLog::record`] for every motion, face and alarm
//! event and [`EventLog::flush`] once at session end. Recording never fails
//! the caller: write errors are traced and counted, and the loop carries on.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::event::{EventRecord, EventType, SessionStats};

/// Column order of the CSV log. Matches the field order of [`LogRow`].
pub const CSV_HEADER: &str = "timestamp,event_type,label,confidence,motion_score,alarm_state";

/// One row of the CSV log, as written by [`FileEventLog`] and read back by
/// [`crate::report::LogReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub timestamp: DateTime<FixedOffset>,
    pub event_type: EventType,
    pub label: String,
    pub confidence: f64,
    pub motion_score: u64,
    #[serde(with = "title_case_bool")]
    pub alarm_state: bool,
}

impl From<&EventRecord> for LogRow {
    fn from(record: &EventRecord) -> Self {
        Self {
            timestamp: record.timestamp.fixed_offset(),
            event_type: record.event_type,
            label: record.label.clone(),
            confidence: record.confidence,
            motion_score: record.motion_score,
            alarm_state: record.alarm_state,
        }
    }
}

/// `True` / `False`, the spelling existing log files use.
mod title_case_bool {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "True" } else { "False" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(serde::de::Error::custom(format!("invalid alarm_state '{raw}'"))),
        }
    }
}

/// Per-list cap on events kept in memory for the session summary.
const DEFAULT_MAX_SESSION_EVENTS: usize = 10_000;

/// Sink for tick events.
pub trait EventLog: Send {
    /// Append one record. Must not fail the calling tick.
    fn record(&mut self, record: EventRecord);

    /// Persist the session summary. Called once at session end.
    fn flush(&mut self, stats: &SessionStats) -> Result<()>;
}

// ── File-backed log ───────────────────────────────────────────

/// Writes a daily CSV file plus a JSON summary per session.
pub struct FileEventLog {
    csv_path: PathBuf,
    session_path: PathBuf,
    session: SessionFile,
    max_events: usize,
    write_failures: u64,
}

#[derive(Debug, Serialize)]
struct SessionFile {
    session_id: Uuid,
    start_time: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Local>>,
    detections: VecDeque<EventRecord>,
    motion_events: VecDeque<EventRecord>,
    alarm_events: VecDeque<EventRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    statistics: Option<SessionStats>,
}

impl FileEventLog {
    /// Open (or create) the log directory and today's CSV file.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let now = Local::now();
        let csv_path = dir.join(format!("smartcam_log_{}.csv", now.format("%Y%m%d")));
        let session_path = dir.join(format!("session_{}.json", now.format("%Y%m%d_%H%M%S")));

        if !csv_path.exists() {
            let mut writer = csv::Writer::from_path(&csv_path)?;
            writer.write_record(CSV_HEADER.split(','))?;
            writer.flush()?;
        }

        tracing::debug!(csv = %csv_path.display(), session = %session_path.display(), "event log opened");

        Ok(Self {
            csv_path,
            session_path,
            session: SessionFile {
                session_id: Uuid::new_v4(),
                start_time: now,
                end_time: None,
                detections: VecDeque::new(),
                motion_events: VecDeque::new(),
                alarm_events: VecDeque::new(),
                statistics: None,
            },
            max_events: DEFAULT_MAX_SESSION_EVENTS,
            write_failures: 0,
        })
    }

    /// Override the per-list cap on events kept for the session summary.
    pub fn with_max_session_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// Number of CSV appends that failed this session.
    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    fn append_csv(&self, record: &EventRecord) -> csv::Result<()> {
        let file = OpenOptions::new().append(true).create(true).open(&self.csv_path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(LogRow::from(record))?;
        writer.flush()?;
        Ok(())
    }
}

impl EventLog for FileEventLog {
    fn record(&mut self, record: EventRecord) {
        if let Err(e) = self.append_csv(&record) {
            self.write_failures += 1;
            tracing::warn!(
                path = %self.csv_path.display(),
                error = %e,
                failures = self.write_failures,
                "event log write failed"
            );
        }

        let list = match record.event_type {
            EventType::FaceDetection => &mut self.session.detections,
            EventType::Motion => &mut self.session.motion_events,
            EventType::Alarm => &mut self.session.alarm_events,
        };
        list.push_back(record);
        while list.len() > self.max_events {
            list.pop_front();
        }
    }

    fn flush(&mut self, stats: &SessionStats) -> Result<()> {
        self.session.end_time = Some(Local::now());
        self.session.statistics = Some(stats.clone());
        let json = serde_json::to_string_pretty(&self.session)?;
        std::fs::write(&self.session_path, json)?;
        tracing::info!(path = %self.session_path.display(), "session summary saved");
        Ok(())
    }
}

// ── In-memory log ─────────────────────────────────────────────

/// Keeps the most recent records in memory with FIFO eviction.
///
/// Lets tests inspect what the tick loop recorded without touching disk.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    records: VecDeque<EventRecord>,
    max_records: Option<usize>,
    flushed: Option<SessionStats>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_records(max: usize) -> Self {
        Self {
            max_records: Some(max),
            ..Self::default()
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.records.iter().filter(|r| r.event_type == event_type).count()
    }

    /// Stats passed to the last `flush`, if any.
    pub fn flushed(&self) -> Option<&SessionStats> {
        self.flushed.as_ref()
    }
}

impl EventLog for MemoryEventLog {
    fn record(&mut self, record: EventRecord) {
        self.records.push_back(record);
        if let Some(max) = self.max_records {
            while self.records.len() > max {
                self.records.pop_front();
            }
        }
    }

    fn flush(&mut self, stats: &SessionStats) -> Result<()> {
        self.flushed = Some(stats.clone());
        Ok(())
    }
}
