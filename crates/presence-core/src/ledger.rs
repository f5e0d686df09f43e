//! Daily attendance ledger.
//!
//! Two logs are kept in step: a JSON event log of [`AttendanceRecord`]s and
//! a tabular SQLite log with one row per (name, date). A person is recorded
//! at most once per day; repeated check-ins are a successful no-op.

use crate::error::Result;
use crate::persist;
use crate::types::AttendanceRecord;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS attendance_log (
    name       TEXT NOT NULL,
    date       TEXT NOT NULL,
    time       TEXT NOT NULL,
    person_id  TEXT NOT NULL DEFAULT '',
    UNIQUE (name, date)
);
";

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";

/// Outcome of [`Ledger::record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Inserted(AttendanceRecord),
    /// Already recorded for that day; nothing was written.
    Duplicate,
}

impl RecordOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, RecordOutcome::Inserted(_))
    }
}

/// Filter for [`Ledger::list`]. Date bounds are inclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttendanceFilter {
    pub person_id: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// One row of the tabular attendance log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRow {
    pub name: String,
    pub date: String,
    pub time: String,
    pub person_id: String,
}

pub struct Ledger {
    json_path: PathBuf,
    records: Vec<AttendanceRecord>,
    conn: Connection,
}

impl Ledger {
    /// Open the JSON event log and the tabular log, creating either if missing.
    pub fn open(json_path: impl Into<PathBuf>, db_path: impl AsRef<Path>) -> Result<Self> {
        let json_path = json_path.into();
        let records: Vec<AttendanceRecord> = persist::read_json_or_default(&json_path)?;
        let conn = Connection::open(db_path.as_ref())?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(
            json = %json_path.display(),
            db = %db_path.as_ref().display(),
            records = records.len(),
            "attendance ledger opened"
        );
        Ok(Self {
            json_path,
            records,
            conn,
        })
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    /// Record attendance for a person at `at`.
    ///
    /// A record is a duplicate if one already exists for the same date with
    /// the same person id or the same name.
    pub fn record(
        &mut self,
        person_id: &str,
        name: &str,
        image: &str,
        at: NaiveDateTime,
    ) -> Result<RecordOutcome> {
        let at = at.with_nanosecond(0).unwrap_or(at);
        let date = at.date();
        let time = at.time();

        let already = self
            .records
            .iter()
            .any(|r| r.date == date && (r.person_id == person_id || r.name == name));
        if already {
            tracing::debug!(person_id, name, %date, "attendance already recorded");
            return Ok(RecordOutcome::Duplicate);
        }

        // The row is committed only once the event log is on disk; dropping
        // the transaction on any error rolls it back.
        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO attendance_log (name, date, time, person_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                name,
                date.format(DATE_FMT).to_string(),
                time.format(TIME_FMT).to_string(),
                person_id
            ],
        )?;
        if inserted == 0 {
            // Row present without a matching event: an earlier event write was lost.
            tracing::warn!(name, %date, "tabular log ahead of event log; resyncing");
        }

        let record = AttendanceRecord {
            id: uuid::Uuid::new_v4().to_string(),
            person_id: person_id.to_string(),
            name: name.to_string(),
            date,
            time,
            timestamp: at,
            image: image.to_string(),
        };
        self.records.push(record.clone());
        if let Err(e) = persist::write_json_atomic(&self.json_path, &self.records) {
            self.records.pop();
            return Err(e);
        }
        if let Err(e) = tx.commit() {
            self.records.pop();
            if let Err(restore) = persist::write_json_atomic(&self.json_path, &self.records) {
                tracing::error!(error = %restore, "event log restore failed");
            }
            return Err(e.into());
        }
        tracing::info!(person_id, name, %date, %time, "attendance recorded");
        Ok(RecordOutcome::Inserted(record))
    }

    pub fn list(&self, filter: &AttendanceFilter) -> Vec<&AttendanceRecord> {
        self.records
            .iter()
            .filter(|r| filter.person_id.as_deref().map_or(true, |id| r.person_id == id))
            .filter(|r| filter.date_from.map_or(true, |from| r.date >= from))
            .filter(|r| filter.date_to.map_or(true, |to| r.date <= to))
            .collect()
    }

    /// Records of one person, most recent first.
    pub fn for_person(&self, person_id: &str) -> Vec<&AttendanceRecord> {
        let mut out: Vec<&AttendanceRecord> = self
            .records
            .iter()
            .filter(|r| r.person_id == person_id)
            .collect();
        out.sort_by(|a, b| b.date.cmp(&a.date).then(b.time.cmp(&a.time)));
        out
    }

    pub fn on_date(&self, date: NaiveDate) -> Vec<&AttendanceRecord> {
        self.records.iter().filter(|r| r.date == date).collect()
    }

    /// All rows of the tabular log, oldest first.
    pub fn log_rows(&self) -> Result<Vec<LogRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, date, time, person_id FROM attendance_log ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LogRow {
                    name: row.get(0)?,
                    date: row.get(1)?,
                    time: row.get(2)?,
                    person_id: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Parse an optional `YYYY-MM-DD` / `HH:MM:SS` pair into a timestamp,
/// filling missing parts from `now`.
pub fn parse_moment(
    date: Option<&str>,
    time: Option<&str>,
    now: NaiveDateTime,
) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    let date = match date.filter(|d| !d.is_empty()) {
        Some(d) => NaiveDate::parse_from_str(d, DATE_FMT)?,
        None => now.date(),
    };
    let time = match time.filter(|t| !t.is_empty()) {
        Some(t) => NaiveTime::parse_from_str(t, TIME_FMT)?,
        None => now.time(),
    };
    Ok(date.and_time(time))
}
