//! Absence snapshot generation.

use crate::error::{Error, Result};
use crate::persist;
use crate::types::{AbsenceRecord, AttendanceRecord, Person};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Active persons whose name is absent from `today_attendance`.
///
/// Inactive persons are never reported, present or not.
pub fn compute_absences(
    roster: &[Person],
    today_attendance: &[&AttendanceRecord],
    today: NaiveDate,
) -> Vec<AbsenceRecord> {
    let present: HashSet<&str> = today_attendance
        .iter()
        .filter(|r| r.date == today)
        .map(|r| r.name.as_str())
        .collect();

    roster
        .iter()
        .filter(|p| p.active && !present.contains(p.name.as_str()))
        .map(|p| AbsenceRecord::from_person(p, today))
        .collect()
}

/// The latest absence snapshot. Regeneration overwrites the file in full.
#[derive(Debug)]
pub struct AbsenceSnapshot {
    path: PathBuf,
    records: Vec<AbsenceRecord>,
}

impl AbsenceSnapshot {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = persist::read_json_or_default(&path)?;
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[AbsenceRecord] {
        &self.records
    }

    /// Replace the snapshot with `fresh`.
    ///
    /// Reasons already entered for the same person and date carry over.
    pub fn replace(&mut self, mut fresh: Vec<AbsenceRecord>) -> Result<()> {
        for record in fresh.iter_mut() {
            if let Some(prev) = self
                .records
                .iter()
                .find(|p| p.id == record.id && p.date == record.date)
            {
                record.reason = prev.reason.clone();
            }
        }
        persist::write_json_atomic(&self.path, &fresh)?;
        tracing::debug!(path = %self.path.display(), absent = fresh.len(), "absence snapshot written");
        self.records = fresh;
        Ok(())
    }

    /// Attach a reason to the absence of `person_id`.
    pub fn set_reason(&mut self, person_id: &str, reason: &str) -> Result<AbsenceRecord> {
        let idx = self
            .records
            .iter()
            .position(|r| r.id == person_id)
            .ok_or_else(|| Error::AbsenceNotFound(person_id.to_string()))?;
        let previous = self.records[idx].reason.replace(reason.to_string());
        if let Err(e) = persist::write_json_atomic(&self.path, &self.records) {
            self.records[idx].reason = previous;
            return Err(e);
        }
        Ok(self.records[idx].clone())
    }
}
