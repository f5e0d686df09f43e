//! The explicit store context: roster, gallery, ledger and absence snapshot
//! opened from one data directory and owned by whoever handles requests.

use crate::absence::{compute_absences, AbsenceSnapshot};
use crate::error::Result;
use crate::gallery::Gallery;
use crate::ledger::{AttendanceFilter, Ledger, RecordOutcome};
use crate::matcher::EuclideanMatcher;
use crate::roster::Roster;
use crate::types::{AbsenceRecord, AttendanceRecord, Person, PersonPatch, Stats};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};

/// File layout of a data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn persons(&self) -> PathBuf {
        self.root.join("persons.json")
    }

    pub fn presence(&self) -> PathBuf {
        self.root.join("presence.json")
    }

    pub fn attendance_db(&self) -> PathBuf {
        self.root.join("attendance.db")
    }

    pub fn absences(&self) -> PathBuf {
        self.root.join("absent.json")
    }

    pub fn gallery(&self) -> PathBuf {
        self.root.join("gallery.json")
    }

    pub fn uploads(&self) -> PathBuf {
        self.root.join("uploads")
    }
}

pub struct Store {
    pub(crate) layout: DataLayout,
    pub(crate) matcher: EuclideanMatcher,
    pub(crate) roster: Roster,
    pub(crate) gallery: Gallery,
    pub(crate) ledger: Ledger,
    pub(crate) absences: AbsenceSnapshot,
}

impl Store {
    /// Open every file under `layout`, creating the directories as needed.
    pub fn open(layout: DataLayout, matcher: EuclideanMatcher) -> Result<Self> {
        std::fs::create_dir_all(layout.root())?;
        std::fs::create_dir_all(layout.uploads())?;

        let roster = Roster::open(layout.persons())?;
        let gallery = Gallery::open(layout.gallery());
        let ledger = Ledger::open(layout.presence(), layout.attendance_db())?;
        let absences = AbsenceSnapshot::open(layout.absences())?;

        let orphans = gallery
            .entries()
            .iter()
            .filter(|e| roster.get(&e.person_id).is_none())
            .count();
        if orphans > 0 {
            tracing::warn!(orphans, "gallery entries without a roster person");
        }

        tracing::info!(
            root = %layout.root().display(),
            persons = roster.len(),
            faces = gallery.len(),
            tolerance = matcher.tolerance,
            "store opened"
        );

        Ok(Self {
            layout,
            matcher,
            roster,
            gallery,
            ledger,
            absences,
        })
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn matcher(&self) -> &EuclideanMatcher {
        &self.matcher
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn persons(&self) -> &[Person] {
        self.roster.persons()
    }

    pub fn person(&self, id: &str) -> Result<&Person> {
        self.roster.require(id)
    }

    pub fn search_persons(&self, query: &str) -> Vec<&Person> {
        self.roster.search(query)
    }

    /// Patch a person's profile. A renamed person keeps matching under the new name.
    pub fn update_person(
        &mut self,
        id: &str,
        patch: PersonPatch,
        now: NaiveDateTime,
    ) -> Result<Person> {
        let previous = self.roster.require(id)?.clone();
        let person = self.roster.update(id, patch, now)?;
        let renamed = self
            .gallery
            .get(id)
            .is_some_and(|entry| entry.name != person.name);
        if renamed {
            self.gallery.rename(id, &person.name);
            if let Err(e) = self.gallery.save() {
                self.gallery.rename(id, &previous.name);
                if let Err(rollback) = self.roster.restore(previous) {
                    tracing::error!(error = %rollback, "roster rollback failed");
                }
                return Err(e);
            }
        }
        Ok(person)
    }

    /// Record attendance for a roster person.
    pub fn record_attendance(&mut self, person_id: &str, at: NaiveDateTime) -> Result<RecordOutcome> {
        let person = self.roster.require(person_id)?;
        let (id, name, image) = (person.id.clone(), person.name.clone(), person.image.clone());
        self.ledger.record(&id, &name, &image, at)
    }

    pub fn attendance(&self, filter: &AttendanceFilter) -> Vec<&AttendanceRecord> {
        self.ledger.list(filter)
    }

    /// A person and their attendance, most recent first.
    pub fn person_attendance(&self, person_id: &str) -> Result<(&Person, Vec<&AttendanceRecord>)> {
        let person = self.roster.require(person_id)?;
        Ok((person, self.ledger.for_person(person_id)))
    }

    pub fn absences(&self) -> &[AbsenceRecord] {
        self.absences.records()
    }

    /// Recompute and overwrite the absence snapshot for `today`.
    pub fn generate_absences(&mut self, today: NaiveDate) -> Result<&[AbsenceRecord]> {
        let present = self.ledger.on_date(today);
        let fresh = compute_absences(self.roster.persons(), &present, today);
        self.absences.replace(fresh)?;
        Ok(self.absences.records())
    }

    pub fn set_absence_reason(&mut self, person_id: &str, reason: &str) -> Result<AbsenceRecord> {
        self.absences.set_reason(person_id, reason)
    }

    pub fn stats(&self, today: NaiveDate) -> Stats {
        let week_ago = today - Duration::days(7);
        let records = self.ledger.records();
        Stats {
            total_persons: self.roster.len(),
            active_persons: self.roster.persons().iter().filter(|p| p.active).count(),
            today_presences: records.iter().filter(|r| r.date == today).count(),
            week_presences: records.iter().filter(|r| r.date >= week_ago).count(),
            total_presences: records.len(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::Error;
    use crate::provider::{EmbeddingProvider, ProviderError};
    use crate::types::{BoundingBox, Embedding};
    use std::collections::HashMap;

    /// Scripted provider: each image's bytes map to a fixed list of faces and embeddings.
    #[derive(Default)]
    pub struct FakeProvider {
        pub faces: HashMap<Vec<u8>, Vec<Embedding>>,
        pub fail: bool,
    }

    impl FakeProvider {
        pub fn with(mut self, image: &[u8], faces: Vec<Vec<f32>>) -> Self {
            self.faces.insert(
                image.to_vec(),
                faces.into_iter().map(Embedding::new).collect(),
            );
            self
        }
    }

    impl EmbeddingProvider for FakeProvider {
        fn detect(&mut self, image: &[u8]) -> std::result::Result<Vec<BoundingBox>, ProviderError> {
            if self.fail {
                return Err(ProviderError::Unavailable("scripted failure".into()));
            }
            let n = self.faces.get(image).map_or(0, Vec::len);
            Ok((0..n)
                .map(|i| BoundingBox {
                    x: i as f32 * 10.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                    confidence: 0.99,
                })
                .collect())
        }

        fn encode(
            &mut self,
            image: &[u8],
            face: &BoundingBox,
        ) -> std::result::Result<Embedding, ProviderError> {
            let idx = (face.x / 10.0) as usize;
            self.faces
                .get(image)
                .and_then(|f| f.get(idx))
                .cloned()
                .ok_or_else(|| ProviderError::MalformedResponse("unknown face".into()))
        }
    }

    /// A tiny valid PNG whose first pixel is `tag`, so different tags give different bytes.
    pub fn png(tag: u8) -> Vec<u8> {
        let img = image::GrayImage::from_pixel(2, 2, image::Luma([tag]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    pub fn open_store(dir: &tempfile::TempDir) -> Store {
        Store::open(DataLayout::new(dir.path()), EuclideanMatcher::new(0.6, 3)).unwrap()
    }

    pub fn is_validation(e: &Error) -> bool {
        e.kind() == crate::ErrorKind::Validation
    }
}
