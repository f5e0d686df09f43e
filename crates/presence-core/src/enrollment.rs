//! Enrollment, removal and gallery rebuild.

use crate::error::{Error, Result};
use crate::gallery::GalleryEntry;
use crate::matcher::Matcher;
use crate::provider::{EmbeddingProvider, ProviderError};
use crate::store::Store;
use crate::types::{Embedding, NewPerson, Person};
use chrono::NaiveDateTime;
use std::path::Path;

const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Lower-cased extension of `file_name` if it is a supported image type.
pub fn image_extension(file_name: &str) -> Result<String> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(Error::UnsupportedExtension(ext))
    }
}

/// Reject bytes that do not decode as an image.
pub fn ensure_decodable(bytes: &[u8]) -> Result<()> {
    image::load_from_memory(bytes)
        .map(|_| ())
        .map_err(|e| Error::InvalidImage(e.to_string()))
}

/// Best-effort removal of an upload written by a failed enrollment.
fn discard_upload(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove upload"),
    }
}

impl Store {
    /// Enroll a new person from a single-face capture.
    ///
    /// Nothing is written unless every check passes: required fields,
    /// unique email, supported and decodable image, exactly one face, and
    /// a face not already enrolled within tolerance.
    pub fn enroll(
        &mut self,
        provider: &mut dyn EmbeddingProvider,
        profile: NewPerson,
        file_name: &str,
        image: &[u8],
        now: NaiveDateTime,
    ) -> Result<Person> {
        self.roster.validate_new(&profile)?;
        let ext = image_extension(file_name)?;
        ensure_decodable(image)?;

        let faces = provider.detect(image)?;
        let face = match faces.as_slice() {
            [] => return Err(Error::NoFaceDetected),
            [face] => face,
            many => return Err(Error::MultipleFaces(many.len())),
        };
        let embedding = provider.encode(image, face)?;
        self.check_dimension(&embedding)?;

        let nearest = self.matcher.best_match(&embedding, self.gallery.entries());
        if nearest.matched {
            return Err(Error::DuplicateFace {
                person_id: nearest.person_id.unwrap_or_default(),
                name: nearest.name.unwrap_or_default(),
            });
        }

        let id = uuid::Uuid::new_v4().to_string();
        let stored_name = format!("{id}.{ext}");
        let stored_path = self.layout.uploads().join(&stored_name);
        if let Err(e) = std::fs::write(&stored_path, image) {
            discard_upload(&stored_path);
            return Err(e.into());
        }

        let person = Person::new(id.clone(), profile, stored_name, now);
        self.gallery.upsert(GalleryEntry {
            person_id: id.clone(),
            name: person.name.clone(),
            embedding,
        });
        let persisted = self
            .gallery
            .save()
            .and_then(|()| self.roster.insert(person.clone()));
        if let Err(e) = persisted {
            self.gallery.remove(&id);
            if let Err(rollback) = self.gallery.save() {
                tracing::error!(error = %rollback, "gallery rollback failed");
            }
            discard_upload(&stored_path);
            return Err(e);
        }

        tracing::info!(person_id = %id, name = %person.name, "person enrolled");
        Ok(person)
    }

    /// Remove a person, their gallery entry and their stored images.
    ///
    /// The gallery is saved first; if the roster cannot be saved afterwards
    /// the gallery entry is put back at its old position.
    pub fn remove_person(&mut self, person_id: &str) -> Result<Person> {
        self.roster.require(person_id)?;
        let taken = self.gallery.take(person_id);
        if let Some((idx, entry)) = &taken {
            if let Err(e) = self.gallery.save() {
                self.gallery.restore(*idx, entry.clone());
                return Err(e);
            }
        }
        let person = match self.roster.remove(person_id) {
            Ok(person) => person,
            Err(e) => {
                if let Some((idx, entry)) = taken {
                    self.gallery.restore(idx, entry);
                    if let Err(rollback) = self.gallery.save() {
                        tracing::error!(error = %rollback, "gallery rollback failed");
                    }
                }
                return Err(e);
            }
        };
        let files = self.remove_person_files(person_id);
        tracing::info!(person_id, name = %person.name, files, "person removed");
        Ok(person)
    }

    /// Remove the single person called `name`.
    ///
    /// Names are not unique; when several persons share `name` nothing is
    /// removed and [`Error::AmbiguousName`] is returned.
    pub fn remove_by_name(&mut self, name: &str) -> Result<Person> {
        let id = match self.roster.find_by_name(name).as_slice() {
            [] => return Err(Error::PersonNotFound(name.to_string())),
            [person] => person.id.clone(),
            _ => return Err(Error::AmbiguousName(name.to_string())),
        };
        self.remove_person(&id)
    }

    /// Rebuild the gallery from every roster person's stored image.
    ///
    /// Persons whose image is missing or shows no face are skipped.
    /// Returns the number of faces encoded.
    pub fn reencode_all(&mut self, provider: &mut dyn EmbeddingProvider) -> Result<usize> {
        let mut entries = Vec::with_capacity(self.roster.len());
        for person in self.roster.persons() {
            if person.image.is_empty() {
                continue;
            }
            let path = self.layout.uploads().join(&person.image);
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(person_id = %person.id, path = %path.display(), error = %e, "image unreadable; skipping");
                    continue;
                }
            };
            let faces = provider.detect(&bytes)?;
            let Some(face) = faces.first() else {
                tracing::warn!(person_id = %person.id, "no face in stored image; skipping");
                continue;
            };
            let embedding = provider.encode(&bytes, face)?;
            if let Err(e) = self.check_dimension(&embedding) {
                tracing::warn!(person_id = %person.id, error = %e, "skipping");
                continue;
            }
            entries.push(GalleryEntry {
                person_id: person.id.clone(),
                name: person.name.clone(),
                embedding,
            });
        }

        let count = entries.len();
        self.gallery.replace_all(entries);
        self.gallery.save()?;
        tracing::info!(count, persons = self.roster.len(), "gallery rebuilt");
        Ok(count)
    }

    pub(crate) fn check_dimension(&self, embedding: &Embedding) -> Result<()> {
        if embedding.len() != self.matcher.dimension {
            return Err(ProviderError::MalformedResponse(format!(
                "expected {}-dim embedding, got {}",
                self.matcher.dimension,
                embedding.len()
            ))
            .into());
        }
        Ok(())
    }

    fn remove_person_files(&self, person_id: &str) -> usize {
        let dir = self.layout.uploads();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "cannot list uploads");
                return 0;
            }
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(person_id) {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(file = %entry.path().display(), error = %e, "failed to remove file")
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 3)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn profile(name: &str, email: &str) -> NewPerson {
        NewPerson {
            name: name.into(),
            email: email.into(),
            phone: "555".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("me.JPG").unwrap(), "jpg");
        assert_eq!(image_extension("a.b.jpeg").unwrap(), "jpeg");
        assert_eq!(image_extension("x.png").unwrap(), "png");
        assert!(matches!(
            image_extension("x.gif"),
            Err(Error::UnsupportedExtension(e)) if e == "gif"
        ));
        assert!(matches!(
            image_extension("noext"),
            Err(Error::UnsupportedExtension(e)) if e.is_empty()
        ));
    }

    #[test]
    fn test_enroll_stores_person_gallery_and_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let mut provider = FakeProvider::default().with(&png(1), vec![vec![1.0, 0.0, 0.0]]);

        let person = store
            .enroll(&mut provider, profile("Ada", "ada@x.io"), "ada.PNG", &png(1), now())
            .unwrap();

        assert_eq!(person.image, format!("{}.png", person.id));
        assert!(dir.path().join("uploads").join(&person.image).exists());
        assert_eq!(store.persons().len(), 1);
        let entry = store.gallery().get(&person.id).unwrap();
        assert_eq!(entry.name, "Ada");
        assert_eq!(entry.embedding.values, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_enroll_without_face_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let mut provider = FakeProvider::default()
            .with(&png(1), vec![vec![1.0, 0.0, 0.0]])
            .with(&png(9), vec![]);
        store
            .enroll(&mut provider, profile("Ada", "ada@x.io"), "a.png", &png(1), now())
            .unwrap();

        let persons_before = store.persons().len();
        let gallery_before = store.gallery().len();
        let err = store
            .enroll(&mut provider, profile("Bob", "bob@x.io"), "b.png", &png(9), now())
            .unwrap_err();

        assert!(matches!(err, Error::NoFaceDetected));
        assert_eq!(store.persons().len(), persons_before);
        assert_eq!(store.gallery().len(), gallery_before);
        let uploads = std::fs::read_dir(dir.path().join("uploads")).unwrap().count();
        assert_eq!(uploads, 1);
    }

    #[test]
    fn test_enroll_rejects_multiple_faces() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let mut provider =
            FakeProvider::default().with(&png(1), vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
        let err = store
            .enroll(&mut provider, profile("Ada", "ada@x.io"), "a.png", &png(1), now())
            .unwrap_err();
        assert!(matches!(err, Error::MultipleFaces(2)));
        assert!(store.gallery().is_empty());
    }

    #[test]
    fn test_enroll_rejects_duplicate_face() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let mut provider = FakeProvider::default()
            .with(&png(1), vec![vec![1.0, 0.0, 0.0]])
            .with(&png(2), vec![vec![1.1, 0.0, 0.0]]);
        let ada = store
            .enroll(&mut provider, profile("Ada", "ada@x.io"), "a.png", &png(1), now())
            .unwrap();
        let err = store
            .enroll(&mut provider, profile("Twin", "twin@x.io"), "t.png", &png(2), now())
            .unwrap_err();
        match err {
            Error::DuplicateFace { person_id, name } => {
                assert_eq!(person_id, ada.id);
                assert_eq!(name, "Ada");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.persons().len(), 1);
    }

    #[test]
    fn test_enroll_validates_before_detection() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let mut provider = FakeProvider {
            fail: true,
            ..Default::default()
        };
        let err = store
            .enroll(&mut provider, profile("", "ada@x.io"), "a.png", &png(1), now())
            .unwrap_err();
        assert!(matches!(err, Error::MissingField("name")));

        let err = store
            .enroll(&mut provider, profile("Ada", "ada@x.io"), "a.gif", &png(1), now())
            .unwrap_err();
        assert!(is_validation(&err));

        let err = store
            .enroll(&mut provider, profile("Ada", "ada@x.io"), "a.png", b"not an image", now())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[test]
    fn test_enroll_rejects_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let mut provider = FakeProvider::default().with(&png(1), vec![vec![1.0, 0.0]]);
        let err = store
            .enroll(&mut provider, profile("Ada", "ada@x.io"), "a.png", &png(1), now())
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert!(store.persons().is_empty());
    }

    #[test]
    fn test_remove_person_keeps_gallery_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let mut provider = FakeProvider::default()
            .with(&png(1), vec![vec![1.0, 0.0, 0.0]])
            .with(&png(2), vec![vec![0.0, 1.0, 0.0]])
            .with(&png(3), vec![vec![0.0, 0.0, 1.0]]);
        let mut ids = Vec::new();
        for (tag, name) in [(1u8, "A"), (2, "B"), (3, "C")] {
            let email = format!("{name}@x.io");
            let p = store
                .enroll(&mut provider, profile(name, &email), "f.png", &png(tag), now())
                .unwrap();
            ids.push(p.id);
        }

        let removed = store.remove_person(&ids[1]).unwrap();
        assert_eq!(removed.name, "B");

        let order: Vec<&str> = store
            .gallery()
            .entries()
            .iter()
            .map(|e| e.person_id.as_str())
            .collect();
        assert_eq!(order, vec![ids[0].as_str(), ids[2].as_str()]);
        assert!(!dir.path().join("uploads").join(&removed.image).exists());
        assert_eq!(std::fs::read_dir(dir.path().join("uploads")).unwrap().count(), 2);
        assert!(matches!(
            store.remove_person(&ids[1]),
            Err(Error::PersonNotFound(_))
        ));
    }

    fn enroll_three(store: &mut Store) -> Vec<String> {
        let mut provider = FakeProvider::default()
            .with(&png(1), vec![vec![1.0, 0.0, 0.0]])
            .with(&png(2), vec![vec![0.0, 1.0, 0.0]])
            .with(&png(3), vec![vec![0.0, 0.0, 1.0]]);
        [(1u8, "A"), (2, "B"), (3, "C")]
            .into_iter()
            .map(|(tag, name)| {
                let email = format!("{name}@x.io");
                store
                    .enroll(&mut provider, profile(name, &email), "f.png", &png(tag), now())
                    .unwrap()
                    .id
            })
            .collect()
    }

    fn gallery_on_disk(dir: &tempfile::TempDir) -> Vec<GalleryEntry> {
        crate::persist::read_json_or_default(&dir.path().join("gallery.json")).unwrap()
    }

    #[test]
    fn test_remove_keeps_roster_when_gallery_save_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let ids = enroll_three(&mut store);
        std::fs::create_dir(dir.path().join("gallery.json.tmp")).unwrap();

        assert!(store.remove_person(&ids[1]).is_err());
        assert_eq!(store.persons().len(), 3);
        assert_eq!(store.gallery().entries()[1].person_id, ids[1]);
        assert_eq!(gallery_on_disk(&dir).len(), 3);
    }

    #[test]
    fn test_remove_restores_gallery_when_roster_save_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let ids = enroll_three(&mut store);
        std::fs::create_dir(dir.path().join("persons.json.tmp")).unwrap();

        assert!(store.remove_person(&ids[1]).is_err());
        assert_eq!(store.persons().len(), 3);
        let order: Vec<String> = gallery_on_disk(&dir)
            .into_iter()
            .map(|e| e.person_id)
            .collect();
        assert_eq!(order, ids);
        assert_eq!(store.gallery().len(), 3);
    }

    #[test]
    fn test_failed_image_write_leaves_no_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let mut provider = FakeProvider::default().with(&png(1), vec![vec![1.0, 0.0, 0.0]]);
        std::fs::remove_dir(dir.path().join("uploads")).unwrap();
        std::fs::write(dir.path().join("uploads"), b"not a directory").unwrap();

        let err = store
            .enroll(&mut provider, profile("Ada", "ada@x.io"), "a.png", &png(1), now())
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(store.persons().is_empty());
        assert!(store.gallery().is_empty());
    }

    #[test]
    fn test_failed_roster_save_discards_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let mut provider = FakeProvider::default().with(&png(1), vec![vec![1.0, 0.0, 0.0]]);
        std::fs::create_dir(dir.path().join("persons.json.tmp")).unwrap();

        assert!(store
            .enroll(&mut provider, profile("Ada", "ada@x.io"), "a.png", &png(1), now())
            .is_err());
        assert_eq!(std::fs::read_dir(dir.path().join("uploads")).unwrap().count(), 0);
        assert!(gallery_on_disk(&dir).is_empty());
    }

    #[test]
    fn test_remove_by_name_refuses_homonyms() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let mut provider = FakeProvider::default()
            .with(&png(1), vec![vec![1.0, 0.0, 0.0]])
            .with(&png(2), vec![vec![0.0, 1.0, 0.0]])
            .with(&png(3), vec![vec![0.0, 0.0, 1.0]]);
        store
            .enroll(&mut provider, profile("Sam", "s1@x.io"), "f.png", &png(1), now())
            .unwrap();
        store
            .enroll(&mut provider, profile("Sam", "s2@x.io"), "f.png", &png(2), now())
            .unwrap();
        store
            .enroll(&mut provider, profile("Kim", "k@x.io"), "f.png", &png(3), now())
            .unwrap();

        assert!(matches!(
            store.remove_by_name("Sam"),
            Err(Error::AmbiguousName(_))
        ));
        assert_eq!(store.persons().len(), 3);
        assert_eq!(store.remove_by_name("Kim").unwrap().name, "Kim");
        assert!(matches!(
            store.remove_by_name("Kim"),
            Err(Error::PersonNotFound(_))
        ));
    }

    #[test]
    fn test_reencode_all_rebuilds_gallery() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let mut provider = FakeProvider::default()
            .with(&png(1), vec![vec![1.0, 0.0, 0.0]])
            .with(&png(2), vec![vec![0.0, 1.0, 0.0]]);
        let a = store
            .enroll(&mut provider, profile("A", "a@x.io"), "f.png", &png(1), now())
            .unwrap();
        let b = store
            .enroll(&mut provider, profile("B", "b@x.io"), "f.png", &png(2), now())
            .unwrap();
        std::fs::remove_file(dir.path().join("uploads").join(&b.image)).unwrap();

        // The model changed: same image, new vector.
        provider = FakeProvider::default().with(&png(1), vec![vec![0.5, 0.5, 0.0]]);
        let count = store.reencode_all(&mut provider).unwrap();

        assert_eq!(count, 1);
        assert_eq!(store.gallery().len(), 1);
        assert_eq!(
            store.gallery().get(&a.id).unwrap().embedding.values,
            vec![0.5, 0.5, 0.0]
        );
    }
}
