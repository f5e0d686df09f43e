//! Roster of enrolled persons, persisted as a JSON array.

use crate::error::{Error, Result};
use crate::persist;
use crate::types::{NewPerson, Person, PersonPatch};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Roster {
    path: PathBuf,
    persons: Vec<Person>,
}

impl Roster {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let persons: Vec<Person> = persist::read_json_or_default(&path)?;
        tracing::info!(path = %path.display(), persons = persons.len(), "roster loaded");
        Ok(Self { path, persons })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn persons(&self) -> &[Person] {
        &self.persons
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Person> {
        self.persons.iter().find(|p| p.id == id)
    }

    pub fn require(&self, id: &str) -> Result<&Person> {
        self.get(id).ok_or_else(|| Error::PersonNotFound(id.to_string()))
    }

    pub fn find_by_name(&self, name: &str) -> Vec<&Person> {
        self.persons.iter().filter(|p| p.name == name).collect()
    }

    /// Case-insensitive substring search over name, email, position and department.
    pub fn search(&self, query: &str) -> Vec<&Person> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return self.persons.iter().collect();
        }
        self.persons
            .iter()
            .filter(|p| {
                [&p.name, &p.email, &p.position, &p.department]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&q))
            })
            .collect()
    }

    /// Check required fields and email uniqueness for a new enrollment.
    pub fn validate_new(&self, profile: &NewPerson) -> Result<()> {
        for (field, value) in [
            ("name", &profile.name),
            ("email", &profile.email),
            ("phone", &profile.phone),
        ] {
            if value.trim().is_empty() {
                return Err(Error::MissingField(field));
            }
        }
        self.check_email_free(profile.email.trim(), None)
    }

    fn check_email_free(&self, email: &str, except_id: Option<&str>) -> Result<()> {
        let taken = self
            .persons
            .iter()
            .any(|p| p.email == email && Some(p.id.as_str()) != except_id);
        if taken {
            return Err(Error::DuplicateEmail(email.to_string()));
        }
        Ok(())
    }

    /// Append a person and persist the roster.
    pub fn insert(&mut self, person: Person) -> Result<()> {
        self.persons.push(person);
        if let Err(e) = self.save() {
            self.persons.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Apply a field patch to person `id` and persist.
    pub fn update(&mut self, id: &str, patch: PersonPatch, now: NaiveDateTime) -> Result<Person> {
        let idx = self
            .persons
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::PersonNotFound(id.to_string()))?;
        for (field, value) in [
            ("name", &patch.name),
            ("email", &patch.email),
            ("phone", &patch.phone),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(Error::MissingField(field));
            }
        }
        if let Some(email) = &patch.email {
            self.check_email_free(email.trim(), Some(id))?;
        }
        let previous = self.persons[idx].clone();
        self.persons[idx].apply(patch, now);
        if let Err(e) = self.save() {
            self.persons[idx] = previous;
            return Err(e);
        }
        Ok(self.persons[idx].clone())
    }

    /// Replace the stored copy of `person` (matched by id) and persist.
    pub(crate) fn restore(&mut self, person: Person) -> Result<()> {
        let idx = self
            .persons
            .iter()
            .position(|p| p.id == person.id)
            .ok_or_else(|| Error::PersonNotFound(person.id.clone()))?;
        self.persons[idx] = person;
        self.save()
    }

    /// Remove person `id` and persist.
    pub fn remove(&mut self, id: &str) -> Result<Person> {
        let idx = self
            .persons
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::PersonNotFound(id.to_string()))?;
        let removed = self.persons.remove(idx);
        if let Err(e) = self.save() {
            self.persons.insert(idx, removed);
            return Err(e);
        }
        Ok(removed)
    }

    pub fn save(&self) -> Result<()> {
        persist::write_json_atomic(&self.path, &self.persons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    fn profile(name: &str, email: &str) -> NewPerson {
        NewPerson {
            name: name.into(),
            email: email.into(),
            phone: "555-0100".into(),
            position: "Engineer".into(),
            department: "Platform".into(),
            active: true,
        }
    }

    fn roster_with(names: &[(&str, &str)]) -> (tempfile::TempDir, Roster) {
        let dir = tempfile::tempdir().unwrap();
        let mut roster = Roster::open(dir.path().join("persons.json")).unwrap();
        for (i, (name, email)) in names.iter().enumerate() {
            let p = Person::new(format!("id-{i}"), profile(name, email), String::new(), now());
            roster.insert(p).unwrap();
        }
        (dir, roster)
    }

    #[test]
    fn test_validate_requires_fields() {
        let (_dir, roster) = roster_with(&[]);
        let mut p = profile("Ada", "ada@x.io");
        p.phone = "  ".into();
        assert!(matches!(
            roster.validate_new(&p),
            Err(Error::MissingField("phone"))
        ));
        p = profile("", "ada@x.io");
        assert!(matches!(
            roster.validate_new(&p),
            Err(Error::MissingField("name"))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_email() {
        let (_dir, roster) = roster_with(&[("Ada", "ada@x.io")]);
        let err = roster.validate_new(&profile("Other", "ada@x.io")).unwrap_err();
        assert!(matches!(err, Error::DuplicateEmail(_)));
        assert!(roster.validate_new(&profile("Other", "o@x.io")).is_ok());
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let (_dir, mut roster) = roster_with(&[("Ada Lovelace", "ada@x.io"), ("Alan", "alan@y.io")]);
        roster
            .update(
                "id-1",
                PersonPatch {
                    department: Some("Cryptanalysis".into()),
                    ..Default::default()
                },
                now(),
            )
            .unwrap();
        assert_eq!(roster.search("LOVE").len(), 1);
        assert_eq!(roster.search("crypt")[0].name, "Alan");
        assert_eq!(roster.search("platform").len(), 1);
        assert_eq!(roster.search("").len(), 2);
    }

    #[test]
    fn test_update_rejects_email_of_other_person() {
        let (_dir, mut roster) = roster_with(&[("Ada", "ada@x.io"), ("Alan", "alan@y.io")]);
        let patch = PersonPatch {
            email: Some("ada@x.io".into()),
            ..Default::default()
        };
        assert!(matches!(
            roster.update("id-1", patch, now()),
            Err(Error::DuplicateEmail(_))
        ));
        // Re-submitting one's own email is fine.
        let same = PersonPatch {
            email: Some("alan@y.io".into()),
            ..Default::default()
        };
        assert!(roster.update("id-1", same, now()).is_ok());
    }

    #[test]
    fn test_update_unknown_id() {
        let (_dir, mut roster) = roster_with(&[]);
        assert!(matches!(
            roster.update("ghost", PersonPatch::default(), now()),
            Err(Error::PersonNotFound(_))
        ));
    }

    #[test]
    fn test_update_unknown_id_with_taken_email_is_not_found() {
        let (_dir, mut roster) = roster_with(&[("Ada", "ada@x.io")]);
        let patch = PersonPatch {
            email: Some("ada@x.io".into()),
            name: Some("".into()),
            ..Default::default()
        };
        assert!(matches!(
            roster.update("ghost", patch, now()),
            Err(Error::PersonNotFound(_))
        ));
    }

    #[test]
    fn test_remove_persists() {
        let (dir, mut roster) = roster_with(&[("Ada", "ada@x.io"), ("Alan", "alan@y.io")]);
        let removed = roster.remove("id-0").unwrap();
        assert_eq!(removed.name, "Ada");

        let reopened = Roster::open(dir.path().join("persons.json")).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.get("id-0").is_none());
        assert!(matches!(roster.remove("id-0"), Err(Error::PersonNotFound(_))));
    }

    #[test]
    fn test_find_by_name_returns_all_homonyms() {
        let (_dir, roster) = roster_with(&[("Sam", "a@x.io"), ("Sam", "b@x.io"), ("Kim", "c@x.io")]);
        assert_eq!(roster.find_by_name("Sam").len(), 2);
        assert!(roster.find_by_name("Nobody").is_empty());
    }
}
