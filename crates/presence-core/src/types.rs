use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Bounding box of a detected face, in image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub confidence: f32,
}

/// Face embedding vector (128-dimensional for the default provider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance between two embeddings.
    ///
    /// Only meaningful for embeddings of the same dimension; callers check
    /// dimensions before comparing.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// An enrolled person on the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub department: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// File name of the enrollment image inside the uploads directory.
    #[serde(default)]
    pub image: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Person {
    pub fn new(id: String, profile: NewPerson, image: String, now: NaiveDateTime) -> Self {
        Self {
            id,
            name: profile.name.trim().to_string(),
            email: profile.email.trim().to_string(),
            phone: profile.phone.trim().to_string(),
            position: profile.position,
            department: profile.department,
            active: profile.active,
            image,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a field patch, refreshing `updated_at`.
    pub fn apply(&mut self, patch: PersonPatch, now: NaiveDateTime) {
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(email) = patch.email {
            self.email = email.trim().to_string();
        }
        if let Some(phone) = patch.phone {
            self.phone = phone.trim().to_string();
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(department) = patch.department {
            self.department = department;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        self.updated_at = now;
    }
}

fn default_active() -> bool {
    true
}

/// Profile fields supplied when enrolling a person.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NewPerson {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub department: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Partial update of a person's profile. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PersonPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub department: Option<String>,
    pub active: Option<bool>,
}

/// A single attendance event: one identity, one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub person_id: String,
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub image: String,
}

/// Snapshot of an active person without attendance on `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsenceRecord {
    /// Person id.
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub image: String,
    pub position: String,
    pub department: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AbsenceRecord {
    pub fn from_person(person: &Person, date: NaiveDate) -> Self {
        Self {
            id: person.id.clone(),
            name: person.name.clone(),
            email: person.email.clone(),
            phone: person.phone.clone(),
            image: person.image.clone(),
            position: person.position.clone(),
            department: person.department.clone(),
            date,
            reason: None,
        }
    }
}

/// Roster and attendance counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_persons: usize,
    pub active_persons: usize,
    pub today_presences: usize,
    pub week_presences: usize,
    pub total_presences: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_euclidean_distance() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_embedding_serializes_as_array() {
        let e = Embedding::new(vec![0.5, -1.0]);
        assert_eq!(serde_json::to_string(&e).unwrap(), "[0.5,-1.0]");
    }

    #[test]
    fn test_new_person_defaults_active() {
        let p: NewPerson =
            serde_json::from_str(r#"{"name":"Ada","email":"ada@x.io","phone":"1"}"#).unwrap();
        assert!(p.active);
        assert_eq!(p.department, "");
    }

    #[test]
    fn test_apply_patch_only_touches_given_fields() {
        let profile = NewPerson {
            name: " Ada ".into(),
            email: "ada@x.io".into(),
            phone: "1".into(),
            ..Default::default()
        };
        let mut person = Person::new("p1".into(), profile, "p1.png".into(), ts());
        assert_eq!(person.name, "Ada");

        let later = ts() + chrono::Duration::hours(1);
        person.apply(
            PersonPatch {
                department: Some("R&D".into()),
                active: Some(false),
                ..Default::default()
            },
            later,
        );
        assert_eq!(person.name, "Ada");
        assert_eq!(person.department, "R&D");
        assert!(!person.active);
        assert_eq!(person.updated_at, later);
        assert_eq!(person.created_at, ts());
    }
}
