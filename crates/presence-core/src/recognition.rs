//! Recognition and check-in.

use crate::enrollment::ensure_decodable;
use crate::error::{Error, Result};
use crate::matcher::Matcher;
use crate::provider::EmbeddingProvider;
use crate::store::Store;
use chrono::NaiveDateTime;
use serde::Serialize;

/// Outcome of matching a captured face against the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Recognition {
    Matched {
        person_id: String,
        name: String,
        distance: f32,
    },
    Unknown,
}

impl Recognition {
    pub fn is_match(&self) -> bool {
        matches!(self, Recognition::Matched { .. })
    }

    /// Display name, or `"unknown"`.
    pub fn name(&self) -> &str {
        match self {
            Recognition::Matched { name, .. } => name,
            Recognition::Unknown => "unknown",
        }
    }
}

/// Outcome of a check-in: who was seen and whether a new record was written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckIn {
    pub recognition: Recognition,
    pub recorded: bool,
}

impl Store {
    /// Match the first face found in `image` against the gallery.
    pub fn recognize(
        &self,
        provider: &mut dyn EmbeddingProvider,
        image: &[u8],
    ) -> Result<Recognition> {
        ensure_decodable(image)?;
        let faces = provider.detect(image)?;
        let face = faces.first().ok_or(Error::NoFaceDetected)?;
        if faces.len() > 1 {
            tracing::debug!(faces = faces.len(), "several faces detected; using the first");
        }
        let embedding = provider.encode(image, face)?;

        let result = self.matcher.best_match(&embedding, self.gallery.entries());
        let (Some(person_id), Some(name)) = (result.person_id, result.name) else {
            tracing::info!(distance = result.distance, "face not recognized");
            return Ok(Recognition::Unknown);
        };
        if self.roster.get(&person_id).is_none() {
            tracing::warn!(%person_id, "matched gallery entry has no roster person");
            return Ok(Recognition::Unknown);
        }

        tracing::info!(%person_id, %name, distance = result.distance, "face recognized");
        Ok(Recognition::Matched {
            person_id,
            name,
            distance: result.distance,
        })
    }

    /// Recognize `image` and, on a match, record attendance at `at`.
    pub fn check_in(
        &mut self,
        provider: &mut dyn EmbeddingProvider,
        image: &[u8],
        at: NaiveDateTime,
    ) -> Result<CheckIn> {
        let recognition = self.recognize(provider, image)?;
        let recorded = match &recognition {
            Recognition::Matched { person_id, .. } => {
                let outcome = self.record_attendance(person_id, at)?;
                outcome.is_inserted()
            }
            Recognition::Unknown => false,
        };
        Ok(CheckIn {
            recognition,
            recorded,
        })
    }
}
