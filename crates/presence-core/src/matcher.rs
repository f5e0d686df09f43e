//! Nearest-neighbour matching of a probe embedding against the gallery.

use crate::gallery::GalleryEntry;
use crate::types::Embedding;

/// Distance from `probe` to every known embedding, in gallery order.
pub fn face_distance<'a, I>(known: I, probe: &Embedding) -> Vec<f32>
where
    I: IntoIterator<Item = &'a Embedding>,
{
    known
        .into_iter()
        .map(|e| probe.euclidean_distance(e))
        .collect()
}

/// Per-entry "same face" flags: `true` where the distance is within `tolerance`.
pub fn compare_faces<'a, I>(known: I, probe: &Embedding, tolerance: f32) -> Vec<bool>
where
    I: IntoIterator<Item = &'a Embedding>,
{
    face_distance(known, probe)
        .into_iter()
        .map(|d| d <= tolerance)
        .collect()
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the nearest gallery entry (`f32::INFINITY` when nothing was compared).
    pub distance: f32,
    /// Person id of the matched entry (if any).
    pub person_id: Option<String>,
    /// Display name of the matched entry (if any).
    pub name: Option<String>,
}

impl MatchResult {
    pub fn unknown(distance: f32) -> Self {
        Self {
            matched: false,
            distance,
            person_id: None,
            name: None,
        }
    }
}

/// Strategy for comparing a probe embedding against the enrolled gallery.
pub trait Matcher {
    fn best_match(&self, probe: &Embedding, gallery: &[GalleryEntry]) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher.
///
/// The nearest entry wins; on equal distances the earliest entry wins. The
/// nearest entry is accepted only when its own compare flag is set, never
/// because some other entry happened to be within tolerance.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub tolerance: f32,
    pub dimension: usize,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            tolerance: crate::DEFAULT_TOLERANCE,
            dimension: crate::DEFAULT_EMBEDDING_DIM,
        }
    }
}

impl EuclideanMatcher {
    pub fn new(tolerance: f32, dimension: usize) -> Self {
        Self {
            tolerance,
            dimension,
        }
    }
}

impl Matcher for EuclideanMatcher {
    fn best_match(&self, probe: &Embedding, gallery: &[GalleryEntry]) -> MatchResult {
        if probe.len() != self.dimension {
            tracing::warn!(
                expected = self.dimension,
                actual = probe.len(),
                "probe embedding has wrong dimension"
            );
            return MatchResult::unknown(f32::INFINITY);
        }

        let distances: Vec<f32> = gallery
            .iter()
            .map(|entry| {
                if entry.embedding.len() == self.dimension {
                    probe.euclidean_distance(&entry.embedding)
                } else {
                    tracing::warn!(
                        person_id = %entry.person_id,
                        actual = entry.embedding.len(),
                        "skipping gallery entry with wrong dimension"
                    );
                    f32::INFINITY
                }
            })
            .collect();
        let matches: Vec<bool> = distances.iter().map(|&d| d <= self.tolerance).collect();

        let mut best: Option<(usize, f32)> = None;
        for (i, &d) in distances.iter().enumerate() {
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((i, d));
            }
        }

        match best {
            Some((idx, distance)) if matches[idx] => MatchResult {
                matched: true,
                distance,
                person_id: Some(gallery[idx].person_id.clone()),
                name: Some(gallery[idx].name.clone()),
            },
            Some((_, distance)) => MatchResult::unknown(distance),
            None => MatchResult::unknown(f32::INFINITY),
        }
    }
}
