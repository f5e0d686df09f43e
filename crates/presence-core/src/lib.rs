//! presence-core — Face-matched attendance tracking.
//!
//! Matches face embeddings against an enrolled gallery and keeps the
//! roster, the daily attendance ledger and the absence snapshot on disk.
//! Face detection and embedding are delegated to an [`EmbeddingProvider`].

pub mod absence;
pub mod enrollment;
pub mod error;
pub mod gallery;
pub mod kiosk;
pub mod ledger;
pub mod matcher;
pub mod persist;
pub mod provider;
pub mod recognition;
pub mod roster;
pub mod store;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use gallery::{Gallery, GalleryEntry};
pub use ledger::{AttendanceFilter, Ledger, RecordOutcome};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher};
pub use provider::{EmbeddingProvider, ProviderError};
pub use recognition::{CheckIn, Recognition};
pub use store::{DataLayout, Store};
pub use types::{
    AbsenceRecord, AttendanceRecord, BoundingBox, Embedding, NewPerson, Person, PersonPatch,
    Stats,
};

/// Default maximum Euclidean distance for two embeddings to be the same person.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Default embedding dimension produced by the provider.
pub const DEFAULT_EMBEDDING_DIM: usize = 128;
