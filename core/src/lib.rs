//! Duplicate identification and record merge for the lead registry.
//!
//! The pipeline, leaves first: [`matching::compare_field`] scores one
//! identity field, [`matching::find_duplicates`] aggregates per-field
//! evidence into candidates, [`decisions::build_preview`] turns a
//! candidate pair into a field-by-field merge plan, and [`engine`]
//! executes or reverses an approved merge through the [`store`] seams.

pub mod config;
pub mod decisions;
pub mod engine;
pub mod error;
pub mod identity;
pub mod leads;
pub mod matching;
pub mod store;

pub use config::DedupConfig;
pub use decisions::{MergeFieldDecision, MergePreview};
pub use engine::{BulkCheckItem, MergeRequest, MergeResult, RestoredRecord};
pub use error::{ApiError, MergeError};
pub use identity::{IdentityField, IdentityProfile};
pub use leads::{
    AuditEntry, DependentKind, DependentRecord, Lead, MergeAuditRecord, MigrationMarker,
    RetirementStamp,
};
pub use matching::{DuplicateCandidate, FieldMatch, MatchType};
pub use store::{DependentStore, LeadStore, MemoryStore, StoreError};
