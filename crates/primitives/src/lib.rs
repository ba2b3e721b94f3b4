//! Shared domain types for the visit ingestion and tree reconciliation
//! engine: identifiers, lifecycle-stage records, and the producer-facing
//! ingress contract. No I/O lives in this crate.

pub mod error;
pub mod ids;
pub mod payload;
pub mod tree;
pub mod visit;

pub use error::SchemaError;
pub use ids::{Digest, InvalidDigest, TreeId, VisitId};
pub use payload::{SubmitAck, ValidatedVisit, VisitPayload};
pub use tree::Tree;
pub use visit::{Analysis, NewVisit, ReconcileOutcome, TreeIntention, Visit, VisitWithMeta};
