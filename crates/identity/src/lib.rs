//! Deterministic content-addressed identifiers (§4.1 of the spec).
//!
//! `visit_id = hash(url + ":" + iso_timestamp)`; `tree_id` is, by
//! convention, the `visit_id` of a tree's root visit (see
//! [`wayline_primitives::TreeId::from_root_visit`]). Pure, no I/O: the same
//! `(url, timestamp)` pair produces the same id in every process and across
//! restarts, which is what lets producers and the engine agree on identity
//! without coordinating.
//!
//! The spec permits "MD5 acceptable; any collision-resistant-within-domain
//! hash acceptable". This implementation uses SHA-256 rather than adding an
//! MD5 dependency the surrounding stack has no other use for — see
//! `DESIGN.md` for the full rationale.

use chrono::{DateTime, SecondsFormat, Utc};
use wayline_primitives::{Digest, TreeId, VisitId};

/// Two distinct `(url, timestamp)` inputs hashed to the same digest while
/// already holding different stored fields. The spec treats this as
/// unreachable in practice; callers are expected to surface it as a fatal,
/// per-visit error rather than attempt recovery.
#[derive(Debug, thiserror::Error)]
#[error("identity collision: two distinct (url, timestamp) pairs hashed to the same digest")]
pub struct IdentityCollision;

/// Renders a timestamp the same way on every call: RFC 3339, `Z` suffix,
/// sub-second precision preserved only when the input carries it.
#[must_use]
pub fn canonical_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Computes the deterministic id for a visit.
#[must_use]
pub fn visit_id(url: &str, page_loaded_at: DateTime<Utc>) -> VisitId {
    let serialised = format!("{url}:{}", canonical_timestamp(page_loaded_at));
    VisitId::from_digest(Digest::of(&serialised))
}

/// The id a new tree takes when rooted at `root_visit`: by convention,
/// identical to the root visit's own id (§3, Identity rules).
#[must_use]
pub const fn tree_id_for_root(root_visit: VisitId) -> TreeId {
    TreeId::from_root_visit(root_visit)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn same_input_same_id() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let a = visit_id("https://a.com/x", t);
        let b = visit_id("https://a.com/x", t);
        assert_eq!(a, b);
    }

    #[test]
    fn different_url_different_id() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let a = visit_id("https://a.com/x", t);
        let b = visit_id("https://a.com/y", t);
        assert_ne!(a, b);
    }

    #[test]
    fn different_timestamp_different_id() {
        let a = visit_id("https://a.com/x", Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap());
        let b = visit_id("https://a.com/x", Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 1).unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn tree_id_matches_root_visit_id() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let root = visit_id("https://a.com/x", t);
        let tree = tree_id_for_root(root);
        assert_eq!(tree.to_string(), root.to_string());
    }

    #[test]
    fn canonical_timestamp_uses_zulu_suffix() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(canonical_timestamp(t), "2025-01-01T10:00:00Z");
    }
}
