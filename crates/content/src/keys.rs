//! Key layout: every visit owns a `meta:` row (url, title, compression
//! flag) and a `body:` row (the page text, optionally zstd-compressed),
//! following the prefixed-key convention the teacher's RocksDB storage
//! layer uses for its own multi-entity tables.

use wayline_primitives::VisitId;

pub(crate) fn meta_key(visit_id: VisitId) -> String {
    format!("meta:{visit_id}")
}

pub(crate) fn body_key(visit_id: VisitId) -> String {
    format!("body:{visit_id}")
}
