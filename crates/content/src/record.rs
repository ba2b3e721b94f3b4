use serde::{Deserialize, Serialize};

/// Stored content for one visit (§3 Content entity, §4.7).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentRecord {
    pub url: String,
    pub title: Option<String>,
    pub body: String,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct ContentMeta {
    pub url: String,
    pub title: Option<String>,
    pub compressed: bool,
}
