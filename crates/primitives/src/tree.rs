//! The navigation tree: a connected set of visits linked by resolved
//! referrer/opener relations, identified by its root visit's id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TreeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub tree_id: TreeId,
    pub first_load_time: DateTime<Utc>,
    pub latest_activity_time: DateTime<Utc>,
}
