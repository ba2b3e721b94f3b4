use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentStoreError {
    #[error("content store io error: {0}")]
    Io(String),

    #[error("content record corrupt for {visit_id}: {reason}")]
    Corrupt { visit_id: String, reason: String },
}

impl From<rocksdb::Error> for ContentStoreError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Io(err.to_string())
    }
}
