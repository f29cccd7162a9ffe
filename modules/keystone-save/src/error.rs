use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaveError {
    /// The value could not be encoded as JSON
    #[error("failed to serialize {data}")]
    Serialize {
        data: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The backing store rejected a read, write, or delete
    #[error("save store failed for {key}")]
    Store {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type SaveResult<T> = std::result::Result<T, SaveError>;
