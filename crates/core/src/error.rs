use thiserror::Error;

#[derive(Error, Debug)]
pub enum CellwatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CellwatchError {
    fn from(e: serde_json::Error) -> Self {
        CellwatchError::Serialize(e.to_string())
    }
}
