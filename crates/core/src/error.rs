use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmartcamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("env var not found: {0}")]
    MissingEnv(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for SmartcamError {
    fn from(e: serde_json::Error) -> Self {
        SmartcamError::Serialize(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SmartcamError>;
