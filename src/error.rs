use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    ConfigValidation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("api error ({code}): {message}")]
    Api { code: String, message: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("text generation error: {0}")]
    Generation(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("prompt error: {0}")]
    Prompt(String),

    #[error("process error: {0}")]
    Process(String),
}

impl Error {
    /// Short name of the error category, as reported to callers.
    pub fn error_type(&self) -> String {
        match self {
            Error::ConfigNotFound(_) | Error::ConfigParse(_) | Error::ConfigValidation(_) => {
                "ConfigError".to_string()
            }
            Error::Io(_) => "IoError".to_string(),
            Error::Api { code, .. } => code.clone(),
            Error::Validation(_) => "ValidationError".to_string(),
            Error::Generation(_) => "GenerationError".to_string(),
            Error::Catalog(_) => "CatalogError".to_string(),
            Error::Prompt(_) => "PromptError".to_string(),
            Error::Process(_) => "ProcessError".to_string(),
        }
    }

    /// The message without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            Error::Api { message, .. } => message.clone(),
            Error::Validation(m)
            | Error::Generation(m)
            | Error::Catalog(m)
            | Error::Prompt(m)
            | Error::Process(m)
            | Error::ConfigValidation(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
