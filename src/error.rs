use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::domain::ArtifactKind;

#[derive(Debug, Error, Diagnostic)]
pub enum HbnError {
    #[error("invalid subject id: {0}")]
    InvalidSubjectId(String),

    #[error("invalid URL template (expected exactly one `{{}}` slot): {0}")]
    InvalidUrlTemplate(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("request to {url} failed: {message}")]
    Retrieval { url: String, message: String },

    #[error("{url} returned status {status}")]
    RetrievalStatus { url: String, status: u16 },

    #[error("no lookup entry for subject {subject} ({kind})")]
    #[diagnostic(help("the bundled lookup table must list every subject in the participant registry"))]
    LookupMissing { subject: String, kind: ArtifactKind },

    #[error("failed to parse {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl HbnError {
    pub(crate) fn parse(source_name: &str, message: impl Into<String>) -> Self {
        HbnError::Parse {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }
}
