//! Error types for the verse data layer

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerseError {
    #[error("Source document is empty")]
    EmptySource,

    #[error("Source document is not verse XML (received an HTML page)")]
    WrongFormat,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Source document contains no usable verses")]
    NoRecords,

    #[error("Load error: {0}")]
    Load(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl VerseError {
    /// True for failures of a language's source document. These disable a
    /// non-default language and trigger the fallback to the default one.
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            VerseError::EmptySource
                | VerseError::WrongFormat
                | VerseError::Parse(_)
                | VerseError::NoRecords
                | VerseError::Load(_)
        )
    }
}

impl serde::Serialize for VerseError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<rusqlite::Error> for VerseError {
    fn from(e: rusqlite::Error) -> Self {
        VerseError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for VerseError {
    fn from(e: serde_json::Error) -> Self {
        VerseError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_failures() {
        assert!(VerseError::EmptySource.is_source_failure());
        assert!(VerseError::Load("HTTP 404".into()).is_source_failure());
        assert!(!VerseError::Storage("quota".into()).is_source_failure());
        assert!(!VerseError::Config("bad".into()).is_source_failure());
        assert!(!VerseError::InvalidInput("empty name".into()).is_source_failure());
    }

    #[test]
    fn test_serializes_as_message() {
        let json = serde_json::to_string(&VerseError::NoRecords).unwrap();
        assert_eq!(json, "\"Source document contains no usable verses\"");
    }
}
