use std::path::PathBuf;
use thiserror::Error;

/// Input- and output-level failures. Anything per channel is recorded on the
/// channel itself and never surfaces here.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("cannot read input {}: {source}", path.display())]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unrecognized playlist dialect in {}: {reason}", path.display())]
    UnknownDialect { path: PathBuf, reason: String },

    #[error("failed to write {}: {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ValidatorError {
    /// Process exit code the CLI reports for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ValidatorError::InputUnreadable { .. } => 2,
            ValidatorError::UnknownDialect { .. } => 3,
            ValidatorError::OutputWrite { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let unreadable = ValidatorError::InputUnreadable {
            path: PathBuf::from("missing.m3u"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "nope"),
        };
        assert_eq!(unreadable.exit_code(), 2);
        assert!(unreadable.to_string().contains("missing.m3u"));

        let dialect = ValidatorError::UnknownDialect {
            path: PathBuf::from("blob.bin"),
            reason: "no channel lines".to_string(),
        };
        assert_eq!(dialect.exit_code(), 3);
    }
}
