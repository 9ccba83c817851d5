//! Error type for the fallible edges of the core.
//!
//! The serial protocol and instruction set never fail: malformed traffic is
//! accepted as a no-op. Errors only come from the collaborators around the
//! device (render surface, capture files, snapshots, trace files).

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The render surface could not allocate or upload the texture.
    #[error("render surface: {0}")]
    Surface(String),
    /// `update` was called before `init` created the texture.
    #[error("display texture not initialized")]
    TextureNotInitialized,
    /// File I/O failed (captures, traces, snapshot files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Snapshot encode/decode failed.
    #[error("snapshot: {0}")]
    Snapshot(String),
    /// A pin trace line could not be parsed.
    #[error("trace line {line}: {message}")]
    Trace { line: usize, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_io_source_is_kept() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "I/O error: gone");
    }

    #[test]
    fn test_trace_message() {
        let err = Error::Trace { line: 7, message: "bad level".into() };
        assert_eq!(err.to_string(), "trace line 7: bad level");
        assert!(err.source().is_none());
    }
}
