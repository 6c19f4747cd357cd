//! Error types shared by the trainer and the tagger.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The main error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration or argument error detected before the engine is involved.
    #[error("{0}")]
    InvalidArgument(String),

    /// A model file was rejected by the validator or by the loader.
    #[error("{problem}: {}", path.display())]
    InvalidModelFile {
        path: PathBuf,
        #[source]
        problem: ModelFileProblem,
    },

    /// The engine finished a training run with a non-success status code.
    #[error("{}", status_message(*code))]
    Engine { code: u32 },

    /// A model dump line did not match the dump grammar.
    #[error("failed to parse model dump line: {line:?}")]
    DumpParse { line: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Why a model file was rejected.
#[derive(Error, Debug)]
pub enum ModelFileProblem {
    #[error("Error opening model file")]
    Open(#[source] io::Error),

    #[error("Invalid model file (magic mismatch)")]
    BadMagic,

    #[error("Model file doesn't have a complete header")]
    IncompleteHeader,

    #[error("Error loading model file")]
    Load(#[source] io::Error),
}

impl Error {
    pub(crate) fn invalid<S: Into<String>>(message: S) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub(crate) fn model_file<P: Into<PathBuf>>(path: P, problem: ModelFileProblem) -> Self {
        Error::InvalidModelFile {
            path: path.into(),
            problem,
        }
    }

    /// Returns `true` for configuration and validation errors, the errors a
    /// caller can fix by passing different arguments.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_) | Error::InvalidModelFile { .. }
        )
    }

    /// The engine status code, if this error came from a training run.
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Engine { code } => Status::from_code(*code),
            _ => None,
        }
    }
}

/// Completion status reported by a failed training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Status {
    Unknown = 0x8000_0000,
    OutOfMemory,
    NotSupported,
    Incompatible,
    InternalLogic,
    Overflow,
    NotImplemented,
}

impl Status {
    const ALL: [Status; 7] = [
        Status::Unknown,
        Status::OutOfMemory,
        Status::NotSupported,
        Status::Incompatible,
        Status::InternalLogic,
        Status::Overflow,
        Status::NotImplemented,
    ];

    /// Numeric status code
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Look up a status by its numeric code
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| status.code() == code)
    }

    /// Fixed human-readable message
    pub fn message(self) -> &'static str {
        match self {
            Status::Unknown => "Unknown error occurred",
            Status::OutOfMemory => "Insufficient memory",
            Status::NotSupported => "Unsupported operation",
            Status::Incompatible => "Incompatible data",
            Status::InternalLogic => "Internal error",
            Status::Overflow => "Overflow",
            Status::NotImplemented => "Not implemented",
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::Engine {
            code: status.code(),
        }
    }
}

/// Message for a raw status code; codes outside the table are "Unexpected error".
pub fn status_message(code: u32) -> &'static str {
    Status::from_code(code).map_or("Unexpected error", Status::message)
}
