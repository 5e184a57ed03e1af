//! Error types for feed ingestion, storage and lookups
//!
//! Refresh-path errors (`FetchError`, `ParseError`, `RepositoryError`) are
//! folded into `RefreshError` and stay inside the engine: the scheduler logs
//! them and the cycle is abandoned. Lookup-path errors surface to callers as
//! `LookupError` so a presentation layer can tell "no results" apart from a
//! storage failure.

use thiserror::Error;

/// Feed could not be retrieved or read to the end
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to reach feed {url}: {message}")]
    Transport { url: String, message: String },

    #[error("feed {url} answered with HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("failed downloading feed {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed reading feed at line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: std::io::Error,
    },
}

/// A route line that looked like a route but did not describe a valid prefix
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {reason} ({content:?})")]
pub struct ParseError {
    pub line: usize,
    pub content: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(line: usize, content: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            line,
            content: content.into(),
            reason: reason.into(),
        }
    }
}

/// Storage backend failure
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to open database at '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("in-memory store lock poisoned")]
    Poisoned,

    #[error("{0}")]
    Backend(String),
}

/// Why a refresh cycle was abandoned
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("malformed route feed: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{0} refresh already in progress")]
    AlreadyRunning(&'static str),

    #[error("{0} refresh cancelled before cutover")]
    Cancelled(&'static str),
}

/// Query-path failure surfaced to callers
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("no results found for '{0}'")]
    NotFound(String),

    #[error("empty query")]
    EmptyQuery,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl LookupError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LookupError::NotFound(_))
    }
}
