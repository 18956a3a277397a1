//! Error types for the harness.
//!
//! Errors are grouped by how far they reach: a [`LoadError`] on a phase
//! partition only ends that phase, an allocation failure during insert only
//! stops the remaining inserts of its phase, and a [`HarnessError`] ends the
//! run.

use std::collections::TryReserveError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::Partition;

/// Result type alias using HarnessError.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// A partition's key source could not be turned into keys.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("partition {partition}: cannot open {path}: {source}")]
    Open {
        partition: Partition,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("partition {partition}: cannot map {path}: {source}")]
    Map {
        partition: Partition,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("partition {partition}: {path} ends with a partial {trailing}-byte record")]
    PartialRecord {
        partition: Partition,
        path: PathBuf,
        trailing: usize,
    },

    #[error("partition {partition}: line {line} of {path} is not a key: {text:?}")]
    BadKey {
        partition: Partition,
        path: PathBuf,
        line: usize,
        text: String,
    },
}

impl LoadError {
    pub fn partition(&self) -> Partition {
        match self {
            LoadError::Open { partition, .. }
            | LoadError::Map { partition, .. }
            | LoadError::PartialRecord { partition, .. }
            | LoadError::BadKey { partition, .. } => *partition,
        }
    }
}

/// An insert ran out of memory partway through a phase.
#[derive(Debug, Clone, Error)]
#[error("partition {partition}: insert at position {position} failed: {source}")]
pub struct InsertError {
    pub partition: Partition,
    /// Zero-based offset of the failed entry within the partition.
    pub position: usize,
    #[source]
    pub source: TryReserveError,
}

/// A snapshot could not be written out.
#[derive(Debug, Error)]
#[error("cannot write snapshot to {path}: {source}")]
pub struct ExportError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// The baseline index could not be built.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("initial partition holds no keys")]
    Empty,

    #[error(transparent)]
    BulkLoad(#[from] leaftree::BulkLoadError),
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("initial load failed: {0}")]
    InitialLoad(#[source] LoadError),

    #[error("cannot build index from partition {partition}: {source}")]
    Build {
        partition: Partition,
        #[source]
        source: BuildError,
    },

    #[error("baseline export failed: {0}")]
    BaselineExport(#[source] ExportError),

    #[error("partition {partition}: cannot write {path}: {source}")]
    Generate {
        partition: Partition,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
