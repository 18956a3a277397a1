//! # leafbench
//!
//! Benchmark harness that watches a [`leaftree::LeafTree`] evolve under
//! partitioned inserts.
//!
//! One partition is bulk loaded to build the index; every further partition
//! is then inserted key by key, timed, and followed by a snapshot of every
//! leaf's linear model. Snapshots are written as `slope,intercept,min,max`
//! lines, one file per phase.
//!
//! ## Example
//!
//! ```no_run
//! use leafbench::{run, KeyEncoding, RunConfig};
//!
//! let config = RunConfig::new(KeyEncoding::Text, 0, "./avg", "./out")
//!     .with_partitions(vec![1, 2, 3]);
//! let report = run(&config)?;
//! report.print_summary();
//! # Ok::<(), leafbench::HarnessError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

pub mod config;
pub mod driver;
pub mod error;
pub mod generate;
pub mod keys;
pub mod snapshot;

/// Index key.
pub type Key = u64;

/// Per-entry payload; every key of a partition carries its partition id.
pub type Tag = f64;

/// Partition identifier, the `<id>` in `user_<id>.txt`.
pub type Partition = u32;

pub use config::{RunArgs, RunConfig, WorkloadShape};
pub use driver::{build, insert_partition, run, PartitionIndex, PhaseOutcome, PhaseReport, RunReport, Workload};
pub use error::{BuildError, ExportError, HarnessError, InsertError, LoadError};
pub use generate::{generate, GenerateArgs, GenerateConfig, KeySpace};
pub use keys::{pair_with_tag, partition_tag, KeyEncoding, PartitionSource};
pub use snapshot::{snapshot, Introspect, ModelSnapshot, Snapshot, TreeNode};
