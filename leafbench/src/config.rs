//! Run configuration.
//!
//! Command-line arguments are parsed by clap into [`RunArgs`] and then
//! validated into a [`RunConfig`] before any index work starts, so a bad
//! option never costs a bulk load.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use tracing::info;

use crate::error::{HarnessError, Result};
use crate::keys::{KeyEncoding, PartitionSource};
use crate::Partition;

/// Phase partitions when none are given.
pub const DEFAULT_PARTITIONS: [Partition; 9] = [1, 2, 3, 4, 5, 6, 7, 8, 9];

/// Baseline export file name.
pub const BASELINE_EXPORT: &str = "node_info.txt";

/// Export file name after `partition`'s phase.
pub fn phase_export_name(partition: Partition) -> String {
    format!("node_info_after_user_{partition}.txt")
}

/// Distribution of lookup keys in a mixed lookup/insert workload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LookupDistribution {
    #[default]
    Uniform,
    Zipf,
}

/// `run` subcommand arguments.
///
/// Flags keep their underscore spelling; kebab-case aliases are accepted.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Encoding of the partition key files
    #[arg(long = "keys_file_type", alias = "keys-file-type", value_enum)]
    pub keys_file_type: KeyEncoding,

    /// Partition used for the initial bulk load
    #[arg(long = "init_usr_id", alias = "init-usr-id")]
    pub init_usr_id: Partition,

    /// Directory holding `user_<id>.txt` partition files
    #[arg(long = "data_dir", alias = "data-dir", default_value = "./avg")]
    pub data_dir: PathBuf,

    /// Directory receiving the node_info exports
    #[arg(long = "out_dir", alias = "out-dir", default_value = ".")]
    pub out_dir: PathBuf,

    /// Partitions inserted after the bulk load, in order
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_PARTITIONS)]
    pub partitions: Vec<Partition>,

    /// Expected number of keys in the initial partition
    #[arg(long = "init_num_keys", alias = "init-num-keys")]
    pub init_num_keys: Option<usize>,

    /// Expected number of keys across all partitions
    #[arg(long = "total_num_keys", alias = "total-num-keys")]
    pub total_num_keys: Option<usize>,

    /// Operations per batch in a mixed workload
    #[arg(long = "batch_size", alias = "batch-size")]
    pub batch_size: Option<usize>,

    /// Fraction of operations that are inserts
    #[arg(long = "insert_frac", alias = "insert-frac", default_value_t = 0.5)]
    pub insert_frac: f64,

    /// Lookup key distribution
    #[arg(
        long = "lookup_distribution",
        alias = "lookup-distribution",
        value_enum,
        default_value_t = LookupDistribution::Uniform
    )]
    pub lookup_distribution: LookupDistribution,

    /// Time limit in minutes
    #[arg(long = "time_limit", alias = "time-limit")]
    pub time_limit: Option<f64>,

    /// Print statistics for every batch
    #[arg(long = "print_batch_stats", alias = "print-batch-stats")]
    pub print_batch_stats: bool,
}

/// Workload-shaping options for a mixed lookup/insert workload. They are
/// validated and recorded; the partition phases themselves don't use them.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadShape {
    pub init_num_keys: Option<usize>,
    pub total_num_keys: Option<usize>,
    pub batch_size: Option<usize>,
    pub insert_frac: f64,
    pub lookup_distribution: LookupDistribution,
    pub time_limit_mins: Option<f64>,
    pub print_batch_stats: bool,
}

impl Default for WorkloadShape {
    fn default() -> Self {
        Self {
            init_num_keys: None,
            total_num_keys: None,
            batch_size: None,
            insert_frac: 0.5,
            lookup_distribution: LookupDistribution::Uniform,
            time_limit_mins: None,
            print_batch_stats: false,
        }
    }
}

/// Validated configuration of one benchmark run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub encoding: KeyEncoding,
    pub initial_partition: Partition,
    pub source: PartitionSource,
    pub out_dir: PathBuf,
    pub partitions: Vec<Partition>,
    pub shape: WorkloadShape,
}

impl RunConfig {
    /// A config with the default phase partitions and workload shape.
    pub fn new(
        encoding: KeyEncoding,
        initial_partition: Partition,
        data_dir: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            encoding,
            initial_partition,
            source: PartitionSource::new(data_dir),
            out_dir: out_dir.into(),
            partitions: DEFAULT_PARTITIONS.to_vec(),
            shape: WorkloadShape::default(),
        }
    }

    pub fn with_partitions(mut self, partitions: impl Into<Vec<Partition>>) -> Self {
        self.partitions = partitions.into();
        self
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.out_dir.join(BASELINE_EXPORT)
    }

    pub fn phase_path(&self, partition: Partition) -> PathBuf {
        self.out_dir.join(phase_export_name(partition))
    }

    pub fn validate(&self) -> Result<()> {
        let frac = self.shape.insert_frac;
        if !(0.0..=1.0).contains(&frac) {
            return Err(HarnessError::Config(format!(
                "insert_frac must be within [0, 1], got {frac}"
            )));
        }
        if let Some(limit) = self.shape.time_limit_mins {
            if !(limit > 0.0) {
                return Err(HarnessError::Config(format!(
                    "time_limit must be positive, got {limit}"
                )));
            }
        }
        if self.shape.batch_size == Some(0) {
            return Err(HarnessError::Config("batch_size must be positive".into()));
        }
        Ok(())
    }

    pub fn log(&self) {
        info!(
            encoding = self.encoding.as_str(),
            initial_partition = self.initial_partition,
            data_dir = %self.source.root().display(),
            out_dir = %self.out_dir.display(),
            partitions = ?self.partitions,
            "run configuration"
        );
        info!(shape = ?self.shape, "workload shape (not used by partition phases)");
    }
}

impl TryFrom<RunArgs> for RunConfig {
    type Error = HarnessError;

    fn try_from(args: RunArgs) -> Result<Self> {
        let config = RunConfig {
            encoding: args.keys_file_type,
            initial_partition: args.init_usr_id,
            source: PartitionSource::new(args.data_dir),
            out_dir: args.out_dir,
            partitions: args.partitions,
            shape: WorkloadShape {
                init_num_keys: args.init_num_keys,
                total_num_keys: args.total_num_keys,
                batch_size: args.batch_size,
                insert_frac: args.insert_frac,
                lookup_distribution: args.lookup_distribution,
                time_limit_mins: args.time_limit,
                print_batch_stats: args.print_batch_stats,
            },
        };
        config.validate()?;
        Ok(config)
    }
}
