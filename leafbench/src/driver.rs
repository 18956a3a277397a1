//! Bulk-load-then-mutate lifecycle of one shared index.
//!
//! ```text
//! initial partition ─ load ─ pair ─ sort ─ bulk load ─┐
//!                                                     ├─ snapshot ─ node_info.txt
//! for p in partitions:                                │
//!     load p ─ pair ─ timed inserts ─ snapshot ─ node_info_after_user_<p>.txt
//! ```
//!
//! Phases run strictly one after another against the same index. A phase
//! whose partition can't be loaded is skipped; a phase that runs out of
//! memory keeps the entries inserted so far. Either way the run moves on.

use std::collections::TryReserveError;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use leaftree::{LeafTree, TreeConfig};
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::error::{BuildError, ExportError, HarnessError, InsertError, LoadError, Result};
use crate::keys::{pair_with_tag, partition_tag, KeyEncoding, PartitionSource};
use crate::snapshot::{snapshot, Introspect, Snapshot};
use crate::{Key, Partition, Tag};

/// An index the insertion phases can drive.
pub trait PartitionIndex: Introspect {
    /// Insert one entry. On `Err` the index must be unchanged.
    fn try_insert(&mut self, key: Key, tag: Tag) -> std::result::Result<(), TryReserveError>;

    /// Number of entries held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartitionIndex for LeafTree<Tag> {
    fn try_insert(&mut self, key: Key, tag: Tag) -> std::result::Result<(), TryReserveError> {
        LeafTree::try_insert(self, key, tag)
    }

    fn len(&self) -> usize {
        LeafTree::len(self)
    }
}

/// Sort `pairs` by key (stable) and bulk load them into a fresh index.
pub fn build(pairs: Vec<(Key, Tag)>) -> std::result::Result<LeafTree<Tag>, BuildError> {
    build_with_config(pairs, TreeConfig::default())
}

pub fn build_with_config(
    mut pairs: Vec<(Key, Tag)>,
    config: TreeConfig,
) -> std::result::Result<LeafTree<Tag>, BuildError> {
    if pairs.is_empty() {
        return Err(BuildError::Empty);
    }
    pairs.sort_by_key(|&(key, _)| key);
    Ok(LeafTree::bulk_load_with_config(pairs, config)?)
}

/// Result of inserting one partition's entries.
#[derive(Debug, Clone)]
pub struct InsertRun {
    /// Entries inserted before the phase finished or stopped.
    pub inserted: usize,
    /// Entries the partition supplied.
    pub total: usize,
    /// Time from just before the first insert to just after the last one
    /// attempted.
    pub elapsed: Duration,
    /// Set if an insert failed and the rest of the partition was skipped.
    pub error: Option<InsertError>,
}

impl InsertRun {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Insert `pairs` one at a time, in order, stopping at the first failure.
pub fn insert_partition<I: PartitionIndex + ?Sized>(
    index: &mut I,
    partition: Partition,
    pairs: &[(Key, Tag)],
) -> InsertRun {
    let mut error = None;
    let mut inserted = 0;

    let start = Instant::now();
    for (position, &(key, tag)) in pairs.iter().enumerate() {
        if let Err(source) = index.try_insert(key, tag) {
            error = Some(InsertError {
                partition,
                position,
                source,
            });
            break;
        }
        inserted += 1;
    }
    let elapsed = start.elapsed();

    InsertRun {
        inserted,
        total: pairs.len(),
        elapsed,
        error,
    }
}

/// Where a snapshot went.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub leaves: usize,
}

/// How a phase ended.
#[derive(Debug)]
pub enum PhaseOutcome {
    /// The partition couldn't be loaded; nothing was inserted or exported.
    LoadFailed(LoadError),
    /// The insertion loop ran (to completion or until an insert failed).
    Inserted {
        run: InsertRun,
        leaves: usize,
        export: std::result::Result<ExportSummary, ExportError>,
    },
}

#[derive(Debug)]
pub struct PhaseReport {
    pub partition: Partition,
    pub outcome: PhaseOutcome,
    /// Index size after the phase.
    pub index_len: usize,
    /// Resident memory after the phase, where the platform reports it.
    pub physical_mem: Option<usize>,
}

impl PhaseReport {
    pub fn insert_run(&self) -> Option<&InsertRun> {
        match &self.outcome {
            PhaseOutcome::Inserted { run, .. } => Some(run),
            PhaseOutcome::LoadFailed(_) => None,
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.insert_run().map(|run| run.elapsed)
    }

    pub fn export_failed(&self) -> bool {
        matches!(self.outcome, PhaseOutcome::Inserted { export: Err(_), .. })
    }

    pub fn leaf_count(&self) -> Option<usize> {
        match &self.outcome {
            PhaseOutcome::Inserted { leaves, .. } => Some(*leaves),
            PhaseOutcome::LoadFailed(_) => None,
        }
    }
}

/// Baseline state right after the bulk load.
#[derive(Debug, Clone)]
pub struct BaselineReport {
    pub partition: Partition,
    pub keys: usize,
    pub snapshot: Snapshot,
    pub export: ExportSummary,
}

#[derive(Debug)]
pub struct RunReport {
    pub baseline: BaselineReport,
    pub phases: Vec<PhaseReport>,
}

impl RunReport {
    /// Per-partition insert times, in phase order.
    pub fn print_summary(&self) {
        for phase in &self.phases {
            match &phase.outcome {
                PhaseOutcome::Inserted { run, export, .. } => {
                    let mut note = String::new();
                    if !run.is_complete() {
                        note.push_str(&format!(" (stopped after {} of {} keys)", run.inserted, run.total));
                    }
                    if export.is_err() {
                        note.push_str(" (export failed)");
                    }
                    println!(
                        "Time taken to insert keys for user {}: {} nanoseconds{}",
                        phase.partition,
                        run.elapsed.as_nanos(),
                        note
                    );
                }
                PhaseOutcome::LoadFailed(_) => {
                    println!("Time taken to insert keys for user {}: skipped (load failed)", phase.partition);
                }
            }
        }
        if let Some(mem) = self.phases.last().and_then(|p| p.physical_mem) {
            println!("Physical memory after last phase: {} MB", mem / (1024 * 1024));
        }
    }

    /// Phases that didn't insert their whole partition or whose export
    /// wasn't written.
    pub fn degraded_phases(&self) -> impl Iterator<Item = &PhaseReport> {
        self.phases.iter().filter(|p| {
            p.insert_run().map_or(true, |run| !run.is_complete()) || p.export_failed()
        })
    }
}

/// Key source plus where exports go.
#[derive(Clone, Debug)]
pub struct Workload {
    pub source: PartitionSource,
    pub encoding: KeyEncoding,
    pub out_dir: PathBuf,
}

impl Workload {
    pub fn new(source: PartitionSource, encoding: KeyEncoding, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            encoding,
            out_dir: out_dir.into(),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.source.clone(), config.encoding, config.out_dir.clone())
    }

    fn export(&self, snap: &Snapshot, name: &str) -> std::result::Result<ExportSummary, ExportError> {
        let path = self.out_dir.join(name);
        snap.export(&path)?;
        Ok(ExportSummary {
            path,
            leaves: snap.leaf_count(),
        })
    }

    /// Load, pair and bulk load the initial partition.
    pub fn build_initial(&self, partition: Partition, tree: TreeConfig) -> Result<LeafTree<Tag>> {
        let keys = self
            .source
            .load(partition, self.encoding)
            .map_err(HarnessError::InitialLoad)?;
        let pairs = pair_with_tag(&keys, partition_tag(partition));
        drop(keys);
        build_with_config(pairs, tree).map_err(|source| HarnessError::Build { partition, source })
    }

    /// Snapshot the freshly built index and write `node_info.txt`.
    pub fn export_baseline<I: Introspect + ?Sized>(
        &self,
        index: &I,
        partition: Partition,
        keys: usize,
    ) -> Result<BaselineReport> {
        let snap = snapshot(index);
        let export = self
            .export(&snap, crate::config::BASELINE_EXPORT)
            .map_err(HarnessError::BaselineExport)?;
        println!("Total number of data nodes: {}", snap.leaf_count());
        println!("Node information exported to {}", export.path.display());
        Ok(BaselineReport {
            partition,
            keys,
            snapshot: snap,
            export,
        })
    }

    /// One phase: load `partition`, insert it, snapshot, export.
    pub fn run_phase<I: PartitionIndex + ?Sized>(&self, index: &mut I, partition: Partition) -> PhaseReport {
        let keys = match self.source.load(partition, self.encoding) {
            Ok(keys) => keys,
            Err(e) => {
                error!(partition, error = %e, "skipping phase");
                return PhaseReport {
                    partition,
                    outcome: PhaseOutcome::LoadFailed(e),
                    index_len: index.len(),
                    physical_mem: physical_mem(),
                };
            }
        };
        let pairs = pair_with_tag(&keys, partition_tag(partition));
        drop(keys);

        info!(partition, keys = pairs.len(), "inserting partition");
        let run = insert_partition(index, partition, &pairs);
        drop(pairs);
        if let Some(e) = &run.error {
            warn!(
                partition,
                position = e.position,
                inserted = run.inserted,
                total = run.total,
                error = %e.source,
                "phase stopped early"
            );
        }

        // The snapshot reflects every insert of this phase, partial or not.
        let snap = snapshot(&*index);
        let name = crate::config::phase_export_name(partition);
        let export = self.export(&snap, &name);
        match &export {
            Ok(summary) => println!(
                "Node information after inserting keys for user {} exported to {}",
                partition,
                summary.path.display()
            ),
            Err(e) => error!(partition, error = %e, "phase export failed"),
        }

        PhaseReport {
            partition,
            outcome: PhaseOutcome::Inserted {
                run,
                leaves: snap.leaf_count(),
                export,
            },
            index_len: index.len(),
            physical_mem: physical_mem(),
        }
    }

    /// Every phase in order against the same index.
    pub fn run_phases<I: PartitionIndex + ?Sized>(
        &self,
        index: &mut I,
        partitions: &[Partition],
    ) -> Vec<PhaseReport> {
        partitions
            .iter()
            .map(|&partition| self.run_phase(index, partition))
            .collect()
    }
}

fn physical_mem() -> Option<usize> {
    memory_stats::memory_stats().map(|stats| stats.physical_mem)
}

fn prepare_out_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| HarnessError::OutputDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Run the whole benchmark described by `config`.
pub fn run(config: &RunConfig) -> Result<RunReport> {
    run_with_tree_config(config, TreeConfig::default())
}

pub fn run_with_tree_config(config: &RunConfig, tree: TreeConfig) -> Result<RunReport> {
    config.validate()?;
    config.log();
    prepare_out_dir(&config.out_dir)?;

    let workload = Workload::from_config(config);
    let mut index = workload.build_initial(config.initial_partition, tree)?;
    let keys = index.len();
    info!(
        partition = config.initial_partition,
        keys,
        height = index.height(),
        "bulk load complete"
    );
    if let Some(expected) = config.shape.init_num_keys {
        if expected != keys {
            warn!(expected, keys, "init_num_keys differs from the initial partition; using the file");
        }
    }

    let baseline = workload.export_baseline(&index, config.initial_partition, keys)?;
    let phases = workload.run_phases(&mut index, &config.partitions);

    if let Some(expected) = config.shape.total_num_keys {
        if expected != index.len() {
            warn!(expected, keys = index.len(), "total_num_keys differs from keys inserted");
        }
    }
    Ok(RunReport { baseline, phases })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::snapshot::TreeNode;

    /// Fails every insert once `budget` inserts have succeeded.
    struct Exhausting {
        inner: LeafTree<Tag>,
        budget: usize,
    }

    impl Introspect for Exhausting {
        fn visit_nodes(&self, visit: &mut dyn FnMut(TreeNode)) {
            self.inner.visit_nodes(visit)
        }
    }

    impl PartitionIndex for Exhausting {
        fn try_insert(&mut self, key: Key, tag: Tag) -> std::result::Result<(), TryReserveError> {
            if self.budget == 0 {
                return Err(Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err());
            }
            self.budget -= 1;
            self.inner.try_insert(key, tag)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    #[test]
    fn test_build_sorts_stably() {
        let pairs = vec![(5, 1.0), (1, 2.0), (5, 3.0), (3, 4.0), (5, 5.0)];
        let t = build(pairs).unwrap();
        let got: Vec<(Key, Tag)> = t.iter().map(|(k, v)| (k, *v)).collect();
        assert_eq!(got, vec![(1, 2.0), (3, 4.0), (5, 1.0), (5, 3.0), (5, 5.0)]);
    }

    #[test]
    fn test_build_rejects_empty() {
        assert!(matches!(build(Vec::new()), Err(BuildError::Empty)));
    }

    #[test]
    fn test_insert_partition_in_order() {
        let mut t = build(vec![(0, 0.0)]).unwrap();
        let pairs = pair_with_tag(&[9, 3, 7], 1.0);
        let run = insert_partition(&mut t, 1, &pairs);
        assert!(run.is_complete());
        assert_eq!((run.inserted, run.total), (3, 3));
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn test_insert_partition_stops_at_failure() {
        let mut index = Exhausting {
            inner: build(vec![(0, 0.0)]).unwrap(),
            budget: 4,
        };
        let pairs = pair_with_tag(&[10, 11, 12, 13, 14, 15, 16], 2.0);
        let run = insert_partition(&mut index, 2, &pairs);

        assert_eq!(run.inserted, 4);
        assert_eq!(run.total, 7);
        let err = run.error.unwrap();
        assert_eq!((err.partition, err.position), (2, 4));
        assert_eq!(index.len(), 5);
        assert!(index.inner.contains_key(13));
        assert!(!index.inner.contains_key(14));
    }

    #[test]
    fn test_insert_partition_empty() {
        let mut t = build(vec![(0, 0.0)]).unwrap();
        let run = insert_partition(&mut t, 3, &[]);
        assert!(run.is_complete());
        assert_eq!(run.inserted, 0);
    }
}
