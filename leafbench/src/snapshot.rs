//! Structural snapshots of an index's leaf models.
//!
//! A [`Snapshot`] is taken by a single read-only walk over the index and is
//! returned by value, so every pass starts from nothing and no state is
//! carried between passes.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use leaftree::{LeafTree, NodeRef};
use tracing::debug;

use crate::error::ExportError;
use crate::Key;

/// One leaf's linear model and key bounds at the moment it was visited.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelSnapshot {
    pub slope: f64,
    pub intercept: f64,
    pub min_key: Key,
    pub max_key: Key,
}

/// The two node kinds a snapshot pass distinguishes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TreeNode {
    Routing { num_children: usize },
    Leaf(ModelSnapshot),
}

/// Read-only access to an index's node structure.
pub trait Introspect {
    /// Visit every node once, in an order that only depends on the index's
    /// current state.
    fn visit_nodes(&self, visit: &mut dyn FnMut(TreeNode));
}

impl<V> Introspect for LeafTree<V> {
    fn visit_nodes(&self, visit: &mut dyn FnMut(TreeNode)) {
        for node in self.nodes() {
            visit(match node {
                NodeRef::Model(m) => TreeNode::Routing {
                    num_children: m.num_children(),
                },
                NodeRef::Data(d) => {
                    let model = d.model();
                    TreeNode::Leaf(ModelSnapshot {
                        slope: model.slope(),
                        intercept: model.intercept(),
                        min_key: d.min_key(),
                        max_key: d.max_key(),
                    })
                }
            });
        }
    }
}

/// Every leaf's model, in traversal order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    leaves: Vec<ModelSnapshot>,
    routing_nodes: usize,
}

impl Snapshot {
    pub fn leaves(&self) -> &[ModelSnapshot] {
        &self.leaves
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn routing_nodes(&self) -> usize {
        self.routing_nodes
    }

    /// One `slope,intercept,min_key,max_key` line per leaf, no header.
    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        for leaf in &self.leaves {
            writeln!(
                w,
                "{},{},{},{}",
                leaf.slope, leaf.intercept, leaf.min_key, leaf.max_key
            )?;
        }
        w.flush()
    }

    /// Write (or overwrite) `path`. A failure partway leaves a truncated
    /// file behind.
    pub fn export(&self, path: &Path) -> Result<(), ExportError> {
        let wrap = |source| ExportError {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(wrap)?;
        self.write_to(BufWriter::new(file)).map_err(wrap)
    }
}

/// Walk `index` once and collect a model snapshot per leaf.
pub fn snapshot<I: Introspect + ?Sized>(index: &I) -> Snapshot {
    let mut snap = Snapshot::default();
    index.visit_nodes(&mut |node| match node {
        TreeNode::Routing { num_children } => {
            snap.routing_nodes += 1;
            debug!(num_children, "routing node");
        }
        TreeNode::Leaf(leaf) => {
            snap.leaves.push(leaf);
            debug!(
                leaf = snap.leaves.len(),
                slope = leaf.slope,
                intercept = leaf.intercept,
                min_key = leaf.min_key,
                max_key = leaf.max_key,
                "data node"
            );
        }
    });
    snap
}
