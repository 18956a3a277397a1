//! # leaftree
//!
//! A mutable ordered multimap over `u64` keys, organized as a learned index:
//! a tree of routing ("model") nodes above leaf ("data") nodes, where every
//! node carries a linear model that predicts positions from keys.
//!
//! ## Example
//!
//! ```rust
//! use leaftree::{LeafTree, NodeRef};
//!
//! let entries: Vec<(u64, f64)> = (0..1000).map(|k| (k, 0.0)).collect();
//! let mut tree = LeafTree::bulk_load(entries).unwrap();
//! tree.insert(5000, 1.0);
//!
//! assert_eq!(tree.get(5000), Some(&1.0));
//! assert_eq!(tree.len(), 1001);
//!
//! let leaves = tree
//!     .nodes()
//!     .filter(|node| matches!(node, NodeRef::Data(_)))
//!     .count();
//! assert!(leaves >= 1);
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

use std::collections::TryReserveError;
use std::fmt;

type NodeId = usize;

#[derive(Clone, Copy)]
struct InsertFrame {
    /// Model node visited while descending.
    node: NodeId,
    /// Child slot followed out of `node`.
    slot: usize,
}

// =============================================================================
// Configuration
// =============================================================================

const DEFAULT_MAX_DATA_NODE_KEYS: usize = 256;
const DEFAULT_MAX_FANOUT: usize = 64;
const MIN_DATA_NODE_KEYS: usize = 2;
const MIN_FANOUT: usize = 4;

/// Node sizing limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeConfig {
    /// A data node holding this many keys is split before the next insert
    /// lands in it (unless every key in it is equal).
    pub max_data_node_keys: usize,
    /// A model node holding this many children is split before it adopts
    /// another one.
    pub max_fanout: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_data_node_keys: DEFAULT_MAX_DATA_NODE_KEYS,
            max_fanout: DEFAULT_MAX_FANOUT,
        }
    }
}

impl TreeConfig {
    fn normalized(self) -> Self {
        Self {
            max_data_node_keys: self.max_data_node_keys.max(MIN_DATA_NODE_KEYS),
            max_fanout: self.max_fanout.max(MIN_FANOUT),
        }
    }

    /// Bulk load leaves headroom so the first inserts don't split every leaf.
    fn leaf_fill(self) -> usize {
        (self.max_data_node_keys * 3 / 4).max(1)
    }

    fn routing_fill(self) -> usize {
        (self.max_fanout * 3 / 4).max(2)
    }
}

// =============================================================================
// Linear model
// =============================================================================

/// `position ~= slope * key + intercept`, fit by least squares.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LinearModel {
    slope: f64,
    intercept: f64,
}

impl LinearModel {
    pub fn new(slope: f64, intercept: f64) -> Self {
        Self { slope, intercept }
    }

    /// Fit positions `0..keys.len()` against `keys` (which must be sorted).
    pub fn fit(keys: &[u64]) -> Self {
        let n = keys.len();
        if n < 2 {
            return Self::default();
        }

        let nf = n as f64;
        let mean_x = keys.iter().map(|&k| k as f64).sum::<f64>() / nf;
        let mean_y = (nf - 1.0) / 2.0;

        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for (i, &k) in keys.iter().enumerate() {
            let dx = k as f64 - mean_x;
            sxy += dx * (i as f64 - mean_y);
            sxx += dx * dx;
        }

        if sxx == 0.0 {
            // All keys equal: predict the middle of the run.
            return Self {
                slope: 0.0,
                intercept: mean_y,
            };
        }

        let slope = sxy / sxx;
        Self {
            slope,
            intercept: mean_y - slope * mean_x,
        }
    }

    #[inline]
    pub fn slope(&self) -> f64 {
        self.slope
    }

    #[inline]
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    #[inline]
    pub fn predict(&self, key: u64) -> f64 {
        self.slope * key as f64 + self.intercept
    }

    /// Predicted position clamped into `0..len`. `len` must be non-zero.
    #[inline]
    fn predict_index(&self, key: u64, len: usize) -> usize {
        debug_assert!(len > 0);
        let p = self.predict(key);
        // `!(p > 0.0)` also catches NaN.
        if !(p > 0.0) {
            0
        } else {
            (p as usize).min(len - 1)
        }
    }
}

// =============================================================================
// Search helpers
// =============================================================================

/// Partition point of `pred` over sorted `keys`, found by exponential search
/// outward from a predicted position. `pred` must be true for a prefix of
/// `keys` and false for the rest.
fn search_from(keys: &[u64], hint: usize, pred: impl Fn(u64) -> bool) -> usize {
    let n = keys.len();
    if n == 0 {
        return 0;
    }
    let hint = hint.min(n - 1);

    if pred(keys[hint]) {
        // Answer lies in (hint, n].
        let mut lo = hint + 1;
        let mut step = 1;
        let hi = loop {
            let hi = (hint + step).min(n);
            if hi == n || !pred(keys[hi]) {
                break hi;
            }
            lo = hi + 1;
            step *= 2;
        };
        lo + keys[lo..hi].partition_point(|&k| pred(k))
    } else {
        // Answer lies in [0, hint].
        let mut hi = hint;
        let mut step = 1;
        let lo = loop {
            if step > hint {
                break 0;
            }
            let probe = hint - step;
            if pred(keys[probe]) {
                break probe + 1;
            }
            hi = probe;
            step *= 2;
        };
        lo + keys[lo..hi].partition_point(|&k| pred(k))
    }
}

/// First split point of `keys` near the middle that doesn't separate equal
/// keys. `None` if every key is equal (or there are fewer than two).
fn data_split_point(keys: &[u64]) -> Option<usize> {
    if keys.len() < 2 {
        return None;
    }
    let pivot = keys[keys.len() / 2];
    let lo = keys.partition_point(|&k| k < pivot);
    if lo > 0 {
        return Some(lo);
    }
    let hi = keys.partition_point(|&k| k <= pivot);
    (hi < keys.len()).then_some(hi)
}

// =============================================================================
// Nodes
// =============================================================================

#[derive(Clone)]
struct ModelNode {
    model: LinearModel,
    /// `children[i]` holds keys in `pivots[i]..pivots[i + 1]`. Pivots are
    /// strictly increasing and the leftmost path of the tree is anchored at
    /// pivot 0, so every key has a child.
    pivots: Vec<u64>,
    children: Vec<NodeId>,
}

impl ModelNode {
    fn new(pivots: Vec<u64>, children: Vec<NodeId>) -> Self {
        debug_assert_eq!(pivots.len(), children.len());
        let model = LinearModel::fit(&pivots);
        Self {
            model,
            pivots,
            children,
        }
    }

    #[inline]
    fn child_slot(&self, key: u64) -> usize {
        let hint = self.model.predict_index(key, self.pivots.len());
        search_from(&self.pivots, hint, |p| p <= key).saturating_sub(1)
    }

    fn refit(&mut self) {
        self.model = LinearModel::fit(&self.pivots);
    }
}

#[derive(Clone)]
struct DataNode<V> {
    model: LinearModel,
    keys: Vec<u64>,
    values: Vec<V>,
    /// Key count when `model` was last fit.
    fitted_len: usize,
}

impl<V> DataNode<V> {
    fn new(keys: Vec<u64>, values: Vec<V>) -> Self {
        debug_assert_eq!(keys.len(), values.len());
        let mut node = Self {
            model: LinearModel::default(),
            keys,
            values,
            fitted_len: 0,
        };
        node.refit();
        node
    }

    fn refit(&mut self) {
        self.model = LinearModel::fit(&self.keys);
        self.fitted_len = self.keys.len();
    }

    #[inline]
    fn hint(&self, key: u64) -> usize {
        if self.keys.is_empty() {
            0
        } else {
            self.model.predict_index(key, self.keys.len())
        }
    }

    fn lower_bound(&self, key: u64) -> usize {
        search_from(&self.keys, self.hint(key), |k| k < key)
    }

    fn upper_bound(&self, key: u64) -> usize {
        search_from(&self.keys, self.hint(key), |k| k <= key)
    }

    /// Caller must have reserved room for one more entry.
    fn insert_reserved(&mut self, key: u64, value: V) {
        debug_assert!(self.keys.len() < self.keys.capacity());
        debug_assert!(self.values.len() < self.values.capacity());
        // Equal keys keep insertion order.
        let pos = self.upper_bound(key);
        self.keys.insert(pos, key);
        self.values.insert(pos, value);
        if self.keys.len() >= self.fitted_len.max(1) * 2 {
            self.refit();
        }
    }

    /// Move `self[at..]` into the pre-allocated `keys`/`values`.
    fn split_off_into(&mut self, at: usize, mut keys: Vec<u64>, mut values: Vec<V>) -> Self {
        keys.extend(self.keys.drain(at..));
        values.extend(self.values.drain(at..));
        self.refit();
        Self::new(keys, values)
    }
}

#[derive(Clone)]
enum Node<V> {
    Model(ModelNode),
    Data(DataNode<V>),
}

/// Buffers allocated ahead of a split so the split itself cannot fail.
enum Spare<V> {
    Data(Vec<u64>, Vec<V>),
    Model(Vec<u64>, Vec<NodeId>),
}

impl<V> Spare<V> {
    fn data(cap: usize) -> Result<Self, TryReserveError> {
        let mut keys = Vec::new();
        keys.try_reserve_exact(cap)?;
        let mut values = Vec::new();
        values.try_reserve_exact(cap)?;
        Ok(Spare::Data(keys, values))
    }

    fn model(cap: usize) -> Result<Self, TryReserveError> {
        let mut pivots = Vec::new();
        pivots.try_reserve_exact(cap)?;
        let mut children = Vec::new();
        children.try_reserve_exact(cap)?;
        Ok(Spare::Model(pivots, children))
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Rejected bulk-load input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkLoadError {
    /// `entries[position]` has a smaller key than its predecessor.
    Unsorted { position: usize },
}

impl fmt::Display for BulkLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkLoadError::Unsorted { position } => {
                write!(f, "bulk load input is not sorted by key at position {position}")
            }
        }
    }
}

impl std::error::Error for BulkLoadError {}

// =============================================================================
// LeafTree
// =============================================================================

/// A learned ordered multimap from `u64` keys to `V`.
///
/// Features:
/// - Bulk load from sorted input into partially filled leaves
/// - Per-node least-squares models with exponential-search correction
/// - Leaf and routing splits on insert (never merges)
/// - Duplicate keys are kept, in insertion order
/// - Fallible insert that leaves the tree untouched on allocation failure
#[derive(Clone)]
pub struct LeafTree<V> {
    nodes: Vec<Node<V>>,
    root: NodeId,
    /// Number of levels; a lone data node is height 1.
    height: usize,
    count: usize,
    config: TreeConfig,
}

impl<V> LeafTree<V> {
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            nodes: vec![Node::Data(DataNode::new(Vec::new(), Vec::new()))],
            root: 0,
            height: 1,
            count: 0,
            config: config.normalized(),
        }
    }

    /// Build from entries sorted by key (duplicates allowed).
    pub fn bulk_load(entries: Vec<(u64, V)>) -> Result<Self, BulkLoadError> {
        Self::bulk_load_with_config(entries, TreeConfig::default())
    }

    pub fn bulk_load_with_config(
        entries: Vec<(u64, V)>,
        config: TreeConfig,
    ) -> Result<Self, BulkLoadError> {
        if let Some(i) = entries.windows(2).position(|w| w[0].0 > w[1].0) {
            return Err(BulkLoadError::Unsorted { position: i + 1 });
        }

        let mut tree = Self::with_config(config);
        if entries.is_empty() {
            return Ok(tree);
        }
        tree.nodes.clear();
        tree.count = entries.len();

        let (keys, values): (Vec<u64>, Vec<V>) = entries.into_iter().unzip();

        // Leaf boundaries, never splitting a run of equal keys.
        let fill = tree.config.leaf_fill();
        let mut bounds = Vec::new();
        let mut start = 0;
        while start < keys.len() {
            let mut end = (start + fill).min(keys.len());
            while end < keys.len() && keys[end] == keys[end - 1] {
                end += 1;
            }
            bounds.push(start..end);
            start = end;
        }

        let mut level: Vec<(u64, NodeId)> = Vec::with_capacity(bounds.len());
        let mut values = values.into_iter();
        for range in bounds {
            let leaf_keys = keys[range.clone()].to_vec();
            let leaf_values: Vec<V> = values.by_ref().take(range.len()).collect();
            let pivot = if level.is_empty() { 0 } else { leaf_keys[0] };
            level.push((pivot, tree.push_node(Node::Data(DataNode::new(leaf_keys, leaf_values)))));
        }

        let fanout = tree.config.routing_fill();
        while level.len() > 1 {
            let mut chunks: Vec<&[(u64, NodeId)]> = level.chunks(fanout).collect();
            // A trailing single child would make a pointless one-way node.
            if chunks.len() > 1 && chunks[chunks.len() - 1].len() == 1 {
                let merged_len = chunks[chunks.len() - 2].len() + 1;
                let merged_start = level.len() - merged_len;
                chunks.pop();
                chunks.pop();
                chunks.push(&level[merged_start..]);
            }

            let mut next = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                let pivots = chunk.iter().map(|&(p, _)| p).collect();
                let children = chunk.iter().map(|&(_, id)| id).collect();
                let pivot = chunk[0].0;
                next.push((pivot, tree.push_node(Node::Model(ModelNode::new(pivots, children)))));
            }
            level = next;
            tree.height += 1;
        }

        tree.root = level[0].1;
        Ok(tree)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn config(&self) -> TreeConfig {
        self.config
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            num_keys: self.count,
            height: self.height,
            ..TreeStats::default()
        };
        for node in &self.nodes {
            match node {
                Node::Model(_) => stats.num_model_nodes += 1,
                Node::Data(_) => stats.num_data_nodes += 1,
            }
        }
        stats
    }

    fn push_node(&mut self, node: Node<V>) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    #[inline]
    fn model_node(&self, id: NodeId) -> &ModelNode {
        match &self.nodes[id] {
            Node::Model(m) => m,
            Node::Data(_) => unreachable!("node {id} is not a model node"),
        }
    }

    #[inline]
    fn model_node_mut(&mut self, id: NodeId) -> &mut ModelNode {
        match &mut self.nodes[id] {
            Node::Model(m) => m,
            Node::Data(_) => unreachable!("node {id} is not a model node"),
        }
    }

    #[inline]
    fn data_node(&self, id: NodeId) -> &DataNode<V> {
        match &self.nodes[id] {
            Node::Data(d) => d,
            Node::Model(_) => unreachable!("node {id} is not a data node"),
        }
    }

    #[inline]
    fn data_node_mut(&mut self, id: NodeId) -> &mut DataNode<V> {
        match &mut self.nodes[id] {
            Node::Data(d) => d,
            Node::Model(_) => unreachable!("node {id} is not a data node"),
        }
    }

    fn leaf_for(&self, key: u64) -> NodeId {
        let mut current = self.root;
        while let Node::Model(m) = &self.nodes[current] {
            current = m.children[m.child_slot(key)];
        }
        current
    }
}

impl<V> LeafTree<V> {
    /// First value stored under `key`.
    pub fn get(&self, key: u64) -> Option<&V> {
        let leaf = self.data_node(self.leaf_for(key));
        let pos = leaf.lower_bound(key);
        (leaf.keys.get(pos) == Some(&key)).then(|| &leaf.values[pos])
    }

    pub fn contains_key(&self, key: u64) -> bool {
        self.get(key).is_some()
    }

    /// Insert an entry. Existing entries for `key` are kept.
    ///
    /// # Panics
    ///
    /// Panics if memory for the entry cannot be allocated, like `Vec::push`.
    /// Use [`LeafTree::try_insert`] to handle that case.
    pub fn insert(&mut self, key: u64, value: V) {
        if let Err(e) = self.try_insert(key, value) {
            panic!("leaftree: insert of key {key} failed: {e}");
        }
    }

    /// Insert an entry, reporting allocation failure instead of aborting.
    ///
    /// Every allocation the insert (and any split it triggers) needs is made
    /// before the tree is touched, so on `Err` the tree is unchanged.
    pub fn try_insert(&mut self, key: u64, value: V) -> Result<(), TryReserveError> {
        let mut path: Vec<InsertFrame> = Vec::new();
        path.try_reserve_exact(self.height)?;

        let mut current = self.root;
        while let Node::Model(m) = &self.nodes[current] {
            let slot = m.child_slot(key);
            path.push(InsertFrame { node: current, slot });
            current = m.children[slot];
        }
        let leaf_id = current;

        let leaf = self.data_node(leaf_id);
        let leaf_split = if leaf.keys.len() >= self.config.max_data_node_keys {
            data_split_point(&leaf.keys)
        } else {
            None
        };

        let Some(at) = leaf_split else {
            let leaf = self.data_node_mut(leaf_id);
            leaf.keys.try_reserve(1)?;
            leaf.values.try_reserve(1)?;
            leaf.insert_reserved(key, value);
            self.count += 1;
            return Ok(());
        };

        // How many nodes split, counting the leaf. If every ancestor splits
        // the root grows a level.
        let mut splits = 1;
        for frame in path.iter().rev() {
            if self.model_node(frame.node).children.len() < self.config.max_fanout {
                break;
            }
            splits += 1;
        }
        let grows = splits == path.len() + 1;

        self.nodes.try_reserve(splits + grows as usize)?;
        let mut spares: Vec<Spare<V>> = Vec::new();
        spares.try_reserve_exact(splits + grows as usize)?;
        spares.push(Spare::data(self.data_node(leaf_id).keys.len() - at + 1)?);
        for frame in path.iter().rev().take(splits - 1) {
            let n = self.model_node(frame.node).children.len();
            spares.push(Spare::model(n - n / 2 + 1)?);
        }
        if grows {
            spares.push(Spare::model(2)?);
        } else {
            let adopter = path[path.len() - splits].node;
            let m = self.model_node_mut(adopter);
            m.pivots.try_reserve(1)?;
            m.children.try_reserve(1)?;
        }

        // Nothing below allocates.
        let mut spares = spares.into_iter();

        let Some(Spare::Data(keys, values)) = spares.next() else {
            unreachable!("leaf spare is allocated first");
        };
        let mut right = self.data_node_mut(leaf_id).split_off_into(at, keys, values);
        let mut pivot = right.keys[0];
        if key >= pivot {
            right.insert_reserved(key, value);
        } else {
            self.data_node_mut(leaf_id).insert_reserved(key, value);
        }
        let mut new_child = self.push_node(Node::Data(right));
        self.count += 1;

        for (level, frame) in path.iter().rev().enumerate() {
            let slot = frame.slot + 1;
            if level + 1 < splits {
                let Some(Spare::Model(mut pivots, mut children)) = spares.next() else {
                    unreachable!("one model spare per splitting ancestor");
                };
                let node = self.model_node_mut(frame.node);
                let mid = node.children.len() / 2;
                pivots.extend(node.pivots.drain(mid..));
                children.extend(node.children.drain(mid..));
                if slot >= mid {
                    pivots.insert(slot - mid, pivot);
                    children.insert(slot - mid, new_child);
                } else {
                    node.pivots.insert(slot, pivot);
                    node.children.insert(slot, new_child);
                }
                node.refit();
                let sibling = ModelNode::new(pivots, children);
                pivot = sibling.pivots[0];
                new_child = self.push_node(Node::Model(sibling));
            } else {
                let node = self.model_node_mut(frame.node);
                node.pivots.insert(slot, pivot);
                node.children.insert(slot, new_child);
                node.refit();
                return Ok(());
            }
        }

        // Every node on the path split: new root above the old one.
        debug_assert!(grows);
        let Some(Spare::Model(mut pivots, mut children)) = spares.next() else {
            unreachable!("root spare is allocated last");
        };
        pivots.push(0);
        pivots.push(pivot);
        children.push(self.root);
        children.push(new_child);
        self.root = self.push_node(Node::Model(ModelNode::new(pivots, children)));
        self.height += 1;
        Ok(())
    }

    /// Entries in key order; equal keys in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &V)> + '_ {
        self.nodes().filter_map(NodeRef::into_data).flat_map(DataNodeRef::entries)
    }

    /// Pre-order, left-to-right walk over every node. Data nodes therefore
    /// come out in key order.
    pub fn nodes(&self) -> Nodes<'_, V> {
        Nodes {
            tree: self,
            stack: vec![self.root],
        }
    }
}

impl<V> Default for LeafTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: fmt::Debug> fmt::Debug for LeafTree<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Node population counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub num_keys: usize,
    pub num_model_nodes: usize,
    pub num_data_nodes: usize,
    pub height: usize,
}

// =============================================================================
// Node traversal
// =============================================================================

/// A node seen during [`LeafTree::nodes`].
pub enum NodeRef<'a, V> {
    Model(ModelNodeRef<'a>),
    Data(DataNodeRef<'a, V>),
}

impl<'a, V> NodeRef<'a, V> {
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeRef::Data(_))
    }

    pub fn into_data(self) -> Option<DataNodeRef<'a, V>> {
        match self {
            NodeRef::Data(d) => Some(d),
            NodeRef::Model(_) => None,
        }
    }
}

/// Routing node view.
#[derive(Clone, Copy)]
pub struct ModelNodeRef<'a> {
    node: &'a ModelNode,
}

impl<'a> ModelNodeRef<'a> {
    pub fn num_children(&self) -> usize {
        self.node.children.len()
    }

    pub fn model(&self) -> LinearModel {
        self.node.model
    }

    pub fn pivots(&self) -> &'a [u64] {
        &self.node.pivots
    }
}

/// Leaf node view.
pub struct DataNodeRef<'a, V> {
    node: &'a DataNode<V>,
}

// Manual impls: `V` itself need not be `Clone`.
impl<V> Clone for DataNodeRef<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for DataNodeRef<'_, V> {}

impl<'a, V> DataNodeRef<'a, V> {
    pub fn model(&self) -> LinearModel {
        self.node.model
    }

    /// Smallest key held, or `u64::MAX` if the node is empty.
    pub fn min_key(&self) -> u64 {
        self.node.keys.first().copied().unwrap_or(u64::MAX)
    }

    /// Largest key held, or `0` if the node is empty.
    pub fn max_key(&self) -> u64 {
        self.node.keys.last().copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.node.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.keys.is_empty()
    }

    pub fn keys(&self) -> &'a [u64] {
        &self.node.keys
    }

    pub fn entries(self) -> impl Iterator<Item = (u64, &'a V)> {
        self.node.keys.iter().copied().zip(self.node.values.iter())
    }
}

pub struct Nodes<'a, V> {
    tree: &'a LeafTree<V>,
    stack: Vec<NodeId>,
}

impl<'a, V> Iterator for Nodes<'a, V> {
    type Item = NodeRef<'a, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        match &self.tree.nodes[id] {
            Node::Model(m) => {
                self.stack.extend(m.children.iter().rev().copied());
                Some(NodeRef::Model(ModelNodeRef { node: m }))
            }
            Node::Data(d) => Some(NodeRef::Data(DataNodeRef { node: d })),
        }
    }
}


#[cfg(test)]
mod proptests;
