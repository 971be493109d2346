//! Decision trees over discrete assignments.
//!
//! A [`DecisionTree`] maps every assignment of a set of discrete keys to a leaf
//! value. Internal nodes branch on one discrete key and hold one child per state;
//! leaves hold values. The tree lives in an arena of nodes addressed by [`NodeId`].
//!
//! # Compaction
//!
//! Every construction path goes through an interning builder:
//! - equal leaf values (by `PartialEq`) are stored once; candidates are found
//!   through a [`LeafHash`] bucket index, so interning stays linear in the
//!   number of leaves,
//! - a branch node is interned on `(key, children)`, so structurally identical
//!   subtrees share a single node,
//! - a branch whose children are all the same node is replaced by that child.
//!
//! Compaction never changes lookup results, only the number of stored nodes. Two
//! trees with different branching may still denote the same mapping.
//!
//! # Combination
//!
//! [`DecisionTree::apply2`] combines two trees leaf-by-leaf over the union of
//! their keys. This is the primitive that makes the representation usable for
//! sequential elimination: the leaf at every joint assignment is the binary
//! operator applied to the two input leaves at the projections of that assignment.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::convert::Infallible;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::core::key::{
    DiscreteKey, DiscreteKeys, Key, KeyFormatter, collect_discrete_keys, default_key_formatter,
    validate_discrete_keys,
};
use crate::core::values::{DiscreteValues, discrete_value};
use crate::core::{ApproxEq, KeyFormat};
use crate::error::{HybridError, HybridResult};

/// Index of a node in a tree's arena
pub type NodeId = usize;

/// Content hash used to bucket leaf values while interning.
///
/// Values equal under `PartialEq` must feed the same data to the hasher.
pub trait LeafHash {
    fn leaf_hash<H: Hasher>(&self, state: &mut H);
}

macro_rules! impl_leaf_hash {
    ($($t:ty),*) => {
        $(
            impl LeafHash for $t {
                fn leaf_hash<H: Hasher>(&self, state: &mut H) {
                    self.hash(state);
                }
            }
        )*
    };
}

impl_leaf_hash!(bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, char, String);

impl LeafHash for f64 {
    fn leaf_hash<H: Hasher>(&self, state: &mut H) {
        // -0.0 == 0.0
        let value = if *self == 0.0 { 0.0 } else { *self };
        value.to_bits().hash(state);
    }
}

impl<T: LeafHash + ?Sized> LeafHash for Arc<T> {
    fn leaf_hash<H: Hasher>(&self, state: &mut H) {
        (**self).leaf_hash(state);
    }
}

impl<T: LeafHash> LeafHash for [T] {
    fn leaf_hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for value in self {
            value.leaf_hash(state);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node<L> {
    Leaf(L),
    Choice { key: Key, children: Vec<NodeId> },
}

/// Arena-backed decision tree with shared subtrees.
///
/// # Example
///
/// ```
/// use apex_hybrid::decision_tree::DecisionTree;
/// use apex_hybrid::core::key::DiscreteKey;
/// use apex_hybrid::core::values::DiscreteValues;
///
/// # fn example() -> Result<(), apex_hybrid::HybridError> {
/// let keys = [DiscreteKey::new(0u64, 2), DiscreteKey::new(1u64, 2)];
/// // (0,0), (0,1), (1,0), (1,1)
/// let tree = DecisionTree::from_enumeration(&keys, vec![1.0, 2.0, 3.0, 4.0])?;
/// let assignment = DiscreteValues::from([(0, 1), (1, 0)]);
/// assert_eq!(*tree.get(&assignment)?, 3.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DecisionTree<L> {
    nodes: Vec<Node<L>>,
    root: NodeId,
    /// Keys the tree was built over, including those compaction removed
    declared: DiscreteKeys,
}

/// Interning arena builder shared by all construction paths
struct TreeBuilder<L> {
    nodes: Vec<Node<L>>,
    /// Leaf ids bucketed by [`LeafHash`]
    leaves: HashMap<u64, Vec<NodeId>>,
    choices: HashMap<(Key, Vec<NodeId>), NodeId>,
}

impl<L: PartialEq + LeafHash> TreeBuilder<L> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            leaves: HashMap::new(),
            choices: HashMap::new(),
        }
    }

    fn leaf(&mut self, value: L) -> NodeId {
        let mut hasher = DefaultHasher::new();
        value.leaf_hash(&mut hasher);
        let bucket = self.leaves.entry(hasher.finish()).or_default();
        let nodes = &self.nodes;
        let existing = bucket
            .iter()
            .copied()
            .find(|&id| matches!(&nodes[id], Node::Leaf(v) if *v == value));
        if let Some(id) = existing {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf(value));
        bucket.push(id);
        id
    }

    fn choice(&mut self, key: Key, children: Vec<NodeId>) -> NodeId {
        if let Some(&first) = children.first() {
            if children.iter().all(|&child| child == first) {
                return first;
            }
        }
        if let Some(&id) = self.choices.get(&(key, children.clone())) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Node::Choice {
            key,
            children: children.clone(),
        });
        self.choices.insert((key, children), id);
        id
    }

    fn finish(self, root: NodeId, declared: DiscreteKeys) -> DecisionTree<L> {
        DecisionTree {
            nodes: self.nodes,
            root,
            declared,
        }
    }
}

/// Assignment fixed so far while combining two trees: key -> (state, cardinality)
type Context = BTreeMap<Key, (usize, usize)>;

impl<L> DecisionTree<L> {
    /// Tree with a single leaf, independent of any discrete key
    pub fn leaf(value: L) -> Self {
        Self {
            nodes: vec![Node::Leaf(value)],
            root: 0,
            declared: DiscreteKeys::new(),
        }
    }

    /// Build a tree from an explicit enumeration of leaves.
    ///
    /// `leaves` must list one value per assignment of `keys`, in lexicographic
    /// order over the keys in key-set order (first key most significant), each
    /// key ranging over `0..cardinality`. The first key becomes the root branch.
    ///
    /// # Errors
    ///
    /// - [`HybridError::MalformedTree`] when `leaves.len()` is not the product of
    ///   the cardinalities
    /// - [`HybridError::InvalidCardinality`] / [`HybridError::DuplicateDiscreteKey`]
    ///   for an invalid key set
    pub fn from_enumeration(keys: &[DiscreteKey], leaves: Vec<L>) -> HybridResult<Self>
    where
        L: PartialEq + LeafHash,
    {
        validate_discrete_keys(keys)?;
        let expected = keys
            .iter()
            .try_fold(1usize, |acc, dk| acc.checked_mul(dk.cardinality))
            .unwrap_or(usize::MAX);
        if leaves.len() != expected {
            return Err(HybridError::MalformedTree {
                expected,
                actual: leaves.len(),
            });
        }

        let mut builder = TreeBuilder::new();
        let mut values = leaves.into_iter();
        let root = Self::build_level(&mut builder, keys, &mut values, expected)?;
        let tree = builder.finish(root, keys.to_vec());
        debug!(
            "Built decision tree over {} keys: {} assignments, {} nodes, {} distinct leaves",
            keys.len(),
            expected,
            tree.num_nodes(),
            tree.num_leaves()
        );
        Ok(tree)
    }

    fn build_level(
        builder: &mut TreeBuilder<L>,
        keys: &[DiscreteKey],
        values: &mut impl Iterator<Item = L>,
        expected: usize,
    ) -> HybridResult<NodeId>
    where
        L: PartialEq + LeafHash,
    {
        let Some((first, rest)) = keys.split_first() else {
            let value = values.next().ok_or(HybridError::MalformedTree {
                expected,
                actual: 0,
            })?;
            return Ok(builder.leaf(value));
        };
        let mut children = Vec::with_capacity(first.cardinality);
        for _ in 0..first.cardinality {
            children.push(Self::build_level(builder, rest, values, expected)?);
        }
        Ok(builder.choice(first.key, children))
    }

    /// Single-key tree with one leaf per state of `key`
    pub fn from_choice(key: DiscreteKey, leaves: Vec<L>) -> HybridResult<Self>
    where
        L: PartialEq + LeafHash,
    {
        Self::from_enumeration(&[key], leaves)
    }

    /// Leaf selected by a full discrete assignment.
    ///
    /// Only the keys on the path from the root must be assigned. Every assigned
    /// key the tree was built over is range-checked, including keys whose
    /// branches were compacted away.
    pub fn get(&self, assignment: &DiscreteValues) -> HybridResult<&L> {
        for dk in &self.declared {
            if let Some(&state) = assignment.get(&dk.key) {
                if state >= dk.cardinality {
                    return Err(HybridError::InvalidAssignment {
                        key: dk.key,
                        value: state,
                        cardinality: dk.cardinality,
                    });
                }
            }
        }
        let mut id = self.root;
        loop {
            match &self.nodes[id] {
                Node::Leaf(value) => return Ok(value),
                Node::Choice { key, children } => {
                    let state = discrete_value(assignment, *key)?;
                    id = *children
                        .get(state)
                        .ok_or(HybridError::InvalidAssignment {
                            key: *key,
                            value: state,
                            cardinality: children.len(),
                        })?;
                }
            }
        }
    }

    /// True when the tree does not depend on any discrete key
    pub fn is_leaf(&self) -> bool {
        matches!(self.nodes[self.root], Node::Leaf(_))
    }

    /// Transform every leaf, re-interning the result
    pub fn map<M: PartialEq + LeafHash>(&self, mut f: impl FnMut(&L) -> M) -> DecisionTree<M> {
        match self.try_map(|value| Ok::<M, Infallible>(f(value))) {
            Ok(tree) => tree,
            Err(never) => match never {},
        }
    }

    /// Fallible leaf transformation; stops at the first error
    pub fn try_map<M: PartialEq + LeafHash, E>(
        &self,
        mut f: impl FnMut(&L) -> Result<M, E>,
    ) -> Result<DecisionTree<M>, E> {
        let mut builder = TreeBuilder::new();
        let mut memo = vec![None; self.nodes.len()];
        let root = self.map_node(self.root, &mut builder, &mut memo, &mut f)?;
        Ok(builder.finish(root, self.declared.clone()))
    }

    fn map_node<M: PartialEq + LeafHash, E, F: FnMut(&L) -> Result<M, E>>(
        &self,
        id: NodeId,
        builder: &mut TreeBuilder<M>,
        memo: &mut Vec<Option<NodeId>>,
        f: &mut F,
    ) -> Result<NodeId, E> {
        if let Some(mapped) = memo[id] {
            return Ok(mapped);
        }
        let mapped = match &self.nodes[id] {
            Node::Leaf(value) => builder.leaf(f(value)?),
            Node::Choice { key, children } => {
                let mut mapped_children = Vec::with_capacity(children.len());
                for &child in children {
                    mapped_children.push(self.map_node(child, builder, memo, f)?);
                }
                builder.choice(*key, mapped_children)
            }
        };
        memo[id] = Some(mapped);
        Ok(mapped)
    }

    /// Combine two trees leaf-by-leaf with a binary operator.
    ///
    /// The result depends on the union of both trees' keys; its leaf at each
    /// joint assignment is `f(self[a], other[a])`.
    ///
    /// # Errors
    ///
    /// [`HybridError::CardinalityMismatch`] when a key appears in both trees with
    /// a different number of states.
    pub fn apply2<R, M: PartialEq + LeafHash>(
        &self,
        other: &DecisionTree<R>,
        mut f: impl FnMut(&L, &R) -> M,
    ) -> HybridResult<DecisionTree<M>> {
        self.try_apply2(other, |a, b| Ok(f(a, b)))
    }

    /// Fallible variant of [`apply2`](Self::apply2)
    pub fn try_apply2<R, M: PartialEq + LeafHash>(
        &self,
        other: &DecisionTree<R>,
        mut f: impl FnMut(&L, &R) -> HybridResult<M>,
    ) -> HybridResult<DecisionTree<M>> {
        let declared = collect_discrete_keys(&self.declared, &other.declared)?;
        let mut builder = TreeBuilder::new();
        let mut context = Context::new();
        let root = combine(
            self,
            self.root,
            other,
            other.root,
            &mut context,
            &mut builder,
            &mut f,
        )?;
        let tree = builder.finish(root, declared);
        trace!(
            "Combined trees with {} and {} nodes into {} nodes",
            self.num_nodes(),
            other.num_nodes(),
            tree.num_nodes()
        );
        Ok(tree)
    }

    /// Follow branches already fixed by `context`
    fn resolve(&self, mut id: NodeId, context: &Context) -> HybridResult<NodeId> {
        while let Node::Choice { key, children } = &self.nodes[id] {
            let Some(&(state, cardinality)) = context.get(key) else {
                break;
            };
            if children.len() != cardinality {
                return Err(HybridError::CardinalityMismatch {
                    key: *key,
                    expected: cardinality,
                    actual: children.len(),
                });
            }
            id = children[state];
        }
        Ok(id)
    }

    /// Reachable nodes in depth-first pre-order, each listed once
    fn reachable(&self) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if visited[id] {
                continue;
            }
            visited[id] = true;
            order.push(id);
            if let Node::Choice { children, .. } = &self.nodes[id] {
                stack.extend(children.iter().rev());
            }
        }
        order
    }

    /// Distinct leaf values, in depth-first order
    pub fn leaves(&self) -> Vec<&L> {
        self.reachable()
            .into_iter()
            .filter_map(|id| match &self.nodes[id] {
                Node::Leaf(value) => Some(value),
                Node::Choice { .. } => None,
            })
            .collect()
    }

    /// Call `f` once for every distinct leaf
    pub fn visit(&self, mut f: impl FnMut(&L)) {
        for value in self.leaves() {
            f(value);
        }
    }

    /// Call `f` for every root-to-leaf path with the assignment along that path.
    ///
    /// Keys that were compacted away on a path are absent from its assignment.
    pub fn visit_with_assignment(&self, mut f: impl FnMut(&DiscreteValues, &L)) {
        let mut assignment = DiscreteValues::new();
        self.visit_path(self.root, &mut assignment, &mut f);
    }

    fn visit_path<F: FnMut(&DiscreteValues, &L)>(
        &self,
        id: NodeId,
        assignment: &mut DiscreteValues,
        f: &mut F,
    ) {
        match &self.nodes[id] {
            Node::Leaf(value) => f(assignment, value),
            Node::Choice { key, children } => {
                for (state, &child) in children.iter().enumerate() {
                    assignment.insert(*key, state);
                    self.visit_path(child, assignment, f);
                }
                assignment.remove(key);
            }
        }
    }

    /// Discrete keys the tree branches on, in first-seen depth-first order
    pub fn discrete_keys(&self) -> DiscreteKeys {
        let mut keys = DiscreteKeys::new();
        for id in self.reachable() {
            if let Node::Choice { key, children } = &self.nodes[id] {
                if !keys.iter().any(|dk| dk.key == *key) {
                    keys.push(DiscreteKey::new(*key, children.len()));
                }
            }
        }
        keys
    }

    /// Keys the tree branches on
    pub fn labels(&self) -> BTreeSet<Key> {
        self.discrete_keys().into_iter().map(|dk| dk.key).collect()
    }

    /// Number of distinct leaves
    pub fn num_leaves(&self) -> usize {
        self.leaves().len()
    }

    /// Number of stored nodes, branches and leaves
    pub fn num_nodes(&self) -> usize {
        self.reachable().len()
    }

    /// Length of the longest root-to-leaf path
    pub fn depth(&self) -> usize {
        self.depth_from(self.root)
    }

    fn depth_from(&self, id: NodeId) -> usize {
        match &self.nodes[id] {
            Node::Leaf(_) => 0,
            Node::Choice { children, .. } => {
                1 + children
                    .iter()
                    .map(|&child| self.depth_from(child))
                    .max()
                    .unwrap_or(0)
            }
        }
    }

    fn same_structure(
        &self,
        a: NodeId,
        other: &DecisionTree<L>,
        b: NodeId,
        leaf_eq: &impl Fn(&L, &L) -> bool,
    ) -> bool {
        match (&self.nodes[a], &other.nodes[b]) {
            (Node::Leaf(x), Node::Leaf(y)) => leaf_eq(x, y),
            (
                Node::Choice {
                    key: ka,
                    children: ca,
                },
                Node::Choice {
                    key: kb,
                    children: cb,
                },
            ) => {
                ka == kb
                    && ca.len() == cb.len()
                    && ca
                        .iter()
                        .zip(cb)
                        .all(|(&x, &y)| self.same_structure(x, other, y, leaf_eq))
            }
            _ => false,
        }
    }

    /// Structural equality: same branching and equal leaves under `leaf_eq`
    pub fn equals_with(&self, other: &DecisionTree<L>, leaf_eq: impl Fn(&L, &L) -> bool) -> bool {
        self.same_structure(self.root, other, other.root, &leaf_eq)
    }

    /// Structural equality with leaves compared within `tol`
    pub fn equals(&self, other: &DecisionTree<L>, tol: f64) -> bool
    where
        L: ApproxEq,
    {
        self.equals_with(other, |a, b| a.approx_eq(b, tol))
    }

    fn fmt_node(
        &self,
        f: &mut fmt::Formatter<'_>,
        formatter: &KeyFormatter,
        id: NodeId,
        indent: usize,
    ) -> fmt::Result
    where
        L: KeyFormat,
    {
        let pad = " ".repeat(indent);
        match &self.nodes[id] {
            Node::Leaf(value) => {
                let text = value.display(formatter).to_string();
                let mut lines = text.lines();
                writeln!(f, "Leaf {}", lines.next().unwrap_or(""))?;
                for line in lines {
                    writeln!(f, "{pad}  {line}")?;
                }
                Ok(())
            }
            Node::Choice { key, children } => {
                let name = formatter(*key);
                writeln!(f, "Choice({name})")?;
                for (state, &child) in children.iter().enumerate() {
                    write!(f, "{pad}  {name}={state} ")?;
                    self.fmt_node(f, formatter, child, indent + 2)?;
                }
                Ok(())
            }
        }
    }
}

fn combine<L, R, M, F>(
    a: &DecisionTree<L>,
    a_id: NodeId,
    b: &DecisionTree<R>,
    b_id: NodeId,
    context: &mut Context,
    builder: &mut TreeBuilder<M>,
    f: &mut F,
) -> HybridResult<NodeId>
where
    M: PartialEq + LeafHash,
    F: FnMut(&L, &R) -> HybridResult<M>,
{
    let a_id = a.resolve(a_id, context)?;
    let b_id = b.resolve(b_id, context)?;
    let (key, cardinality) = match (&a.nodes[a_id], &b.nodes[b_id]) {
        (Node::Leaf(x), Node::Leaf(y)) => {
            let value = f(x, y)?;
            return Ok(builder.leaf(value));
        }
        (Node::Choice { key, children }, _) | (_, Node::Choice { key, children }) => {
            (*key, children.len())
        }
    };
    let mut children = Vec::with_capacity(cardinality);
    for state in 0..cardinality {
        context.insert(key, (state, cardinality));
        children.push(combine(a, a_id, b, b_id, context, builder, f)?);
    }
    context.remove(&key);
    Ok(builder.choice(key, children))
}

impl<L: PartialEq> PartialEq for DecisionTree<L> {
    fn eq(&self, other: &Self) -> bool {
        self.equals_with(other, |a, b| a == b)
    }
}

impl<L: ApproxEq> ApproxEq for DecisionTree<L> {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.equals(other, tol)
    }
}

impl<L: KeyFormat> KeyFormat for DecisionTree<L> {
    fn fmt_keys(&self, f: &mut fmt::Formatter<'_>, formatter: &KeyFormatter) -> fmt::Result {
        self.fmt_node(f, formatter, self.root, 0)
    }
}

impl<L: KeyFormat> fmt::Display for DecisionTree<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_keys(f, &default_key_formatter)
    }
}
