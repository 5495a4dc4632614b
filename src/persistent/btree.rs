//! Copy-on-write B+ tree engine shared by the ordered containers.
//!
//! This module implements the persistent B+ tree that backs both
//! [`PersistentOrderedMap`](super::PersistentOrderedMap) and
//! [`PersistentOrderedSet`](super::PersistentOrderedSet). It is not part
//! of the public API; the container façades map their surfaces onto it.
//!
//! # Structure
//!
//! Elements live only in leaves, ordered strictly by key. Internal nodes
//! hold child handles and separator keys, where separator `i` equals the
//! minimum key reachable through child `i + 1`. Every leaf sits at the
//! same depth, and every non-root node holds between ⌈M/2⌉ and M
//! elements or children.
//!
//! # Copy-on-write and edit tokens
//!
//! Every mutating operation is stamped with an [`EditToken`]. A node
//! whose tag matches the token is mutated in place; any other node is
//! cloned, tagged, and the clone mutated. Persistent operations mint a
//! fresh token per call, so they copy exactly the path from the root to
//! the change; a transient holds one token across a batch, so nodes it
//! has already produced are edited in place. Sealing a transient simply
//! drops its token handle, after which no live operation can match the
//! tags left on its nodes.
//!
//! # Iteration
//!
//! Cursors carry a private descent stack from the root to their current
//! leaf, giving amortized O(1) advance and retreat without leaf sibling
//! links, which could not be re-linked under structural sharing without
//! touching nodes owned by older versions.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::ops::{Bound, RangeBounds};

use smallvec::SmallVec;

use super::ReferenceCounter;
use super::compare::Comparator;

/// Nodes are scanned linearly up to this occupancy, binary-searched above.
const LINEAR_SEARCH_MAX: usize = 16;

/// Inline capacity of cursor descent stacks. A tree of order 32 reaches
/// this depth only beyond 16^12 elements; deeper stacks spill to the heap.
const CURSOR_STACK_DEPTH: usize = 12;

// =============================================================================
// Edit Token
// =============================================================================

/// A process-unique mutation license.
///
/// Realized as a fresh reference-counted cell compared by address. Nodes
/// tagged with a token keep its cell alive, so the address of a retired
/// token can never be recycled into a future token while any node still
/// bears the tag.
#[derive(Clone)]
pub(crate) struct EditToken(ReferenceCounter<()>);

impl EditToken {
    /// Mints a token that matches no existing node.
    pub(crate) fn fresh() -> Self {
        Self(ReferenceCounter::new(()))
    }

    /// Checks whether a node tag licenses in-place mutation.
    fn matches(&self, tag: Option<&Self>) -> bool {
        tag.is_some_and(|tagged| ReferenceCounter::ptr_eq(&self.0, &tagged.0))
    }
}

// =============================================================================
// Node Definition
// =============================================================================

pub(crate) type NodeRef<K, V> = ReferenceCounter<Node<K, V>>;

/// A tree node: an optional edit tag plus a leaf/internal variant.
#[derive(Clone)]
pub(crate) struct Node<K, V> {
    edit: Option<EditToken>,
    kind: NodeKind<K, V>,
}

#[derive(Clone)]
enum NodeKind<K, V> {
    Leaf(Leaf<K, V>),
    Internal(Internal<K, V>),
}

/// Leaf node: elements strictly increasing by key.
#[derive(Clone)]
struct Leaf<K, V> {
    entries: Vec<(K, V)>,
}

/// Internal node: `children.len() - 1` separator keys, where
/// `separators[i]` is the minimum key of the subtree at `children[i + 1]`.
#[derive(Clone)]
struct Internal<K, V> {
    separators: Vec<K>,
    children: Vec<NodeRef<K, V>>,
}

impl<K, V> Node<K, V> {
    fn new_leaf(entries: Vec<(K, V)>, token: &EditToken) -> NodeRef<K, V> {
        ReferenceCounter::new(Self {
            edit: Some(token.clone()),
            kind: NodeKind::Leaf(Leaf { entries }),
        })
    }

    fn new_internal(
        separators: Vec<K>,
        children: Vec<NodeRef<K, V>>,
        token: &EditToken,
    ) -> NodeRef<K, V> {
        ReferenceCounter::new(Self {
            edit: Some(token.clone()),
            kind: NodeKind::Internal(Internal {
                separators,
                children,
            }),
        })
    }

    /// Occupancy as counted by the balance invariant: elements for a
    /// leaf, children for an internal node.
    fn occupancy(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.entries.len(),
            NodeKind::Internal(internal) => internal.children.len(),
        }
    }
}

/// Produces a mutable reference to a node owned by the given token.
///
/// If the node's tag matches the token it is edited in place; otherwise
/// the node is cloned and the clone tagged. The in-place path goes
/// through `make_mut`, so a stray live handle to a tagged node degrades
/// to a copy rather than aliasing.
fn cow<'a, K: Clone, V: Clone>(
    node: &'a mut NodeRef<K, V>,
    token: &EditToken,
) -> &'a mut Node<K, V> {
    if !token.matches(node.edit.as_ref()) {
        let mut copy = Node::clone(node);
        copy.edit = Some(token.clone());
        *node = ReferenceCounter::new(copy);
    }
    ReferenceCounter::make_mut(node)
}

// =============================================================================
// Search Helpers
// =============================================================================

/// Locates `key` among leaf entries: `Ok(index)` for an equivalent key,
/// `Err(index)` for its insertion point.
fn search_entries<K, V, Q, C>(entries: &[(K, V)], key: &Q, comparator: &C) -> Result<usize, usize>
where
    K: Borrow<Q>,
    Q: ?Sized,
    C: Comparator<Q>,
{
    if entries.len() <= LINEAR_SEARCH_MAX {
        for (index, (stored, _)) in entries.iter().enumerate() {
            match comparator.compare(stored.borrow(), key) {
                Ordering::Less => {}
                Ordering::Equal => return Ok(index),
                Ordering::Greater => return Err(index),
            }
        }
        Err(entries.len())
    } else {
        let index = entries
            .partition_point(|(stored, _)| comparator.compare(stored.borrow(), key) == Ordering::Less);
        if entries
            .get(index)
            .is_some_and(|(stored, _)| comparator.compare(stored.borrow(), key) == Ordering::Equal)
        {
            Ok(index)
        } else {
            Err(index)
        }
    }
}

/// Index of the first leaf entry at or above the bound: with
/// `strict == false` the first key ≥ `key`, with `strict == true` the
/// first key > `key`.
fn bound_index<K, V, Q, C>(entries: &[(K, V)], key: &Q, strict: bool, comparator: &C) -> usize
where
    K: Borrow<Q>,
    Q: ?Sized,
    C: Comparator<Q>,
{
    entries.partition_point(|(stored, _)| {
        let ordering = comparator.compare(stored.borrow(), key);
        if strict {
            ordering != Ordering::Greater
        } else {
            ordering == Ordering::Less
        }
    })
}

/// Selects the child whose key range contains `key`: the number of
/// separators at or below it.
fn child_index<K, Q, C>(separators: &[K], key: &Q, comparator: &C) -> usize
where
    K: Borrow<Q>,
    Q: ?Sized,
    C: Comparator<Q>,
{
    separators
        .partition_point(|separator| comparator.compare(separator.borrow(), key) != Ordering::Greater)
}

// =============================================================================
// Tree Definition
// =============================================================================

/// A root handle plus the element count. `M` is the target fan-out.
#[derive(Clone)]
pub(crate) struct Tree<K, V, const M: usize> {
    root: Option<NodeRef<K, V>>,
    length: usize,
}

enum InsertOutcome<K, V> {
    /// The element was added without overflowing the leaf's ancestors.
    Inserted,
    /// An equivalent key existed; its value was replaced.
    Replaced,
    /// The element was added and the node split; the separator and the
    /// new right sibling must be attached to the parent.
    SplitInserted { separator: K, right: NodeRef<K, V> },
}

enum RemoveOutcome<K> {
    NotFound,
    Removed {
        /// The child dropped below minimum occupancy.
        underfull: bool,
        /// The subtree's minimum key changed to this value; the nearest
        /// ancestor holding the old minimum as a separator must refresh it.
        new_min: Option<K>,
    },
}

impl<K, V, const M: usize> Tree<K, V, M> {
    /// Minimum occupancy of every non-root node.
    const MIN_OCCUPANCY: usize = M.div_ceil(2);

    /// Leaf and internal fill used by the bottom-up sorted builder.
    const BULK_FILL: usize = (2 * M).div_ceil(3);

    pub(crate) const fn new() -> Self {
        const { assert!(M >= 3, "tree order M must be at least 3") }
        Self {
            root: None,
            length: 0,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.length
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Root identity comparison, the O(1) equality fast path.
    pub(crate) fn same_root(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (None, None) => true,
            (Some(left), Some(right)) => ReferenceCounter::ptr_eq(left, right),
            _ => false,
        }
    }

    /// Finds the entry with a key equivalent to `key`.
    pub(crate) fn get<Q, C>(&self, key: &Q, comparator: &C) -> Option<&(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        let mut node = self.root.as_ref()?;
        loop {
            match &node.kind {
                NodeKind::Internal(internal) => {
                    node = &internal.children[child_index(&internal.separators, key, comparator)];
                }
                NodeKind::Leaf(leaf) => {
                    return match search_entries(&leaf.entries, key, comparator) {
                        Ok(index) => Some(&leaf.entries[index]),
                        Err(_) => None,
                    };
                }
            }
        }
    }

    /// Entry with the minimum key.
    pub(crate) fn first(&self) -> Option<&(K, V)> {
        let mut node = self.root.as_ref()?;
        loop {
            match &node.kind {
                NodeKind::Internal(internal) => node = &internal.children[0],
                NodeKind::Leaf(leaf) => return leaf.entries.first(),
            }
        }
    }

    /// Entry with the maximum key.
    pub(crate) fn last(&self) -> Option<&(K, V)> {
        let mut node = self.root.as_ref()?;
        loop {
            match &node.kind {
                NodeKind::Internal(internal) => {
                    node = internal
                        .children
                        .last()
                        .expect("internal node has at least one child");
                }
                NodeKind::Leaf(leaf) => return leaf.entries.last(),
            }
        }
    }
}

// =============================================================================
// Mutation
// =============================================================================

impl<K: Clone, V: Clone, const M: usize> Tree<K, V, M> {
    /// Upserts `(key, value)` under `token`. Returns `true` if the
    /// element count grew, `false` on replacement.
    pub(crate) fn insert<C>(&mut self, token: &EditToken, key: K, value: V, comparator: &C) -> bool
    where
        C: Comparator<K>,
    {
        let Some(root) = self.root.as_mut() else {
            self.root = Some(Node::new_leaf(vec![(key, value)], token));
            self.length = 1;
            return true;
        };

        match Self::insert_rec(root, token, key, value, comparator) {
            InsertOutcome::Replaced => false,
            InsertOutcome::Inserted => {
                self.length += 1;
                true
            }
            InsertOutcome::SplitInserted { separator, right } => {
                // The root split: grow the tree by one level.
                let old_root = self
                    .root
                    .take()
                    .expect("root existed before the split cascade");
                self.root = Some(Node::new_internal(
                    vec![separator],
                    vec![old_root, right],
                    token,
                ));
                self.length += 1;
                true
            }
        }
    }

    fn insert_rec<C>(
        node: &mut NodeRef<K, V>,
        token: &EditToken,
        key: K,
        value: V,
        comparator: &C,
    ) -> InsertOutcome<K, V>
    where
        C: Comparator<K>,
    {
        let node_mut = cow(node, token);
        match &mut node_mut.kind {
            NodeKind::Leaf(leaf) => match search_entries(&leaf.entries, &key, comparator) {
                Ok(index) => {
                    leaf.entries[index] = (key, value);
                    InsertOutcome::Replaced
                }
                Err(index) => {
                    leaf.entries.insert(index, (key, value));
                    if leaf.entries.len() <= M {
                        InsertOutcome::Inserted
                    } else {
                        // Overflow at M + 1: the left half keeps ⌈M/2⌉
                        // elements, the right half takes ⌊M/2⌋ + 1, and the
                        // right half's minimum is promoted as the separator.
                        let right_entries = leaf.entries.split_off(Self::MIN_OCCUPANCY);
                        let separator = right_entries[0].0.clone();
                        InsertOutcome::SplitInserted {
                            separator,
                            right: Node::new_leaf(right_entries, token),
                        }
                    }
                }
            },
            NodeKind::Internal(internal) => {
                let index = child_index(&internal.separators, &key, comparator);
                match Self::insert_rec(&mut internal.children[index], token, key, value, comparator)
                {
                    InsertOutcome::SplitInserted { separator, right } => {
                        internal.separators.insert(index, separator);
                        internal.children.insert(index + 1, right);
                        if internal.children.len() <= M {
                            InsertOutcome::Inserted
                        } else {
                            Self::split_internal(internal, token)
                        }
                    }
                    other => other,
                }
            }
        }
    }

    /// Splits an internal node holding M + 1 children, promoting the
    /// median separator.
    fn split_internal(internal: &mut Internal<K, V>, token: &EditToken) -> InsertOutcome<K, V> {
        let left_children = (M + 1).div_ceil(2);
        let right_children = internal.children.split_off(left_children);
        let mut right_separators = internal.separators.split_off(left_children - 1);
        let promoted = right_separators.remove(0);
        InsertOutcome::SplitInserted {
            separator: promoted,
            right: Node::new_internal(right_separators, right_children, token),
        }
    }

    /// Removes the entry with a key equivalent to `key` under `token`.
    /// Returns `true` if an entry was removed.
    ///
    /// The copy-on-write pass starts before absence can be detected, so
    /// callers that must preserve root identity on a missing key probe
    /// with [`get`](Self::get) first.
    pub(crate) fn remove<Q, C>(&mut self, token: &EditToken, key: &Q, comparator: &C) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        let Some(root) = self.root.as_mut() else {
            return false;
        };

        match Self::remove_rec(root, token, key, comparator) {
            RemoveOutcome::NotFound => false,
            RemoveOutcome::Removed { .. } => {
                self.length -= 1;
                self.collapse_root();
                true
            }
        }
    }

    /// Shrinks the tree when the root has decayed: an internal root with
    /// a single child hands the root to that child, an empty root leaf
    /// empties the tree.
    fn collapse_root(&mut self) {
        let replacement = match self.root.as_ref().map(|root| &root.kind) {
            Some(NodeKind::Leaf(leaf)) if leaf.entries.is_empty() => Some(None),
            Some(NodeKind::Internal(internal)) if internal.children.len() == 1 => {
                Some(Some(internal.children[0].clone()))
            }
            _ => None,
        };
        if let Some(new_root) = replacement {
            self.root = new_root;
        }
    }

    fn remove_rec<Q, C>(
        node: &mut NodeRef<K, V>,
        token: &EditToken,
        key: &Q,
        comparator: &C,
    ) -> RemoveOutcome<K>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        let node_mut = cow(node, token);
        match &mut node_mut.kind {
            NodeKind::Leaf(leaf) => match search_entries(&leaf.entries, key, comparator) {
                Err(_) => RemoveOutcome::NotFound,
                Ok(index) => {
                    leaf.entries.remove(index);
                    let new_min = (index == 0 && !leaf.entries.is_empty())
                        .then(|| leaf.entries[0].0.clone());
                    RemoveOutcome::Removed {
                        underfull: leaf.entries.len() < Self::MIN_OCCUPANCY,
                        new_min,
                    }
                }
            },
            NodeKind::Internal(internal) => {
                let index = child_index(&internal.separators, key, comparator);
                match Self::remove_rec(&mut internal.children[index], token, key, comparator) {
                    RemoveOutcome::NotFound => RemoveOutcome::NotFound,
                    RemoveOutcome::Removed { underfull, new_min } => {
                        // Refresh the separator tracking the child's minimum
                        // before any merge sinks it into a child.
                        let mut new_min_up = None;
                        if let Some(min_key) = new_min {
                            if index > 0 {
                                internal.separators[index - 1] = min_key;
                            } else {
                                new_min_up = Some(min_key);
                            }
                        }
                        let underfull_here = if underfull {
                            Self::rebalance_child(internal, index, token);
                            internal.children.len() < Self::MIN_OCCUPANCY
                        } else {
                            false
                        };
                        RemoveOutcome::Removed {
                            underfull: underfull_here,
                            new_min: new_min_up,
                        }
                    }
                }
            }
        }
    }

    /// Restores minimum occupancy of `parent.children[index]`: borrow
    /// from the left sibling, else from the right, else merge (left
    /// sibling preferred).
    fn rebalance_child(parent: &mut Internal<K, V>, index: usize, token: &EditToken) {
        if index > 0 && parent.children[index - 1].occupancy() > Self::MIN_OCCUPANCY {
            Self::borrow_from_left(parent, index, token);
        } else if index + 1 < parent.children.len()
            && parent.children[index + 1].occupancy() > Self::MIN_OCCUPANCY
        {
            Self::borrow_from_right(parent, index, token);
        } else if index > 0 {
            Self::merge_children(parent, index - 1, token);
        } else {
            Self::merge_children(parent, index, token);
        }
    }

    /// Moves one element or child from `children[index - 1]` into the
    /// front of `children[index]`, rotating separators through the parent.
    fn borrow_from_left(parent: &mut Internal<K, V>, index: usize, token: &EditToken) {
        let (left_part, right_part) = parent.children.split_at_mut(index);
        let left = cow(
            left_part.last_mut().expect("borrow_from_left needs index > 0"),
            token,
        );
        let child = cow(&mut right_part[0], token);
        match (&mut left.kind, &mut child.kind) {
            (NodeKind::Leaf(left_leaf), NodeKind::Leaf(child_leaf)) => {
                let moved = left_leaf
                    .entries
                    .pop()
                    .expect("donor leaf is above minimum occupancy");
                child_leaf.entries.insert(0, moved);
                parent.separators[index - 1] = child_leaf.entries[0].0.clone();
            }
            (NodeKind::Internal(left_internal), NodeKind::Internal(child_internal)) => {
                let moved_child = left_internal
                    .children
                    .pop()
                    .expect("donor node is above minimum occupancy");
                let moved_separator = left_internal
                    .separators
                    .pop()
                    .expect("donor node is above minimum occupancy");
                // The old parent separator bounds the receiver's first
                // child from below; the donor's last separator becomes
                // the new parent separator.
                let old_parent_separator =
                    std::mem::replace(&mut parent.separators[index - 1], moved_separator);
                child_internal.children.insert(0, moved_child);
                child_internal.separators.insert(0, old_parent_separator);
            }
            _ => unreachable!("siblings always share a depth"),
        }
    }

    /// Mirror image of [`borrow_from_left`](Self::borrow_from_left).
    fn borrow_from_right(parent: &mut Internal<K, V>, index: usize, token: &EditToken) {
        let (left_part, right_part) = parent.children.split_at_mut(index + 1);
        let child = cow(&mut left_part[index], token);
        let right = cow(&mut right_part[0], token);
        match (&mut child.kind, &mut right.kind) {
            (NodeKind::Leaf(child_leaf), NodeKind::Leaf(right_leaf)) => {
                let moved = right_leaf.entries.remove(0);
                child_leaf.entries.push(moved);
                parent.separators[index] = right_leaf.entries[0].0.clone();
            }
            (NodeKind::Internal(child_internal), NodeKind::Internal(right_internal)) => {
                let moved_child = right_internal.children.remove(0);
                let moved_separator = right_internal.separators.remove(0);
                let old_parent_separator =
                    std::mem::replace(&mut parent.separators[index], moved_separator);
                child_internal.children.push(moved_child);
                child_internal.separators.push(old_parent_separator);
            }
            _ => unreachable!("siblings always share a depth"),
        }
    }

    /// Concatenates `children[left_index]` and `children[left_index + 1]`,
    /// dropping (for leaves) or sinking (for internal nodes) the separator
    /// between them.
    fn merge_children(parent: &mut Internal<K, V>, left_index: usize, token: &EditToken) {
        let right_ref = parent.children.remove(left_index + 1);
        let separator = parent.separators.remove(left_index);
        let right_node = match ReferenceCounter::try_unwrap(right_ref) {
            Ok(node) => node,
            Err(shared) => (*shared).clone(),
        };
        let left = cow(&mut parent.children[left_index], token);
        match (&mut left.kind, right_node.kind) {
            (NodeKind::Leaf(left_leaf), NodeKind::Leaf(right_leaf)) => {
                left_leaf.entries.extend(right_leaf.entries);
            }
            (NodeKind::Internal(left_internal), NodeKind::Internal(right_internal)) => {
                left_internal.separators.push(separator);
                left_internal.separators.extend(right_internal.separators);
                left_internal.children.extend(right_internal.children);
            }
            _ => unreachable!("siblings always share a depth"),
        }
    }
}

// =============================================================================
// Bulk Construction
// =============================================================================

const SORTED_INVARIANT_PANIC_MESSAGE: &str =
    "from_sorted_entries requires strictly increasing keys";

impl<K: Clone, V: Clone, const M: usize> Tree<K, V, M> {
    /// Builds a height-minimal tree from entries already strictly
    /// increasing under `comparator`, packing nodes to ⌈2M/3⌉ occupancy
    /// in a single bottom-up pass.
    ///
    /// The ordering precondition is debug-asserted; callers feeding
    /// unsorted data must go through a transient instead.
    pub(crate) fn from_sorted_entries<C>(
        mut entries: Vec<(K, V)>,
        token: &EditToken,
        comparator: &C,
    ) -> Self
    where
        C: Comparator<K>,
    {
        debug_assert!(
            entries
                .windows(2)
                .all(|pair| comparator.compare(&pair[0].0, &pair[1].0) == Ordering::Less),
            "{}",
            SORTED_INVARIANT_PANIC_MESSAGE
        );

        let length = entries.len();
        if length == 0 {
            return Self::new();
        }

        // Pack the leaf level.
        let mut level: Vec<(K, NodeRef<K, V>)> = Vec::new();
        for chunk_size in Self::chunk_sizes(length).into_iter().rev() {
            let chunk = entries.split_off(entries.len() - chunk_size);
            level.push((chunk[0].0.clone(), Node::new_leaf(chunk, token)));
        }
        level.reverse();

        // Pack internal levels until a single root remains.
        while level.len() > 1 {
            let mut next_level: Vec<(K, NodeRef<K, V>)> = Vec::new();
            let mut nodes = level;
            for chunk_size in Self::chunk_sizes(nodes.len()).into_iter().rev() {
                let group = nodes.split_off(nodes.len() - chunk_size);
                let min_key = group[0].0.clone();
                let separators = group[1..].iter().map(|(key, _)| key.clone()).collect();
                let children = group.into_iter().map(|(_, node)| node).collect();
                next_level.push((min_key, Node::new_internal(separators, children, token)));
            }
            next_level.reverse();
            level = next_level;
        }

        let (_, root) = level.pop().expect("nonempty input builds a root");
        Self {
            root: Some(root),
            length,
        }
    }

    /// Splits `length` items into chunk sizes of ⌈2M/3⌉, fixing up the
    /// tail so no chunk is below minimum occupancy (a single chunk may
    /// be, since the root is exempt).
    fn chunk_sizes(length: usize) -> Vec<usize> {
        let fill = Self::BULK_FILL;
        let mut sizes = vec![fill; length / fill];
        let remainder = length % fill;
        if remainder == 0 {
            return sizes;
        }
        if sizes.is_empty() || remainder >= Self::MIN_OCCUPANCY {
            sizes.push(remainder);
        } else {
            // Fold the short tail into the last full chunk; when the
            // union overflows M it is split evenly, and both halves land
            // at or above minimum occupancy because the union exceeds M.
            let total = fill + remainder;
            sizes.pop();
            if total <= M {
                sizes.push(total);
            } else {
                sizes.push(total.div_ceil(2));
                sizes.push(total / 2);
            }
        }
        sizes
    }
}

// =============================================================================
// Cursors
// =============================================================================

type Frames<'a, K, V> = SmallVec<[(&'a Internal<K, V>, usize); CURSOR_STACK_DEPTH]>;

/// A position in the tree: the descent stack from the root, the current
/// leaf, and an index within it. The end position has no leaf.
pub(crate) struct Cursor<'a, K, V> {
    stack: Frames<'a, K, V>,
    leaf: Option<&'a Leaf<K, V>>,
    index: usize,
}

impl<K, V> Clone for Cursor<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            stack: self.stack.clone(),
            leaf: self.leaf,
            index: self.index,
        }
    }
}

impl<'a, K, V> Cursor<'a, K, V> {
    fn end() -> Self {
        Self {
            stack: SmallVec::new(),
            leaf: None,
            index: 0,
        }
    }

    fn current(&self) -> Option<&'a (K, V)> {
        self.leaf.and_then(|leaf| leaf.entries.get(self.index))
    }

    /// Positional equality: same leaf (by address) and index, or both end.
    fn same_position(&self, other: &Self) -> bool {
        match (self.leaf, other.leaf) {
            (None, None) => true,
            (Some(left), Some(right)) => std::ptr::eq(left, right) && self.index == other.index,
            _ => false,
        }
    }

    fn descend_first(&mut self, node: &'a Node<K, V>) {
        let mut node = node;
        loop {
            match &node.kind {
                NodeKind::Internal(internal) => {
                    self.stack.push((internal, 0));
                    node = &internal.children[0];
                }
                NodeKind::Leaf(leaf) => {
                    self.leaf = Some(leaf);
                    self.index = 0;
                    return;
                }
            }
        }
    }

    fn descend_last(&mut self, node: &'a Node<K, V>) {
        let mut node = node;
        loop {
            match &node.kind {
                NodeKind::Internal(internal) => {
                    let last = internal.children.len() - 1;
                    self.stack.push((internal, last));
                    node = &internal.children[last];
                }
                NodeKind::Leaf(leaf) => {
                    self.leaf = Some(leaf);
                    self.index = leaf.entries.len().saturating_sub(1);
                    return;
                }
            }
        }
    }

    /// Steps to the next element, or to the end position.
    fn advance(&mut self) {
        self.index += 1;
        if self
            .leaf
            .is_some_and(|leaf| self.index >= leaf.entries.len())
        {
            self.advance_to_next_leaf();
        }
    }

    fn advance_to_next_leaf(&mut self) {
        while let Some(frame) = self.stack.len().checked_sub(1) {
            let (internal, position) = self.stack[frame];
            if position + 1 < internal.children.len() {
                self.stack[frame].1 = position + 1;
                self.descend_first(&internal.children[position + 1]);
                return;
            }
            self.stack.pop();
        }
        self.leaf = None;
        self.index = 0;
    }

    /// Steps to the previous element, or to the end position when
    /// already at the first.
    fn retreat(&mut self) {
        if self.index > 0 {
            self.index -= 1;
        } else {
            self.retreat_to_previous_leaf();
        }
    }

    fn retreat_to_previous_leaf(&mut self) {
        while let Some(frame) = self.stack.len().checked_sub(1) {
            let (internal, position) = self.stack[frame];
            if position > 0 {
                self.stack[frame].1 = position - 1;
                self.descend_last(&internal.children[position - 1]);
                return;
            }
            self.stack.pop();
        }
        self.leaf = None;
        self.index = 0;
    }

    /// Moves a freshly built bound cursor off a leaf's past-the-end slot
    /// and onto the next element.
    fn normalize_forward(&mut self) {
        if self
            .leaf
            .is_some_and(|leaf| self.index >= leaf.entries.len())
        {
            self.advance_to_next_leaf();
        }
    }
}

impl<K, V, const M: usize> Tree<K, V, M> {
    fn cursor_first(&self) -> Cursor<'_, K, V> {
        let mut cursor = Cursor::end();
        if let Some(root) = self.root.as_ref() {
            cursor.descend_first(root);
        }
        cursor
    }

    fn cursor_last(&self) -> Cursor<'_, K, V> {
        let mut cursor = Cursor::end();
        if let Some(root) = self.root.as_ref() {
            cursor.descend_last(root);
        }
        cursor
    }

    /// Raw bound cursor: descends to the leaf containing the boundary
    /// and sets the in-leaf bound index, which may be the leaf's
    /// past-the-end slot. Callers normalize forward or retreat.
    fn cursor_bound<Q, C>(&self, key: &Q, strict: bool, comparator: &C) -> Cursor<'_, K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        let mut cursor = Cursor::end();
        let Some(mut node) = self.root.as_ref() else {
            return cursor;
        };
        loop {
            match &node.kind {
                NodeKind::Internal(internal) => {
                    let index = child_index(&internal.separators, key, comparator);
                    cursor.stack.push((internal, index));
                    node = &internal.children[index];
                }
                NodeKind::Leaf(leaf) => {
                    cursor.leaf = Some(leaf);
                    cursor.index = bound_index(&leaf.entries, key, strict, comparator);
                    return cursor;
                }
            }
        }
    }
}

// =============================================================================
// Iteration
// =============================================================================

/// Double-ended in-order iterator between two cursors (both inclusive).
///
/// Exhaustion is detected by positional equality of the cursors, so no
/// key comparisons happen during iteration.
pub(crate) struct TreeIter<'a, K, V> {
    front: Cursor<'a, K, V>,
    back: Cursor<'a, K, V>,
    /// Exact number of remaining elements when known (full iteration).
    remaining: Option<usize>,
    exhausted: bool,
}

impl<K, V> Clone for TreeIter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            front: self.front.clone(),
            back: self.back.clone(),
            remaining: self.remaining,
            exhausted: self.exhausted,
        }
    }
}

impl<'a, K, V> TreeIter<'a, K, V> {
    fn empty() -> Self {
        Self {
            front: Cursor::end(),
            back: Cursor::end(),
            remaining: Some(0),
            exhausted: true,
        }
    }

    /// Exact remaining count; meaningful only for full iteration.
    pub(crate) fn exact_len(&self) -> usize {
        self.remaining.unwrap_or_default()
    }
}

impl<'a, K, V> Iterator for TreeIter<'a, K, V> {
    type Item = &'a (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let item = self.front.current()?;
        if self.front.same_position(&self.back) {
            self.exhausted = true;
        } else {
            self.front.advance();
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.exhausted {
            return (0, Some(0));
        }
        self.remaining
            .map_or((1, None), |remaining| (remaining, Some(remaining)))
    }
}

impl<K, V> DoubleEndedIterator for TreeIter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let item = self.back.current()?;
        if self.front.same_position(&self.back) {
            self.exhausted = true;
        } else {
            self.back.retreat();
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(item)
    }
}

impl<K, V> std::iter::FusedIterator for TreeIter<'_, K, V> {}

impl<K, V, const M: usize> Tree<K, V, M> {
    /// Full in-order iteration with an exact length.
    pub(crate) fn iter(&self) -> TreeIter<'_, K, V> {
        if self.is_empty() {
            return TreeIter::empty();
        }
        TreeIter {
            front: self.cursor_first(),
            back: self.cursor_last(),
            remaining: Some(self.length),
            exhausted: false,
        }
    }

    /// Iteration from the first key ≥ `key` (`strict == false`) or
    /// > `key` (`strict == true`) to the end.
    pub(crate) fn iter_from_bound<Q, C>(
        &self,
        key: &Q,
        strict: bool,
        comparator: &C,
    ) -> TreeIter<'_, K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        if self.is_empty() {
            return TreeIter::empty();
        }
        let mut front = self.cursor_bound(key, strict, comparator);
        front.normalize_forward();
        if front.current().is_none() {
            return TreeIter::empty();
        }
        TreeIter {
            front,
            back: self.cursor_last(),
            remaining: None,
            exhausted: false,
        }
    }

    /// Iteration over the keys within `range`. An inverted range yields
    /// nothing.
    pub(crate) fn iter_range<Q, C, R>(&self, range: &R, comparator: &C) -> TreeIter<'_, K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
        R: RangeBounds<Q>,
    {
        if self.is_empty() {
            return TreeIter::empty();
        }

        let mut front = match range.start_bound() {
            Bound::Included(key) => self.cursor_bound(key, false, comparator),
            Bound::Excluded(key) => self.cursor_bound(key, true, comparator),
            Bound::Unbounded => self.cursor_first(),
        };
        front.normalize_forward();

        let mut back = match range.end_bound() {
            Bound::Included(key) => {
                let mut cursor = self.cursor_bound(key, true, comparator);
                cursor.retreat();
                cursor
            }
            Bound::Excluded(key) => {
                let mut cursor = self.cursor_bound(key, false, comparator);
                cursor.retreat();
                cursor
            }
            Bound::Unbounded => self.cursor_last(),
        };

        let (Some(first), Some(last)) = (front.current(), back.current()) else {
            return TreeIter::empty();
        };
        if comparator.compare(first.0.borrow(), last.0.borrow()) == Ordering::Greater {
            return TreeIter::empty();
        }

        TreeIter {
            front,
            back,
            remaining: None,
            exhausted: false,
        }
    }
}

// =============================================================================
// Invariant Checker (test only)
// =============================================================================

#[cfg(test)]
impl<K: Clone, V: Clone, const M: usize> Tree<K, V, M> {
    /// Asserts every structural invariant: uniform leaf depth, occupancy
    /// bounds, separator correctness, strict global key order, and the
    /// stored element count.
    pub(crate) fn check_invariants<C>(&self, comparator: &C)
    where
        C: Comparator<K>,
    {
        let Some(root) = self.root.as_ref() else {
            assert_eq!(self.length, 0, "empty tree must have length 0");
            return;
        };

        let mut keys: Vec<&K> = Vec::new();
        Self::check_node(root, true, &mut keys, comparator);

        assert_eq!(keys.len(), self.length, "stored length matches leaf entries");
        for pair in keys.windows(2) {
            assert_eq!(
                comparator.compare(pair[0], pair[1]),
                Ordering::Less,
                "leaf-level keys must be strictly increasing"
            );
        }
    }

    /// Returns the subtree depth; panics on any violated invariant.
    fn check_node<'a, C>(
        node: &'a NodeRef<K, V>,
        is_root: bool,
        keys: &mut Vec<&'a K>,
        comparator: &C,
    ) -> usize
    where
        C: Comparator<K>,
    {
        match &node.kind {
            NodeKind::Leaf(leaf) => {
                if is_root {
                    assert!(!leaf.entries.is_empty(), "root leaf may not be empty");
                } else {
                    assert!(
                        leaf.entries.len() >= Self::MIN_OCCUPANCY,
                        "non-root leaf below minimum occupancy"
                    );
                }
                assert!(leaf.entries.len() <= M, "leaf above maximum occupancy");
                keys.extend(leaf.entries.iter().map(|(key, _)| key));
                1
            }
            NodeKind::Internal(internal) => {
                let minimum = if is_root { 2 } else { Self::MIN_OCCUPANCY };
                assert!(
                    internal.children.len() >= minimum,
                    "internal node below minimum occupancy"
                );
                assert!(
                    internal.children.len() <= M,
                    "internal node above maximum occupancy"
                );
                assert_eq!(
                    internal.separators.len(),
                    internal.children.len() - 1,
                    "separator count must be children - 1"
                );
                for (index, separator) in internal.separators.iter().enumerate() {
                    let right_min = Self::subtree_min(&internal.children[index + 1]);
                    assert_eq!(
                        comparator.compare(separator, right_min),
                        Ordering::Equal,
                        "separator must equal the right subtree's minimum key"
                    );
                }
                let mut depths = internal
                    .children
                    .iter()
                    .map(|child| Self::check_node(child, false, keys, comparator));
                let first_depth = depths.next().expect("internal node has children");
                assert!(
                    depths.all(|depth| depth == first_depth),
                    "all leaves must share a depth"
                );
                first_depth + 1
            }
        }
    }

    fn subtree_min(node: &NodeRef<K, V>) -> &K {
        let mut node = node;
        loop {
            match &node.kind {
                NodeKind::Internal(internal) => node = &internal.children[0],
                NodeKind::Leaf(leaf) => return &leaf.entries[0].0,
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::compare::NaturalOrder;
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    /// Small order exercises splits and merges with few elements.
    type SmallTree = Tree<i32, i32, 4>;
    /// Default order.
    type WideTree = Tree<i32, i32, 32>;

    fn tree_from<const M: usize>(entries: impl IntoIterator<Item = i32>) -> Tree<i32, i32, M> {
        let token = EditToken::fresh();
        let mut tree = Tree::new();
        for key in entries {
            tree.insert(&token, key, key * 10, &NaturalOrder);
        }
        tree
    }

    #[rstest]
    fn test_new_tree_is_empty() {
        let tree = SmallTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert!(tree.get(&1, &NaturalOrder).is_none());
        tree.check_invariants(&NaturalOrder);
    }

    #[rstest]
    fn test_insert_and_get_across_splits() {
        let tree = tree_from::<4>(0..100);
        assert_eq!(tree.len(), 100);
        for key in 0..100 {
            assert_eq!(tree.get(&key, &NaturalOrder), Some(&(key, key * 10)));
        }
        assert!(tree.get(&100, &NaturalOrder).is_none());
        tree.check_invariants(&NaturalOrder);
    }

    #[rstest]
    fn test_insert_replaces_equivalent_key() {
        let token = EditToken::fresh();
        let mut tree = tree_from::<4>(0..10);
        let grew = tree.insert(&token, 5, 999, &NaturalOrder);
        assert!(!grew);
        assert_eq!(tree.len(), 10);
        assert_eq!(tree.get(&5, &NaturalOrder), Some(&(5, 999)));
        tree.check_invariants(&NaturalOrder);
    }

    #[rstest]
    fn test_remove_across_merges() {
        let token = EditToken::fresh();
        let mut tree = tree_from::<4>(0..100);
        for key in 0..100 {
            assert!(tree.remove(&token, &key, &NaturalOrder));
            tree.check_invariants(&NaturalOrder);
        }
        assert!(tree.is_empty());
    }

    #[rstest]
    fn test_remove_absent_key_reports_not_found() {
        let token = EditToken::fresh();
        let mut tree = tree_from::<4>(0..10);
        assert!(!tree.remove(&token, &42, &NaturalOrder));
        assert_eq!(tree.len(), 10);
    }

    #[rstest]
    fn test_remove_minimum_refreshes_separators() {
        let token = EditToken::fresh();
        let mut tree = tree_from::<4>(0..50);
        // Removing successive minima forces separator refreshes at every level.
        for key in 0..25 {
            assert!(tree.remove(&token, &key, &NaturalOrder));
            tree.check_invariants(&NaturalOrder);
        }
        assert_eq!(tree.first(), Some(&(25, 250)));
    }

    #[rstest]
    fn test_first_and_last() {
        let tree = tree_from::<4>([7, 3, 9, 1, 5]);
        assert_eq!(tree.first(), Some(&(1, 10)));
        assert_eq!(tree.last(), Some(&(9, 90)));
    }

    #[rstest]
    fn test_iteration_is_sorted() {
        let tree = tree_from::<4>([9, 2, 7, 0, 5, 3, 8, 1, 6, 4]);
        let keys: Vec<i32> = tree.iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, (0..10).collect::<Vec<_>>());
    }

    #[rstest]
    fn test_reverse_iteration() {
        let tree = tree_from::<4>(0..30);
        let keys: Vec<i32> = tree.iter().rev().map(|(key, _)| *key).collect();
        assert_eq!(keys, (0..30).rev().collect::<Vec<_>>());
    }

    #[rstest]
    fn test_double_ended_iteration_meets_in_the_middle() {
        let tree = tree_from::<4>(0..10);
        let mut iterator = tree.iter();
        assert_eq!(iterator.next().map(|(key, _)| *key), Some(0));
        assert_eq!(iterator.next_back().map(|(key, _)| *key), Some(9));
        assert_eq!(iterator.next().map(|(key, _)| *key), Some(1));
        assert_eq!(iterator.next_back().map(|(key, _)| *key), Some(8));
        let middle: Vec<i32> = iterator.map(|(key, _)| *key).collect();
        assert_eq!(middle, vec![2, 3, 4, 5, 6, 7]);
    }

    #[rstest]
    fn test_bound_iteration() {
        let tree = tree_from::<4>((0..40).map(|key| key * 2));
        let from_lower: Vec<i32> = tree
            .iter_from_bound(&10, false, &NaturalOrder)
            .map(|(key, _)| *key)
            .take(3)
            .collect();
        assert_eq!(from_lower, vec![10, 12, 14]);

        let from_upper: Vec<i32> = tree
            .iter_from_bound(&10, true, &NaturalOrder)
            .map(|(key, _)| *key)
            .take(3)
            .collect();
        assert_eq!(from_upper, vec![12, 14, 16]);

        // A bound between stored keys behaves like the next stored key.
        let between: Vec<i32> = tree
            .iter_from_bound(&11, false, &NaturalOrder)
            .map(|(key, _)| *key)
            .take(2)
            .collect();
        assert_eq!(between, vec![12, 14]);
    }

    #[rstest]
    fn test_bound_past_maximum_is_empty() {
        let tree = tree_from::<4>(0..10);
        assert!(tree.iter_from_bound(&10, false, &NaturalOrder).next().is_none());
        assert!(tree.iter_from_bound(&9, true, &NaturalOrder).next().is_none());
    }

    #[rstest]
    fn test_range_iteration() {
        let tree = tree_from::<4>(0..20);
        let keys: Vec<i32> = tree
            .iter_range(&(5..15), &NaturalOrder)
            .map(|(key, _)| *key)
            .collect();
        assert_eq!(keys, (5..15).collect::<Vec<_>>());

        let inclusive: Vec<i32> = tree
            .iter_range(&(5..=15), &NaturalOrder)
            .map(|(key, _)| *key)
            .collect();
        assert_eq!(inclusive, (5..=15).collect::<Vec<_>>());

        let empty: Vec<i32> = tree
            .iter_range(&(15..5), &NaturalOrder)
            .map(|(key, _)| *key)
            .collect();
        assert!(empty.is_empty());
    }

    #[rstest]
    fn test_persistent_copies_leave_original_untouched() {
        let original = tree_from::<4>(0..50);
        let mut derived = original.clone();
        let token = EditToken::fresh();
        derived.insert(&token, 999, 0, &NaturalOrder);
        derived.remove(&token, &0, &NaturalOrder);

        assert_eq!(original.len(), 50);
        assert_eq!(original.get(&0, &NaturalOrder), Some(&(0, 0)));
        assert!(original.get(&999, &NaturalOrder).is_none());
        original.check_invariants(&NaturalOrder);
        derived.check_invariants(&NaturalOrder);
    }

    #[rstest]
    fn test_shared_token_mutates_in_place() {
        let token = EditToken::fresh();
        let mut tree = SmallTree::new();
        tree.insert(&token, 1, 10, &NaturalOrder);
        // Observe the allocation address without holding a handle, which
        // would itself force a copy.
        let root_address = ReferenceCounter::as_ptr(tree.root.as_ref().expect("root exists"));
        tree.insert(&token, 2, 20, &NaturalOrder);
        // Same token, no split: the root cell is reused.
        assert_eq!(
            root_address,
            ReferenceCounter::as_ptr(tree.root.as_ref().expect("root exists")),
        );
    }

    #[rstest]
    fn test_fresh_token_copies_shared_root() {
        let tree = tree_from::<4>(0..4);
        let mut derived = tree.clone();
        derived.insert(&EditToken::fresh(), 2, 999, &NaturalOrder);
        assert!(!tree.same_root(&derived));
        assert_eq!(tree.get(&2, &NaturalOrder), Some(&(2, 20)));
    }

    #[rstest]
    #[case::empty(0)]
    #[case::single(1)]
    #[case::one_leaf(5)]
    #[case::tail_below_minimum(7)]
    #[case::several_levels(1000)]
    fn test_from_sorted_entries(#[case] count: usize) {
        let entries: Vec<(i32, i32)> = (0..count as i32).map(|key| (key, key * 10)).collect();
        let tree: SmallTree =
            Tree::from_sorted_entries(entries, &EditToken::fresh(), &NaturalOrder);
        assert_eq!(tree.len(), count);
        tree.check_invariants(&NaturalOrder);
        let keys: Vec<i32> = tree.iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, (0..count as i32).collect::<Vec<_>>());
    }

    #[rstest]
    fn test_from_sorted_entries_wide_order() {
        let entries: Vec<(i32, i32)> = (0..10_000).map(|key| (key, key)).collect();
        let tree: WideTree =
            Tree::from_sorted_entries(entries, &EditToken::fresh(), &NaturalOrder);
        assert_eq!(tree.len(), 10_000);
        tree.check_invariants(&NaturalOrder);
    }

    proptest! {
        /// Structural invariants hold after any interleaving of inserts
        /// and removes, and the tree agrees with a reference model.
        #[test]
        fn prop_invariants_after_random_operations(
            operations in prop::collection::vec((any::<bool>(), 0i32..200, any::<i32>()), 0..400)
        ) {
            let token = EditToken::fresh();
            let mut tree = SmallTree::new();
            let mut model = std::collections::BTreeMap::new();

            for (is_insert, key, value) in operations {
                if is_insert {
                    tree.insert(&token, key, value, &NaturalOrder);
                    model.insert(key, value);
                } else {
                    tree.remove(&token, &key, &NaturalOrder);
                    model.remove(&key);
                }
                tree.check_invariants(&NaturalOrder);
            }

            prop_assert_eq!(tree.len(), model.len());
            let tree_entries: Vec<(i32, i32)> = tree.iter().copied().collect();
            let model_entries: Vec<(i32, i32)> =
                model.iter().map(|(key, value)| (*key, *value)).collect();
            prop_assert_eq!(tree_entries, model_entries);
        }

        /// Path copying never disturbs previously sealed versions.
        #[test]
        fn prop_persistence_of_prior_versions(
            initial in prop::collection::btree_map(0i32..100, any::<i32>(), 0..60),
            mutations in prop::collection::vec((any::<bool>(), 0i32..100, any::<i32>()), 1..60)
        ) {
            let snapshot: SmallTree = Tree::from_sorted_entries(
                initial.iter().map(|(key, value)| (*key, *value)).collect(),
                &EditToken::fresh(),
                &NaturalOrder,
            );
            let expected: Vec<(i32, i32)> = snapshot.iter().copied().collect();

            let mut derived = snapshot.clone();
            for (is_insert, key, value) in mutations {
                let token = EditToken::fresh();
                if is_insert {
                    derived.insert(&token, key, value, &NaturalOrder);
                } else {
                    derived.remove(&token, &key, &NaturalOrder);
                }
            }

            let after: Vec<(i32, i32)> = snapshot.iter().copied().collect();
            prop_assert_eq!(expected, after);
        }

        /// The sorted bulk builder agrees with incremental insertion.
        #[test]
        fn prop_sorted_build_matches_incremental(
            keys in prop::collection::btree_set(any::<i32>(), 0..300)
        ) {
            let entries: Vec<(i32, i32)> = keys.iter().map(|key| (*key, *key)).collect();
            let built: SmallTree = Tree::from_sorted_entries(
                entries.clone(),
                &EditToken::fresh(),
                &NaturalOrder,
            );
            built.check_invariants(&NaturalOrder);

            let token = EditToken::fresh();
            let mut incremental = SmallTree::new();
            for (key, value) in entries {
                incremental.insert(&token, key, value, &NaturalOrder);
            }

            let built_entries: Vec<(i32, i32)> = built.iter().copied().collect();
            let incremental_entries: Vec<(i32, i32)> = incremental.iter().copied().collect();
            prop_assert_eq!(built_entries, incremental_entries);
        }
    }
}
