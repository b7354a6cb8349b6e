//! B-tree index
//!
//! This module provides a generic, ordered, balanced multiway search tree
//! of the kind that backs database indexes. It supports:
//! - Exact search and ordered insertion with automatic rebalancing
//! - Deletion with sibling rotation and merging
//! - Range queries and in-order traversal
//! - Bulk bottom-up construction from pre-sorted keys
//! - A structural invariant verifier for tests and debugging
//!
//! The tree is purely in-memory and single-threaded; persistence and
//! concurrency control belong to the caller.

mod error;
mod node;
mod path;

pub use error::{BTreeError, BTreeResult};
pub use node::{Node, NodeId};
pub use path::{PathEntry, PathStack};

use std::fmt::{self, Write};
use std::mem;

/// B-tree data structure
///
/// Order `m` means:
/// - Every node has at most `m` children and `m - 1` keys
/// - Every non-root node has at least `ceil(m/2) - 1` keys
/// - The root has at least one key unless the tree is empty
/// - All leaves sit at the same depth
#[derive(Debug)]
pub struct BTree<K> {
    /// Root node ID (None if tree is empty)
    root: Option<NodeId>,

    /// Tree order (max children per node)
    order: usize,

    /// Node storage
    nodes: Vec<Option<Node<K>>>,

    /// Free list for recycling deleted nodes
    free_list: Vec<NodeId>,

    /// Total number of distinct keys in the tree
    entry_count: usize,
}

impl<K: Ord + Clone> BTree<K> {
    /// Create a new empty B-tree with the given order
    ///
    /// # Arguments
    /// * `order` - The tree order (must be >= 3)
    ///
    /// # Returns
    /// * `Ok(BTree)` - A new empty B-tree
    /// * `Err(BTreeError)` - If order is invalid
    pub fn new(order: usize) -> BTreeResult<Self> {
        if order < 3 {
            return Err(BTreeError::InvalidOrder(order));
        }

        Ok(Self {
            root: None,
            order,
            nodes: Vec::new(),
            free_list: Vec::new(),
            entry_count: 0,
        })
    }

    /// Get the tree order
    pub fn order(&self) -> usize {
        self.order
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Get number of distinct keys in the tree
    pub fn len(&self) -> usize {
        self.entry_count
    }

    /// Get tree height (0 for empty, 1 for a single leaf root)
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root;

        while let Some(id) = current {
            height += 1;
            current = self
                .get_node(id)
                .and_then(|node| node.children.first().copied());
        }

        height
    }

    /// Get the minimum key in the tree
    pub fn min_key(&self) -> Option<&K> {
        let mut current = self.root?;

        loop {
            let node = self.get_node(current)?;
            if node.is_leaf() {
                return node.min_key();
            }
            current = *node.children.first()?;
        }
    }

    /// Get the maximum key in the tree
    pub fn max_key(&self) -> Option<&K> {
        let mut current = self.root?;

        loop {
            let node = self.get_node(current)?;
            if node.is_leaf() {
                return node.max_key();
            }
            current = *node.children.last()?;
        }
    }

    /// Remove every key from the tree
    pub fn clear(&mut self) {
        self.root = None;
        self.nodes.clear();
        self.free_list.clear();
        self.entry_count = 0;
    }

    /// Minimum keys in a non-root node
    fn min_keys(&self) -> usize {
        self.order.div_ceil(2) - 1
    }

    /// Maximum keys in any node
    fn max_keys(&self) -> usize {
        self.order - 1
    }

    // ========== Node Management ==========

    /// Allocate a new node, returning its ID
    fn allocate_node(&mut self, node: Node<K>) -> NodeId {
        if let Some(id) = self.free_list.pop() {
            self.nodes[id] = Some(node);
            id
        } else {
            let id = self.nodes.len();
            self.nodes.push(Some(node));
            id
        }
    }

    /// Get a reference to a node by ID
    fn get_node(&self, id: NodeId) -> Option<&Node<K>> {
        self.nodes.get(id).and_then(|n| n.as_ref())
    }

    /// Get a reference to a node, failing on a stale ID
    fn node(&self, id: NodeId) -> BTreeResult<&Node<K>> {
        self.get_node(id).ok_or(BTreeError::NodeNotFound(id))
    }

    /// Get a mutable reference to a node, failing on a stale ID
    fn node_mut(&mut self, id: NodeId) -> BTreeResult<&mut Node<K>> {
        self.nodes
            .get_mut(id)
            .and_then(|n| n.as_mut())
            .ok_or(BTreeError::NodeNotFound(id))
    }

    /// Remove a node from storage, returning its contents
    fn take_node(&mut self, id: NodeId) -> BTreeResult<Node<K>> {
        let node = self
            .nodes
            .get_mut(id)
            .and_then(|n| n.take())
            .ok_or(BTreeError::NodeNotFound(id))?;
        self.free_list.push(id);
        Ok(node)
    }

    /// Free a node, adding it to the free list
    fn free_node(&mut self, id: NodeId) {
        if id < self.nodes.len() {
            self.nodes[id] = None;
            self.free_list.push(id);
        }
    }

    // ========== Search Operations ==========

    /// Check whether a key is present
    pub fn contains(&self, key: &K) -> bool {
        let mut current = match self.root {
            Some(id) => id,
            None => return false,
        };

        loop {
            let Some(node) = self.get_node(current) else {
                return false;
            };

            let (index, found) = node.search_index(key);
            if found {
                return true;
            }
            if node.is_leaf() {
                return false;
            }
            current = node.children[index];
        }
    }

    /// Record the descent from the root to the key or its insertion point
    ///
    /// Returns whether the key was found; if so, the top entry holds the
    /// node and key slot where it sits.
    fn find_path(&self, key: &K, path: &mut PathStack) -> BTreeResult<bool> {
        let mut current = match self.root {
            Some(id) => id,
            None => return Ok(false),
        };

        loop {
            let node = self.node(current)?;
            let (index, found) = node.search_index(key);
            path.push(current, index);

            if found {
                return Ok(true);
            }
            if node.is_leaf() {
                return Ok(false);
            }
            current = node.children[index];
        }
    }

    /// Find the smallest key strictly greater than the given key
    ///
    /// Fails with `KeyNotFound` if the key is absent and with
    /// `SuccessorNotFound` if it is the maximum of the tree.
    pub fn successor(&self, key: &K) -> BTreeResult<&K> {
        let mut path = PathStack::new();
        if !self.find_path(key, &mut path)? {
            return Err(BTreeError::KeyNotFound);
        }

        let entry = *path.top()?;
        let node = self.node(entry.node)?;

        if node.is_leaf() {
            if entry.index + 1 < node.len() {
                return Ok(&node.keys[entry.index + 1]);
            }
            // the key closes its leaf; the successor is the separator of
            // the first ancestor we entered through a non-rightmost child
            loop {
                path.pop()?;
                if path.is_empty() {
                    return Err(BTreeError::SuccessorNotFound);
                }
                let up = *path.top()?;
                let parent = self.node(up.node)?;
                if up.index < parent.len() {
                    return Ok(&parent.keys[up.index]);
                }
            }
        } else {
            // leftmost key of the right subtree
            let mut current = node.children[entry.index + 1];
            loop {
                let child = self.node(current)?;
                if child.is_leaf() {
                    return child.min_key().ok_or_else(|| {
                        BTreeError::InvalidState("empty leaf on successor path".to_string())
                    });
                }
                current = child.children[0];
            }
        }
    }

    // ========== Insert Operations ==========

    /// Insert a key into the tree
    ///
    /// Returns `Ok(false)` without changing the tree if the key is
    /// already present.
    pub fn insert(&mut self, key: K) -> BTreeResult<bool> {
        if self.root.is_none() {
            let root_id = self.allocate_node(Node::leaf(vec![key]));
            self.root = Some(root_id);
            self.entry_count = 1;
            return Ok(true);
        }

        let mut path = PathStack::new();
        if self.find_path(&key, &mut path)? {
            return Ok(false);
        }

        let mut value = key;
        let mut right_of_value: Option<NodeId> = None;
        let mut left_of_value: Option<NodeId> = None;

        loop {
            if path.is_empty() {
                // every ancestor split; grow a new root above the halves
                let children = match (left_of_value.take(), right_of_value.take()) {
                    (Some(left), Some(right)) => vec![left, right],
                    _ => return Err(BTreeError::EmptyStack),
                };
                let new_root = self.allocate_node(Node::internal(vec![value], children));
                self.root = Some(new_root);
                break;
            }

            let entry = *path.top()?;
            if self.node(entry.node)?.len() < self.max_keys() {
                self.insert_into_node(entry.node, entry.index, value, right_of_value)?;
                break;
            }

            // full node: split it in place and carry the median upward
            let (right_id, median) =
                self.split_node(entry.node, entry.index, value, right_of_value)?;
            left_of_value = Some(entry.node);
            right_of_value = Some(right_id);
            value = median;
            path.pop()?;
        }

        self.entry_count += 1;
        Ok(true)
    }

    /// Insert a key and its right child into a node with room
    fn insert_into_node(
        &mut self,
        node_id: NodeId,
        index: usize,
        value: K,
        right_of_value: Option<NodeId>,
    ) -> BTreeResult<()> {
        let node = self.node_mut(node_id)?;
        node.keys.insert(index, value);
        if let Some(right) = right_of_value {
            node.children.insert(index + 1, right);
        }
        Ok(())
    }

    /// Split a full node receiving `value` at `index`, returning the new
    /// right sibling and the median key to promote
    ///
    /// The left node keeps `median_index` keys; the sibling inherits the
    /// leaf status of the node it split from.
    fn split_node(
        &mut self,
        node_id: NodeId,
        index: usize,
        value: K,
        right_of_value: Option<NodeId>,
    ) -> BTreeResult<(NodeId, K)> {
        let median_index = (self.order - 1) / 2;

        let (right_keys, right_children, median) = {
            let node = self.node_mut(node_id)?;
            let internal = !node.is_leaf();

            if index < median_index {
                // new key lands in the left half; keys[median_index - 1] moves up
                let right_keys = node.keys.split_off(median_index);
                let right_children = if internal {
                    node.children.split_off(median_index)
                } else {
                    Vec::new()
                };
                let median = node.keys.pop().unwrap();

                node.keys.insert(index, value);
                if let Some(right) = right_of_value {
                    node.children.insert(index + 1, right);
                }
                (right_keys, right_children, median)
            } else if index > median_index {
                // new key lands in the right half; keys[median_index] moves up
                let mut right_keys = node.keys.split_off(median_index + 1);
                let median = node.keys.pop().unwrap();
                right_keys.insert(index - median_index - 1, value);

                let mut right_children = if internal {
                    node.children.split_off(median_index + 1)
                } else {
                    Vec::new()
                };
                if let Some(right) = right_of_value {
                    right_children.insert(index - median_index, right);
                }
                (right_keys, right_children, median)
            } else {
                // the incoming key is itself the median
                let right_keys = node.keys.split_off(median_index);
                let mut right_children = if internal {
                    node.children.split_off(median_index + 1)
                } else {
                    Vec::new()
                };
                if let Some(right) = right_of_value {
                    right_children.insert(0, right);
                }
                (right_keys, right_children, value)
            }
        };

        let right_id = self.allocate_node(Node::from_parts(right_keys, right_children));
        Ok((right_id, median))
    }

    // ========== Delete Operations ==========

    /// Remove a key from the tree
    ///
    /// Returns `Ok(false)` without changing the tree if the key is
    /// absent.
    pub fn remove(&mut self, key: &K) -> BTreeResult<bool> {
        if self.root.is_none() {
            return Ok(false);
        }

        let mut path = PathStack::new();
        if !self.find_path(key, &mut path)? {
            return Ok(false);
        }

        let entry = *path.top()?;
        if self.node(entry.node)?.is_leaf() {
            self.node_mut(entry.node)?.keys.remove(entry.index);
        } else {
            // swap in the in-order successor, then delete it from its leaf
            self.descend_to_successor(&mut path)?;
            let leaf_id = path.top()?.node;
            let successor = self.node_mut(leaf_id)?.keys.remove(0);
            self.node_mut(entry.node)?.keys[entry.index] = successor;
        }

        self.rebalance_after_removal(path)?;
        self.entry_count -= 1;
        Ok(true)
    }

    /// Extend the path from an internal key slot down to the leaf holding
    /// its in-order successor (the leftmost leaf of the right subtree)
    fn descend_to_successor(&mut self, path: &mut PathStack) -> BTreeResult<()> {
        let entry = *path.top()?;
        // the entry now records the child taken, not the key slot
        path.top_mut()?.index = entry.index + 1;

        let mut current = self.node(entry.node)?.children[entry.index + 1];
        path.push(current, 0);

        loop {
            let node = self.node(current)?;
            if node.is_leaf() {
                return Ok(());
            }
            current = node.children[0];
            path.push(current, 0);
        }
    }

    /// Walk the recorded path bottom-up, fixing every underflowed node
    fn rebalance_after_removal(&mut self, mut path: PathStack) -> BTreeResult<()> {
        let mut child_id = path.pop()?.node;

        loop {
            if path.is_empty() {
                // child is the root; collapse it if a merge emptied it
                if self.node(child_id)?.is_empty() {
                    let promoted = self.node(child_id)?.children.first().copied();
                    self.free_node(child_id);
                    self.root = promoted;
                }
                return Ok(());
            }

            if self.node(child_id)?.len() >= self.min_keys() {
                return Ok(());
            }

            let parent = path.pop()?;
            self.fix_underflow(parent.node, parent.index)?;
            child_id = parent.node;
        }
    }

    /// Repair `children[child_index]` of `parent_id`, which has fallen
    /// below the minimum key count
    ///
    /// Rotation from a sibling with spare keys leaves the parent intact;
    /// otherwise a merge shrinks the parent by one key, which the caller
    /// must then re-examine.
    fn fix_underflow(&mut self, parent_id: NodeId, child_index: usize) -> BTreeResult<()> {
        let min_keys = self.min_keys();

        let (left_id, right_id) = {
            let parent = self.node(parent_id)?;
            let left = if child_index > 0 {
                Some(parent.children[child_index - 1])
            } else {
                None
            };
            let right = parent.children.get(child_index + 1).copied();
            (left, right)
        };

        if let Some(left) = left_id {
            if self.node(left)?.len() > min_keys {
                return self.rotate_from_left(parent_id, child_index);
            }
        }
        if let Some(right) = right_id {
            if self.node(right)?.len() > min_keys {
                return self.rotate_from_right(parent_id, child_index);
            }
        }

        if left_id.is_some() {
            self.merge_children(parent_id, child_index - 1)
        } else {
            self.merge_children(parent_id, child_index)
        }
    }

    /// Pull the left separator down into the underflowed child and
    /// promote the left sibling's maximum in its place
    fn rotate_from_left(&mut self, parent_id: NodeId, child_index: usize) -> BTreeResult<()> {
        let (sibling_id, child_id) = {
            let parent = self.node(parent_id)?;
            (
                parent.children[child_index - 1],
                parent.children[child_index],
            )
        };

        let (loaned_key, loaned_child) = {
            let sibling = self.node_mut(sibling_id)?;
            (sibling.keys.pop().unwrap(), sibling.children.pop())
        };

        let separator = mem::replace(
            &mut self.node_mut(parent_id)?.keys[child_index - 1],
            loaned_key,
        );

        let child = self.node_mut(child_id)?;
        child.keys.insert(0, separator);
        if let Some(grandchild) = loaned_child {
            child.children.insert(0, grandchild);
        }
        Ok(())
    }

    /// Pull the right separator down into the underflowed child and
    /// promote the right sibling's minimum in its place
    fn rotate_from_right(&mut self, parent_id: NodeId, child_index: usize) -> BTreeResult<()> {
        let (sibling_id, child_id) = {
            let parent = self.node(parent_id)?;
            (
                parent.children[child_index + 1],
                parent.children[child_index],
            )
        };

        let (loaned_key, loaned_child) = {
            let sibling = self.node_mut(sibling_id)?;
            let key = sibling.keys.remove(0);
            let child = if sibling.children.is_empty() {
                None
            } else {
                Some(sibling.children.remove(0))
            };
            (key, child)
        };

        let separator = mem::replace(&mut self.node_mut(parent_id)?.keys[child_index], loaned_key);

        let child = self.node_mut(child_id)?;
        child.keys.push(separator);
        if let Some(grandchild) = loaned_child {
            child.children.push(grandchild);
        }
        Ok(())
    }

    /// Merge `children[separator_index + 1]` into `children[separator_index]`
    /// together with the separator between them, discarding the emptied node
    fn merge_children(&mut self, parent_id: NodeId, separator_index: usize) -> BTreeResult<()> {
        let (left_id, right_id, separator) = {
            let parent = self.node_mut(parent_id)?;
            let right_id = parent.children.remove(separator_index + 1);
            let separator = parent.keys.remove(separator_index);
            (parent.children[separator_index], right_id, separator)
        };

        let mut right = self.take_node(right_id)?;
        let left = self.node_mut(left_id)?;
        left.keys.push(separator);
        left.keys.append(&mut right.keys);
        left.children.append(&mut right.children);
        Ok(())
    }

    // ========== Range Query and Traversal ==========

    /// Return all stored keys `k` with `begin <= k <= end`, ascending
    ///
    /// Empty when `begin > end`.
    pub fn range_search(&self, begin: &K, end: &K) -> Vec<K> {
        let mut result = Vec::new();

        if begin > end {
            return result;
        }
        if let Some(root) = self.root {
            self.range_rec(root, begin, end, &mut result);
        }
        result
    }

    fn range_rec(&self, node_id: NodeId, begin: &K, end: &K, result: &mut Vec<K>) {
        let Some(node) = self.get_node(node_id) else {
            return;
        };

        let mut i = 0;
        while i < node.len() && node.keys[i] < *begin {
            i += 1;
        }

        // children[i] is the leftmost subtree that can still reach `begin`;
        // each later child is visited exactly once, as the right child of
        // the in-range key before it
        if !node.is_leaf() {
            self.range_rec(node.children[i], begin, end, result);
        }
        while i < node.len() && node.keys[i] <= *end {
            result.push(node.keys[i].clone());
            if !node.is_leaf() {
                self.range_rec(node.children[i + 1], begin, end, result);
            }
            i += 1;
        }
    }

    /// Iterate over all keys in ascending order
    pub fn iter(&self) -> Iter<'_, K> {
        let mut iter = Iter {
            tree: self,
            stack: Vec::new(),
        };
        if let Some(root) = self.root {
            iter.descend(root);
        }
        iter
    }

    /// Render all keys in order, joined by the given separator
    pub fn join(&self, sep: &str) -> String
    where
        K: fmt::Display,
    {
        let mut result = String::new();
        for key in self.iter() {
            if !result.is_empty() {
                result.push_str(sep);
            }
            let _ = write!(result, "{key}");
        }
        result
    }

    // ========== Bulk Build ==========

    /// Build a tree bottom-up from a strictly ascending, duplicate-free
    /// key sequence in O(n)
    ///
    /// The input ordering is the caller's responsibility and is not
    /// validated. Every level is cut into full nodes, except that the
    /// second-to-last group shrinks to the minimum when the tail would
    /// otherwise fall below it.
    pub fn from_sorted(keys: Vec<K>, order: usize) -> BTreeResult<Self> {
        let mut tree = Self::new(order)?;
        if keys.is_empty() {
            return Ok(tree);
        }

        let total = keys.len();
        tree.entry_count = total;
        let mut keys: Vec<Option<K>> = keys.into_iter().map(Some).collect();

        // One entry per child slot of the level being built: the node
        // (None at the leaf level) and the index of the key separating it
        // from its right neighbor. The last entry's separator is a
        // sentinel that is never promoted.
        let mut level: Vec<(Option<NodeId>, usize)> = (0..=total).map(|i| (None, i)).collect();
        let min_keys = tree.min_keys();

        loop {
            let size = level.len();

            if size - 1 < order {
                // remaining entries fit in one node, which becomes the root
                let mut root = Node::new();
                for (child, separator) in &level[..size - 1] {
                    root.keys.push(take_key(&mut keys, *separator)?);
                    if let Some(id) = child {
                        root.children.push(*id);
                    }
                }
                if let Some(id) = level[size - 1].0 {
                    root.children.push(id);
                }
                let root_id = tree.allocate_node(root);
                tree.root = Some(root_id);
                return Ok(tree);
            }

            let next_size = size.div_ceil(order);
            let mut next = Vec::with_capacity(next_size);
            let mut i = 0;

            for _ in 0..next_size {
                let remaining = size - 1 - i;
                let key_count = if remaining > order - 1 && remaining < order + min_keys {
                    min_keys
                } else if remaining > order - 1 {
                    order - 1
                } else {
                    remaining
                };

                let mut node = Node::new();
                for _ in 0..key_count {
                    let (child, separator) = level[i];
                    node.keys.push(take_key(&mut keys, separator)?);
                    if let Some(id) = child {
                        node.children.push(id);
                    }
                    i += 1;
                }
                if let Some(id) = level[i].0 {
                    node.children.push(id);
                }

                let node_id = tree.allocate_node(node);
                next.push((Some(node_id), level[i].1));
                i += 1;
            }

            level = next;
        }
    }

    // ========== Property Checker ==========

    /// Verify every structural invariant of the tree
    ///
    /// An empty tree is valid.
    pub fn check_properties(&self) -> bool {
        match self.root {
            None => true,
            Some(root) => self.check_subtree(root, true).is_some(),
        }
    }

    /// Validate a subtree, reporting `(height, min key, max key)` or
    /// `None` on the first violation
    fn check_subtree(&self, node_id: NodeId, is_root: bool) -> Option<(usize, &K, &K)> {
        let node = self.get_node(node_id)?;

        if node.is_empty() {
            return None;
        }
        if !is_root && node.len() < self.min_keys() {
            return None;
        }
        if node.len() > self.max_keys() {
            return None;
        }
        if node.keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            return None;
        }

        if node.is_leaf() {
            return Some((0, node.min_key()?, node.max_key()?));
        }
        if node.children.len() != node.len() + 1 {
            return None;
        }

        let mut height = 0;
        let mut min_key = None;
        let mut max_key = None;

        for (i, &child) in node.children.iter().enumerate() {
            let (child_height, child_min, child_max) = self.check_subtree(child, false)?;

            if i == 0 {
                height = child_height;
                min_key = Some(child_min);
            } else {
                if child_height != height {
                    return None;
                }
                if *child_min <= node.keys[i - 1] {
                    return None;
                }
            }
            if i < node.len() && *child_max >= node.keys[i] {
                return None;
            }
            max_key = Some(child_max);
        }

        Some((height + 1, min_key?, max_key?))
    }
}

/// Move a key out of its bulk-build slot, failing if it was already used
fn take_key<K>(keys: &mut [Option<K>], index: usize) -> BTreeResult<K> {
    keys.get_mut(index).and_then(|slot| slot.take()).ok_or_else(|| {
        BTreeError::InvalidState("separator reused during bulk build".to_string())
    })
}

/// In-order iterator over the keys of a B-tree
pub struct Iter<'a, K> {
    tree: &'a BTree<K>,
    stack: Vec<(NodeId, usize)>,
}

impl<'a, K: Ord + Clone> Iter<'a, K> {
    /// Push a node and its leftmost descendants
    fn descend(&mut self, mut node_id: NodeId) {
        loop {
            self.stack.push((node_id, 0));
            match self.tree.get_node(node_id) {
                Some(node) if !node.is_leaf() => node_id = node.children[0],
                _ => break,
            }
        }
    }
}

impl<'a, K: Ord + Clone> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;

        loop {
            let (node_id, index) = *self.stack.last()?;
            let node = tree.get_node(node_id)?;

            if index < node.len() {
                self.stack.last_mut()?.1 = index + 1;
                if !node.is_leaf() {
                    self.descend(node.children[index + 1]);
                }
                return Some(&node.keys[index]);
            }

            self.stack.pop();
        }
    }
}
