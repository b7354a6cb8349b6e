/// Node identifier (index into node storage)
pub type NodeId = usize;

/// B-tree node: sorted keys plus child node IDs
///
/// A leaf has no children. An internal node with `k` keys has exactly
/// `k + 1` children, where `children[i]` roots the subtree of keys
/// between `keys[i - 1]` and `keys[i]`.
#[derive(Debug, Clone)]
pub struct Node<K> {
    /// Keys (sorted, strictly increasing)
    pub keys: Vec<K>,
    /// Child node IDs (empty for a leaf)
    pub children: Vec<NodeId>,
}

impl<K> Node<K> {
    /// Create a new empty leaf node
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create a leaf node with the given keys
    pub fn leaf(keys: Vec<K>) -> Self {
        Self {
            keys,
            children: Vec::new(),
        }
    }

    /// Create an internal node with the given keys and children
    pub fn internal(keys: Vec<K>, children: Vec<NodeId>) -> Self {
        debug_assert_eq!(keys.len() + 1, children.len());
        Self { keys, children }
    }

    /// Assemble a node from split halves; leaf status follows from the
    /// children being empty or not
    pub fn from_parts(keys: Vec<K>, children: Vec<NodeId>) -> Self {
        Self { keys, children }
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the node holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Check if this is a leaf node
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Get the minimum key in this node
    pub fn min_key(&self) -> Option<&K> {
        self.keys.first()
    }

    /// Get the maximum key in this node
    pub fn max_key(&self) -> Option<&K> {
        self.keys.last()
    }
}

impl<K: Ord> Node<K> {
    /// Scan for a key, returning the slot where it sits or where the
    /// descent continues
    ///
    /// Returns `(index, true)` when `keys[index]` equals the key, and
    /// `(index, false)` when the key would belong in `children[index]`.
    pub fn search_index(&self, key: &K) -> (usize, bool) {
        for (i, k) in self.keys.iter().enumerate() {
            if key < k {
                return (i, false);
            }
            if key == k {
                return (i, true);
            }
        }
        (self.keys.len(), false)
    }
}

impl<K> Default for Node<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_index_hits_and_slots() {
        let node = Node::leaf(vec![3, 7, 12]);

        assert_eq!(node.search_index(&1), (0, false));
        assert_eq!(node.search_index(&3), (0, true));
        assert_eq!(node.search_index(&5), (1, false));
        assert_eq!(node.search_index(&7), (1, true));
        assert_eq!(node.search_index(&12), (2, true));
        assert_eq!(node.search_index(&15), (3, false));
    }

    #[test]
    fn test_leaf_flag_follows_children() {
        let leaf: Node<i64> = Node::leaf(vec![1, 2]);
        assert!(leaf.is_leaf());

        let internal = Node::internal(vec![5], vec![0, 1]);
        assert!(!internal.is_leaf());
        assert_eq!(internal.len(), 1);
    }

    #[test]
    fn test_min_max_key() {
        let node = Node::leaf(vec![2, 4, 9]);
        assert_eq!(node.min_key(), Some(&2));
        assert_eq!(node.max_key(), Some(&9));

        let empty: Node<i64> = Node::new();
        assert_eq!(empty.min_key(), None);
        assert!(empty.is_empty());
    }
}
