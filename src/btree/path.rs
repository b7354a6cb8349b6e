use super::error::{BTreeError, BTreeResult};
use super::node::NodeId;

/// One step of a root-to-leaf descent: the node visited and the key or
/// child index chosen inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathEntry {
    pub node: NodeId,
    pub index: usize,
}

/// LIFO record of the descent from the root to a located key or
/// insertion point
///
/// Holds at most `height + 1` entries and owns none of the nodes it
/// references; insertion and deletion replay it bottom-up instead of
/// recursing.
#[derive(Debug, Default)]
pub struct PathStack {
    entries: Vec<PathEntry>,
}

impl PathStack {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, node: NodeId, index: usize) {
        self.entries.push(PathEntry { node, index });
    }

    pub fn pop(&mut self) -> BTreeResult<PathEntry> {
        self.entries.pop().ok_or(BTreeError::EmptyStack)
    }

    pub fn top(&self) -> BTreeResult<&PathEntry> {
        self.entries.last().ok_or(BTreeError::EmptyStack)
    }

    pub fn top_mut(&mut self) -> BTreeResult<&mut PathEntry> {
        self.entries.last_mut().ok_or(BTreeError::EmptyStack)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
