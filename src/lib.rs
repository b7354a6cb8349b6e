pub mod btree;

pub use btree::{BTree, BTreeError, BTreeResult, Node, NodeId, PathEntry, PathStack};
