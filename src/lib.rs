//! An ordered map and set implemented with an AVL tree.
//!
//! Every node carries a balance factor, the height of its right subtree
//! minus the height of its left subtree. Mutations record their search path
//! on an explicit, height-bounded stack and retrace it bottom-up, rotating
//! wherever a balance factor overflows and stopping as soon as the subtree
//! height is settled. Lookup, insert and remove all run in O(log n).

pub mod map;
pub mod set;

pub use map::{AvlTreeMap, CheckError};
pub use set::AvlTreeSet;

#[cfg(test)]
mod proptests;
