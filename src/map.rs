//! An ordered map implemented with a balance factor AVL tree.

use std::cmp::Ordering;
use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;

/// An ordered map implemented with an AVL tree.
///
/// Every node carries its balance factor, the height of its right subtree
/// minus the height of its left subtree, which the mutation paths keep in
/// `{-1, 0, 1}` with local rotations only.
///
/// ```
/// use avlmap::AvlTreeMap;
/// let mut map = AvlTreeMap::new();
/// map.insert(0, "zero");
/// map.insert(1, "one");
/// map.insert(2, "two");
/// assert_eq!(map.get(&1), Some(&"one"));
/// map.remove(&1);
/// assert!(map.get(&1).is_none());
/// ```
pub struct AvlTreeMap<K: Ord, V> {
    root: Link<K, V>,
    num_nodes: usize,
}

struct Node<K, V> {
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
    balance: i8,
}

type NodePtr<K, V> = NonNull<Node<K, V>>;
type Link<K, V> = Option<NodePtr<K, V>>;
type LinkPtr<K, V> = NonNull<Link<K, V>>;

/// Maximum height of a supported tree.
/// An AVL tree of height 64 holds far more than 2^44 elements.
const MAX_HEIGHT: usize = 64;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// The ways a tree can fail its consistency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
    /// A balance factor lies outside {-1, 0, 1}.
    BalanceOutOfRange,
    /// A balance factor does not match the measured subtree heights.
    BalanceMismatch,
    /// A node's key does not separate the keys of its children.
    OrderViolation,
}

/// Search path from the root to a node, recorded as rewritable links
/// together with the branch direction taken at each one.
struct Path<K, V> {
    entries: [MaybeUninit<(LinkPtr<K, V>, Side)>; MAX_HEIGHT],
    len: usize,
}

impl<K, V> Path<K, V> {
    fn new() -> Self {
        Self {
            entries: [MaybeUninit::uninit(); MAX_HEIGHT],
            len: 0,
        }
    }

    fn push(&mut self, link_ptr: LinkPtr<K, V>, side: Side) {
        assert!(self.len < MAX_HEIGHT);
        self.entries[self.len].write((link_ptr, side));
        self.len += 1;
    }

    fn pop(&mut self) -> Option<(LinkPtr<K, V>, Side)> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(unsafe { self.entries[self.len].assume_init() })
    }
}

impl Side {
    fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl<K: Ord, V> AvlTreeMap<K, V> {
    /// Creates an empty map.
    /// No memory is allocated until the first item is inserted.
    pub fn new() -> Self {
        Self {
            root: None,
            num_nodes: 0,
        }
    }

    /// Returns true if the map contains no elements.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the number of elements in the map.
    pub fn len(&self) -> usize {
        self.num_nodes
    }

    /// Clears the map, deallocating all memory.
    pub fn clear(&mut self) {
        // Iterative pre-order release, the stack never outgrows the tree height.
        let mut stack = Vec::new();
        if let Some(root_ptr) = self.root.take() {
            stack.push(root_ptr);
        }
        while let Some(node_ptr) = stack.pop() {
            let node = unsafe { Box::from_raw(node_ptr.as_ptr()) };
            if let Some(left_ptr) = node.left {
                stack.push(left_ptr);
            }
            if let Some(right_ptr) = node.right {
                stack.push(right_ptr);
            }
        }
        self.num_nodes = 0;
    }

    /// Returns a reference to the value corresponding to the key.
    pub fn get(&self, key: &K) -> Option<&V> {
        if let Some(node_ptr) = self.find(key) {
            return Some(&unsafe { &*node_ptr.as_ptr() }.value);
        }
        None
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        if let Some(node_ptr) = self.find(key) {
            return Some(&mut unsafe { &mut *node_ptr.as_ptr() }.value);
        }
        None
    }

    /// Returns references to the key-value pair corresponding to the key.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        if let Some(node_ptr) = self.find(key) {
            return Some((
                &unsafe { &*node_ptr.as_ptr() }.key,
                &unsafe { &*node_ptr.as_ptr() }.value,
            ));
        }
        None
    }

    /// Returns true if the map contains the key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Inserts a key-value pair into the map.
    /// If the key was already present its value is overwritten in place and
    /// the previous value is returned; the tree structure does not change.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let mut path = Path::new();
        let mut link_ptr = self.find_path(&key, &mut path);
        unsafe {
            if let Some(mut node_ptr) = *link_ptr.as_ref() {
                return Some(mem::replace(&mut node_ptr.as_mut().value, value));
            }
            *link_ptr.as_mut() = Some(Node::create(key, value));
            self.num_nodes += 1;
            Self::retrace_grown(&mut path);
        }
        None
    }

    /// Removes a key from the map.
    /// Returns the value at the key if the key was previously in the map.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let mut path = Path::new();
        let link_ptr = self.find_path(key, &mut path);
        unsafe {
            let node_ptr = (*link_ptr.as_ref())?;
            debug_assert!(self.num_nodes >= 1);
            let value = Self::unlink_node(link_ptr, node_ptr, &mut path);
            self.num_nodes -= 1;
            debug_assert!(self.get(key).is_none());
            Some(value)
        }
    }

    /// Verifies the AVL invariants over the whole tree.
    /// Returns the tree height on success; an empty tree has height zero.
    pub fn check(&self) -> Result<usize, CheckError> {
        Self::check_subtree(self.root)
    }

    /// Panics if the tree violates one of its invariants.
    #[cfg(any(test, feature = "consistency_check"))]
    pub fn check_consistency(&self) {
        if let Err(error) = self.check() {
            panic!("inconsistent tree: {:?}", error);
        }
        assert_eq!(self.iter().count(), self.num_nodes);
    }

    /// Gets an iterator over the entries of the map, sorted by key.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut stack = Vec::new();
        let mut current = self.root;
        while let Some(node_ptr) = current {
            stack.push(node_ptr);
            current = unsafe { node_ptr.as_ref().left };
        }
        Iter {
            stack,
            num_remaining: self.num_nodes,
            _marker: PhantomData,
        }
    }

    /// Writes the tree to the given writer as a Graphviz digraph.
    /// Every edge is labeled with the child node's balance factor.
    pub fn write_dot<W: io::Write>(&self, writer: &mut W) -> io::Result<()>
    where
        K: fmt::Display,
    {
        writeln!(writer, "digraph avl {{")?;
        writeln!(writer, "\tnode [shape = record];")?;
        writeln!(writer, "\tn0 [label = \"map\"];")?;
        let mut next_id = 1;
        Self::write_dot_subtree(self.root, 0, &mut next_id, writer)?;
        writeln!(writer, "}}")
    }

    fn write_dot_subtree<W: io::Write>(
        link: Link<K, V>,
        parent_id: u64,
        next_id: &mut u64,
        writer: &mut W,
    ) -> io::Result<()>
    where
        K: fmt::Display,
    {
        let id = *next_id;
        *next_id += 1;
        match link {
            Some(node_ptr) => unsafe {
                let node = node_ptr.as_ref();
                writeln!(
                    writer,
                    "\tn{} -> n{} [label = \"{}\"];",
                    parent_id, id, node.balance
                )?;
                writeln!(writer, "\tn{} [label = \"{}\"];", id, node.key)?;
                Self::write_dot_subtree(node.left, id, next_id, writer)?;
                Self::write_dot_subtree(node.right, id, next_id, writer)
            },
            None => {
                writeln!(writer, "\tn{} -> l{} [style = invis];", parent_id, id)?;
                writeln!(writer, "\tl{} [style = invis];", id)
            }
        }
    }

    fn find(&self, key: &K) -> Link<K, V> {
        let mut current = self.root;
        while let Some(node_ptr) = current {
            current = unsafe {
                match key.cmp(&node_ptr.as_ref().key) {
                    Ordering::Equal => break,
                    Ordering::Less => node_ptr.as_ref().left,
                    Ordering::Greater => node_ptr.as_ref().right,
                }
            }
        }
        current
    }

    /// Descends from the root towards the given key, recording every link and
    /// the branch direction taken at it. Returns the link that holds the
    /// matching node, or the empty link where the key would be inserted.
    fn find_path(&mut self, key: &K, path: &mut Path<K, V>) -> LinkPtr<K, V> {
        let mut link_ptr = unsafe { LinkPtr::new_unchecked(&mut self.root) };
        unsafe {
            while let Some(mut node_ptr) = *link_ptr.as_ref() {
                let side = match key.cmp(&node_ptr.as_ref().key) {
                    Ordering::Equal => break,
                    Ordering::Less => Side::Left,
                    Ordering::Greater => Side::Right,
                };
                path.push(link_ptr, side);
                link_ptr = LinkPtr::new_unchecked(node_ptr.as_mut().child_mut(side));
            }
        }
        link_ptr
    }

    /// Rotates the subtree at the given link, promoting the child on the
    /// given side. The two new balance factors are computed from the two old
    /// ones alone; no subtree is re-measured.
    unsafe fn rotate(mut link_ptr: LinkPtr<K, V>, side: Side) {
        let mut node_ptr = (*link_ptr.as_ref()).unwrap();
        let mut child_ptr = node_ptr.as_ref().child(side).unwrap();

        let x = node_ptr.as_ref().balance;
        let y = child_ptr.as_ref().balance;
        let (x, y) = match side {
            // Counter-clockwise: the right child comes up.
            Side::Right => {
                let x = x - 1 - y.max(0);
                (x, y - 1 + x.min(0))
            }
            // Clockwise: the left child comes up.
            Side::Left => {
                let x = x + 1 - y.min(0);
                (x, y + 1 + x.max(0))
            }
        };

        *node_ptr.as_mut().child_mut(side) = child_ptr.as_ref().child(side.opposite());
        *child_ptr.as_mut().child_mut(side.opposite()) = Some(node_ptr);
        node_ptr.as_mut().balance = x;
        child_ptr.as_mut().balance = y;
        *link_ptr.as_mut() = Some(child_ptr);
    }

    /// Restores the AVL condition at a link whose balance factor has just
    /// left {-1, 0, 1}. When the heavy child leans the opposite way it is
    /// rotated first, making this a double rotation.
    unsafe fn rebalance(link_ptr: LinkPtr<K, V>) {
        let mut node_ptr = (*link_ptr.as_ref()).unwrap();
        let x = node_ptr.as_ref().balance;
        let side = if x > 0 { Side::Right } else { Side::Left };
        let child_link = LinkPtr::new_unchecked(node_ptr.as_mut().child_mut(side));
        let y = (*child_link.as_ref()).unwrap().as_ref().balance;
        if x * y < 0 {
            Self::rotate(child_link, side.opposite());
        }
        Self::rotate(link_ptr, side);
    }

    /// Replays the recorded search path bottom-up after an insert, adjusting
    /// each ancestor's balance factor and rotating where one overflows.
    /// Stops as soon as the subtree height is known to be unchanged.
    unsafe fn retrace_grown(path: &mut Path<K, V>) {
        while let Some((link_ptr, side)) = path.pop() {
            let mut node_ptr = (*link_ptr.as_ref()).unwrap();
            let balance = node_ptr.as_ref().balance + if side == Side::Right { 1 } else { -1 };
            node_ptr.as_mut().balance = balance;
            if balance == 0 {
                // The shorter subtree caught up, the height did not change.
                break;
            }
            if balance < -1 || balance > 1 {
                // A rotation after an insert always absorbs the growth.
                Self::rebalance(link_ptr);
                break;
            }
        }
    }

    /// Replays the recorded search path bottom-up after a removal.
    /// Propagation continues only while the subtree height actually shrank.
    unsafe fn retrace_shrunk(path: &mut Path<K, V>) {
        while let Some((link_ptr, side)) = path.pop() {
            let mut node_ptr = (*link_ptr.as_ref()).unwrap();
            let balance = node_ptr.as_ref().balance + if side == Side::Right { -1 } else { 1 };
            node_ptr.as_mut().balance = balance;
            if balance < -1 || balance > 1 {
                Self::rebalance(link_ptr);
                // The one rotation case that leaves the new subtree root
                // unbalanced also leaves the subtree height unchanged.
                if (*link_ptr.as_ref()).unwrap().as_ref().balance != 0 {
                    break;
                }
            } else if balance != 0 {
                // The taller subtree is still taller, the height did not change.
                break;
            }
        }
    }

    /// Removes the node at the given link and returns its value.
    /// A node with two children first swaps its entry with an adjacent node
    /// from its heavier subtree, so the physically unlinked node has at most
    /// one child.
    unsafe fn unlink_node(
        mut link_ptr: LinkPtr<K, V>,
        mut node_ptr: NodePtr<K, V>,
        path: &mut Path<K, V>,
    ) -> V {
        if node_ptr.as_ref().left.is_some() && node_ptr.as_ref().right.is_some() {
            let side = if node_ptr.as_ref().balance > 0 {
                Side::Right
            } else {
                Side::Left
            };
            path.push(link_ptr, side);

            // Find the in-order neighbor on the heavy side.
            let mut donor_link = LinkPtr::new_unchecked(node_ptr.as_mut().child_mut(side));
            loop {
                let mut donor_ptr = (*donor_link.as_ref()).unwrap();
                if donor_ptr.as_ref().child(side.opposite()).is_none() {
                    break;
                }
                path.push(donor_link, side.opposite());
                donor_link = LinkPtr::new_unchecked(donor_ptr.as_mut().child_mut(side.opposite()));
            }

            // Unlink the donor and move its entry into the doomed node,
            // which keeps its structural position and balance factor.
            let donor_ptr = (*donor_link.as_ref()).unwrap();
            *donor_link.as_mut() = donor_ptr.as_ref().child(side);
            let donor = Box::from_raw(donor_ptr.as_ptr());
            let node = node_ptr.as_mut();
            node.key = donor.key;
            let value = mem::replace(&mut node.value, donor.value);
            Self::retrace_shrunk(path);
            value
        } else {
            // Stem or leaf, replace it by its sole child if any.
            let node = node_ptr.as_ref();
            let child = if node.left.is_some() {
                node.left
            } else {
                node.right
            };
            *link_ptr.as_mut() = child;
            let node = Box::from_raw(node_ptr.as_ptr());
            Self::retrace_shrunk(path);
            node.value
        }
    }

    fn check_subtree(link: Link<K, V>) -> Result<usize, CheckError> {
        let node_ptr = match link {
            None => return Ok(0),
            Some(node_ptr) => node_ptr,
        };
        unsafe {
            let node = node_ptr.as_ref();
            if node.balance < -1 || node.balance > 1 {
                return Err(CheckError::BalanceOutOfRange);
            }
            if let Some(left_ptr) = node.left {
                if left_ptr.as_ref().key >= node.key {
                    return Err(CheckError::OrderViolation);
                }
            }
            if let Some(right_ptr) = node.right {
                if right_ptr.as_ref().key <= node.key {
                    return Err(CheckError::OrderViolation);
                }
            }
            let left_height = Self::check_subtree(node.left)?;
            let right_height = Self::check_subtree(node.right)?;
            if right_height as isize - left_height as isize != node.balance as isize {
                return Err(CheckError::BalanceMismatch);
            }
            Ok(left_height.max(right_height) + 1)
        }
    }
}

impl<K: Ord, V> Drop for AvlTreeMap<K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K: Ord, V> Default for AvlTreeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V: Clone> Clone for AvlTreeMap<K, V> {
    fn clone(&self) -> Self {
        let mut map = Self::new();
        for (key, value) in self.iter() {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for AvlTreeMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord, V> Extend<(K, V)> for AvlTreeMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for AvlTreeMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<'a, K: Ord, V> IntoIterator for &'a AvlTreeMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the entries of a map, sorted by key.
pub struct Iter<'a, K, V> {
    stack: Vec<NodePtr<K, V>>,
    num_remaining: usize,
    _marker: PhantomData<&'a Node<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node_ptr = self.stack.pop()?;
        let node = unsafe { &*node_ptr.as_ptr() };
        let mut current = node.right;
        while let Some(right_ptr) = current {
            self.stack.push(right_ptr);
            current = unsafe { right_ptr.as_ref().left };
        }
        self.num_remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.num_remaining, Some(self.num_remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> Node<K, V> {
    fn create(key: K, value: V) -> NodePtr<K, V> {
        let boxed = Box::new(Node {
            key,
            value,
            left: None,
            right: None,
            balance: 0,
        });
        unsafe { NodePtr::new_unchecked(Box::into_raw(boxed)) }
    }

    fn child(&self, side: Side) -> Link<K, V> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn child_mut(&mut self, side: Side) -> &mut Link<K, V> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}
