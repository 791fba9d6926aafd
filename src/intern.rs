//! The classifying node comparator.
//!
//! Structural equality over foreign node objects is potentially quadratic;
//! the writer avoids that with three side tables keyed by object identity:
//! a memoized structural hash per object, a union-find of proven-equal
//! objects (path compression, union by rank), and the node-table index
//! assigned to each equivalence class. Two equal nodes are proven equal by
//! structural descent at most once; afterwards their classes are merged and
//! every later comparison is a root lookup.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::format::NodeId;
use crate::node::{Node, Value};

fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Folds a child hash into a parent's: `h' = ((h << 1) + h) ^ child`.
fn mix(h: u64, child: u64) -> u64 {
    (h.wrapping_shl(1).wrapping_add(h)) ^ child
}

#[derive(Debug, Default)]
pub(crate) struct Classifier {
    /// Object identity -> dense slot.
    slots: HashMap<usize, u32>,
    /// Slot -> node handle. Holding the handle pins the identity for the
    /// session, so a freed-and-reused address can never alias a slot.
    nodes: Vec<Node>,
    hashes: Vec<Option<u64>>,
    parent: Vec<u32>,
    rank: Vec<u8>,
    /// Node-table index of each class, stored on the class root.
    assigned: Vec<Option<NodeId>>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, node: &Node) -> u32 {
        if let Some(&slot) = self.slots.get(&node.identity()) {
            return slot;
        }
        let slot = self.nodes.len() as u32;
        self.slots.insert(node.identity(), slot);
        self.nodes.push(node.clone());
        self.hashes.push(None);
        self.parent.push(slot);
        self.rank.push(0);
        self.assigned.push(None);
        slot
    }

    fn find(&mut self, slot: u32) -> u32 {
        let mut root = slot;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut at = slot;
        while self.parent[at as usize] != root {
            let next = self.parent[at as usize];
            self.parent[at as usize] = root;
            at = next;
        }
        root
    }

    fn union(&mut self, a: u32, b: u32) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        let (winner, loser) = if self.rank[root_a as usize] >= self.rank[root_b as usize] {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };
        self.parent[loser as usize] = winner;
        if self.rank[winner as usize] == self.rank[loser as usize] {
            self.rank[winner as usize] += 1;
        }
        if self.assigned[winner as usize].is_none() {
            self.assigned[winner as usize] = self.assigned[loser as usize];
        }
    }

    /// The memoized structural hash of `node`, computing and caching any
    /// missing descendant hashes with an explicit stack.
    pub fn hash(&mut self, node: &Node) -> u64 {
        let slot = self.slot(node);
        if let Some(h) = self.hashes[slot as usize] {
            return h;
        }
        let mut stack: Vec<(Node, bool)> = vec![(node.clone(), false)];
        while let Some((n, children_done)) = stack.pop() {
            let s = self.slot(&n) as usize;
            if self.hashes[s].is_some() {
                continue;
            }
            if !children_done {
                stack.push((n.clone(), true));
                if let Some((target, args)) = n.as_call() {
                    stack.push((target.clone(), false));
                    for arg in args {
                        stack.push((arg.clone(), false));
                    }
                }
                for attr in n.attrs() {
                    stack.push((attr.clone(), false));
                }
            } else {
                let mut h = if let Some(name) = n.name() {
                    hash_of(&**name)
                } else if let Some(value) = n.value() {
                    match value {
                        Value::Null => 0,
                        other => hash_of(other),
                    }
                } else {
                    let (target, args) = n.as_call().unwrap();
                    let mut h = self.memoized(target);
                    for arg in args {
                        h = mix(h, self.memoized(arg));
                    }
                    h
                };
                for attr in n.attrs() {
                    h = mix(h, self.memoized(attr));
                }
                self.hashes[s] = Some(h);
            }
        }
        self.hashes[slot as usize].unwrap()
    }

    fn memoized(&mut self, node: &Node) -> u64 {
        let slot = self.slot(node);
        self.hashes[slot as usize].unwrap()
    }

    /// Classified equality. Identity and same-class hits return without
    /// descending; differing hashes refute without descending; a structural
    /// proof merges the two classes so it never reruns for this pair's
    /// classes.
    pub fn eq(&mut self, a: &Node, b: &Node) -> bool {
        if a.identity() == b.identity() {
            return true;
        }
        let slot_a = self.slot(a);
        let slot_b = self.slot(b);
        if self.find(slot_a) == self.find(slot_b) {
            return true;
        }
        if self.hash(a) != self.hash(b) {
            return false;
        }
        if !self.structural_eq(a, b) {
            return false;
        }
        self.union(slot_a, slot_b);
        true
    }

    fn structural_eq(&mut self, a: &Node, b: &Node) -> bool {
        if a.attrs().len() != b.attrs().len() {
            return false;
        }
        for (x, y) in a.attrs().iter().zip(b.attrs()) {
            if !self.eq(x, y) {
                return false;
            }
        }
        if let (Some(name_a), Some(name_b)) = (a.name(), b.name()) {
            name_a == name_b
        } else if let (Some(value_a), Some(value_b)) = (a.value(), b.value()) {
            value_a == value_b
        } else if let (Some((target_a, args_a)), Some((target_b, args_b))) =
            (a.as_call(), b.as_call())
        {
            args_a.len() == args_b.len()
                && self.eq(target_a, target_b)
                && args_a.iter().zip(args_b).all(|(x, y)| self.eq(x, y))
        } else {
            false
        }
    }

    /// The node-table index of `node`'s equivalence class, if one has been
    /// allocated.
    pub fn assigned_index(&mut self, node: &Node) -> Option<NodeId> {
        let slot = self.slot(node);
        let root = self.find(slot);
        self.assigned[root as usize]
    }

    pub fn assign(&mut self, node: &Node, id: NodeId) {
        let slot = self.slot(node);
        let root = self.find(slot);
        self.assigned[root as usize] = Some(id);
    }
}
