//! Nested value trees.
//!
//! A device value may be a structured nest of leaves (a tree of arrays), and
//! its metadata and per-party share handles must always mirror that nesting
//! exactly. [`Tree`] makes the nesting explicit, with [`Tree::flatten`] and
//! [`Tree::unflatten`] as the two order-preserving traversals that move
//! between the nested and the flat representation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A nested tree of values: either a single leaf or an ordered list of
/// subtrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tree<T> {
    /// A single value.
    Leaf(T),
    /// An ordered list of subtrees.
    Node(Vec<Tree<T>>),
}

/// The shape of a [`Tree`], with all leaf values erased.
pub type TreeShape = Tree<()>;

/// The error raised when a flat leaf list does not fit a tree shape.
#[derive(Debug, Error)]
#[error("cannot unflatten {actual} leaves into a tree with {expected} leaf positions")]
pub struct UnflattenError {
    /// The number of leaf positions in the shape.
    pub expected: usize,
    /// The number of leaves provided.
    pub actual: usize,
}

impl<T> Tree<T> {
    /// Returns the number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Tree::Leaf(_) => 1,
            Tree::Node(children) => children.iter().map(Tree::leaf_count).sum(),
        }
    }

    /// Returns the shape of the tree, with all leaf values erased.
    pub fn shape(&self) -> TreeShape {
        match self {
            Tree::Leaf(_) => Tree::Leaf(()),
            Tree::Node(children) => Tree::Node(children.iter().map(Tree::shape).collect()),
        }
    }

    /// Flattens the tree into its leaves, in depth-first (left-to-right)
    /// order.
    pub fn flatten(self) -> Vec<T> {
        let mut leaves = Vec::with_capacity(self.leaf_count());
        self.flatten_into(&mut leaves);
        leaves
    }

    fn flatten_into(self, leaves: &mut Vec<T>) {
        match self {
            Tree::Leaf(value) => leaves.push(value),
            Tree::Node(children) => {
                for child in children {
                    child.flatten_into(leaves);
                }
            }
        }
    }

    /// Flattens the tree into references to its leaves, in the same order as
    /// [`Tree::flatten`].
    pub fn leaves(&self) -> Vec<&T> {
        let mut leaves = Vec::with_capacity(self.leaf_count());
        self.leaves_into(&mut leaves);
        leaves
    }

    fn leaves_into<'a>(&'a self, leaves: &mut Vec<&'a T>) {
        match self {
            Tree::Leaf(value) => leaves.push(value),
            Tree::Node(children) => {
                for child in children {
                    child.leaves_into(leaves);
                }
            }
        }
    }

    /// Rebuilds a tree of the given shape from a flat leaf list, the inverse
    /// of [`Tree::flatten`].
    pub fn unflatten(shape: &TreeShape, leaves: Vec<T>) -> Result<Tree<T>, UnflattenError> {
        let expected = shape.leaf_count();
        if leaves.len() != expected {
            return Err(UnflattenError {
                expected,
                actual: leaves.len(),
            });
        }
        let mut leaves = leaves.into_iter();
        Ok(Self::unflatten_next(shape, &mut leaves))
    }

    fn unflatten_next(shape: &TreeShape, leaves: &mut impl Iterator<Item = T>) -> Tree<T> {
        match shape {
            // the leaf count was checked up front, so the iterator cannot run dry
            Tree::Leaf(()) => Tree::Leaf(leaves.next().unwrap()),
            Tree::Node(children) => Tree::Node(
                children
                    .iter()
                    .map(|child| Self::unflatten_next(child, leaves))
                    .collect(),
            ),
        }
    }

    /// Applies `f` to every leaf, preserving the tree structure.
    pub fn map<U>(&self, f: &mut impl FnMut(&T) -> U) -> Tree<U> {
        match self {
            Tree::Leaf(value) => Tree::Leaf(f(value)),
            Tree::Node(children) => {
                Tree::Node(children.iter().map(|child| child.map(f)).collect())
            }
        }
    }
}
