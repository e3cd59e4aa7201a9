use std::fmt;
use thiserror::Error;

use crate::value::Value;

/// Stable handle of a node inside its [`Tree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {child} cannot be placed under {parent}: it is the parent or one of its ancestors")]
    Cycle { parent: NodeId, child: NodeId },
    #[error("node {child} already belongs to {owner}")]
    AlreadyOwned { child: NodeId, owner: NodeId },
    #[error("child index {index} is out of range for {len} children")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone)]
pub struct Node {
    tag: Value,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    offset: Option<usize>,
}

impl Node {
    pub fn tag(&self) -> &Value {
        &self.tag
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<NodeId> {
        self.children.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Byte offset of the token this node was parsed from, if it came from source.
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }
}

/// Arena holding one S-expression tree. Nodes are exclusively owned by at most one parent.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    pub fn new(tag: Value) -> Self {
        Self::with_root_at(tag, None)
    }

    pub(crate) fn with_root_at(tag: Value, offset: Option<usize>) -> Self {
        Self {
            nodes: vec![Node {
                tag,
                children: Vec::new(),
                parent: None,
                offset,
            }],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn tag(&self, id: NodeId) -> &Value {
        &self.nodes[id.0].tag
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Number of nodes in the arena, detached ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates a detached node; attach it with [`Tree::add_child`].
    pub fn create(&mut self, tag: Value) -> NodeId {
        self.create_at(tag, None)
    }

    pub(crate) fn create_at(&mut self, tag: Value, offset: Option<usize>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag,
            children: Vec::new(),
            parent: None,
            offset,
        });
        id
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        let index = self.nodes[parent.0].children.len();
        self.insert_child(parent, index, child)
    }

    pub fn insert_child(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), TreeError> {
        if self.is_ancestor_or_self(child, parent) {
            return Err(TreeError::Cycle { parent, child });
        }
        if let Some(owner) = self.nodes[child.0].parent {
            return Err(TreeError::AlreadyOwned { child, owner });
        }
        let len = self.nodes[parent.0].children.len();
        if index > len {
            return Err(TreeError::IndexOutOfRange { index, len });
        }
        self.nodes[parent.0].children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    /// Detaches and returns the child at `index`; it may be re-attached elsewhere.
    pub fn remove_child(&mut self, parent: NodeId, index: usize) -> Result<NodeId, TreeError> {
        let len = self.nodes[parent.0].children.len();
        if index >= len {
            return Err(TreeError::IndexOutOfRange { index, len });
        }
        let child = self.nodes[parent.0].children.remove(index);
        self.nodes[child.0].parent = None;
        Ok(child)
    }

    // Only used by the parser for nodes it just created.
    pub(crate) fn attach_fresh(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
    }

    fn is_ancestor_or_self(&self, candidate: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == candidate {
                return true;
            }
            match self.nodes[node.0].parent {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    /// Line and column of a node, derived from its recorded offset.
    pub fn position(&self, id: NodeId, source: &str) -> Option<SourcePosition> {
        self.nodes[id.0]
            .offset
            .map(|offset| SourcePosition::locate(source, offset))
    }
}

/// 1-based line and column of a byte offset inside a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    /// `\r\n` counts as a single line break; lone `\r` and lone `\n` count as one each.
    pub fn locate(source: &str, offset: usize) -> Self {
        let mut line = 1;
        let mut column = 1;
        let mut after_cr = false;
        for (index, ch) in source.char_indices() {
            if index >= offset {
                break;
            }
            match ch {
                '\r' => {
                    line += 1;
                    column = 1;
                    after_cr = true;
                }
                '\n' => {
                    if !after_cr {
                        line += 1;
                    }
                    column = 1;
                    after_cr = false;
                }
                _ => {
                    column += 1;
                    after_cr = false;
                }
            }
        }
        Self { line, column }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}
