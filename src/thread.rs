//! Comment reply trees
//!
//! A display index over the comments of one post. The comments themselves
//! live in an [`EntityStore`](crate::store::EntityStore); the thread only
//! keeps structure as a flat arena: id → node, each node holding its
//! children's ids. Depth is computed once on insert and every traversal is
//! an explicit stack walk, so deep threads cannot overflow the call stack.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

/// Thread index shared by a comment view and its reconciler. Code holding
/// both this and the comment store locks takes the thread lock first.
pub type SharedThread = Arc<RwLock<CommentThread>>;

#[derive(Debug, Clone)]
struct ThreadNode {
    parent_id: Option<String>,
    depth: usize,
    children: Vec<String>,
}

/// One row of a rendered thread
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadItem<'a> {
    Comment { id: &'a str, depth: usize },
    /// Replies below `parent_id` cut off at the depth limit
    ContinueThread { parent_id: &'a str, depth: usize, hidden: usize },
}

/// Reply structure of one post
#[derive(Debug, Clone, Default)]
pub struct CommentThread {
    nodes: HashMap<String, ThreadNode>,
    roots: Vec<String>,
    /// Replies that arrived before their parent: parent id → reply ids
    orphans: HashMap<String, Vec<String>>,
}

impl CommentThread {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn depth(&self, id: &str) -> Option<usize> {
        self.nodes.get(id).map(|n| n.depth)
    }

    pub fn children(&self, id: &str) -> &[String] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Comments waiting for a parent that is not loaded yet
    pub fn orphan_count(&self) -> usize {
        self.orphans.values().map(Vec::len).sum()
    }

    /// Place a comment. A reply whose parent is unknown is held back and
    /// attached as soon as the parent arrives. Returns `true` when the
    /// comment is new and visible.
    pub fn insert(&mut self, id: &str, parent_id: Option<&str>) -> bool {
        if self.nodes.contains_key(id) {
            return false;
        }

        let depth = match parent_id {
            None => 0,
            Some(parent_id) => match self.nodes.get(parent_id) {
                Some(parent) => parent.depth + 1,
                None => {
                    debug!(comment_id = id, parent_id, "Reply held until parent arrives");
                    let waiting = self.orphans.entry(parent_id.to_string()).or_default();
                    if !waiting.iter().any(|w| w == id) {
                        waiting.push(id.to_string());
                    }
                    return false;
                }
            },
        };

        let mut queue = vec![(id.to_string(), parent_id.map(str::to_string), depth)];
        while let Some((id, parent_id, depth)) = queue.pop() {
            match parent_id.as_deref().and_then(|p| self.nodes.get_mut(p)) {
                Some(parent) => parent.children.push(id.clone()),
                None => self.roots.push(id.clone()),
            }
            if let Some(waiting) = self.orphans.remove(&id) {
                queue.extend(waiting.into_iter().map(|child| (child, Some(id.clone()), depth + 1)));
            }
            self.nodes.insert(
                id,
                ThreadNode {
                    parent_id,
                    depth,
                    children: Vec::new(),
                },
            );
        }
        true
    }

    /// Remove a comment, every reply below it, and any replies still
    /// waiting on one of them. Returns the ids to drop from the comment
    /// store, `id` itself first (even when the thread never placed it).
    pub fn remove(&mut self, id: &str) -> Vec<String> {
        match self.nodes.get(id).map(|n| n.parent_id.clone()) {
            Some(parent_id) => match parent_id.as_deref().and_then(|p| self.nodes.get_mut(p)) {
                Some(parent) => parent.children.retain(|c| c != id),
                None => self.roots.retain(|r| r != id),
            },
            None => {
                for waiting in self.orphans.values_mut() {
                    waiting.retain(|w| w != id);
                }
                self.orphans.retain(|_, waiting| !waiting.is_empty());
            }
        }

        let mut removed = Vec::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(waiting) = self.orphans.remove(&current) {
                stack.extend(waiting);
            }
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
            }
            removed.push(current);
        }
        removed
    }

    /// Number of comments in the subtree rooted at `id`, itself included
    pub fn subtree_size(&self, id: &str) -> usize {
        let mut count = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                count += 1;
                stack.extend(node.children.iter().map(String::as_str));
            }
        }
        count
    }

    /// Whole thread in display order, cut at `max_depth`
    pub fn visible(&self, max_depth: usize) -> Vec<ThreadItem<'_>> {
        self.walk(&self.roots, 0, max_depth)
    }

    /// A "continue thread" view: the subtree under `id`, re-based so `id`
    /// sits at depth 0
    pub fn visible_from(&self, id: &str, max_depth: usize) -> Vec<ThreadItem<'_>> {
        match self.nodes.get_key_value(id) {
            Some((key, node)) => self.walk(std::slice::from_ref(key), node.depth, max_depth),
            None => Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.orphans.clear();
    }

    fn walk<'a>(&'a self, start: &'a [String], base: usize, max_depth: usize) -> Vec<ThreadItem<'a>> {
        let mut items = Vec::new();
        let mut stack: Vec<&str> = start.iter().rev().map(String::as_str).collect();

        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let depth = node.depth - base;
            items.push(ThreadItem::Comment { id, depth });

            if node.children.is_empty() {
                continue;
            }
            if depth + 1 >= max_depth {
                items.push(ThreadItem::ContinueThread {
                    parent_id: id,
                    depth: depth + 1,
                    hidden: self.subtree_size(id) - 1,
                });
            } else {
                stack.extend(node.children.iter().rev().map(String::as_str));
            }
        }
        items
    }
}
