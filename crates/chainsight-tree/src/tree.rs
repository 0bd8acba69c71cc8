//! Trace span tree construction and serialization.

use std::collections::HashMap;

use chainsight_core::{generate_token, LevelPath, Span};
use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::node::{NodeId, SerializedNode, TraceSpanNode};

/// Largest level index accepted in any path segment.
///
/// Every index below it at the same level gets a node, real or placeholder.
pub const MAX_LEVEL_INDEX: u32 = 4096;

/// The reconstructed call tree of one trace.
#[derive(Debug, Clone)]
pub struct TraceSpanTree {
    cid: String,
    user_id: Option<String>,
    root: NodeId,
    nodes: Vec<TraceSpanNode>,
    index: HashMap<String, NodeId>,
}

#[derive(Serialize, Deserialize)]
struct SerializedTree {
    cid: String,
    #[serde(default)]
    user_id: Option<String>,
    nodes: Vec<SerializedNode>,
}

impl TraceSpanTree {
    /// Builds the call tree of one trace and returns it with its chain id.
    ///
    /// Spans are materialized in lexicographic order of their dotted level
    /// text, so `"0.10"` is placed before `"0.2"`; the later span then lands
    /// on the placeholder created for it.
    pub fn build(spans: Vec<Span>) -> Result<(String, Self), TreeError> {
        if spans.is_empty() {
            return Err(TreeError::EmptyInput);
        }

        let mut addressed = spans
            .into_iter()
            .map(|span| {
                let path = span
                    .level_path()
                    .map_err(|source| TreeError::AddressResolution {
                        trace_id: span.trace_id.clone(),
                        source,
                    })?;
                if path.segments().iter().any(|&index| index > MAX_LEVEL_INDEX) {
                    tracing::error!(
                        trace_id = %span.trace_id,
                        level = %path,
                        limit = MAX_LEVEL_INDEX,
                        "Span level index out of range"
                    );
                    return Err(TreeError::LevelOutOfRange {
                        trace_id: span.trace_id.clone(),
                        level: path.to_string(),
                        limit: MAX_LEVEL_INDEX,
                    });
                }
                Ok((path.to_string(), path, span))
            })
            .collect::<Result<Vec<_>, TreeError>>()?;
        addressed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut addressed = addressed.into_iter();
        let Some((level, path, entry)) = addressed.next() else {
            return Err(TreeError::EmptyInput);
        };
        if !path.is_root() {
            return Err(TreeError::MalformedRoot {
                trace_id: entry.trace_id,
                level,
            });
        }

        let trace_id = entry.trace_id.clone();
        let cid = generate_token(&entry.view_point_id);
        let mut tree = Self {
            cid: cid.clone(),
            user_id: None,
            root: NodeId(0),
            nodes: Vec::new(),
            index: HashMap::new(),
        };
        tree.note_user(&entry);
        let root = tree.alloc(LevelPath::root(), None, false);
        tree.nodes[root.0].merge_span(entry);

        for (_, path, span) in addressed {
            tree.place(&path, span);
        }

        tracing::debug!(
            trace_id = %trace_id,
            cid = %cid,
            nodes = tree.nodes.len(),
            visual = tree.visual_count(),
            "Built trace span tree"
        );

        Ok((cid, tree))
    }

    /// Chain id, derived from the entry span's viewpoint.
    pub fn cid(&self) -> &str {
        &self.cid
    }

    /// First non-empty user id seen while building.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &TraceSpanNode {
        &self.nodes[id.0]
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &TraceSpanNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn visual_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.visual).count()
    }

    /// Looks a node up by its reference token.
    pub fn find_node(&self, token: &str) -> Result<&TraceSpanNode, TreeError> {
        self.index
            .get(token)
            .map(|id| &self.nodes[id.0])
            .ok_or_else(|| TreeError::NodeNotFound(token.to_string()))
    }

    /// Node currently addressed by `path`, if the tree reaches that far.
    pub fn find_by_level(&self, path: &LevelPath) -> Option<&TraceSpanNode> {
        let mut current = self.root;
        for (depth, &hops) in path.segments().iter().enumerate() {
            if depth > 0 {
                current = self.nodes[current.0].sub?;
            }
            for _ in 0..hops {
                current = self.nodes[current.0].next?;
            }
        }
        Some(&self.nodes[current.0])
    }

    /// Direct callees of a node, in sibling order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.nodes[id.0].sub, move |c| self.nodes[c.0].next)
    }

    /// Depth-first walk: a node, then its callees, then its later siblings.
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: vec![self.root],
        }
    }

    /// Encodes the tree in its flat, token-addressed form.
    pub fn serialize(&self) -> Result<String, TreeError> {
        let token_of = |id: Option<NodeId>| id.map(|id| self.nodes[id.0].token.clone());
        let nodes = self
            .nodes
            .iter()
            .map(|node| SerializedNode {
                token: node.token.clone(),
                level: node.level.clone(),
                parent: token_of(node.parent),
                next: token_of(node.next),
                sub: token_of(node.sub),
                client: node.client.clone(),
                server: node.server.clone(),
                visual: node.visual,
            })
            .collect();

        let flat = SerializedTree {
            cid: self.cid.clone(),
            user_id: self.user_id.clone(),
            nodes,
        };
        Ok(serde_json::to_string(&flat)?)
    }

    /// Restores a tree from [`serialize`](Self::serialize) output.
    ///
    /// The token index is rebuilt in one pass over the flat node list; every
    /// neighbour token must then resolve through it.
    pub fn deserialize(value: &str) -> Result<Self, TreeError> {
        let flat: SerializedTree = serde_json::from_str(value).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse trace span tree");
            TreeError::Corrupt(e.to_string())
        })?;

        let mut index = HashMap::with_capacity(flat.nodes.len());
        for (i, node) in flat.nodes.iter().enumerate() {
            if index.insert(node.token.clone(), NodeId(i)).is_some() {
                tracing::error!(cid = %flat.cid, token = %node.token, "Duplicate node ref token");
                return Err(TreeError::Corrupt(format!(
                    "duplicate node ref token {}",
                    node.token
                )));
            }
        }

        let resolve = |token: Option<String>| -> Result<Option<NodeId>, TreeError> {
            token
                .map(|t| index.get(&t).copied().ok_or(TreeError::NodeNotFound(t)))
                .transpose()
        };

        let mut nodes = Vec::with_capacity(flat.nodes.len());
        let mut roots = Vec::new();
        for (i, node) in flat.nodes.into_iter().enumerate() {
            let parent = resolve(node.parent)?;
            if parent.is_none() {
                roots.push(NodeId(i));
            }
            nodes.push(TraceSpanNode {
                token: node.token,
                level: node.level,
                parent,
                next: resolve(node.next)?,
                sub: resolve(node.sub)?,
                client: node.client,
                server: node.server,
                visual: node.visual,
            });
        }

        let [root] = roots[..] else {
            tracing::error!(cid = %flat.cid, roots = roots.len(), "Trace span tree must have exactly one root");
            return Err(TreeError::Corrupt(format!(
                "expected exactly one root, found {}",
                roots.len()
            )));
        };

        let tree = Self {
            cid: flat.cid,
            user_id: flat.user_id,
            root,
            nodes,
            index,
        };
        if let Err(reason) = tree.check_links() {
            tracing::error!(cid = %tree.cid, reason = %reason, "Inconsistent trace span tree links");
            return Err(TreeError::Corrupt(reason));
        }
        Ok(tree)
    }

    /// Walks `sub` and `next` links from the root. Every node must be reached
    /// exactly once, from the node its `parent` names.
    fn check_links(&self) -> Result<(), String> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![(self.root, None)];

        while let Some((id, from)) = stack.pop() {
            let node = &self.nodes[id.0];
            if std::mem::replace(&mut seen[id.0], true) {
                return Err(format!("node {} is linked more than once", node.token));
            }
            if node.parent != from {
                return Err(format!("node {} does not hang from its parent", node.token));
            }
            stack.extend(node.next.map(|next| (next, Some(id))));
            stack.extend(node.sub.map(|sub| (sub, Some(id))));
        }

        match seen.iter().position(|reached| !reached) {
            Some(i) => Err(format!("node {} is unreachable from the root", self.nodes[i].token)),
            None => Ok(()),
        }
    }

    fn note_user(&mut self, span: &Span) {
        if self.user_id.is_some() {
            return;
        }
        if let Some(user_id) = &span.user_id {
            self.user_id = Some(user_id.clone());
        }
    }

    fn alloc(&mut self, level: LevelPath, parent: Option<NodeId>, visual: bool) -> NodeId {
        let id = NodeId(self.nodes.len());
        let node = TraceSpanNode::new(level, parent, visual);
        self.index.insert(node.token.clone(), id);
        self.nodes.push(node);
        id
    }

    fn place(&mut self, path: &LevelPath, span: Span) {
        self.note_user(&span);
        let id = self.resolve(path);
        let node = &mut self.nodes[id.0];
        let was_visual = node.visual;
        let side = if span.is_receiver { "server" } else { "client" };

        if node.merge_span(span) {
            if was_visual {
                tracing::debug!(level = %path, token = %node.token, "Promoted placeholder node");
            }
        } else {
            tracing::warn!(
                cid = %self.cid,
                level = %path,
                side,
                "Duplicate span for call edge, keeping the first"
            );
        }
    }

    /// Walks from the root to `path`, one segment at a time: hop along
    /// `next` links as many times as the segment says, then descend into
    /// `sub` before the following segment. Missing hops are filled with
    /// placeholder nodes.
    fn resolve(&mut self, path: &LevelPath) -> NodeId {
        let mut current = self.root;
        let mut level = LevelPath::root();

        for (depth, &hops) in path.segments().iter().enumerate() {
            if depth > 0 {
                level = level.child(0);
                current = match self.nodes[current.0].sub {
                    Some(sub) => sub,
                    None => {
                        let sub = self.alloc(level.clone(), Some(current), true);
                        self.nodes[current.0].sub = Some(sub);
                        sub
                    }
                };
            }

            for i in 1..=hops {
                level = level.sibling(i);
                current = match self.nodes[current.0].next {
                    Some(next) => next,
                    None => {
                        let next = self.alloc(level.clone(), Some(current), true);
                        self.nodes[current.0].next = Some(next);
                        next
                    }
                };
            }
        }

        current
    }
}

/// Iterator returned by [`TraceSpanTree::preorder`].
pub struct Preorder<'a> {
    tree: &'a TraceSpanTree,
    stack: Vec<NodeId>,
}

impl Iterator for Preorder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = self.tree.node(id);
        if let Some(next) = node.next {
            self.stack.push(next);
        }
        if let Some(sub) = node.sub {
            self.stack.push(sub);
        }
        Some(id)
    }
}
