//! Arena nodes of a trace span tree.

use chainsight_core::{LevelPath, Span};
use serde::{Deserialize, Serialize};

/// Handle of a node inside its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position in creation order.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A node of the reconstructed call tree.
///
/// `parent` is the node this one hangs from: the node whose `sub` it is, or
/// the sibling whose `next` it is. Only the root has no parent.
#[derive(Debug, Clone)]
pub struct TraceSpanNode {
    pub(crate) token: String,
    pub(crate) level: LevelPath,
    pub(crate) parent: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) sub: Option<NodeId>,
    pub(crate) client: Option<Span>,
    pub(crate) server: Option<Span>,
    pub(crate) visual: bool,
}

impl TraceSpanNode {
    pub(crate) fn new(level: LevelPath, parent: Option<NodeId>, visual: bool) -> Self {
        Self {
            token: uuid::Uuid::new_v4().to_string(),
            level,
            parent,
            next: None,
            sub: None,
            client: None,
            server: None,
            visual,
        }
    }

    /// Stable reference token, assigned at creation.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn level(&self) -> &LevelPath {
        &self.level
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Following sibling.
    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    /// First child.
    pub fn sub(&self) -> Option<NodeId> {
        self.sub
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn has_sub(&self) -> bool {
        self.sub.is_some()
    }

    /// Placeholder inserted for a span missing from the input.
    pub fn is_visual(&self) -> bool {
        self.visual
    }

    /// Caller side of the call edge.
    pub fn client(&self) -> Option<&Span> {
        self.client.as_ref()
    }

    /// Receiver side of the call edge.
    pub fn server(&self) -> Option<&Span> {
        self.server.as_ref()
    }

    /// The span describing this call, preferring the caller side.
    pub fn span(&self) -> Option<&Span> {
        self.client.as_ref().or(self.server.as_ref())
    }

    pub fn view_point(&self) -> Option<&str> {
        self.span().map(|s| s.view_point_id.as_str())
    }

    /// Merges a span into the matching side of this node, promoting a
    /// placeholder to a real node. Returns `false` if that side was taken.
    pub(crate) fn merge_span(&mut self, span: Span) -> bool {
        let slot = if span.is_receiver {
            &mut self.server
        } else {
            &mut self.client
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(span);
        self.visual = false;
        true
    }
}

/// Token-addressed form of a node, with neighbour links replaced by the
/// neighbours' reference tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    pub token: String,
    pub level: LevelPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<Span>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Span>,
    pub visual: bool,
}
