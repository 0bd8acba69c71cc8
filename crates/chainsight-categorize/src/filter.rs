//! Node annotation filters.
//!
//! Each filter copies or derives one aspect of a tree node into its
//! [`ChainNode`] and threads a [`SubLevelCostCounter`] through. Filters run in
//! order for every node via [`apply_filters`].

use std::collections::HashMap;

use chainsight_core::{LevelPath, Span};
use chainsight_tree::TraceSpanNode;

use crate::chain::{ChainNode, NodeStatus};

/// View of one tree node handed to the filters.
#[derive(Debug, Clone, Copy)]
pub struct SpanEntry<'a> {
    pub level: &'a LevelPath,
    pub client: Option<&'a Span>,
    pub server: Option<&'a Span>,
    pub visual: bool,
}

impl<'a> SpanEntry<'a> {
    pub fn from_node(node: &'a TraceSpanNode) -> Self {
        Self {
            level: node.level(),
            client: node.client(),
            server: node.server(),
            visual: node.is_visual(),
        }
    }

    /// Caller side if present, else receiver side.
    pub fn span(&self) -> Option<&'a Span> {
        self.client.or(self.server)
    }

    pub fn is_failed(&self) -> bool {
        self.client.is_some_and(Span::is_failed) || self.server.is_some_and(Span::is_failed)
    }
}

/// Accumulated cost of the calls made from each level.
#[derive(Debug, Clone, Default)]
pub struct SubLevelCostCounter {
    totals: HashMap<LevelPath, u64>,
}

impl SubLevelCostCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a callee's cost to the total of the level that called it.
    pub fn add(mut self, caller: LevelPath, cost_ms: u64) -> Self {
        let total = self.totals.entry(caller).or_default();
        *total = total.saturating_add(cost_ms);
        self
    }

    /// Total cost of the direct callees of `level`.
    pub fn sub_level_cost(&self, level: &LevelPath) -> u64 {
        self.totals.get(level).copied().unwrap_or(0)
    }
}

/// One annotation step.
pub type SpanNodeFilter = fn(&SpanEntry<'_>, &mut ChainNode, SubLevelCostCounter) -> SubLevelCostCounter;

/// Filters applied when a chain is derived from a tree.
pub const DEFAULT_FILTERS: &[SpanNodeFilter] = &[copy_attributes, mark_status, record_cost];

/// Runs `filters` in order over one node.
pub fn apply_filters(
    filters: &[SpanNodeFilter],
    entry: &SpanEntry<'_>,
    node: &mut ChainNode,
    counter: SubLevelCostCounter,
) -> SubLevelCostCounter {
    filters
        .iter()
        .fold(counter, |counter, filter| filter(entry, node, counter))
}

pub fn copy_attributes(
    entry: &SpanEntry<'_>,
    node: &mut ChainNode,
    counter: SubLevelCostCounter,
) -> SubLevelCostCounter {
    node.level = entry.level.clone();
    if let Some(span) = entry.span() {
        node.view_point = Some(span.view_point_id.clone());
        node.business_key = span.business_key.clone();
    }
    counter
}

pub fn mark_status(
    entry: &SpanEntry<'_>,
    node: &mut ChainNode,
    counter: SubLevelCostCounter,
) -> SubLevelCostCounter {
    node.status = if entry.visual {
        NodeStatus::Missing
    } else if entry.is_failed() {
        NodeStatus::Abnormal
    } else {
        NodeStatus::Normal
    };
    counter
}

pub fn record_cost(
    entry: &SpanEntry<'_>,
    node: &mut ChainNode,
    counter: SubLevelCostCounter,
) -> SubLevelCostCounter {
    node.cost_ms = entry.span().map(|s| s.cost_ms).unwrap_or(0);
    match entry.level.parent() {
        Some(caller) => counter.add(caller, node.cost_ms),
        None => counter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry<'a>(level: &'a LevelPath, client: Option<&'a Span>, visual: bool) -> SpanEntry<'a> {
        SpanEntry {
            level,
            client,
            server: None,
            visual,
        }
    }

    #[test]
    fn test_default_filters_annotate_node() {
        let level = LevelPath::parse("0.1").unwrap();
        let span = Span::new("t1", "0", 1, "Order.place")
            .with_cost(30)
            .with_business_key("order-42");

        let mut node = ChainNode::default();
        let counter = apply_filters(
            DEFAULT_FILTERS,
            &entry(&level, Some(&span), false),
            &mut node,
            SubLevelCostCounter::new(),
        );

        assert_eq!(node.level, level);
        assert_eq!(node.view_point.as_deref(), Some("Order.place"));
        assert_eq!(node.business_key.as_deref(), Some("order-42"));
        assert_eq!(node.status, NodeStatus::Normal);
        assert_eq!(node.cost_ms, 30);
        assert_eq!(counter.sub_level_cost(&LevelPath::root()), 30);
    }

    #[test]
    fn test_mark_status() {
        let level = LevelPath::root();
        let failed = Span::new("t1", "", 0, "/a").with_status(500);

        let mut node = ChainNode::default();
        mark_status(&entry(&level, Some(&failed), false), &mut node, SubLevelCostCounter::new());
        assert_eq!(node.status, NodeStatus::Abnormal);

        mark_status(&entry(&level, None, true), &mut node, SubLevelCostCounter::new());
        assert_eq!(node.status, NodeStatus::Missing);
    }

    #[test]
    fn test_server_side_failure_marks_abnormal() {
        let level = LevelPath::parse("0.0").unwrap();
        let client = Span::new("t1", "0", 0, "Order.place");
        let server = Span::new("t1", "0", 0, "Order.place")
            .receiver()
            .with_exception("TimeoutException");
        let entry = SpanEntry {
            level: &level,
            client: Some(&client),
            server: Some(&server),
            visual: false,
        };
        assert!(entry.is_failed());
        assert_eq!(entry.span(), Some(&client));
    }

    #[test]
    fn test_filters_run_in_order() {
        fn tag_business_key(
            _: &SpanEntry<'_>,
            node: &mut ChainNode,
            counter: SubLevelCostCounter,
        ) -> SubLevelCostCounter {
            node.business_key = Some("overridden".to_string());
            counter
        }

        let level = LevelPath::root();
        let span = Span::new("t1", "", 0, "/a").with_business_key("original");
        let mut node = ChainNode::default();
        apply_filters(
            &[copy_attributes, tag_business_key],
            &entry(&level, Some(&span), false),
            &mut node,
            SubLevelCostCounter::new(),
        );
        assert_eq!(node.business_key.as_deref(), Some("overridden"));
    }

    #[test]
    fn test_cost_counter_accumulates_per_caller() {
        let caller = LevelPath::parse("0.1").unwrap();
        let counter = SubLevelCostCounter::new()
            .add(caller.clone(), 5)
            .add(caller.clone(), 7)
            .add(LevelPath::root(), 100);
        assert_eq!(counter.sub_level_cost(&caller), 12);
        assert_eq!(counter.sub_level_cost(&LevelPath::parse("0.2").unwrap()), 0);
    }
}
