//! Processing units for batch analysis.
//!
//! A trace is the unit of tree building and a group (entry viewpoint) is the
//! unit of categorization. Units share nothing, so a scheduler may run any
//! number of them in parallel as long as each group is handled by one worker.

use std::collections::BTreeMap;

use chainsight_categorize::{Categorization, CategorizeError, ChainInfo, ChainRelationship};
use chainsight_core::Span;
use chainsight_store::ChainStore;
use chainsight_tree::{TraceSpanTree, TreeError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("tree build failed: {0}")]
    Tree(#[from] TreeError),

    #[error("categorization failed: {0}")]
    Categorize(#[from] CategorizeError),
}

/// Splits a flat span batch by trace id, keeping input order per trace.
pub fn partition_traces(spans: impl IntoIterator<Item = Span>) -> BTreeMap<String, Vec<Span>> {
    let mut traces: BTreeMap<String, Vec<Span>> = BTreeMap::new();
    for span in spans {
        traces.entry(span.trace_id.clone()).or_default().push(span);
    }
    traces
}

/// Builds the tree of one trace and reduces it to its chain.
pub fn build_chain(spans: Vec<Span>) -> Result<ChainInfo, PipelineError> {
    let (cid, tree) = TraceSpanTree::build(spans)?;
    let chain = ChainInfo::from_tree(&tree);
    debug!(
        group_key = %cid,
        chain_id = %chain.cid,
        nodes = tree.len(),
        visual = tree.visual_count(),
        status = ?chain.status,
        "Built chain"
    );
    Ok(chain)
}

/// A trace whose tree could not be built.
#[derive(Debug)]
pub struct TraceFailure {
    pub trace_id: String,
    pub error: PipelineError,
}

/// Chains collected per group key, plus the traces that failed.
#[derive(Debug, Default)]
pub struct GroupedChains {
    pub groups: BTreeMap<String, Vec<ChainInfo>>,
    pub failures: Vec<TraceFailure>,
}

/// Builds every trace and collects the chains by group key.
///
/// A failing trace is logged and reported in [`GroupedChains::failures`];
/// the remaining traces are still built.
pub fn group_traces(traces: impl IntoIterator<Item = (String, Vec<Span>)>) -> GroupedChains {
    let mut built = Vec::new();
    let mut failures = Vec::new();

    for (trace_id, spans) in traces {
        match build_chain(spans) {
            Ok(chain) => built.push(chain),
            Err(error) => {
                warn!(trace_id = %trace_id, error = %error, "Skipping trace");
                failures.push(TraceFailure { trace_id, error });
            }
        }
    }

    GroupedChains {
        groups: group_chains(built),
        failures,
    }
}

pub fn group_chains(chains: impl IntoIterator<Item = ChainInfo>) -> BTreeMap<String, Vec<ChainInfo>> {
    let mut groups: BTreeMap<String, Vec<ChainInfo>> = BTreeMap::new();
    for chain in chains {
        groups.entry(chain.group_key.clone()).or_default().push(chain);
    }
    groups
}

/// Outcome counts for one categorized group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub group_key: String,
    pub chains: usize,
    pub new_categories: usize,
    pub absorbed: usize,
    pub pending: usize,
    pub reconciled: usize,
    /// Categories held by the group after the pass.
    pub categories: usize,
    /// Chains still pending after the pass.
    pub pending_total: usize,
}

impl GroupSummary {
    fn record(&mut self, outcome: &Categorization) {
        self.chains += 1;
        match outcome {
            Categorization::NewCategory { reconciled } => {
                self.new_categories += 1;
                self.reconciled += reconciled;
            }
            Categorization::ExistingCategory { reconciled } => self.reconciled += reconciled,
            Categorization::Absorbed { .. } => self.absorbed += 1,
            Categorization::Pending => self.pending += 1,
            Categorization::AlreadyContained | Categorization::AlreadyPending => {}
        }
    }
}

/// Restores the group's saved state, folds in `chains` one by one and saves.
pub fn categorize_group(
    key: &str,
    chains: Vec<ChainInfo>,
    store: &dyn ChainStore,
) -> Result<GroupSummary, PipelineError> {
    let mut relationship = ChainRelationship::restore(key, store)?;
    let mut summary = GroupSummary {
        group_key: key.to_string(),
        ..Default::default()
    };

    for chain in chains {
        let outcome = relationship.categorize(chain);
        summary.record(&outcome);
    }

    relationship.save(store)?;
    summary.categories = relationship.categories().len();
    summary.pending_total = relationship.pending_ids().len();

    info!(
        group_key = %key,
        chains = summary.chains,
        categories = summary.categories,
        pending = summary.pending_total,
        reconciled = summary.reconciled,
        "Categorized group"
    );
    Ok(summary)
}
