use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chainsight::{
    build_chain, categorize_group, group_chains, partition_traces, ChainInfo, ChainStore,
    GroupSummary, JobConfig, Span, SqliteChainStore,
};
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

#[derive(Debug, Default)]
struct JobReport {
    traces: usize,
    chains: usize,
    groups: Vec<GroupSummary>,
    failed_traces: Vec<String>,
    failed_groups: Vec<String>,
}

impl JobReport {
    fn is_success(&self) -> bool {
        self.failed_traces.is_empty() && self.failed_groups.is_empty()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut args = env::args().skip(1);
    let config = load_config(args.next().map(PathBuf::from), args.next().map(PathBuf::from))?;

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .compact()
        .init();

    let report = run(&config).await?;

    info!(
        traces = report.traces,
        chains = report.chains,
        groups = report.groups.len(),
        failed_traces = report.failed_traces.len(),
        failed_groups = report.failed_groups.len(),
        "Job finished"
    );

    if !report.is_success() {
        bail!(
            "{} trace(s) and {} group(s) failed",
            report.failed_traces.len(),
            report.failed_groups.len()
        );
    }
    Ok(())
}

fn load_config(config_path: Option<PathBuf>, input_path: Option<PathBuf>) -> Result<JobConfig> {
    let config = match config_path {
        Some(path) => JobConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => JobConfig::default(),
    };
    let mut config = config.apply_env()?;
    if input_path.is_some() {
        config.input_path = input_path;
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: &JobConfig) -> Result<JobReport> {
    let Some(input_path) = config.input_path.as_deref() else {
        bail!("no input path configured");
    };
    let spans = read_spans(input_path)?;
    let store: Arc<dyn ChainStore> = Arc::new(
        SqliteChainStore::new(&config.database_path)
            .with_context(|| format!("opening {}", config.database_path.display()))?,
    );

    let traces = partition_traces(spans);
    info!(traces = traces.len(), workers = config.workers, "Building chains");

    let mut report = JobReport {
        traces: traces.len(),
        ..Default::default()
    };

    let chains = build_chains(traces, config.workers, &mut report.failed_traces).await;
    report.chains = chains.len();

    let groups = group_chains(chains);
    info!(groups = groups.len(), "Categorizing groups");
    report.groups = categorize_groups(groups, store, config.workers, &mut report.failed_groups).await;

    Ok(report)
}

fn read_spans(path: &Path) -> Result<Vec<Span>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading spans from {}", path.display()))?;
    let spans: Vec<Span> = serde_json::from_str(&content)
        .with_context(|| format!("parsing spans from {}", path.display()))?;
    Ok(spans)
}

async fn build_chains(
    traces: BTreeMap<String, Vec<Span>>,
    workers: usize,
    failed: &mut Vec<String>,
) -> Vec<ChainInfo> {
    let results: Vec<_> = stream::iter(traces)
        .map(|(trace_id, spans)| async move {
            let result = tokio::task::spawn_blocking(move || build_chain(spans)).await;
            (trace_id, result)
        })
        .buffer_unordered(workers)
        .collect()
        .await;

    let mut chains = Vec::with_capacity(results.len());
    for (trace_id, result) in results {
        match result {
            Ok(Ok(chain)) => chains.push(chain),
            Ok(Err(e)) => {
                warn!(trace_id = %trace_id, error = %e, "Trace failed");
                failed.push(trace_id);
            }
            Err(e) => {
                error!(trace_id = %trace_id, error = %e, "Trace worker panicked");
                failed.push(trace_id);
            }
        }
    }
    chains
}

async fn categorize_groups(
    groups: BTreeMap<String, Vec<ChainInfo>>,
    store: Arc<dyn ChainStore>,
    workers: usize,
    failed: &mut Vec<String>,
) -> Vec<GroupSummary> {
    let results: Vec<_> = stream::iter(groups)
        .map(|(key, chains)| {
            let store = Arc::clone(&store);
            async move {
                let task_key = key.clone();
                let result = tokio::task::spawn_blocking(move || {
                    categorize_group(&task_key, chains, store.as_ref())
                })
                .await;
                (key, result)
            }
        })
        .buffer_unordered(workers)
        .collect()
        .await;

    let mut summaries = Vec::with_capacity(results.len());
    for (key, result) in results {
        match result {
            Ok(Ok(summary)) => summaries.push(summary),
            Ok(Err(e)) => {
                error!(group_key = %key, error = %e, "Group failed");
                failed.push(key);
            }
            Err(e) => {
                error!(group_key = %key, error = %e, "Group worker panicked");
                failed.push(key);
            }
        }
    }
    summaries.sort_by(|a, b| a.group_key.cmp(&b.group_key));
    summaries
}
