//! Dependency-Aware Orchestrator
//!
//! [`run_aggregation`] resolves the regions, launches one task per selected
//! global service and one per selected (region, regional service) pair, then
//! drains the error channel until every task, including the children tasks
//! launched along the way, has finished.
//!
//! A run is all-or-nothing: any reported error discards the whole tree.

mod services;

pub use services::{all_service_names, GlobalService, RegionalService};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::context::FetchContext;
use crate::error::{collapse, error_channel, ErrorSink, FetchError};
use crate::executor::{Completion, Executor};
use crate::filter::{RegionFilter, ServiceFilter};
use crate::inventory::Inventory;
use crate::resource::regions::list_regions;

/// Lifecycle of one aggregation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    RegionsResolved,
    TasksLaunched,
    Draining,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::RegionsResolved => "regions resolved",
            RunState::TasksLaunched => "tasks launched",
            RunState::Draining => "draining",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct RunTracker {
    state: RunState,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
        }
    }

    fn advance(&mut self, next: RunState) {
        tracing::debug!("Aggregation {} -> {}", self.state, next);
        self.state = next;
    }
}

/// What every task of a run shares: the fetch context, the executor it
/// launches follow-up work on, and the error channel.
#[derive(Clone)]
pub struct RunScope {
    ctx: Arc<FetchContext>,
    executor: Executor,
    errors: ErrorSink,
}

impl RunScope {
    pub fn new(ctx: Arc<FetchContext>, executor: Executor, errors: ErrorSink) -> Self {
        Self {
            ctx,
            executor,
            errors,
        }
    }

    pub fn ctx(&self) -> &Arc<FetchContext> {
        &self.ctx
    }

    /// Launch arbitrary work in this run
    pub fn launch<F>(&self, work: F) -> Completion
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.executor.launch(&self.ctx.cancel, work)
    }

    /// Launch a leaf fetch whose result is handed to `store`. A failure is
    /// reported on the run's error channel and `store` is skipped.
    pub fn fetch_into<T, F, Fut, S>(&self, what: impl Into<String>, fetch: F, store: S) -> Completion
    where
        T: Send + 'static,
        F: FnOnce(Arc<FetchContext>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        S: FnOnce(T) + Send + 'static,
    {
        let what = what.into();
        let fut = fetch(Arc::clone(&self.ctx));
        let errors = self.errors.clone();

        self.launch(async move {
            match fut.await {
                Ok(value) => store(value),
                Err(err) => errors.report(err.context(format!("error while fetching {}", what))),
            }
        })
    }
}

/// Collect the inventory of every selected service in every selected region.
///
/// Regions come from `regions` directly when it names any, otherwise from
/// the region lister. Returns the complete tree, the single error when one
/// task failed, an aggregate error when several did, or
/// [`FetchError::Cancelled`] when the run's token fired.
pub async fn run_aggregation(
    ctx: FetchContext,
    regions: &RegionFilter,
    services: &ServiceFilter,
) -> Result<Inventory> {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("aggregation", %run_id, project = %ctx.project());

    aggregate(run_id, Arc::new(ctx), regions, services)
        .instrument(span)
        .await
}

async fn aggregate(
    run_id: Uuid,
    ctx: Arc<FetchContext>,
    region_filter: &RegionFilter,
    services: &ServiceFilter,
) -> Result<Inventory> {
    let mut run = RunTracker::new();

    let global: Vec<GlobalService> = GlobalService::ALL
        .into_iter()
        .filter(|s| services.allows(s.name()))
        .collect();
    let regional: Vec<RegionalService> = RegionalService::ALL
        .into_iter()
        .filter(|s| services.allows(s.name()))
        .collect();

    let regions = if regional.is_empty() {
        Vec::new()
    } else {
        match region_filter.resolve(|| list_regions(&ctx)).await {
            Ok(regions) => regions,
            Err(err) => {
                run.advance(RunState::Failed);
                if ctx.cancel.is_cancelled() {
                    return Err(FetchError::Cancelled.into());
                }
                return Err(err.context("error while listing regions"));
            }
        }
    };
    run.advance(RunState::RegionsResolved);
    tracing::info!(
        "Aggregating {} global and {} regional services across {} regions",
        global.len(),
        regional.len(),
        regions.len()
    );

    let inventory = Arc::new(Inventory::new(run_id, ctx.project(), &regions));
    let executor = Executor::unbounded();
    let (errors, mut rx) = error_channel();

    {
        let scope = RunScope::new(Arc::clone(&ctx), executor.clone(), errors);

        for service in &global {
            tracing::debug!("Launching {}", service.name());
            service.launch(&scope, &inventory);
        }

        for region in inventory.regions.values() {
            for service in &regional {
                tracing::debug!("Launching {} in {}", service.name(), region.region);
                service.launch(&scope, region);
            }
        }
    }
    run.advance(RunState::TasksLaunched);

    run.advance(RunState::Draining);
    let errors = drain(&executor, &mut rx).await;

    if ctx.cancel.is_cancelled() {
        run.advance(RunState::Failed);
        return Err(FetchError::Cancelled.into());
    }

    if let Some(err) = collapse(errors) {
        run.advance(RunState::Failed);
        return Err(err);
    }

    run.advance(RunState::Completed);
    Ok(Arc::unwrap_or_clone(inventory))
}

/// Receive errors until every launched task has finished
async fn drain(executor: &Executor, rx: &mut mpsc::UnboundedReceiver<anyhow::Error>) -> Vec<anyhow::Error> {
    let mut errors = Vec::new();
    let done = executor.done();
    tokio::pin!(done);

    loop {
        tokio::select! {
            Some(err) = rx.recv() => errors.push(err),
            _ = &mut done => break,
        }
    }

    // Errors sent right before the last task finished
    while let Ok(err) = rx.try_recv() {
        errors.push(err);
    }

    if !errors.is_empty() {
        tracing::warn!("{} fetches failed", errors.len());
    }
    errors
}
