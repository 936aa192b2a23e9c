// Centralized observability infrastructure for Dolex.
// Structured logging, lightweight tracing context, and in-process counters.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static OPERATION_COUNTER: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNTER: AtomicU64 = AtomicU64::new(0);
static QUERY_COUNTER: AtomicU64 = AtomicU64::new(0);
static TRANSFORM_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize logging with the default verbosity.
pub fn init_logging() -> Result<()> {
    init_logging_with_level(false, false)
}

/// Initialize logging with configurable verbosity.
///
/// `--quiet` always wins over `RUST_LOG`; otherwise `RUST_LOG` overrides the
/// flag-derived default.
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("dolex=debug,info")
    } else {
        EnvFilter::new("dolex=warn,error")
    };

    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_thread_ids(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet)
        .with_ansi(true)
        .with_writer(std::io::stderr);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            if !quiet {
                info!("dolex observability initialized");
            }
            Ok(())
        }
        Err(_) => Ok(()), // already initialized (common in tests)
    }
}

/// Structured description of a core operation, for consistent log shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    SourceAdd { source_id: String },
    SourceConnect { source_id: String },
    SourceQuery { source_id: String, row_count: usize },
    DslExecute { table: String, pushed_down: bool },
    TransformApply { table: String, column: String },
    TransformRollback { table: String, batch_size: usize },
    ManifestReplay { table: String, replayed: usize, failed: usize },
    PatternSelect { intent: String, recommended: String },
    CacheEvict { store: &'static str, id: String },
}

/// Lightweight tracing context threaded through a logical operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    pub operation: String,
    pub start_time: Instant,
    pub attributes: Vec<(String, String)>,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            operation: operation.into(),
            start_time: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn child(&self, operation: impl Into<String>) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            operation: operation.into(),
            start_time: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Log a completed operation and update the relevant counters.
pub fn log_operation(ctx: &OperationContext, op: &Operation, result: &Result<()>) {
    let elapsed = ctx.elapsed();
    match result {
        Ok(()) => {
            info!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                operation = %ctx.operation,
                elapsed_ms = elapsed.as_millis(),
                "operation completed: {:?}", op
            );
            OPERATION_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            error!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                operation = %ctx.operation,
                elapsed_ms = elapsed.as_millis(),
                error = %e,
                "operation failed: {:?}", op
            );
            ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
    }

    match op {
        Operation::DslExecute { .. } | Operation::SourceQuery { .. } => {
            QUERY_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        Operation::TransformApply { .. } => {
            TRANSFORM_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        _ => {}
    }
}

/// Run a future under a named trace, logging start/success/failure.
pub async fn with_trace_id<F, T>(operation: &str, f: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    let ctx = OperationContext::new(operation);
    info!(trace_id = %ctx.trace_id, "starting operation: {}", operation);

    let start = Instant::now();
    let result = f.await;
    let elapsed = start.elapsed();

    match &result {
        Ok(_) => {
            info!(trace_id = %ctx.trace_id, elapsed_ms = elapsed.as_millis(), "operation completed: {}", operation);
        }
        Err(e) => {
            error!(trace_id = %ctx.trace_id, elapsed_ms = elapsed.as_millis(), error = %e, "operation failed: {}", operation);
        }
    }

    result
}

/// Snapshot of process-wide counters, used by the `server_status` tool.
pub fn get_metrics() -> serde_json::Value {
    serde_json::json!({
        "operations": {
            "total": OPERATION_COUNTER.load(Ordering::Relaxed),
            "errors": ERROR_COUNTER.load(Ordering::Relaxed),
            "queries": QUERY_COUNTER.load(Ordering::Relaxed),
            "transforms": TRANSFORM_COUNTER.load(Ordering::Relaxed),
        },
        "timestamp": Utc::now().to_rfc3339(),
    })
}

#[instrument]
pub fn log_error_with_context(error: &anyhow::Error, ctx: &OperationContext) {
    let error_chain = error
        .chain()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(" -> ");

    tracing::error!(
        trace_id = %ctx.trace_id,
        span_id = %ctx.span_id,
        operation = %ctx.operation,
        error_chain = %error_chain,
        "error occurred during operation"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_context_child_shares_trace() {
        let ctx = OperationContext::new("parent");
        let child = ctx.child("child");
        assert_eq!(child.trace_id, ctx.trace_id);
        assert_eq!(child.parent_span_id, Some(ctx.span_id));
    }

    #[tokio::test]
    async fn with_trace_id_propagates_result() {
        let result = with_trace_id("test_op", async { Ok::<_, anyhow::Error>(7) }).await;
        assert_eq!(result.expect("op should succeed"), 7);
    }

    #[test]
    fn metrics_snapshot_has_expected_shape() {
        let ctx = OperationContext::new("metrics_test");
        log_operation(
            &ctx,
            &Operation::SourceAdd { source_id: "src-aaaa".into() },
            &Ok(()),
        );
        let metrics = get_metrics();
        assert!(metrics["operations"]["total"].as_u64().unwrap() >= 1);
        assert!(metrics["timestamp"].is_string());
    }
}
