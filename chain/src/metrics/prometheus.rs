//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed chain metrics, and an async HTTP
//! exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Chain-related Prometheus metrics.
///
/// These are registered into a [`Registry`] and updated from the node's
/// block and vote paths.
#[derive(Clone)]
pub struct ChainMetrics {
    /// Latency of full block application (validation + commit), in seconds.
    pub block_apply_seconds: Histogram,
    /// Total transactions applied in committed blocks.
    pub transactions_applied_total: IntCounter,
    /// Total blocks rejected by the validation pipeline.
    pub blocks_rejected_total: IntCounter,
    /// Latest finalized height.
    pub finalized_height: IntGauge,
    /// Current number of pending transactions in the mempool.
    pub mempool_size: IntGauge,
}

impl ChainMetrics {
    /// Registers chain metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        // Block application latency.
        let block_apply_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "consensus_block_apply_seconds",
                "Time to validate and commit a block in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;
        registry.register(Box::new(block_apply_seconds.clone()))?;

        // Applied transactions.
        let transactions_applied_total = IntCounter::with_opts(Opts::new(
            "consensus_transactions_applied_total",
            "Total number of transactions applied in committed blocks",
        ))?;
        registry.register(Box::new(transactions_applied_total.clone()))?;

        // Rejected blocks.
        let blocks_rejected_total = IntCounter::with_opts(Opts::new(
            "consensus_blocks_rejected_total",
            "Total number of blocks rejected by the validation pipeline",
        ))?;
        registry.register(Box::new(blocks_rejected_total.clone()))?;

        // Finality progress.
        let finalized_height = IntGauge::with_opts(Opts::new(
            "consensus_finalized_height",
            "Latest finalized block height",
        ))?;
        registry.register(Box::new(finalized_height.clone()))?;

        // Mempool backlog.
        let mempool_size = IntGauge::with_opts(Opts::new(
            "consensus_mempool_size",
            "Number of pending transactions in the mempool",
        ))?;
        registry.register(Box::new(mempool_size.clone()))?;

        Ok(Self {
            block_apply_seconds,
            transactions_applied_total,
            blocks_rejected_total,
            finalized_height,
            mempool_size,
        })
    }
}

/// Wrapper around a Prometheus registry and the chain metrics.
///
/// This is the main handle you pass around in the node. It can be wrapped
/// in an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub chain: ChainMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the chain metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("chain".to_string()), None)?;
        let chain = ChainMetrics::register(&registry)?;
        Ok(Self { registry, chain })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
///
/// This function is `async` and is intended to be spawned onto a Tokio
/// runtime, e.g.:
///
/// ```ignore
/// let registry = Arc::new(MetricsRegistry::new()?);
/// let addr: SocketAddr = "127.0.0.1:9898".parse()?;
/// tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
/// ```
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::error!("prometheus HTTP server error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .unwrap())
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap()),
    }
}
