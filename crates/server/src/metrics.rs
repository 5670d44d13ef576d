//! Prometheus exporter on its own listener, separate from the API port.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use decision_protocol::ResolveResponse;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct MetricsExporter {
    registry: Arc<Registry>,
    requests: IntCounter,
    degraded: IntCounter,
    clarifications: IntCounter,
    stage_failures: IntCounterVec,
    stage_latency_ms: IntGaugeVec,
    _server_handle: Arc<JoinHandle<()>>,
}

impl MetricsExporter {
    pub fn start(port: u16) -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests = IntCounter::with_opts(Opts::new(
            "decision_resolve_requests_total",
            "Resolve requests handled",
        ))?;
        let degraded = IntCounter::with_opts(Opts::new(
            "decision_resolve_degraded_total",
            "Resolve requests that took any degraded path",
        ))?;
        let clarifications = IntCounter::with_opts(Opts::new(
            "decision_clarifications_total",
            "Requests answered with a clarifying question",
        ))?;
        let stage_failures = IntCounterVec::new(
            Opts::new("decision_stage_failures_total", "Stage invocation failures"),
            &["stage"],
        )?;
        let stage_latency_ms = IntGaugeVec::new(
            Opts::new(
                "decision_stage_last_latency_ms",
                "Latency of the most recent invocation per stage",
            ),
            &["stage"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(degraded.clone()))?;
        registry.register(Box::new(clarifications.clone()))?;
        registry.register(Box::new(stage_failures.clone()))?;
        registry.register(Box::new(stage_latency_ms.clone()))?;

        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let serve_registry = Arc::clone(&registry);
        let handle = tokio::spawn(async move {
            let make_svc = make_service_fn(move |_conn| {
                let registry = Arc::clone(&serve_registry);
                async move {
                    Ok::<_, Infallible>(service_fn(move |_req: Request<Body>| {
                        let registry = Arc::clone(&registry);
                        async move {
                            let metric_families = registry.gather();
                            let mut buffer = Vec::new();
                            let encoder = TextEncoder::new();
                            if encoder.encode(&metric_families, &mut buffer).is_err() {
                                buffer.clear();
                            }
                            Ok::<_, Infallible>(Response::new(Body::from(buffer)))
                        }
                    }))
                }
            });
            if let Err(err) = Server::bind(&addr).serve(make_svc).await {
                log::warn!("metrics exporter stopped: {err}");
            }
        });
        log::info!("metrics exporter listening on http://{addr}/metrics");

        Ok(Self {
            registry,
            requests,
            degraded,
            clarifications,
            stage_failures,
            stage_latency_ms,
            _server_handle: Arc::new(handle),
        })
    }

    pub fn observe(&self, response: &ResolveResponse) {
        self.requests.inc();
        if response.meta.degraded_path.is_some() {
            self.degraded.inc();
        }
        if response
            .answer
            .as_ref()
            .is_some_and(|answer| answer.clarification)
        {
            self.clarifications.inc();
        }
        for timing in &response.meta.stage_timings {
            self.stage_latency_ms
                .with_label_values(&[timing.stage.as_str()])
                .set(timing.latency_ms as i64);
            if !timing.success {
                self.stage_failures
                    .with_label_values(&[timing.stage.as_str()])
                    .inc();
            }
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
