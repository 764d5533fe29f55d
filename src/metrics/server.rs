//! Prometheus metrics HTTP server.
//!
//! Serves metrics on a configurable HTTP endpoint.

use crate::backend::BackendPool;
use crate::metrics::MetricsCollector;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus_client::encoding::text::encode;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Prometheus metrics HTTP server.
pub struct MetricsServer {
    /// Address to bind.
    address: SocketAddr,
    /// Path for metrics endpoint.
    path: String,
    collector: MetricsCollector,
    /// Pool whose gauges are refreshed on every scrape.
    pool: Option<Arc<BackendPool>>,
}

struct ServerState {
    path: String,
    collector: MetricsCollector,
    pool: Option<Arc<BackendPool>>,
}

impl MetricsServer {
    /// Create a new metrics server.
    pub fn new(address: SocketAddr, path: String, collector: MetricsCollector) -> Self {
        Self {
            address,
            path,
            collector,
            pool: None,
        }
    }

    /// Refresh connection and health gauges from `pool` before each scrape.
    pub fn with_pool(mut self, pool: Arc<BackendPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Bind the listening socket.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.address).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) {
        let address = listener.local_addr().unwrap_or(self.address);
        info!(address = %address, path = %self.path, "metrics server started");

        let state = Arc::new(ServerState {
            path: self.path,
            collector: self.collector,
            pool: self.pool,
        });

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let state = Arc::clone(&state);

                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let state = Arc::clone(&state);
                                    async move { handle_request(req, &state).await }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!(error = %e, "metrics connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept metrics connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("metrics server shutting down");
                    break;
                }
            }
        }
    }
}

/// Handle an incoming metrics request.
async fn handle_request<B>(
    req: Request<B>,
    state: &ServerState,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();
    let method = req.method();

    debug!(path = %path, method = %method, "metrics request");

    if method != Method::GET {
        return Ok(text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed\n"));
    }

    if path == state.path {
        if let Some(pool) = &state.pool {
            state.collector.observe_pool(&pool.status());
        }

        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, state.collector.registry()) {
            error!(error = %e, "failed to encode metrics");
            return Ok(text(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics\n",
            ));
        }

        let mut response = text(StatusCode::OK, buffer);
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
        );
        Ok(response)
    } else if path == "/health" || path == "/healthz" {
        Ok(text(StatusCode::OK, "OK\n"))
    } else if path == "/" {
        let body = format!(
            "lbcore metrics server\n\nEndpoints:\n  {} - Prometheus metrics\n  /health - Health check\n",
            state.path
        );
        Ok(text(StatusCode::OK, body))
    } else {
        Ok(text(StatusCode::NOT_FOUND, "Not found\n"))
    }
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}
