use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::alerts::AlertSink;
use crate::monitor::SiteLocks;
use crate::store::Store;

use super::{IngestOutcome, ingest_heartbeat};

const API_KEY_HEADER: &str = "x-api-key";

/// Serves `GET /api/heartbeat/` for devices and `GET /health`.
pub struct HeartbeatServer<S> {
    store: Store,
    locks: SiteLocks,
    sink: Arc<S>,
}

impl<S: AlertSink + 'static> HeartbeatServer<S> {
    pub fn new(store: Store, locks: SiteLocks, sink: Arc<S>) -> Self {
        Self { store, locks, sink }
    }

    /// Accepts connections until `shutdown` flips.
    pub async fn run(
        self,
        listen: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(listen).await?;
        log::info!("heartbeat_server_listening addr={}", listener.local_addr()?);
        let server = Arc::new(self);

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(error) => {
                        log::warn!("heartbeat_server_accept_failed error={}", error);
                        continue;
                    }
                },
                _ = shutdown.changed() => {
                    log::info!("heartbeat_server_stopped");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let server = server.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.handle_request(req).await) }
                });

                if let Err(error) = http1::Builder::new().serve_connection(io, service).await {
                    log::warn!(
                        "heartbeat_connection_error remote={} error={}",
                        remote_addr,
                        error
                    );
                }
            });
        }
    }

    async fn handle_request(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let path = req.uri().path();
        match path {
            "/health" if req.method() == Method::GET => {
                json_response(StatusCode::OK, json!({ "status": "ok" }))
            }
            "/api/heartbeat/" | "/api/heartbeat" => {
                if req.method() != Method::GET {
                    return json_response(
                        StatusCode::METHOD_NOT_ALLOWED,
                        json!({ "error": "method_not_allowed" }),
                    );
                }
                let api_key = api_key_from(req.uri().query(), req.headers()).unwrap_or_default();
                self.handle_heartbeat(&api_key).await
            }
            _ => json_response(StatusCode::NOT_FOUND, json!({ "error": "not_found" })),
        }
    }

    async fn handle_heartbeat(&self, api_key: &str) -> Response<Full<Bytes>> {
        match ingest_heartbeat(&self.store, &self.locks, &self.sink, api_key, Utc::now()).await {
            Ok(ingested) => outcome_response(&ingested.outcome),
            Err(error) => {
                log::error!("heartbeat_store_failed error={}", error);
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "storage_unavailable" }),
                )
            }
        }
    }
}

/// Query parameter `api_key` wins over the `X-API-Key` header.
fn api_key_from(query: Option<&str>, headers: &HeaderMap) -> Option<String> {
    let from_query = query.and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(name, _)| name == "api_key")
            .map(|(_, value)| value.into_owned())
    });
    from_query.filter(|key| !key.is_empty()).or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    })
}

fn outcome_response(outcome: &IngestOutcome) -> Response<Full<Bytes>> {
    match outcome {
        IngestOutcome::Accepted { received_at } => json_response(
            StatusCode::OK,
            json!({ "status": "ok", "received_at": iso(*received_at) }),
        ),
        IngestOutcome::DuplicateIgnored { last_heartbeat_at } => json_response(
            StatusCode::OK,
            json!({ "status": "duplicate_ignored", "received_at": iso(*last_heartbeat_at) }),
        ),
        IngestOutcome::Rejected => json_response(
            StatusCode::UNAUTHORIZED,
            json!({ "error": "invalid_api_key" }),
        ),
    }
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
