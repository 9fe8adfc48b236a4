// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! JSON-over-HTTP front for an [`AddressDirectory`].

pub mod validation;

use anyhow::{Result, anyhow, bail};
use ktovet_app::AddressDirectory;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tiny_http::{Header, Response, Server};

pub use validation::{ApiError, ApiResult, parse_city_symbol, parse_page};

pub const MAX_WORKERS: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: impl Serialize) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status: 200, body },
            Err(error) => {
                log::error!("serialize response: {error}");
                Self::error(ApiError::internal("Failed to encode response"))
            }
        }
    }

    fn error(error: ApiError) -> Self {
        let body = serde_json::json!({
            "error": error.error,
            "message": error.message,
        });
        Self {
            status: error.status,
            body,
        }
    }
}

/// Dispatches one request. Kept free of any socket so it can be tested
/// directly.
pub fn route(method: &str, url: &str, directory: &dyn AddressDirectory) -> ApiResponse {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let params = query_params(query);

    let result = match (method, path.trim_end_matches('/')) {
        ("GET", "/cities") => cities(&params, directory),
        ("GET", "/streets") => streets(&params, directory),
        ("GET", "/health") => health(directory),
        (_, "/cities" | "/streets" | "/health") => Err(ApiError::method_not_allowed(method)),
        _ => Err(ApiError::not_found(path)),
    };

    let response = match result {
        Ok(response) => response,
        Err(error) => ApiResponse::error(error),
    };
    log::debug!("{method} {url} -> {}", response.status);
    response
}

fn cities(
    params: &HashMap<String, String>,
    directory: &dyn AddressDirectory,
) -> ApiResult<ApiResponse> {
    let search = params.get("search").map(String::as_str).unwrap_or_default();
    let page = parse_page(params.get("page").map(String::as_str))?;

    match directory.search_cities(search, page) {
        Ok(result) => Ok(ApiResponse::ok(result)),
        Err(error) => {
            log::error!("city search {search:?} page {page} failed: {error:#}");
            Err(ApiError::internal("Failed to fetch cities"))
        }
    }
}

fn streets(
    params: &HashMap<String, String>,
    directory: &dyn AddressDirectory,
) -> ApiResult<ApiResponse> {
    let city = parse_city_symbol(params.get("citySymbol").map(String::as_str))?;
    let search = params.get("search").map(String::as_str).unwrap_or_default();
    let page = parse_page(params.get("page").map(String::as_str))?;

    match directory.search_streets(Some(city), search, page) {
        Ok(result) => Ok(ApiResponse::ok(result)),
        Err(error) => {
            log::error!("street search {search:?} in city {city} page {page} failed: {error:#}");
            Err(ApiError::internal("Failed to fetch streets"))
        }
    }
}

fn health(directory: &dyn AddressDirectory) -> ApiResult<ApiResponse> {
    match directory.ping() {
        Ok(()) => Ok(ApiResponse::ok(serde_json::json!({"status": "ok"}))),
        Err(error) => {
            log::error!("health check failed: {error:#}");
            Err(ApiError::unavailable("Database connection failed"))
        }
    }
}

/// Query string pairs. Repeated keys keep their first value.
fn query_params(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    params
}

/// A running listener. Dropping the handle leaves the workers running;
/// call [`ServerHandle::shutdown`] to stop them.
pub struct ServerHandle {
    server: Arc<Server>,
    addr: String,
    workers: Vec<JoinHandle<Result<()>>>,
}

impl ServerHandle {
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Blocks until every worker exits. Fails if the listener itself failed.
    pub fn join(self) -> Result<()> {
        let mut outcome = Ok(());
        for worker in self.workers {
            let result = worker
                .join()
                .map_err(|_| anyhow!("server worker panicked"))
                .and_then(|result| result);
            if outcome.is_ok() {
                outcome = result;
            }
        }
        outcome
    }

    pub fn shutdown(self) -> Result<()> {
        for _ in 0..self.workers.len() {
            self.server.unblock();
        }
        self.join()
    }
}

pub fn start(
    listen: &str,
    directory: Arc<dyn AddressDirectory + Send + Sync>,
    workers: usize,
) -> Result<ServerHandle> {
    if workers == 0 || workers > MAX_WORKERS {
        bail!("server workers must be between 1 and {MAX_WORKERS}, got {workers}");
    }
    let server = Server::http(listen).map_err(|error| {
        anyhow!("listen on {listen}: {error}; pick a free address with [server] listen in the config")
    })?;
    let server = Arc::new(server);
    let addr = server.server_addr().to_string();
    log::info!("listening on http://{addr} with {workers} workers");

    let count = workers;
    let workers = (0..count)
        .map(|index| {
            let server = Arc::clone(&server);
            let directory = Arc::clone(&directory);
            thread::Builder::new()
                .name(format!("ktovet-http-{index}"))
                .spawn(move || serve_requests(&server, directory.as_ref(), count))
                .map_err(|error| anyhow!("spawn server worker: {error}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ServerHandle {
        server,
        addr,
        workers,
    })
}

fn serve_requests(
    server: &Server,
    directory: &(dyn AddressDirectory + Send + Sync),
    workers: usize,
) -> Result<()> {
    loop {
        let request = match server.recv() {
            Ok(request) => request,
            Err(error) if is_unblocked(&error) => {
                log::debug!("listener stopped");
                return Ok(());
            }
            Err(error) => return Err(listener_failed(server, workers, error)),
        };

        let response = route(request.method().as_str(), request.url(), directory);
        let mut reply =
            Response::from_string(response.body.to_string()).with_status_code(response.status);
        if let Ok(header) = Header::from_bytes("Content-Type", "application/json; charset=utf-8") {
            reply = reply.with_header(header);
        }
        if let Err(error) = request.respond(reply) {
            log::warn!("write response: {error}");
        }
    }
}

// tiny_http reports a deliberate `unblock()` with this exact error.
fn is_unblocked(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::Other && error.to_string() == "thread unblocked"
}

/// The acceptor is gone once it reports an error, so wake the sibling
/// workers instead of leaving them parked in `recv`.
fn listener_failed(server: &Server, workers: usize, error: io::Error) -> anyhow::Error {
    log::error!("listener failed: {error}");
    for _ in 1..workers {
        server.unblock();
    }
    anyhow!("http listener failed: {error}; restart `ktovet --serve`")
}
