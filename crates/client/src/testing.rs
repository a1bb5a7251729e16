//! Test doubles for code that drives the sync engine.
//!
//! Compiled for tests and with the `testing` feature only.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::transport::{Method, Transport, TransportRequest, TransportResponse};

type Handler = Arc<dyn Fn(&TransportRequest) -> TransportResponse + Send + Sync>;
type RouteKey = (Method, String);

/// Scripted in-process transport.
///
/// Responses are looked up by `(method, path)`: one-shot responses are used
/// first (FIFO), then the sticky handler. Unscripted routes answer with a
/// network failure. Every request is recorded.
#[derive(Default)]
pub struct StubTransport {
    once: Mutex<HashMap<RouteKey, VecDeque<TransportResponse>>>,
    handlers: Mutex<HashMap<RouteKey, Handler>>,
    holds: Mutex<HashMap<RouteKey, Arc<Semaphore>>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request to the route with `response`.
    pub fn respond(&self, method: Method, path: &str, response: TransportResponse) {
        self.respond_with(method, path, move |_| response.clone());
    }

    /// Answer the next request to the route with `response`.
    pub fn respond_once(&self, method: Method, path: &str, response: TransportResponse) {
        let mut once = lock(&self.once);
        once.entry((method, path.to_string()))
            .or_default()
            .push_back(response);
    }

    /// Compute the answer from the request (e.g. echo uploaded ids).
    pub fn respond_with<F>(&self, method: Method, path: &str, handler: F)
    where
        F: Fn(&TransportRequest) -> TransportResponse + Send + Sync + 'static,
    {
        lock(&self.handlers).insert((method, path.to_string()), Arc::new(handler));
    }

    /// Block requests to the route until the returned semaphore gets permits.
    pub fn hold(&self, method: Method, path: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        lock(&self.holds).insert((method, path.to_string()), gate.clone());
        gate
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self, method: Method, path: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl Transport for StubTransport {
    async fn request(&self, request: TransportRequest) -> TransportResponse {
        let key = (request.method, request.path.clone());
        lock(&self.requests).push(request.clone());

        let gate = lock(&self.holds).get(&key).cloned();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if let Some(response) = lock(&self.once).get_mut(&key).and_then(VecDeque::pop_front) {
            return response;
        }
        let handler = lock(&self.handlers).get(&key).cloned();
        match handler {
            Some(handler) => handler(&request),
            None => TransportResponse::network_error(format!(
                "no stub for {} {}",
                request.method.as_str(),
                request.path
            )),
        }
    }
}
