//! Purpose: In-process fake counting endpoint for integration tests.
//! Role: Serves GET (read) and POST (increment) on loopback with plain-text bodies.
//! Invariants: Bound to 127.0.0.1 on an ephemeral port; stopped on drop.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;

pub const ENDPOINT_PATH: &str = "/prod/visitor";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Ok,
    Status(u16),
    Garbage,
}

struct FakeState {
    count: AtomicU64,
    gets: AtomicUsize,
    posts: AtomicUsize,
    mode: Mutex<Mode>,
}

pub struct FakeCounter {
    url: String,
    state: Arc<FakeState>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl FakeCounter {
    pub fn start(initial: u64) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.set_nonblocking(true).expect("nonblocking");
        let addr = listener.local_addr().expect("addr");

        let state = Arc::new(FakeState {
            count: AtomicU64::new(initial),
            gets: AtomicUsize::new(0),
            posts: AtomicUsize::new(0),
            mode: Mutex::new(Mode::Ok),
        });
        let app = Router::new()
            .route(ENDPOINT_PATH, get(read_count).post(increment))
            .with_state(Arc::clone(&state));

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("listener");
                let _ = axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await;
            });
        });

        Self {
            url: format!("http://{addr}{ENDPOINT_PATH}"),
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.state.mode.lock().expect("mode") = mode;
    }

    pub fn count(&self) -> u64 {
        self.state.count.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.state.gets.load(Ordering::SeqCst)
    }

    pub fn posts(&self) -> usize {
        self.state.posts.load(Ordering::SeqCst)
    }
}

impl Drop for FakeCounter {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn read_count(State(state): State<Arc<FakeState>>) -> Response {
    state.gets.fetch_add(1, Ordering::SeqCst);
    reply(&state, state.count.load(Ordering::SeqCst))
}

async fn increment(State(state): State<Arc<FakeState>>) -> Response {
    state.posts.fetch_add(1, Ordering::SeqCst);
    let mode = *state.mode.lock().expect("mode");
    if mode != Mode::Ok {
        return reply(&state, 0);
    }
    let count = state.count.fetch_add(1, Ordering::SeqCst) + 1;
    reply(&state, count)
}

fn reply(state: &FakeState, count: u64) -> Response {
    let mode = *state.mode.lock().expect("mode");
    match mode {
        Mode::Ok => count.to_string().into_response(),
        Mode::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, "0").into_response()
        }
        Mode::Garbage => "<html>gateway</html>".into_response(),
    }
}

/// A loopback URL nothing is listening on.
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}{ENDPOINT_PATH}")
}
