//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;

use marquee::config::Config;
use marquee::http::ApiServer;
use marquee::lifecycle::{ShutdownError, ShutdownHandle};
use marquee::store::{MailError, Mailer, MemoryStore, User};
use marquee::tasks::TaskTracker;

/// Mailer that records every send for later inspection.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(i64, String)>>,
}

impl RecordingMailer {
    /// Snapshot of (user id, activation token) pairs sent so far.
    #[allow(dead_code)]
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    fn send_welcome(&self, user: &User, activation_token: &str) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap()
            .push((user.id, activation_token.to_string()));
        Ok(())
    }
}

// each test binary uses a different subset of the fields
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub tasks: TaskTracker,
    pub shutdown: ShutdownHandle,
    /// The running serve loop; resolves with the terminal shutdown outcome.
    pub run: tokio::task::JoinHandle<Result<(), ShutdownError>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start a server on an ephemeral port backed by a fresh in-memory store.
pub async fn start_server(config: Config) -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = ApiServer::new(config, store.clone(), store.clone(), mailer.clone());
    let tasks = server.tasks();
    let shutdown = server.shutdown_handle();

    let run = tokio::spawn(server.run(listener));

    TestServer {
        addr,
        store,
        mailer,
        tasks,
        shutdown,
        run,
    }
}

/// Non-pooled client so each request opens a distinct connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
