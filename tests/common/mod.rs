//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use brrtmediator::services::{ServiceContainer, ServiceProvider};
use brrtmediator::{
    check_cancelled, Dispatcher, ErasedResponse, HandlerRegistry, Next, PipelineBehavior, Request,
    RequestContext, RequestHandler,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary. `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Ordered record of what ran, shared by handlers and behaviors of a test.
#[derive(Default)]
pub struct CallLog {
    entries: Mutex<Vec<String>>,
}

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.lock().iter().any(|e| e == entry)
    }
}

#[derive(Request)]
#[request(response = String)]
pub struct Echo {
    pub msg: String,
}

impl Echo {
    pub fn new(msg: &str) -> Self {
        Self { msg: msg.to_string() }
    }
}

/// Returns the message unchanged and logs `H`.
pub struct EchoHandler {
    pub log: Arc<CallLog>,
}

#[async_trait]
impl RequestHandler<Echo> for EchoHandler {
    async fn handle(&self, req: &Echo, cancel: &CancellationToken) -> anyhow::Result<String> {
        check_cancelled(cancel)?;
        self.log.push("H");
        Ok(req.msg.clone())
    }
}

/// Behavior logging `<TAG>-enter` and `<TAG>-exit` around the rest of the chain.
pub struct Recording<const TAG: char> {
    pub log: Arc<CallLog>,
}

#[async_trait]
impl<const TAG: char> PipelineBehavior for Recording<TAG> {
    async fn handle(&self, _ctx: RequestContext<'_>, next: Next<'_>) -> anyhow::Result<ErasedResponse> {
        self.log.push(format!("{}-enter", TAG));
        let result = next.run().await;
        self.log.push(format!("{}-exit", TAG));
        result
    }
}

/// Counts instances created by a factory.
#[derive(Default)]
pub struct Counter(AtomicUsize);

impl Counter {
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn dispatcher(registry: HandlerRegistry, services: ServiceContainer) -> (Dispatcher, Arc<ServiceContainer>) {
    init_tracing();
    let services = Arc::new(services);
    let dispatcher = Dispatcher::new(Arc::new(registry), Arc::clone(&services) as Arc<dyn ServiceProvider>);
    (dispatcher, services)
}
