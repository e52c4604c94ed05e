//! Mock collaborators shared by the engine scenario tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use monitor_lib::catalog::StaticCatalog;
use monitor_lib::invoker::RetryPolicy;
use monitor_lib::probe::{Notifier, ProbeExecutor, StatusSink, StoragePathSource, TargetCatalog};
use monitor_lib::state::ManualClock;
use monitor_lib::{
    Config, LatencyThresholds, Level, Mode, Monitor, NetworkTarget, Protocol, StorageKind,
    StoragePathTarget,
};
use tokio::sync::{watch, Notify};

#[derive(Debug, Clone)]
pub enum Reply {
    Latency(f64),
    Fail(String),
}

/// Executor answering from a per-host table, optionally holding some hosts
/// until the gate opens
pub struct MockExecutor {
    replies: Mutex<HashMap<String, Reply>>,
    gated: Mutex<HashSet<String>>,
    gate: watch::Sender<bool>,
    pub entered: Notify,
    calls: AtomicUsize,
    per_host: Mutex<HashMap<String, usize>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            replies: Mutex::new(HashMap::new()),
            gated: Mutex::new(HashSet::new()),
            gate,
            entered: Notify::new(),
            calls: AtomicUsize::new(0),
            per_host: Mutex::new(HashMap::new()),
        }
    }

    pub fn reply(self, host: &str, reply: Reply) -> Self {
        self.set_reply(host, reply);
        self
    }

    pub fn set_reply(&self, host: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(host.to_string(), reply);
    }

    pub fn hold(self, host: &str) -> Self {
        self.gated.lock().unwrap().insert(host.to_string());
        self
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, host: &str) -> usize {
        self.per_host.lock().unwrap().get(host).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ProbeExecutor for MockExecutor {
    async fn probe(&self, hostname: &str, _port: u16, _protocol: Protocol) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .per_host
            .lock()
            .unwrap()
            .entry(hostname.to_string())
            .or_default() += 1;

        let held = self.gated.lock().unwrap().contains(hostname);
        if held {
            self.entered.notify_one();
            let mut rx = self.gate.subscribe();
            rx.wait_for(|open| *open).await?;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(hostname)
            .cloned()
            .unwrap_or(Reply::Latency(20.0));
        match reply {
            Reply::Latency(v) => Ok(v),
            Reply::Fail(msg) => Err(anyhow::anyhow!(msg)),
        }
    }
}

/// Notifier that records every delivery
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
    pub panic: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        if self.panic.load(Ordering::SeqCst) {
            panic!("notifier crashed");
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("notification service unavailable");
        }
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub published: Mutex<Vec<(f64, Level)>>,
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn publish(&self, average_ms: f64, level: Level, _thresholds: &LatencyThresholds) -> Result<()> {
        self.published.lock().unwrap().push((average_ms, level));
        Ok(())
    }
}

pub struct FixedStoragePaths(pub Vec<StoragePathTarget>);

#[async_trait]
impl StoragePathSource for FixedStoragePaths {
    async fn list_storage_paths(&self) -> Result<Vec<StoragePathTarget>> {
        Ok(self.0.clone())
    }
}

pub fn net(id: &str, name: &str, host: &str) -> NetworkTarget {
    let mut target = NetworkTarget::new(id, host);
    target.name = name.to_string();
    target
}

pub fn storage_path(index: usize, host: &str) -> StoragePathTarget {
    StoragePathTarget {
        id: format!("storage-profile-{}", index),
        kind: StorageKind::Profile,
        path: format!(r"\\{}\profiles", host),
        hostname: host.to_string(),
        port: 445,
        muted: false,
    }
}

pub const T0: i64 = 1_700_000_000_000;

pub struct Harness {
    pub monitor: Arc<Monitor>,
    pub executor: Arc<MockExecutor>,
    pub notifier: Arc<RecordingNotifier>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
}

pub struct HarnessBuilder {
    config: Config,
    catalog: StaticCatalog,
    file_catalog: Option<Arc<dyn TargetCatalog>>,
    executor: MockExecutor,
    storage: Vec<StoragePathTarget>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            catalog: StaticCatalog::new(),
            file_catalog: None,
            executor: MockExecutor::new(),
            storage: Vec::new(),
        }
    }

    pub fn config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn targets(mut self, mode: Mode, targets: Vec<NetworkTarget>) -> Self {
        self.catalog = self.catalog.with_mode(mode, targets);
        self
    }

    /// Replaces any targets given through `targets`
    pub fn catalog(mut self, catalog: Arc<dyn TargetCatalog>) -> Self {
        self.file_catalog = Some(catalog);
        self
    }

    pub fn executor(mut self, f: impl FnOnce(MockExecutor) -> MockExecutor) -> Self {
        self.executor = f(self.executor);
        self
    }

    pub fn storage(mut self, paths: Vec<StoragePathTarget>) -> Self {
        self.storage = paths;
        self
    }

    pub fn build(self) -> Harness {
        let executor = Arc::new(self.executor);
        let notifier = Arc::new(RecordingNotifier::default());
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(ManualClock::new(T0));
        let catalog = self
            .file_catalog
            .unwrap_or_else(|| Arc::new(self.catalog));

        let monitor = Monitor::builder()
            .config(self.config)
            .executor(executor.clone())
            .notifier(notifier.clone())
            .status_sink(sink.clone())
            .catalog(catalog)
            .storage_source(Arc::new(FixedStoragePaths(self.storage)))
            .clock(clock.clone())
            .retry_policy(RetryPolicy::immediate(1))
            .node_name("test-node")
            .build()
            .unwrap();

        Harness {
            monitor: Arc::new(monitor),
            executor,
            notifier,
            sink,
            clock,
        }
    }
}
