#![allow(dead_code)]

pub mod mocks;

use mocks::{EngineLog, MockEngine, MockSink, SinkLog};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use watchpoint::Config;
use watchpoint::events::SessionOutput;
use watchpoint::player::{EngineEvent, SessionController, SessionHandle};
use watchpoint::services::ProgressSync;
use watchpoint::store::{DEFAULT_TABLE, MemoryStore, OpKind};

/// Wait for an async condition to become true
pub async fn wait_for_async<F, Fut>(mut condition: F, max_wait: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();

    while start.elapsed() < max_wait {
        if condition().await {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }

    false
}

/// Let spawned tasks run until they block
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.progress.save_interval_seconds = 10;
    config.thumbnails.fetch_timeout_seconds = 5;
    config
}

pub fn sync_for(store: &Arc<MemoryStore>, config: &Config) -> ProgressSync {
    ProgressSync::new(store.clone(), &config.progress, DEFAULT_TABLE)
}

/// A running session controller wired to mock engine and sink
pub struct Harness {
    pub handle: SessionHandle,
    pub outputs: mpsc::UnboundedReceiver<SessionOutput>,
    pub engine: Arc<Mutex<EngineLog>>,
    pub sink: Arc<Mutex<SinkLog>>,
    pub store: Arc<MemoryStore>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn start(store: Arc<MemoryStore>) -> Self {
        Self::start_with(store, test_config())
    }

    pub fn start_with(store: Arc<MemoryStore>, config: Config) -> Self {
        let engine = MockEngine::default();
        let sink = MockSink::default();
        let engine_log = engine.log();
        let sink_log = sink.log();

        let sync = sync_for(&store, &config);
        let (handle, controller) =
            SessionController::new(&config, sync, Box::new(engine), Box::new(sink));
        let outputs = handle
            .take_output_receiver()
            .expect("output receiver already taken");
        let task = tokio::spawn(controller.run());

        Self {
            handle,
            outputs,
            engine: engine_log,
            sink: sink_log,
            store,
            task,
        }
    }

    /// Send an engine event on the most recent attach
    pub fn emit(&self, event: EngineEvent) -> bool {
        let events = self
            .engine
            .lock()
            .unwrap()
            .events
            .last()
            .cloned()
            .expect("nothing attached");
        events.emit(event)
    }

    pub fn drain_outputs(&mut self) -> Vec<SessionOutput> {
        let mut outputs = Vec::new();
        while let Ok(output) = self.outputs.try_recv() {
            outputs.push(output);
        }
        outputs
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.sink.lock().unwrap().seeks()
    }

    pub async fn unmount(self) -> Arc<MemoryStore> {
        self.handle.unmount().await.expect("unmount");
        self.task.await.expect("controller task");
        self.store
    }
}

pub async fn wait_for_ops(store: &Arc<MemoryStore>, kind: OpKind, count: usize) -> bool {
    wait_for_async(
        || {
            let store = store.clone();
            async move { store.op_count(kind).await >= count }
        },
        Duration::from_secs(2),
    )
    .await
}
