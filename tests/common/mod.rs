//! Shared fake engine for session and server tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use watchbridge::{ChangeKind, EventSink, Subscription, WatchEngine, WatchError, WatchPattern};

/// Engine that hands every sink back to the test instead of watching disk.
#[derive(Default)]
pub struct FakeEngine {
    sinks: Mutex<Vec<(String, EventSink)>>,
    disposed: Arc<AtomicUsize>,
}

struct FakeSubscription(Arc<AtomicUsize>);

impl Subscription for FakeSubscription {
    fn dispose(self: Box<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl WatchEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn watch(
        &self,
        pattern: &WatchPattern,
        sink: EventSink,
    ) -> Result<Box<dyn Subscription>, WatchError> {
        self.sinks.lock().unwrap().push((pattern.glob(), sink));
        Ok(Box::new(FakeSubscription(self.disposed.clone())))
    }
}

impl FakeEngine {
    pub fn watched(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    pub fn glob(&self, index: usize) -> String {
        self.sinks.lock().unwrap()[index].0.clone()
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn emit(&self, index: usize, change: ChangeKind, path: &str) -> bool {
        let sink = self.sinks.lock().unwrap()[index].1.clone();
        sink.emit(change, PathBuf::from(path))
    }

    /// Wait until the session has registered `count` subscriptions.
    pub async fn wait_for_watches(&self, count: usize) {
        wait_until(|| self.watched() >= count).await;
    }

    /// Wait until `count` subscriptions have been disposed.
    pub async fn wait_for_disposed(&self, count: usize) {
        wait_until(|| self.disposed() >= count).await;
    }
}

async fn wait_until(mut ready: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !ready() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
