use crate::error::Result;
use rsc_storage::{LedgerStore, WriteBatch};
use rsc_types::LedgerEvent;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// Observer notified after a ledger transaction has committed.
///
/// Hooks run inline on the committing task and must not block.
pub trait LedgerHook: Send + Sync {
    fn name(&self) -> &str;

    fn on_commit(&self, event: &LedgerEvent);
}

#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<Arc<dyn LedgerHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, hook: Arc<dyn LedgerHook>) {
        debug!(hook = hook.name(), "Registered ledger hook");
        self.hooks.write().await.push(hook);
    }

    pub async fn dispatch(&self, events: &[LedgerEvent]) {
        if events.is_empty() {
            return;
        }
        let hooks = self.hooks.read().await;
        for event in events {
            for hook in hooks.iter() {
                hook.on_commit(event);
            }
        }
    }

    /// Commit `batch` and, only if it succeeded, deliver its queued events.
    pub async fn commit(&self, store: &dyn LedgerStore, mut batch: WriteBatch) -> Result<()> {
        let events = batch.take_events();
        store.commit(batch).await?;
        self.dispatch(&events).await;
        Ok(())
    }
}

/// Forwards events into an unbounded channel.
pub struct ChannelHook {
    tx: mpsc::UnboundedSender<LedgerEvent>,
}

impl ChannelHook {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LedgerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl LedgerHook for ChannelHook {
    fn name(&self) -> &str {
        "channel"
    }

    fn on_commit(&self, event: &LedgerEvent) {
        // receiver gone means nobody is listening any more
        let _ = self.tx.send(event.clone());
    }
}
