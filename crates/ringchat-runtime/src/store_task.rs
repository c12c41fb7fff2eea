//! Store task
//!
//! Owns the [`SessionStore`] inside a single tokio task. Every producer (poller,
//! inbound listener, presence channel, name resolver, UI) sends events over a
//! channel, so dispatches are applied strictly one after another. Readers get
//! the latest snapshot through a `watch` channel.
//!
//! The published `Arc` is the only copy of the store. It is mutated in place
//! and cloned only while a reader still holds an older snapshot.

use std::sync::Arc;

use ringchat_core::{Result, RingchatError, SessionEvent, SessionStore};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Snapshot of the store published after each dispatch
pub type SessionView = Arc<SessionStore>;

const STORE_BUFFER_SIZE: usize = 128;

enum StoreCommand {
    Apply {
        event: SessionEvent,
        applied: Option<oneshot::Sender<()>>,
    },
}

// ----------------------------------------------------------------------------
// Store Handle
// ----------------------------------------------------------------------------

/// Cloneable handle to the store task
#[derive(Clone)]
pub struct StoreHandle {
    commands: mpsc::Sender<StoreCommand>,
    view: watch::Receiver<SessionView>,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl StoreHandle {
    /// Spawn the store task with an empty store
    pub fn spawn() -> (Self, JoinHandle<()>) {
        Self::spawn_with(SessionStore::new())
    }

    /// Spawn the store task seeded with existing state
    pub fn spawn_with(store: SessionStore) -> (Self, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(STORE_BUFFER_SIZE);
        let (view_tx, view_rx) = watch::channel(Arc::new(store));

        let task = tokio::spawn(run_store(command_rx, view_tx));

        (
            Self {
                commands: command_tx,
                view: view_rx,
            },
            task,
        )
    }

    /// Apply an event and wait until the new view is published
    pub async fn dispatch(&self, event: SessionEvent) -> Result<()> {
        let (applied_tx, applied_rx) = oneshot::channel();
        self.commands
            .send(StoreCommand::Apply {
                event,
                applied: Some(applied_tx),
            })
            .await
            .map_err(|_| RingchatError::StoreClosed)?;
        applied_rx.await.map_err(|_| RingchatError::StoreClosed)
    }

    /// Queue an event without waiting for it to be applied
    pub fn try_dispatch(&self, event: SessionEvent) -> Result<()> {
        self.commands
            .try_send(StoreCommand::Apply {
                event,
                applied: None,
            })
            .map_err(|_| RingchatError::StoreClosed)
    }

    /// Latest published view
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Receiver notified after every applied event
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }
}

async fn run_store(mut commands: mpsc::Receiver<StoreCommand>, view: watch::Sender<SessionView>) {
    debug!("store task starting");

    while let Some(command) = commands.recv().await {
        match command {
            StoreCommand::Apply { event, applied } => {
                view.send_modify(|current| Arc::make_mut(current).apply(event));
                if let Some(applied) = applied {
                    let _ = applied.send(());
                }
            }
        }
    }

    info!("all store handles dropped, store task exiting");
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
