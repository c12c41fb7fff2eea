//! Presence channel
//!
//! Keeps a websocket to the presence service open, feeds roster updates into
//! the store and sends the local user's join/leave announcements. The channel
//! reconnects on unexpected closes with a fixed attempt budget and delay;
//! [`PresenceChannel::shutdown`] closes it for good.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use ringchat_core::presence::{decode_update, encode_announcement};
use ringchat_core::{
    Address, AddressType, Announcement, PresenceConfig, Result, RingchatError, SessionEvent,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::naming::NameResolver;
use crate::store_task::StoreHandle;

const COMMAND_BUFFER_SIZE: usize = 16;

/// Socket state of the presence channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
}

enum ChannelCommand {
    Announce {
        announcement: Announcement,
        sent: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// Local identity as announced on the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPresence {
    pub address: Address,
    pub address_type: AddressType,
}

// ----------------------------------------------------------------------------
// Presence Channel
// ----------------------------------------------------------------------------

pub struct PresenceChannel {
    commands: mpsc::Sender<ChannelCommand>,
    state: watch::Receiver<ChannelState>,
    task: Option<JoinHandle<()>>,
}

impl PresenceChannel {
    /// Spawn the channel task and start connecting
    ///
    /// With a name resolver, lookups are requested after every roster update
    /// whether or not an overlay session exists.
    pub fn open(
        config: PresenceConfig,
        local: Option<LocalPresence>,
        store: StoreHandle,
        names: Option<NameResolver>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let (state_tx, state_rx) = watch::channel(ChannelState::Closed);

        let worker = ChannelWorker {
            config,
            local,
            store,
            names,
            commands: command_rx,
            state: state_tx,
        };
        let task = tokio::spawn(worker.run());

        Self {
            commands: command_tx,
            state: state_rx,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Send a join or leave announcement
    ///
    /// Fails with [`RingchatError::ChannelUnavailable`] unless the socket is
    /// open and a local address is set. Delivery is not confirmed.
    pub async fn announce(&self, announcement: Announcement) -> Result<()> {
        if self.state() != ChannelState::Open {
            return Err(RingchatError::ChannelUnavailable);
        }
        let (sent_tx, sent_rx) = oneshot::channel();
        self.commands
            .send(ChannelCommand::Announce {
                announcement,
                sent: sent_tx,
            })
            .await
            .map_err(|_| RingchatError::ChannelUnavailable)?;
        sent_rx.await.map_err(|_| RingchatError::ChannelUnavailable)?
    }

    /// Close the socket and suppress any further reconnects
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(ChannelCommand::Shutdown).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PresenceChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Worker
// ----------------------------------------------------------------------------

enum SessionEnd {
    Dropped,
    Shutdown,
}

struct ChannelWorker {
    config: PresenceConfig,
    local: Option<LocalPresence>,
    store: StoreHandle,
    names: Option<NameResolver>,
    commands: mpsc::Receiver<ChannelCommand>,
    state: watch::Sender<ChannelState>,
}

impl ChannelWorker {
    async fn run(mut self) {
        let mut failures = 0u32;

        loop {
            self.state.send_replace(ChannelState::Connecting);
            debug!(url = %self.config.url, "connecting presence channel");

            match connect_async(self.config.url.as_str()).await {
                Ok((socket, _)) => {
                    failures = 0;
                    self.state.send_replace(ChannelState::Open);
                    info!(url = %self.config.url, "presence channel open");

                    let end = self.serve(socket).await;
                    self.state.send_replace(ChannelState::Closed);
                    if matches!(end, SessionEnd::Shutdown) {
                        info!("presence channel shut down");
                        return;
                    }
                    info!("presence channel dropped");
                }
                Err(e) => {
                    self.state.send_replace(ChannelState::Closed);
                    warn!(url = %self.config.url, "presence connect failed: {}", e);
                }
            }

            failures += 1;
            if failures > self.config.reconnect_attempts {
                warn!(
                    attempts = self.config.reconnect_attempts,
                    "presence reconnect budget exhausted"
                );
                return;
            }
            if self.wait_before_retry(self.config.reconnect_interval()).await {
                return;
            }
        }
    }

    /// Sleep until the next attempt; returns true if shut down meanwhile
    async fn wait_before_retry(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                command = self.commands.recv() => match command {
                    Some(ChannelCommand::Announce { sent, .. }) => {
                        let _ = sent.send(Err(RingchatError::ChannelUnavailable));
                    }
                    Some(ChannelCommand::Shutdown) | None => return true,
                },
            }
        }
    }

    async fn serve<S>(&mut self, socket: S) -> SessionEnd
    where
        S: futures::Stream<Item = tokio_tungstenite::tungstenite::Result<Message>>
            + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin,
    {
        let (mut write, mut read) = socket.split();

        if self.config.visible {
            if let Some(frame) = self.frame(Announcement::Join) {
                if let Err(e) = write.send(Message::Text(frame)).await {
                    warn!("presence join announcement failed: {}", e);
                    return SessionEnd::Dropped;
                }
            }
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ChannelCommand::Announce { announcement, sent }) => {
                        let result = match self.frame(announcement) {
                            Some(frame) => write
                                .send(Message::Text(frame))
                                .await
                                .map_err(RingchatError::transport),
                            None => Err(RingchatError::ChannelUnavailable),
                        };
                        let _ = sent.send(result);
                    }
                    Some(ChannelCommand::Shutdown) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                },
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text).await,
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Dropped,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("presence socket error: {}", e);
                        return SessionEnd::Dropped;
                    }
                },
            }
        }
    }

    fn frame(&self, announcement: Announcement) -> Option<String> {
        let local = self.local.as_ref()?;
        match encode_announcement(&local.address, local.address_type, announcement) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("failed to encode announcement: {}", e);
                None
            }
        }
    }

    async fn handle_frame(&self, text: &str) {
        match decode_update(text) {
            Ok(update) => {
                if let Err(e) = self.store.dispatch(SessionEvent::from(update)).await {
                    debug!("presence update dropped: {}", e);
                    return;
                }
                if let Some(names) = &self.names {
                    names.request();
                }
            }
            Err(e) => debug!("ignoring presence frame: {}", e),
        }
    }
}
