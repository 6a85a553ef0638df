//! WebSocket transport.
//!
//! One socket per session. Subscriptions are multiplexed over it by channel
//! name: the client sends `{"action":"subscribe","channel":…}` frames and
//! the gateway fans events back as `{"channel":…,"event":…}` frames. The
//! reader task routes incoming events to per-subscription buffers; anything
//! unroutable or malformed is dropped with a debug log.
//!
//! The transport never redials on its own. Socket loss flips the
//! connectivity watch to `false`; the host calls [`WsChannels::reconnect`]
//! when it wants to try again, and the subscription manager re-opens the
//! streams once connectivity returns.

use std::sync::Arc;

use async_trait::async_trait;
use banter_core::events::PushEvent;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{ChannelError, ChannelName, EventChannels, Subscription};

const OUTBOUND_BUFFER: usize = 32;

/// Configuration for the WebSocket transport.
#[derive(Clone, Debug)]
pub struct WsConfig {
    /// Gateway endpoint.
    pub url: String,
    /// Bound of each subscription's event buffer.
    pub event_buffer: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9330/ws".to_owned(),
            event_buffer: 64,
        }
    }
}

/// Frames the client sends to the gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Start receiving events for a channel.
    Subscribe {
        /// Channel to open.
        channel: ChannelName,
    },
    /// Stop receiving events for a channel.
    Unsubscribe {
        /// Channel to close.
        channel: ChannelName,
    },
}

/// Frames the gateway sends to the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    /// Channel the event belongs to.
    pub channel: ChannelName,
    /// Raw event payload; validated by [`PushEvent::from_value`] before it
    /// reaches anyone.
    pub event: serde_json::Value,
}

/// WebSocket [`EventChannels`] implementation.
pub struct WsChannels {
    config: WsConfig,
    routes: DashMap<ChannelName, mpsc::Sender<PushEvent>>,
    outbound: Mutex<Option<mpsc::Sender<ClientFrame>>>,
    connected: watch::Sender<bool>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl WsChannels {
    /// Dial the gateway and start the socket tasks.
    pub async fn connect(config: WsConfig) -> Result<Arc<Self>, ChannelError> {
        let (connected, _) = watch::channel(false);
        let this = Arc::new(Self {
            config,
            routes: DashMap::new(),
            outbound: Mutex::new(None),
            connected,
            cancel: Mutex::new(None),
        });
        this.dial().await?;
        Ok(this)
    }

    /// Dial again after the socket was lost.
    ///
    /// Does not replay subscriptions: their routes died with the old socket
    /// and the subscription manager re-opens them when it sees connectivity
    /// come back. Safe to call while already connected (the old socket is
    /// torn down first).
    pub async fn reconnect(self: &Arc<Self>) -> Result<(), ChannelError> {
        self.dial().await
    }

    async fn dial(self: &Arc<Self>) -> Result<(), ChannelError> {
        let (stream, _response) = tokio_tungstenite::connect_async(self.config.url.as_str())
            .await
            .map_err(|error| {
                let _ = self.connected.send(false);
                ChannelError::Handshake(error.to_string())
            })?;

        // Tear down any previous socket; its routes are dead now.
        if let Some(previous) = self.cancel.lock().take() {
            previous.cancel();
        }
        self.routes.clear();

        let cancel = CancellationToken::new();
        *self.cancel.lock() = Some(cancel.clone());

        let (mut ws_tx, mut ws_rx) = stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<ClientFrame>(OUTBOUND_BUFFER);
        *self.outbound.lock() = Some(out_tx);
        let _ = self.connected.send(true);

        // Writer task: serialize control frames onto the socket.
        let writer_cancel = cancel.clone();
        let writer_connected = self.connected.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = writer_cancel.cancelled() => break,
                    frame = out_rx.recv() => {
                        let Some(frame) = frame else { break };
                        let Ok(text) = serde_json::to_string(&frame) else { continue };
                        if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                            let _ = writer_connected.send(false);
                            break;
                        }
                    }
                }
            }
        });

        // Reader task: route event frames to subscriptions.
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    message = ws_rx.next() => match message {
                        Some(Ok(WsMessage::Text(text))) => this.route_frame(text.as_str()),
                        Some(Ok(WsMessage::Close(_))) | None => {
                            debug!("socket closed by peer");
                            let _ = this.connected.send(false);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            debug!(%error, "socket read error");
                            let _ = this.connected.send(false);
                            break;
                        }
                    }
                }
            }
        });

        Ok(())
    }

    fn route_frame(&self, raw: &str) {
        let Ok(frame) = serde_json::from_str::<ServerFrame>(raw) else {
            debug!("dropping malformed server frame");
            return;
        };
        let Some(event) = PushEvent::from_value(frame.event) else {
            return;
        };
        let route = self.routes.get(&frame.channel).map(|r| r.value().clone());
        match route {
            Some(tx) => match tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    counter!("channel_event_drops_total").increment(1);
                    tracing::warn!(channel = %frame.channel, "subscription buffer full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    let _ = self.routes.remove(&frame.channel);
                }
            },
            None => {
                debug!(channel = %frame.channel, "no subscription for channel, dropping event");
            }
        }
    }

    async fn send_frame(&self, frame: ClientFrame) -> Result<(), ChannelError> {
        let outbound = self.outbound.lock().clone();
        match outbound {
            Some(tx) => tx.send(frame).await.map_err(|_| ChannelError::Disconnected),
            // the slot is only ever emptied by shutdown
            None => Err(ChannelError::Closed),
        }
    }
}

#[async_trait]
impl EventChannels for WsChannels {
    async fn subscribe(&self, channel: &ChannelName) -> Result<Subscription, ChannelError> {
        if !*self.connected.borrow() {
            return Err(ChannelError::Disconnected);
        }
        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        let _ = self.routes.insert(channel.clone(), tx);
        if let Err(error) = self
            .send_frame(ClientFrame::Subscribe {
                channel: channel.clone(),
            })
            .await
        {
            let _ = self.routes.remove(channel);
            return Err(error);
        }
        Ok(Subscription::new(channel.clone(), rx))
    }

    async fn unsubscribe(&self, channel: &ChannelName) -> Result<(), ChannelError> {
        let _ = self.routes.remove(channel);
        self.send_frame(ClientFrame::Unsubscribe {
            channel: channel.clone(),
        })
        .await
    }

    async fn shutdown(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        *self.outbound.lock() = None;
        self.routes.clear();
        let _ = self.connected.send(false);
    }

    fn connectivity(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }
}
