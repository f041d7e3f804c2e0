//! Wand session
//! This module provides the main interface to a single wand: it drives the
//! connection, folds notifications into the wand state and fans state changes
//! out to callbacks.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::session_config::SessionConfig;
use crate::core::bluetooth::callbacks::{CallbackHandle, CallbackRegistry};
use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::device::WandDevice;
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::transport::{EventSink, LinkEvent, Transport};
use crate::core::bluetooth::types::{ConnectionState, DisconnectKind};
use crate::core::wand::WandState;
use crate::error::WandError;

/// A session with one wand.
///
/// Must be created inside a Tokio runtime: link events are processed on a task
/// spawned by [`WandSession::new`] and stopped when the session is dropped.
pub struct WandSession<T: Transport> {
    connection: Arc<ConnectionManager<T>>,
    notifications: NotificationHandler,
    callbacks: CallbackRegistry,
    event_loop: JoinHandle<()>,
}

impl<T: Transport> WandSession<T> {
    /// Creates a session for `device`. Nothing is connected until [`update`](Self::update).
    pub fn new(transport: T, device: WandDevice, config: SessionConfig) -> Self {
        let (events, receiver) = EventSink::channel();
        let connection = Arc::new(ConnectionManager::new(
            transport,
            device,
            config.disconnect_delay(),
            events,
        ));
        let callbacks = CallbackRegistry::new();
        let notifications = NotificationHandler::new(callbacks.clone());

        let event_loop = tokio::spawn(Self::process_events(
            receiver,
            connection.clone(),
            notifications.clone(),
        ));

        Self {
            connection,
            notifications,
            callbacks,
            event_loop,
        }
    }

    /// Drains link events in arrival order.
    async fn process_events(
        mut receiver: mpsc::UnboundedReceiver<LinkEvent>,
        connection: Arc<ConnectionManager<T>>,
        notifications: NotificationHandler,
    ) {
        while let Some(event) = receiver.recv().await {
            match event {
                LinkEvent::Notification { link, channel, payload } => {
                    trace!("{} notification on {}: {:02x?}", link, channel, payload);
                    notifications.handle(channel, &payload);
                }
                LinkEvent::Disconnected { link } => connection.handle_disconnected(link),
                LinkEvent::IdleDeadline { generation } => {
                    connection.execute_timed_disconnect(generation).await
                }
            }
        }
        debug!("Link event stream ended");
    }

    /// Makes sure the wand is connected and subscribed, reconnecting if needed.
    ///
    /// Spell and battery updates arrive asynchronously afterwards.
    pub async fn update(&self) -> Result<(), WandError> {
        self.connection.ensure_connected().await?;
        debug!("{}: Updating", self.name());
        Ok(())
    }

    /// Stops listening for wand updates and disconnects.
    pub async fn stop(&self) {
        debug!("{}: Stop", self.name());
        self.connection.disconnect_now().await;
    }

    /// Writes raw bytes to the wand's command channel.
    pub async fn send_command(&self, data: &[u8]) -> Result<(), WandError> {
        self.connection.write_command(data).await
    }

    /// Registers a callback that receives every new state snapshot.
    pub fn register_callback<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&WandState) + Send + Sync + 'static,
    {
        self.callbacks.register(callback)
    }

    /// Replaces the cached device and advertisement data.
    pub fn set_device(&self, device: WandDevice) {
        self.connection.set_device(device);
    }

    pub fn address(&self) -> String {
        self.connection.device().address
    }

    /// The advertised name, or the address when the device has none.
    pub fn name(&self) -> String {
        self.connection.device().display_name().to_string()
    }

    /// RSSI from the cached advertisement, `None` when unknown.
    pub fn rssi(&self) -> Option<i16> {
        self.connection.device().rssi
    }

    pub fn state(&self) -> WandState {
        self.notifications.state()
    }

    pub fn last_spell(&self) -> String {
        self.notifications.state().last_spell
    }

    pub fn battery_level(&self) -> u32 {
        self.notifications.state().battery_level
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    pub fn last_disconnect(&self) -> Option<DisconnectKind> {
        self.connection.last_disconnect()
    }

    pub fn disconnect_delay(&self) -> Duration {
        self.connection.disconnect_delay()
    }
}

impl<T: Transport> Drop for WandSession<T> {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}
