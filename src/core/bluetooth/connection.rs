//! Bluetooth connection handling for the wand
//! This module owns the link lifecycle: connecting, verifying the characteristics,
//! subscribing, the idle-disconnect deadline and teardown.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::{REQUIRED_CHANNELS, VERIFY_ATTEMPTS, WAND_COMMAND_CHANNEL};
use crate::core::bluetooth::device::WandDevice;
use crate::core::bluetooth::resolver::resolve;
use crate::core::bluetooth::transport::{EventSink, Link, LinkEvent, Transport};
use crate::core::bluetooth::types::{
    Channel, ConnectionState, DisconnectKind, LinkId, ResolvedCharacteristics,
};
use crate::error::{TransportError, WandError};

type Resolved<L> = ResolvedCharacteristics<<L as Link>::Characteristic>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The live link and what was resolved on it.
struct LinkSlot<L: Link> {
    link: Option<Arc<L>>,
    characteristics: Resolved<L>,
    command: Option<L::Characteristic>,
    expected_disconnect: bool,
    last_disconnect: Option<DisconnectKind>,
    /// Links released before their disconnect event arrived; the loss is already recorded.
    reaped: HashSet<LinkId>,
}

impl<L: Link> Default for LinkSlot<L> {
    fn default() -> Self {
        Self {
            link: None,
            characteristics: ResolvedCharacteristics::default(),
            command: None,
            expected_disconnect: false,
            last_disconnect: None,
            reaped: HashSet::new(),
        }
    }
}

impl<L: Link> LinkSlot<L> {
    fn is_current(&self, link_id: LinkId) -> bool {
        self.link.as_ref().is_some_and(|link| link.id() == link_id)
    }

    fn release(&mut self) -> (Option<Arc<L>>, Resolved<L>) {
        self.command = None;
        (self.link.take(), std::mem::take(&mut self.characteristics))
    }
}

/// The single pending idle-disconnect timer.
struct DisconnectDeadline {
    at: Instant,
    generation: u64,
    cancel: CancellationToken,
}

/// Connection manager for the wand
pub struct ConnectionManager<T: Transport> {
    transport: T,
    device: RwLock<WandDevice>,
    disconnect_delay: Duration,
    events: EventSink,
    /// Serialises connect/verify/subscribe and deliberate teardown.
    connect_lock: tokio::sync::Mutex<()>,
    slot: Mutex<LinkSlot<T::Link>>,
    deadline: Mutex<Option<DisconnectDeadline>>,
    state: watch::Sender<ConnectionState>,
    next_link_id: AtomicU64,
    next_generation: AtomicU64,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, device: WandDevice, disconnect_delay: Duration, events: EventSink) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            device: RwLock::new(device),
            disconnect_delay,
            events,
            connect_lock: tokio::sync::Mutex::new(()),
            slot: Mutex::new(LinkSlot::default()),
            deadline: Mutex::new(None),
            state,
            next_link_id: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn device(&self) -> WandDevice {
        self.device
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_device(&self, device: WandDevice) {
        *self.device.write().unwrap_or_else(PoisonError::into_inner) = device;
    }

    pub fn disconnect_delay(&self) -> Duration {
        self.disconnect_delay
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Whether the last disconnect was flagged as deliberate.
    pub fn expected_disconnect(&self) -> bool {
        lock(&self.slot).expected_disconnect
    }

    pub fn last_disconnect(&self) -> Option<DisconnectKind> {
        lock(&self.slot).last_disconnect
    }

    /// Whether an idle-disconnect deadline is armed.
    pub fn has_pending_deadline(&self) -> bool {
        lock(&self.deadline).is_some()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Connection state {:?} -> {:?}", previous, state);
        }
    }

    pub async fn is_connected(&self) -> bool {
        let link = lock(&self.slot).link.clone();
        match link {
            Some(link) => link.is_connected().await,
            None => false,
        }
    }

    /// Connects, verifies and subscribes unless a usable link already exists.
    ///
    /// Every successful call re-arms the idle-disconnect deadline.
    pub async fn ensure_connected(&self) -> Result<(), WandError> {
        let device = self.device();
        if self.connect_lock.try_lock().is_err() {
            debug!(
                "{}: Connection already in progress, waiting for it to complete; RSSI: {}",
                device.display_name(),
                device.rssi_label()
            );
        }
        if self.is_connected().await {
            self.reset_disconnect_timer();
            return Ok(());
        }

        let _guard = self.connect_lock.lock().await;

        // Check again while holding the lock
        if self.is_connected().await {
            self.reset_disconnect_timer();
            return Ok(());
        }
        self.reap_lost_link();

        // Re-read: the device may have been refreshed while we waited
        let device = self.device();
        debug!("{}: Connecting; RSSI: {}", device.display_name(), device.rssi_label());

        let (link, characteristics, command) = self.connect_and_verify(&device).await?;
        let link = Arc::new(link);
        {
            let mut slot = lock(&self.slot);
            slot.link = Some(link.clone());
            slot.characteristics = characteristics.clone();
            slot.command = command;
        }
        self.reset_disconnect_timer();

        self.set_state(ConnectionState::Subscribing);
        debug!(
            "{}: Subscribe to notifications; RSSI: {}",
            device.display_name(),
            device.rssi_label()
        );
        if let Err(e) = self.subscribe(&link, &characteristics).await {
            warn!("{}: Failed to subscribe to notifications: {}", device.display_name(), e);
            self.teardown().await;
            return Err(e.into());
        }

        if !lock(&self.slot).is_current(link.id()) {
            warn!("{}: Link lost while subscribing", device.display_name());
            return Err(TransportError::NotConnected.into());
        }

        self.set_state(ConnectionState::Connected);
        info!("Connected to {}!", device.display_name());
        Ok(())
    }

    /// Releases a stored link that went down before its disconnect event was processed.
    ///
    /// The caller holds the connect lock and has seen the link report not connected.
    fn reap_lost_link(&self) {
        let (link_id, kind) = {
            let mut slot = lock(&self.slot);
            let Some(link_id) = slot.link.as_ref().map(|link| link.id()) else {
                return;
            };
            slot.release();
            let kind = if slot.expected_disconnect {
                DisconnectKind::Expected
            } else {
                DisconnectKind::Unexpected
            };
            slot.last_disconnect = Some(kind);
            slot.reaped.insert(link_id);
            (link_id, kind)
        };
        self.cancel_disconnect_timer();

        let device = self.device();
        match kind {
            DisconnectKind::Expected => debug!(
                "{}: {} is down; RSSI: {}",
                device.display_name(),
                link_id,
                device.rssi_label()
            ),
            DisconnectKind::Unexpected => warn!(
                "{}: Device unexpectedly disconnected ({}); RSSI: {}",
                device.display_name(),
                link_id,
                device.rssi_label()
            ),
        }
    }

    /// Opens a link and resolves the required characteristics, retrying once with a
    /// cleared cache when some are missing.
    async fn connect_and_verify(
        &self,
        device: &WandDevice,
    ) -> Result<(T::Link, Resolved<T::Link>, Option<<T::Link as Link>::Characteristic>), WandError> {
        for attempt in 1..=VERIFY_ATTEMPTS {
            let link_id = LinkId::new(self.next_link_id.fetch_add(1, Ordering::SeqCst));
            self.set_state(ConnectionState::Connecting);

            let link = match self
                .transport
                .establish_connection(device, link_id, self.events.clone())
                .await
            {
                Ok(link) => link,
                Err(source) => {
                    warn!("{}: Connection failed: {}", device.display_name(), source);
                    self.set_state(ConnectionState::Disconnected);
                    return Err(WandError::TransportConnect {
                        name: device.display_name().to_string(),
                        source,
                    });
                }
            };
            debug!(
                "{}: Connected ({}); RSSI: {}",
                device.display_name(),
                link_id,
                device.rssi_label()
            );

            self.set_state(ConnectionState::Verifying);
            let catalog = match link.services().await {
                Ok(catalog) => catalog,
                Err(e) => {
                    warn!("{}: Service discovery failed: {}", device.display_name(), e);
                    self.discard(&link).await;
                    return Err(e.into());
                }
            };
            debug!(
                "{}: Discovered {} services, {} characteristics",
                device.display_name(),
                catalog.services.len(),
                catalog.characteristic_count()
            );

            let (characteristics, all_found) = resolve(&catalog, &REQUIRED_CHANNELS);
            if all_found {
                let (optional, _) = resolve(&catalog, &[WAND_COMMAND_CHANNEL]);
                let command = optional.get(Channel::WandCommand).cloned();
                if command.is_none() {
                    debug!("{}: No command channel, writes are unavailable", device.display_name());
                }
                return Ok((link, characteristics, command));
            }

            warn!(
                "{}: Missing characteristics {:?} (attempt {}/{})",
                device.display_name(),
                characteristics.missing().collect::<Vec<_>>(),
                attempt,
                VERIFY_ATTEMPTS
            );
            lock(&self.slot).expected_disconnect = true;

            if attempt < VERIFY_ATTEMPTS {
                // Services may have failed to load; start over with a fresh catalog
                let reset = match link.clear_cache().await {
                    Ok(()) => link.disconnect().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = reset {
                    warn!("{}: Failed to reset link: {}", device.display_name(), e);
                    self.discard(&link).await;
                    return Err(e.into());
                }
            } else if let Err(e) = link.disconnect().await {
                debug!("{}: Failed to disconnect: {}", device.display_name(), e);
            }
        }

        self.set_state(ConnectionState::Disconnected);
        Err(WandError::CharacteristicMissing)
    }

    /// Drops a link that never became current.
    async fn discard(&self, link: &T::Link) {
        lock(&self.slot).expected_disconnect = true;
        if let Err(e) = link.disconnect().await {
            debug!("Failed to disconnect {}: {}", link.id(), e);
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn subscribe(&self, link: &T::Link, characteristics: &Resolved<T::Link>) -> Result<(), TransportError> {
        for channel in [Channel::WandActivityNotify, Channel::BatteryLevelNotify] {
            let characteristic = characteristics
                .get(channel)
                .ok_or_else(|| TransportError::Other(format!("{channel} was not resolved")))?;
            link.start_notify(characteristic, channel).await?;
            debug!("Subscribed to {}", channel);
        }
        Ok(())
    }

    /// Deliberately tears down the link: unsubscribes and disconnects.
    pub async fn disconnect_now(&self) {
        let _guard = self.connect_lock.lock().await;
        self.teardown().await;
    }

    /// Teardown body; the caller holds the connect lock.
    async fn teardown(&self) {
        self.cancel_disconnect_timer();

        let (link, characteristics) = {
            let mut slot = lock(&self.slot);
            slot.expected_disconnect = true;
            let released = slot.release();
            if released.0.is_some() {
                slot.last_disconnect = Some(DisconnectKind::Expected);
            }
            released
        };

        let Some(link) = link else {
            self.set_state(ConnectionState::Disconnected);
            return;
        };

        let device = self.device();
        self.set_state(ConnectionState::Disconnecting);
        if link.is_connected().await {
            for (channel, characteristic) in characteristics.present() {
                // The link may already be degraded; keep tearing down regardless
                if let Err(e) = link.stop_notify(characteristic).await {
                    debug!(
                        "{}: Failed to stop notifications on {}: {}",
                        device.display_name(),
                        channel,
                        e
                    );
                }
            }
            if let Err(e) = link.disconnect().await {
                warn!("{}: Failed to disconnect: {}", device.display_name(), e);
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Runs the idle disconnect if `generation` is still the armed deadline and it has passed.
    pub async fn execute_timed_disconnect(&self, generation: u64) {
        let _guard = self.connect_lock.lock().await;

        // Checked under the lock: a connect in progress re-arms the deadline
        let due = {
            let deadline = lock(&self.deadline);
            deadline
                .as_ref()
                .is_some_and(|d| d.generation == generation && Instant::now() >= d.at)
        };
        if !due {
            debug!("Ignoring stale idle deadline #{}", generation);
            return;
        }

        debug!(
            "{}: Disconnecting after timeout of {:?}",
            self.device().display_name(),
            self.disconnect_delay
        );
        self.teardown().await;
    }

    /// Records a disconnect reported by the transport.
    pub fn handle_disconnected(&self, link_id: LinkId) {
        let (current, kind) = {
            let mut slot = lock(&self.slot);
            if slot.reaped.remove(&link_id) {
                debug!("{} disconnect already recorded", link_id);
                return;
            }
            let current = slot.is_current(link_id);
            let kind = if current && !slot.expected_disconnect {
                DisconnectKind::Unexpected
            } else {
                DisconnectKind::Expected
            };
            if current {
                slot.release();
            }
            slot.last_disconnect = Some(kind);
            (current, kind)
        };

        if current {
            self.cancel_disconnect_timer();
            self.set_state(ConnectionState::Disconnected);
        }

        let device = self.device();
        match kind {
            DisconnectKind::Expected => debug!(
                "{}: Disconnected from device; RSSI: {}",
                device.display_name(),
                device.rssi_label()
            ),
            DisconnectKind::Unexpected => warn!(
                "{}: Device unexpectedly disconnected; RSSI: {}",
                device.display_name(),
                device.rssi_label()
            ),
        }
    }

    /// Writes raw bytes to the command characteristic.
    pub async fn write_command(&self, data: &[u8]) -> Result<(), WandError> {
        let (link, command) = {
            let slot = lock(&self.slot);
            (slot.link.clone(), slot.command.clone())
        };
        let link = link.ok_or(WandError::NotConnected)?;
        let command = command.ok_or(WandError::CommandUnavailable)?;
        debug!("Sending command to wand: {:02x?}", data);
        link.write(&command, data).await?;
        Ok(())
    }

    fn reset_disconnect_timer(&self) {
        lock(&self.slot).expected_disconnect = false;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let at = Instant::now() + self.disconnect_delay;
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(at) => {
                    events.send(LinkEvent::IdleDeadline { generation });
                }
                _ = token.cancelled() => {}
            }
        });

        let previous = lock(&self.deadline).replace(DisconnectDeadline {
            at,
            generation,
            cancel,
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }

    fn cancel_disconnect_timer(&self) {
        if let Some(deadline) = lock(&self.deadline).take() {
            deadline.cancel.cancel();
        }
    }
}
