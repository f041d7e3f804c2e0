//! `bluest` backend for the transport seam
//! This module connects to wands through the system Bluetooth adapter and turns
//! notification streams and connection events into [`LinkEvent`]s.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, ConnectionEvent, Device};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::bluetooth_config::BluetoothConfig;
use crate::core::bluetooth::device::WandDevice;
use crate::core::bluetooth::scanner::BluetoothScanner;
use crate::core::bluetooth::transport::{
    EventSink, GattCharacteristic, GattService, Link, LinkEvent, ServiceCatalog, Transport,
};
use crate::core::bluetooth::types::{Channel, LinkId};
use crate::error::TransportError;

/// Devices seen by the scanner, keyed by platform device id.
pub type DeviceRegistry = Arc<Mutex<HashMap<String, Device>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport backed by the default system adapter
#[derive(Clone)]
pub struct BluestTransport {
    adapter: Adapter,
    devices: DeviceRegistry,
    config: BluetoothConfig,
}

impl BluestTransport {
    /// Opens the default adapter and waits until it is powered on.
    pub async fn new(config: BluetoothConfig) -> Result<Self, TransportError> {
        let adapter = Adapter::default().await.ok_or(TransportError::NoAdapter)?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        Ok(Self {
            adapter,
            devices: Arc::new(Mutex::new(HashMap::new())),
            config,
        })
    }

    /// A scanner that registers what it finds with this transport.
    pub fn scanner(&self) -> BluetoothScanner {
        BluetoothScanner::new(self.adapter.clone(), self.devices.clone(), self.config.clone())
    }

    fn lookup(&self, device_id: &str) -> Result<Device, TransportError> {
        lock(&self.devices)
            .get(device_id)
            .cloned()
            .ok_or_else(|| TransportError::DeviceNotFound(device_id.to_string()))
    }

    /// Connect with the configured retry policy
    async fn connect_with_retry(&self, device: &Device) -> Result<(), TransportError> {
        let max_retries = self.config.max_connect_retries.max(1);
        let mut retry_count = 0;
        let mut last_error = None;

        while retry_count < max_retries {
            match self.try_connect(device).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", retry_count + 1, e);
                    last_error = Some(e);

                    if retry_count < max_retries - 1 {
                        info!("Retrying connection in {} ms...", self.config.connect_retry_delay_ms);
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                }
            }
            retry_count += 1;
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::Other(format!("failed to connect after {} attempts", max_retries))
        }))
    }

    async fn try_connect(&self, device: &Device) -> Result<(), TransportError> {
        if !device.is_connected().await {
            info!("Initiating connection to {}...", device.id());
            self.adapter.connect_device(device).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for BluestTransport {
    type Link = BluestLink;

    async fn establish_connection(
        &self,
        wand: &WandDevice,
        link_id: LinkId,
        events: EventSink,
    ) -> Result<BluestLink, TransportError> {
        let device = self.lookup(&wand.id)?;
        info!("Device details - ID: {}, Name: {:?}", wand.id, wand.name);

        self.connect_with_retry(&device).await?;
        Ok(BluestLink::new(link_id, self.adapter.clone(), device, events))
    }
}

/// A connected `bluest` device.
///
/// Each subscription runs on its own task; dropping the link stops them and the
/// connection-event watcher.
pub struct BluestLink {
    id: LinkId,
    adapter: Adapter,
    device: Device,
    events: EventSink,
    subscriptions: Mutex<HashMap<Uuid, CancellationToken>>,
    shutdown: CancellationToken,
}

impl BluestLink {
    fn new(id: LinkId, adapter: Adapter, device: Device, events: EventSink) -> Self {
        let shutdown = CancellationToken::new();
        tokio::spawn(Self::watch_connection(
            id,
            adapter.clone(),
            device.clone(),
            events.clone(),
            shutdown.clone(),
        ));

        Self {
            id,
            adapter,
            device,
            events,
            subscriptions: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Reports link loss for `link` until the link is dropped.
    async fn watch_connection(
        link: LinkId,
        adapter: Adapter,
        device: Device,
        events: EventSink,
        shutdown: CancellationToken,
    ) {
        let mut connection_events = match adapter.device_connection_events(&device).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to watch connection events for {}: {}", device.id(), e);
                return;
            }
        };

        loop {
            tokio::select! {
                event = connection_events.next() => match event {
                    Some(ConnectionEvent::Disconnected) => {
                        debug!("{} reported disconnected", link);
                        events.send(LinkEvent::Disconnected { link });
                        break;
                    }
                    Some(ConnectionEvent::Connected) => debug!("{} reported connected", link),
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            }
        }
    }

    /// Forwards notifications from `characteristic` until cancelled or the stream ends.
    async fn process_notifications(
        link: LinkId,
        characteristic: Characteristic,
        channel: Channel,
        events: EventSink,
        cancel: CancellationToken,
        ready: oneshot::Sender<Result<(), bluest::Error>>,
    ) {
        let mut notification_stream = match characteristic.notify().await {
            Ok(stream) => {
                let _ = ready.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        info!("Listening for {} notifications...", channel);

        loop {
            tokio::select! {
                result = notification_stream.next() => match result {
                    Some(Ok(payload)) => {
                        if !events.send(LinkEvent::Notification { link, channel, payload }) {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Error in {} notification stream: {}", channel, e);
                        break;
                    }
                    None => break,
                },
                _ = cancel.cancelled() => break,
            }
        }

        debug!("{} notification stream ended", channel);
    }
}

#[async_trait]
impl Link for BluestLink {
    type Characteristic = Characteristic;

    fn id(&self) -> LinkId {
        self.id
    }

    async fn is_connected(&self) -> bool {
        self.device.is_connected().await
    }

    async fn services(&self) -> Result<ServiceCatalog<Characteristic>, TransportError> {
        let mut services = Vec::new();
        for service in self.device.services().await? {
            let characteristics = service
                .characteristics()
                .await?
                .into_iter()
                .map(|handle| GattCharacteristic {
                    uuid: handle.uuid(),
                    handle,
                })
                .collect();
            services.push(GattService {
                uuid: service.uuid(),
                characteristics,
            });
        }
        Ok(ServiceCatalog::new(services))
    }

    async fn start_notify(&self, characteristic: &Characteristic, channel: Channel) -> Result<(), TransportError> {
        let cancel = self.shutdown.child_token();
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(Self::process_notifications(
            self.id,
            characteristic.clone(),
            channel,
            self.events.clone(),
            cancel.clone(),
            ready_tx,
        ));

        match ready_rx.await {
            Ok(Ok(())) => {
                if let Some(previous) = lock(&self.subscriptions).insert(characteristic.uuid(), cancel) {
                    previous.cancel();
                }
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(TransportError::Other(format!(
                "{} notification task ended before subscribing",
                channel
            ))),
        }
    }

    async fn stop_notify(&self, characteristic: &Characteristic) -> Result<(), TransportError> {
        // Dropping the notification stream unsubscribes
        match lock(&self.subscriptions).remove(&characteristic.uuid()) {
            Some(cancel) => {
                cancel.cancel();
                Ok(())
            }
            None => Err(TransportError::Other(format!(
                "not subscribed to {}",
                characteristic.uuid()
            ))),
        }
    }

    async fn write(&self, characteristic: &Characteristic, data: &[u8]) -> Result<(), TransportError> {
        if !self.device.is_connected().await {
            return Err(TransportError::NotConnected);
        }
        characteristic.write(data).await?;
        Ok(())
    }

    /// Re-runs service discovery, replacing the cached services.
    async fn clear_cache(&self) -> Result<(), TransportError> {
        let services = self.device.discover_services().await?;
        debug!("{}: rediscovered {} services", self.id, services.len());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        for (_, cancel) in lock(&self.subscriptions).drain() {
            cancel.cancel();
        }
        if self.device.is_connected().await {
            info!("Disconnecting from device {}", self.device.id());
            self.adapter.disconnect_device(&self.device).await?;
        }
        Ok(())
    }
}

impl Drop for BluestLink {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
