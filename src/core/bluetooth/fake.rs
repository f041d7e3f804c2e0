//! Scriptable in-memory transport for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    UUID_BATTERY_LEVEL, UUID_BATTERY_SERVICE, UUID_WAND_ACTIVITY_CHAR, UUID_WAND_COMMAND_CHAR,
    UUID_WAND_SERVICE,
};
use crate::core::bluetooth::device::WandDevice;
use crate::core::bluetooth::transport::{
    EventSink, GattCharacteristic, GattService, Link, LinkEvent, ServiceCatalog, Transport,
};
use crate::core::bluetooth::types::{Channel, LinkId};
use crate::error::TransportError;

pub(crate) fn test_device() -> WandDevice {
    WandDevice::new(
        "fake-wand".into(),
        Some("MCW-TEST".into()),
        "AA:BB:CC:DD:EE:FF".into(),
        Some(-60),
    )
}

fn service(uuid: Uuid, characteristics: &[Uuid]) -> GattService<Uuid> {
    GattService {
        uuid,
        characteristics: characteristics
            .iter()
            .map(|&uuid| GattCharacteristic { uuid, handle: uuid })
            .collect(),
    }
}

pub(crate) fn full_catalog() -> ServiceCatalog<Uuid> {
    ServiceCatalog::new(vec![
        service(UUID_BATTERY_SERVICE, &[UUID_BATTERY_LEVEL]),
        service(UUID_WAND_SERVICE, &[UUID_WAND_COMMAND_CHAR, UUID_WAND_ACTIVITY_CHAR]),
    ])
}

/// A catalog without the activity characteristic.
pub(crate) fn incomplete_catalog() -> ServiceCatalog<Uuid> {
    ServiceCatalog::new(vec![
        service(UUID_BATTERY_SERVICE, &[UUID_BATTERY_LEVEL]),
        service(UUID_WAND_SERVICE, &[UUID_WAND_COMMAND_CHAR]),
    ])
}

#[derive(Default)]
struct Shared {
    connect_calls: AtomicUsize,
    connect_delay: Mutex<Duration>,
    catalogs: Mutex<VecDeque<ServiceCatalog<Uuid>>>,
    connect_failures: Mutex<VecDeque<String>>,
    fail_start_notify: AtomicBool,
    fail_stop_notify: AtomicBool,
    links: Mutex<Vec<FakeLink>>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeTransport {
    shared: Arc<Shared>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_connect_delay(self, delay: Duration) -> Self {
        *self.shared.connect_delay.lock().unwrap() = delay;
        self
    }

    /// Queues the catalog the next link will report. Unqueued links get [`full_catalog`].
    pub(crate) fn push_catalog(&self, catalog: ServiceCatalog<Uuid>) {
        self.shared.catalogs.lock().unwrap().push_back(catalog);
    }

    pub(crate) fn fail_next_connect(&self, reason: &str) {
        self.shared
            .connect_failures
            .lock()
            .unwrap()
            .push_back(reason.to_string());
    }

    pub(crate) fn fail_start_notify(&self, fail: bool) {
        self.shared.fail_start_notify.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_stop_notify(&self, fail: bool) {
        self.shared.fail_stop_notify.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.shared.connect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn links(&self) -> Vec<FakeLink> {
        self.shared.links.lock().unwrap().clone()
    }

    pub(crate) fn last_link(&self) -> Option<FakeLink> {
        self.shared.links.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    type Link = FakeLink;

    async fn establish_connection(
        &self,
        _device: &WandDevice,
        link_id: LinkId,
        events: EventSink,
    ) -> Result<FakeLink, TransportError> {
        self.shared.connect_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.shared.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failure = self.shared.connect_failures.lock().unwrap().pop_front();
        if let Some(reason) = failure {
            return Err(TransportError::Other(reason));
        }

        let catalog = self
            .shared
            .catalogs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(full_catalog);
        let link = FakeLink {
            state: Arc::new(LinkState {
                id: link_id,
                events,
                catalog,
                transport: self.shared.clone(),
                connected: AtomicBool::new(true),
                cache_cleared: AtomicBool::new(false),
                subscriptions: Mutex::new(Vec::new()),
                writes: Mutex::new(Vec::new()),
            }),
        };
        self.shared.links.lock().unwrap().push(link.clone());
        Ok(link)
    }
}

struct LinkState {
    id: LinkId,
    events: EventSink,
    catalog: ServiceCatalog<Uuid>,
    transport: Arc<Shared>,
    connected: AtomicBool,
    cache_cleared: AtomicBool,
    subscriptions: Mutex<Vec<(Uuid, Channel)>>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
}

#[derive(Clone)]
pub(crate) struct FakeLink {
    state: Arc<LinkState>,
}

impl FakeLink {
    pub(crate) fn is_link_up(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn cache_cleared(&self) -> bool {
        self.state.cache_cleared.load(Ordering::SeqCst)
    }

    pub(crate) fn subscriptions(&self) -> Vec<Uuid> {
        self.state
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .map(|(uuid, _)| *uuid)
            .collect()
    }

    pub(crate) fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.state.writes.lock().unwrap().clone()
    }

    /// Pushes a notification as if the device sent it. Returns false when not subscribed.
    pub(crate) fn notify(&self, characteristic: Uuid, payload: &[u8]) -> bool {
        let channel = self
            .state
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|(uuid, _)| *uuid == characteristic)
            .map(|(_, channel)| *channel);
        match channel {
            Some(channel) => self.state.events.send(LinkEvent::Notification {
                link: self.state.id,
                channel,
                payload: payload.to_vec(),
            }),
            None => false,
        }
    }

    /// Simulates the device going out of range.
    pub(crate) fn drop_link(&self) {
        self.go_down();
    }

    fn go_down(&self) {
        if self.state.connected.swap(false, Ordering::SeqCst) {
            self.state.subscriptions.lock().unwrap().clear();
            self.state.events.send(LinkEvent::Disconnected { link: self.state.id });
        }
    }
}

#[async_trait]
impl Link for FakeLink {
    type Characteristic = Uuid;

    fn id(&self) -> LinkId {
        self.state.id
    }

    async fn is_connected(&self) -> bool {
        self.is_link_up()
    }

    async fn services(&self) -> Result<ServiceCatalog<Uuid>, TransportError> {
        Ok(self.state.catalog.clone())
    }

    async fn start_notify(&self, characteristic: &Uuid, channel: Channel) -> Result<(), TransportError> {
        if self.state.transport.fail_start_notify.load(Ordering::SeqCst) {
            return Err(TransportError::Other("notify refused".into()));
        }
        self.state
            .subscriptions
            .lock()
            .unwrap()
            .push((*characteristic, channel));
        Ok(())
    }

    async fn stop_notify(&self, characteristic: &Uuid) -> Result<(), TransportError> {
        if self.state.transport.fail_stop_notify.load(Ordering::SeqCst) {
            return Err(TransportError::Other("stop notify failed".into()));
        }
        self.state
            .subscriptions
            .lock()
            .unwrap()
            .retain(|(uuid, _)| uuid != characteristic);
        Ok(())
    }

    async fn write(&self, characteristic: &Uuid, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_link_up() {
            return Err(TransportError::NotConnected);
        }
        self.state
            .writes
            .lock()
            .unwrap()
            .push((*characteristic, data.to_vec()));
        Ok(())
    }

    async fn clear_cache(&self) -> Result<(), TransportError> {
        self.state.cache_cleared.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.go_down();
        Ok(())
    }
}
