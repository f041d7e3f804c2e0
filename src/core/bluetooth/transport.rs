//! Transport seam between the wand session and a BLE stack.
//!
//! A [`Transport`] opens [`Link`]s. Links push everything they observe (notification
//! payloads, link loss) onto the session's [`EventSink`] as [`LinkEvent`]s, so the
//! session processes them in arrival order on a single task.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::bluetooth::device::WandDevice;
use crate::core::bluetooth::types::{Channel, LinkId};
use crate::error::TransportError;

/// Events delivered to the session's inbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A notification arrived on a subscribed channel.
    Notification {
        link: LinkId,
        channel: Channel,
        payload: Vec<u8>,
    },
    /// The link went down, requested or not.
    Disconnected { link: LinkId },
    /// The idle-disconnect deadline armed as `generation` has passed.
    IdleDeadline { generation: u64 },
}

/// Sending half of the session's inbound queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<LinkEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queues an event. Returns false when the session is gone.
    pub fn send(&self, event: LinkEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// A characteristic as discovered on a link.
#[derive(Debug, Clone)]
pub struct GattCharacteristic<C> {
    pub uuid: Uuid,
    pub handle: C,
}

/// A service and its characteristics.
#[derive(Debug, Clone)]
pub struct GattService<C> {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic<C>>,
}

/// Everything a link reported during service discovery.
#[derive(Debug, Clone)]
pub struct ServiceCatalog<C> {
    pub services: Vec<GattService<C>>,
}

impl<C> Default for ServiceCatalog<C> {
    fn default() -> Self {
        Self {
            services: Vec::new(),
        }
    }
}

impl<C> ServiceCatalog<C> {
    pub fn new(services: Vec<GattService<C>>) -> Self {
        Self { services }
    }

    /// Finds a characteristic by UUID in any service.
    pub fn get_characteristic(&self, uuid: Uuid) -> Option<&C> {
        self.services
            .iter()
            .flat_map(|service| service.characteristics.iter())
            .find(|characteristic| characteristic.uuid == uuid)
            .map(|characteristic| &characteristic.handle)
    }

    pub fn characteristic_count(&self) -> usize {
        self.services.iter().map(|s| s.characteristics.len()).sum()
    }
}

/// Opens links to devices.
///
/// Implementations do their own low-level retrying; an error from
/// [`establish_connection`](Transport::establish_connection) is final for that attempt.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Link: Link;

    /// Connects to `device`. The returned link reports its events to `events`, tagged with `link_id`.
    async fn establish_connection(
        &self,
        device: &WandDevice,
        link_id: LinkId,
        events: EventSink,
    ) -> Result<Self::Link, TransportError>;
}

/// A live GATT connection.
#[async_trait]
pub trait Link: Send + Sync + 'static {
    type Characteristic: Clone + std::fmt::Debug + Send + Sync + 'static;

    fn id(&self) -> LinkId;

    async fn is_connected(&self) -> bool;

    /// Services and characteristics of the connected device.
    async fn services(&self) -> Result<ServiceCatalog<Self::Characteristic>, TransportError>;

    /// Subscribes to `characteristic`; payloads are delivered as [`LinkEvent::Notification`] for `channel`.
    async fn start_notify(
        &self,
        characteristic: &Self::Characteristic,
        channel: Channel,
    ) -> Result<(), TransportError>;

    async fn stop_notify(&self, characteristic: &Self::Characteristic) -> Result<(), TransportError>;

    async fn write(&self, characteristic: &Self::Characteristic, data: &[u8]) -> Result<(), TransportError>;

    /// Forgets any cached service catalog so the next discovery starts fresh.
    async fn clear_cache(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ServiceCatalog<&'static str> {
        ServiceCatalog::new(vec![
            GattService {
                uuid: Uuid::from_u128(1),
                characteristics: vec![GattCharacteristic {
                    uuid: Uuid::from_u128(10),
                    handle: "ten",
                }],
            },
            GattService {
                uuid: Uuid::from_u128(2),
                characteristics: vec![
                    GattCharacteristic {
                        uuid: Uuid::from_u128(20),
                        handle: "twenty",
                    },
                    GattCharacteristic {
                        uuid: Uuid::from_u128(21),
                        handle: "twenty-one",
                    },
                ],
            },
        ])
    }

    #[test]
    fn test_get_characteristic_searches_all_services() {
        let catalog = catalog();
        assert_eq!(catalog.get_characteristic(Uuid::from_u128(10)), Some(&"ten"));
        assert_eq!(catalog.get_characteristic(Uuid::from_u128(21)), Some(&"twenty-one"));
        assert_eq!(catalog.get_characteristic(Uuid::from_u128(99)), None);
        assert_eq!(catalog.characteristic_count(), 3);
    }

    #[tokio::test]
    async fn test_event_sink_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        assert!(sink.send(LinkEvent::IdleDeadline { generation: 1 }));
        assert!(sink.send(LinkEvent::Disconnected { link: LinkId::new(3) }));

        assert_eq!(rx.recv().await, Some(LinkEvent::IdleDeadline { generation: 1 }));
        assert_eq!(rx.recv().await, Some(LinkEvent::Disconnected { link: LinkId::new(3) }));

        drop(rx);
        assert!(!sink.send(LinkEvent::IdleDeadline { generation: 2 }));
    }
}
