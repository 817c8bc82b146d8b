//! BLE transport using btleplug.
//!
//! Provides scanning, connecting and disconnecting, and implements
//! [`Transport`] over the profile's control, data and notify characteristics.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    ValueNotification, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::frame::{Channel, TransferChunk};
use crate::protocol::PrinterProfile;
use crate::transport::{Transport, TransportError};
use crate::{CatPrinterError, Result};

/// Default BLE scan timeout.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for a reply on the notify characteristic.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Settle time after connecting before the first write.
const POST_CONNECT_DELAY: Duration = Duration::from_millis(500);

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// Discovered BLE device information.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Device display name (may be empty if not advertised).
    pub name: String,
    /// Platform-specific device identifier (address on Linux, UUID on macOS).
    pub id: String,
    /// The underlying btleplug peripheral handle.
    pub peripheral: Peripheral,
}

/// Open the first available BLE adapter.
pub async fn default_adapter() -> Result<Adapter> {
    let manager = Manager::new()
        .await
        .map_err(|e| CatPrinterError::BleConnection(e.to_string()))?;

    manager
        .adapters()
        .await
        .map_err(|e| CatPrinterError::BleConnection(e.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| CatPrinterError::BleConnection("No BLE adapter found".into()))
}

/// Scan for printers matching `profile`, by advertised service or name.
pub async fn scan_devices(
    adapter: &Adapter,
    profile: &dyn PrinterProfile,
    timeout: Duration,
) -> Result<Vec<DiscoveredDevice>> {
    tracing::info!(timeout_secs = timeout.as_secs(), "Starting BLE scan");

    let mut events = adapter
        .events()
        .await
        .map_err(|e| CatPrinterError::BleScan(e.to_string()))?;

    adapter
        .start_scan(ScanFilter::default())
        .await
        .map_err(|e| CatPrinterError::BleScan(e.to_string()))?;

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let service_uuid = profile.service_uuid();
    let mut found = Vec::new();
    let mut seen_ids = std::collections::HashSet::new();

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.next() => {
                let Some(event) = event else { break };
                let CentralEvent::DeviceDiscovered(id) = event else { continue };
                let id_str = id.to_string();
                if seen_ids.contains(&id_str) {
                    continue;
                }
                let Ok(peripheral) = adapter.peripheral(&id).await else { continue };
                let Ok(Some(props)) = peripheral.properties().await else { continue };

                let name = props.local_name.unwrap_or_default();
                let matches = props.services.contains(&service_uuid)
                    || name.eq_ignore_ascii_case(profile.name());
                if matches {
                    tracing::info!(name = %name, id = %id_str, "Found printer");
                    seen_ids.insert(id_str.clone());
                    found.push(DiscoveredDevice {
                        name,
                        id: id_str,
                        peripheral,
                    });
                }
            }
        }
    }

    adapter
        .stop_scan()
        .await
        .map_err(|e| CatPrinterError::BleScan(e.to_string()))?;

    tracing::info!(count = found.len(), "BLE scan complete");
    Ok(found)
}

/// Lowercase alphanumerics only, so `AA:BB:..` matches `aabb..`.
pub fn normalize_device_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Whether a device id or name refers to `target`.
pub fn device_matches_target(device_id: &str, device_name: &str, target: &str) -> bool {
    let normalized_target = normalize_device_id(target);
    device_id.eq_ignore_ascii_case(target)
        || normalize_device_id(device_id) == normalized_target
        || (!device_name.is_empty() && device_name.eq_ignore_ascii_case(target))
}

pub fn find_target_device(
    devices: Vec<DiscoveredDevice>,
    target: &str,
) -> Option<DiscoveredDevice> {
    devices
        .into_iter()
        .find(|device| device_matches_target(&device.id, &device.name, target))
}

/// A connected printer.
pub struct BleTransport {
    peripheral: Peripheral,
    id: String,
    control: Characteristic,
    data: Characteristic,
    profile: Arc<dyn PrinterProfile>,
    notifications: NotificationStream,
    link: CancellationToken,
    watcher: JoinHandle<()>,
}

impl BleTransport {
    /// Scan for `target` (address or name) and connect to it.
    pub async fn connect_to(
        target: &str,
        profile: Arc<dyn PrinterProfile>,
        scan_timeout: Duration,
    ) -> Result<Self> {
        let adapter = default_adapter().await?;
        let devices = scan_devices(&adapter, profile.as_ref(), scan_timeout).await?;
        let device = if target.trim().is_empty() {
            devices.into_iter().next()
        } else {
            find_target_device(devices, target)
        }
        .ok_or(CatPrinterError::PrinterNotFound)?;
        Self::connect(&adapter, device, profile).await
    }

    /// Connect to a discovered peripheral and subscribe to notifications.
    pub async fn connect(
        adapter: &Adapter,
        device: DiscoveredDevice,
        profile: Arc<dyn PrinterProfile>,
    ) -> Result<Self> {
        tracing::info!(id = %device.id, name = %device.name, "Connecting to device");
        let peripheral = device.peripheral;

        peripheral
            .connect()
            .await
            .map_err(|e| CatPrinterError::BleConnection(e.to_string()))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| CatPrinterError::BleConnection(e.to_string()))?;

        let characteristics = peripheral.characteristics();
        let find = |uuid: uuid::Uuid| {
            characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or(CatPrinterError::MissingCharacteristic(uuid))
        };
        let control = find(profile.control_characteristic())?;
        let data = find(profile.data_characteristic())?;
        let notify = find(profile.notify_characteristic())?;

        peripheral
            .subscribe(&notify)
            .await
            .map_err(|e| CatPrinterError::BleConnection(e.to_string()))?;
        let notifications = peripheral
            .notifications()
            .await
            .map_err(|e| CatPrinterError::BleConnection(e.to_string()))?;

        let link = CancellationToken::new();
        let watcher = watch_disconnect(adapter, &peripheral, link.clone()).await?;

        tokio::time::sleep(POST_CONNECT_DELAY).await;
        tracing::info!(printer = profile.name(), "Connected and discovered characteristics");

        Ok(Self {
            peripheral,
            id: device.id,
            control,
            data,
            profile,
            notifications,
            link,
            watcher,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn profile(&self) -> &dyn PrinterProfile {
        self.profile.as_ref()
    }

    /// Disconnect from the peripheral.
    pub async fn disconnect(self) -> Result<()> {
        tracing::info!(id = %self.id, "Disconnecting BLE device");
        self.link.cancel();
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| CatPrinterError::BleConnection(e.to_string()))
    }

    fn characteristic(&self, channel: Channel) -> &Characteristic {
        match channel {
            Channel::Control => &self.control,
            Channel::Data => &self.data,
        }
    }

    fn map_error(&self, err: btleplug::Error) -> TransportError {
        match err {
            btleplug::Error::NotConnected | btleplug::Error::DeviceNotFound => {
                self.link.cancel();
                TransportError::Disconnected
            }
            other => TransportError::Failed(other.to_string()),
        }
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

/// Cancel `link` when the adapter reports this peripheral gone.
async fn watch_disconnect(
    adapter: &Adapter,
    peripheral: &Peripheral,
    link: CancellationToken,
) -> Result<JoinHandle<()>> {
    let mut events = adapter
        .events()
        .await
        .map_err(|e| CatPrinterError::BleConnection(e.to_string()))?;
    let id = peripheral.id();

    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDisconnected(gone) = event {
                if gone == id {
                    tracing::warn!("Printer disconnected");
                    link.cancel();
                    return;
                }
            }
        }
    }))
}

#[async_trait]
impl Transport for BleTransport {
    async fn send_chunk(&mut self, chunk: &TransferChunk) -> std::result::Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let characteristic = self.characteristic(chunk.channel).clone();
        self.peripheral
            .write(&characteristic, &chunk.bytes, WriteType::WithResponse)
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn query_battery(&mut self) -> std::result::Result<u8, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let request = self.profile.build_battery_request();
        let control = self.control.clone();
        self.peripheral
            .write(&control, &request, WriteType::WithResponse)
            .await
            .map_err(|e| self.map_error(e))?;

        let profile = Arc::clone(&self.profile);
        let reply = tokio::time::timeout(RESPONSE_TIMEOUT, async {
            while let Some(notification) = self.notifications.next().await {
                if let Some(percent) = profile.parse_battery_response(&notification.value) {
                    return Some(percent);
                }
                tracing::debug!(len = notification.value.len(), "Ignoring unrelated notification");
            }
            None
        })
        .await;

        match reply {
            Ok(Some(percent)) => Ok(percent),
            Ok(None) => {
                self.link.cancel();
                Err(TransportError::Disconnected)
            }
            Err(_) => Err(TransportError::Failed("no battery reply".into())),
        }
    }

    fn is_connected(&self) -> bool {
        !self.link.is_cancelled()
    }

    fn link_lost(&self) -> CancellationToken {
        self.link.clone()
    }
}
