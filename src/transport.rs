//! Transport seam between the protocol engine and the radio link
//!
//! The engine only needs two primitives from a connected device: write bytes
//! to an endpoint, and forward endpoint notifications into a sink. Anything
//! that can do both can drive a session; `BluerTransport` provides the
//! primitives on top of a BlueZ GATT connection. Connecting, pairing, and
//! disconnecting stay with the caller.

use crate::types::{BandError, EndpointId, Result};
use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::Device;
use futures::StreamExt;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

/// Receiver of raw endpoint notifications
///
/// Implemented by the notification dispatcher; a transport calls
/// `on_notification` for every value the device pushes on a subscribed
/// endpoint.
pub trait NotificationSink: Send + Sync {
    fn on_notification(&self, endpoint: EndpointId, data: &[u8]);
}

/// Write/notify primitives of a connected device
#[async_trait]
pub trait EndpointTransport: Send + Sync {
    /// Write a frame to an endpoint; resolves when the link layer accepts it
    async fn write(&self, endpoint: EndpointId, payload: &[u8]) -> Result<()>;

    /// Start forwarding the endpoint's notifications into `sink`
    ///
    /// Must be called once per endpoint before any write that expects a
    /// reply on it.
    async fn subscribe(&self, endpoint: EndpointId, sink: Arc<dyn NotificationSink>) -> Result<()>;
}

/// `EndpointTransport` over a connected BlueZ GATT device
pub struct BluerTransport {
    characteristics: Mutex<HashMap<EndpointId, Characteristic>>,
}

impl BluerTransport {
    /// Discover and cache the device's characteristics
    ///
    /// The device must already be connected; discovery waits up to 30 s for
    /// BlueZ to resolve the GATT database.
    pub async fn new(device: &Device) -> Result<Self> {
        const MAX_ATTEMPTS: u32 = 30;

        let mut attempts = 0;
        while !device.is_services_resolved().await.map_err(gatt_err)? {
            attempts += 1;
            if attempts >= MAX_ATTEMPTS {
                return Err(BandError::Transport(
                    "timed out waiting for GATT services to be resolved".to_string(),
                ));
            }
            sleep(Duration::from_secs(1)).await;
        }

        let mut characteristics = HashMap::new();
        for service in device.services().await.map_err(gatt_err)? {
            for characteristic in service.characteristics().await.map_err(gatt_err)? {
                let uuid = characteristic.uuid().await.map_err(gatt_err)?;
                characteristics.insert(EndpointId(uuid), characteristic);
            }
        }

        debug!("discovered {} characteristics", characteristics.len());
        Ok(Self {
            characteristics: Mutex::new(characteristics),
        })
    }

    fn characteristic(&self, endpoint: EndpointId) -> Result<Characteristic> {
        self.characteristics
            .lock()
            .unwrap()
            .get(&endpoint)
            .cloned()
            .ok_or_else(|| BandError::Transport(format!("characteristic {} not found", endpoint)))
    }
}

#[async_trait]
impl EndpointTransport for BluerTransport {
    async fn write(&self, endpoint: EndpointId, payload: &[u8]) -> Result<()> {
        debug!("-> {}: {:02X?}", endpoint, payload);
        let characteristic = self.characteristic(endpoint)?;
        characteristic.write(payload).await.map_err(gatt_err)
    }

    async fn subscribe(&self, endpoint: EndpointId, sink: Arc<dyn NotificationSink>) -> Result<()> {
        let characteristic = self.characteristic(endpoint)?;
        let stream = characteristic.notify().await.map_err(gatt_err)?;

        tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(value) = stream.next().await {
                sink.on_notification(endpoint, &value);
            }
            // The stream ends when the device disconnects or notifications
            // are turned off; the session owner is responsible for calling
            // Band::on_disconnected.
            warn!("notification stream ended for {}", endpoint);
        });

        Ok(())
    }
}

fn gatt_err(err: bluer::Error) -> BandError {
    BandError::Transport(err.to_string())
}
