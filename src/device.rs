//! High-level device facade
//!
//! `Band` is the public API of the engine: it sequences codec, session, and
//! transport calls for each operation and parks the caller until the matching
//! reply notification arrives. One session per connected device; operations
//! on the same `Band` are mutually exclusive because the protocol allows only
//! one outstanding request at a time.

use crate::codec::{self, Command, Notification};
use crate::config::ProtocolConfig;
use crate::dispatcher::{Exchange, ExpectedReply, NotificationDispatcher};
use crate::session::{AuthState, Session};
use crate::transport::{EndpointTransport, NotificationSink};
use crate::types::{
    Alarm, AlertKind, AuthStatus, BandError, BatteryInfo, DeviceEvent, Key, Result,
};
use chrono::NaiveDateTime;
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A session with one connected band
pub struct Band {
    transport: Arc<dyn EndpointTransport>,
    dispatcher: Arc<NotificationDispatcher>,
    session: Mutex<Session>,
    config: Arc<ProtocolConfig>,
}

impl Band {
    /// Create a session using the default (Mi Band 2 lineage) protocol config
    pub fn new(transport: Arc<dyn EndpointTransport>) -> Self {
        Self::with_config(transport, ProtocolConfig::default())
    }

    /// Create a session targeting a specific protocol variant
    pub fn with_config(transport: Arc<dyn EndpointTransport>, config: ProtocolConfig) -> Self {
        let config = Arc::new(config);
        Self {
            dispatcher: Arc::new(NotificationDispatcher::new(Arc::clone(&config))),
            session: Mutex::new(Session::new()),
            transport,
            config,
        }
    }

    /// Subscribe the dispatcher to the device's notify endpoints
    ///
    /// Must be called once after the transport is connected, before any
    /// operation that expects a reply.
    pub async fn initialize(&self) -> Result<()> {
        let sink: Arc<dyn NotificationSink> = self.dispatcher.clone();
        self.transport
            .subscribe(self.config.auth_endpoint, Arc::clone(&sink))
            .await?;
        self.transport
            .subscribe(self.config.notify_endpoint, sink)
            .await?;
        info!("subscribed to auth and notify endpoints");
        Ok(())
    }

    /// Run the authentication handshake
    ///
    /// The key is borrowed for this call only. On rejection the session lands
    /// in `AuthFailed` and `auth` may be called again to retry from scratch.
    pub async fn auth(&self, key: &Key) -> Result<AuthStatus> {
        let mut session = self.session.lock().await;
        session.authenticate(key, &self.exchange(), &self.config).await
    }

    /// Request a battery report
    pub async fn get_battery(&self) -> Result<BatteryInfo> {
        let session = self.session.lock().await;
        session.ensure_authenticated()?;

        let frame = codec::encode(&Command::BatteryRequest, &self.config)?;
        let reply = self
            .exchange()
            .request(
                self.config.command_endpoint,
                &frame,
                ExpectedReply::BatteryReply,
            )
            .await?;

        match reply {
            Notification::BatteryReply(info) => {
                debug!("battery at {}%", info.level);
                Ok(info)
            }
            other => Err(BandError::Protocol(format!(
                "unexpected battery reply: {:?}",
                other
            ))),
        }
    }

    /// Ring the band; fire-and-forget, no reply is waited for
    pub async fn ring(&self, kind: AlertKind) -> Result<()> {
        let session = self.session.lock().await;
        session.ensure_authenticated()?;

        let frame = codec::encode(&Command::Alert { kind }, &self.config)?;
        self.transport
            .write(self.config.command_endpoint, &frame)
            .await
    }

    /// Set the device clock
    pub async fn set_datetime(&self, time: NaiveDateTime) -> Result<()> {
        let session = self.session.lock().await;
        session.ensure_authenticated()?;

        let frame = codec::encode(&Command::SetTime { time }, &self.config)?;
        self.acked_write(&frame, self.config.op_codes.set_time, "set_time")
            .await
    }

    /// Configure an alarm slot
    pub async fn set_alarm(&self, alarm: &Alarm) -> Result<()> {
        let session = self.session.lock().await;
        session.ensure_authenticated()?;

        let frame = codec::encode(&Command::SetAlarm { alarm: *alarm }, &self.config)?;
        self.acked_write(&frame, self.config.op_codes.set_alarm, "set_alarm")
            .await
    }

    /// Register a callback for unsolicited device events (button press, ...)
    pub fn on_event(&self, listener: Box<dyn Fn(DeviceEvent) + Send + Sync>) {
        self.dispatcher.add_listener(listener);
    }

    /// Tell the session the transport is gone
    ///
    /// Any caller blocked on a reply is resolved with `Disconnected`; the
    /// session returns to its initial state so a fresh handshake can run
    /// after reconnection.
    pub async fn on_disconnected(&self) {
        self.dispatcher.fail_pending();
        self.session.lock().await.reset();
        info!("session reset after disconnect");
    }

    /// Current authentication state
    pub async fn auth_state(&self) -> AuthState {
        self.session.lock().await.auth_state()
    }

    fn exchange(&self) -> Exchange<'_> {
        Exchange {
            transport: self.transport.as_ref(),
            dispatcher: self.dispatcher.as_ref(),
            timeout: self.config.response_timeout,
        }
    }

    async fn acked_write(&self, frame: &[u8], op: u8, what: &str) -> Result<()> {
        let reply = self
            .exchange()
            .request(
                self.config.command_endpoint,
                frame,
                ExpectedReply::Ack { op },
            )
            .await?;

        match reply {
            Notification::Ack { status, .. } if status == self.config.op_codes.status_success => {
                Ok(())
            }
            Notification::Ack { status, .. } => Err(BandError::Protocol(format!(
                "device rejected {} with status {:#04x}",
                what, status
            ))),
            other => Err(BandError::Protocol(format!(
                "unexpected ack for {}: {:?}",
                what, other
            ))),
        }
    }
}
