//! Notification demultiplexing and request/reply correlation
//!
//! The device pushes notifications asynchronously on its notify endpoints;
//! the application-level protocol allows exactly one outstanding request at a
//! time. The dispatcher owns that capacity-one correlation slot: a pending
//! request is a oneshot resolver plus a description of the reply that
//! resolves it. Everything else that arrives is either an unsolicited event
//! (forwarded to listeners) or residue from a timed-out request (logged and
//! dropped, never an error).

use crate::codec::{self, Notification};
use crate::config::ProtocolConfig;
use crate::transport::{EndpointTransport, NotificationSink};
use crate::types::{BandError, DeviceEvent, EndpointId, Result};
use log::{debug, trace};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Shape of the reply that resolves a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpectedReply {
    /// Any auth-endpoint reply; the handshake verifies the step op itself so
    /// an out-of-order reply aborts immediately instead of timing out
    AuthReply,
    BatteryReply,
    Ack { op: u8 },
}

impl ExpectedReply {
    fn matches(&self, notification: &Notification) -> bool {
        match (self, notification) {
            (ExpectedReply::AuthReply, Notification::AuthReply { .. }) => true,
            (ExpectedReply::BatteryReply, Notification::BatteryReply(_)) => true,
            (ExpectedReply::Ack { op }, Notification::Ack { op: got, .. }) => op == got,
            _ => false,
        }
    }
}

struct PendingRequest {
    expected: ExpectedReply,
    resolver: oneshot::Sender<Notification>,
}

/// Demultiplexes incoming endpoint notifications
pub struct NotificationDispatcher {
    config: Arc<ProtocolConfig>,
    pending: Mutex<Option<PendingRequest>>,
    listeners: Mutex<Vec<Box<dyn Fn(DeviceEvent) + Send + Sync>>>,
}

impl NotificationDispatcher {
    pub(crate) fn new(config: Arc<ProtocolConfig>) -> Self {
        Self {
            config,
            pending: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Install the pending request slot and hand back its resolver end
    pub(crate) fn begin_request(
        &self,
        expected: ExpectedReply,
    ) -> Result<oneshot::Receiver<Notification>> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_some() {
            return Err(BandError::RequestInFlight);
        }

        let (resolver, reply) = oneshot::channel();
        *pending = Some(PendingRequest { expected, resolver });
        Ok(reply)
    }

    /// Clear the slot after a timeout or failed write
    ///
    /// A reply that still arrives afterwards is handled as unmatched.
    pub(crate) fn cancel_request(&self) {
        if self.pending.lock().unwrap().take().is_some() {
            debug!("pending request cancelled");
        }
    }

    /// Drop the resolver so a blocked caller observes `Disconnected`
    pub(crate) fn fail_pending(&self) {
        if self.pending.lock().unwrap().take().is_some() {
            debug!("pending request failed by disconnect");
        }
    }

    pub(crate) fn add_listener(&self, listener: Box<dyn Fn(DeviceEvent) + Send + Sync>) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Entry point for raw endpoint data, invoked by the transport
    pub fn dispatch(&self, endpoint: EndpointId, data: &[u8]) {
        trace!("<- {}: {:02X?}", endpoint, data);
        let notification = codec::decode(endpoint, data, &self.config);

        {
            let mut pending = self.pending.lock().unwrap();
            if let Some(request) = pending.as_ref() {
                if request.expected.matches(&notification) {
                    let request = pending.take().unwrap();
                    drop(pending);
                    if request.resolver.send(notification).is_err() {
                        debug!("reply from {} arrived after the caller gave up", endpoint);
                    }
                    return;
                }
            }
        }

        match notification {
            Notification::Unsolicited(event) => {
                let listeners = self.listeners.lock().unwrap();
                debug!("unsolicited event for {} listeners: {:?}", listeners.len(), event);
                for listener in listeners.iter() {
                    listener(event.clone());
                }
            }
            other => {
                // Residual replies after a timeout land here; dropping them
                // keeps the session usable for the next request.
                debug!("dropping unmatched notification from {}: {:?}", endpoint, other);
            }
        }
    }
}

impl NotificationSink for NotificationDispatcher {
    fn on_notification(&self, endpoint: EndpointId, data: &[u8]) {
        self.dispatch(endpoint, data);
    }
}

/// One write-then-await-reply exchange against the pending slot
pub(crate) struct Exchange<'a> {
    pub transport: &'a dyn EndpointTransport,
    pub dispatcher: &'a NotificationDispatcher,
    pub timeout: Duration,
}

impl Exchange<'_> {
    /// Install the pending request, write the frame, and race the reply
    /// against the deadline
    ///
    /// Timeouts and write failures clear the slot; a late reply from the
    /// device is then dropped by the dispatcher. A dropped resolver (abrupt
    /// disconnect) surfaces as `Disconnected`.
    pub(crate) async fn request(
        &self,
        endpoint: EndpointId,
        frame: &[u8],
        expected: ExpectedReply,
    ) -> Result<Notification> {
        let reply = self.dispatcher.begin_request(expected)?;

        if let Err(err) = self.transport.write(endpoint, frame).await {
            self.dispatcher.cancel_request();
            return Err(err);
        }

        match tokio::time::timeout(self.timeout, reply).await {
            Ok(Ok(notification)) => Ok(notification),
            Ok(Err(_)) => Err(BandError::Disconnected),
            Err(_) => {
                self.dispatcher.cancel_request();
                Err(BandError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BatteryInfo;

    fn dispatcher() -> NotificationDispatcher {
        NotificationDispatcher::new(Arc::new(ProtocolConfig::default()))
    }

    #[test]
    fn test_matching_reply_resolves_pending() {
        let dispatcher = dispatcher();
        let config = ProtocolConfig::default();

        let mut reply = dispatcher.begin_request(ExpectedReply::BatteryReply).unwrap();
        dispatcher.dispatch(config.notify_endpoint, &[0x06, 0x4B]);

        match reply.try_recv().unwrap() {
            Notification::BatteryReply(BatteryInfo { level: 75, .. }) => {}
            other => panic!("expected battery reply, got {:?}", other),
        }
    }

    #[test]
    fn test_second_request_is_rejected() {
        let dispatcher = dispatcher();
        let _reply = dispatcher.begin_request(ExpectedReply::BatteryReply).unwrap();
        assert!(matches!(
            dispatcher.begin_request(ExpectedReply::AuthReply),
            Err(BandError::RequestInFlight)
        ));
    }

    #[test]
    fn test_cancel_frees_the_slot() {
        let dispatcher = dispatcher();
        let _reply = dispatcher.begin_request(ExpectedReply::BatteryReply).unwrap();
        dispatcher.cancel_request();
        assert!(dispatcher.begin_request(ExpectedReply::BatteryReply).is_ok());
    }

    #[test]
    fn test_fail_pending_drops_resolver() {
        let dispatcher = dispatcher();
        let mut reply = dispatcher.begin_request(ExpectedReply::BatteryReply).unwrap();
        dispatcher.fail_pending();
        assert!(reply.try_recv().is_err());
    }

    #[test]
    fn test_unsolicited_event_reaches_listeners() {
        let dispatcher = dispatcher();
        let config = ProtocolConfig::default();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.add_listener(Box::new(move |event| {
            sink.lock().unwrap().push(event);
        }));

        dispatcher.dispatch(config.notify_endpoint, &[0x07]);

        assert_eq!(seen.lock().unwrap().as_slice(), &[DeviceEvent::ButtonPress]);
    }

    #[test]
    fn test_unmatched_reply_is_dropped() {
        let dispatcher = dispatcher();
        let config = ProtocolConfig::default();

        // No pending request: an ack is residue, not an event and not an error
        dispatcher.dispatch(config.notify_endpoint, &[0x10, 0x0A, 0x01]);

        // Pending battery request: an ack does not resolve it
        let mut reply = dispatcher.begin_request(ExpectedReply::BatteryReply).unwrap();
        dispatcher.dispatch(config.notify_endpoint, &[0x10, 0x0A, 0x01]);
        assert!(matches!(
            reply.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        ));
    }
}
