//! Authentication state machine and handshake sequencing
//!
//! One session exists per connected device. The handshake proves possession
//! of the shared key: optionally register the key (first pairing), request a
//! random challenge, and return the challenge encrypted under the key. Each
//! step blocks on the single pending-request slot until the device replies
//! or the deadline fires.
//!
//! A failed handshake is not resumable; the session lands in `AuthFailed`
//! and the caller retries from the start. Partial device state cannot be
//! re-queried mid-sequence.

use crate::codec::{self, Command, Notification};
use crate::config::ProtocolConfig;
use crate::crypto;
use crate::dispatcher::{Exchange, ExpectedReply};
use crate::types::{AuthStatus, BandError, Key, Result};
use log::{debug, info, warn};

/// Authentication state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Disconnected,
    AwaitingAuthStart,
    KeyExchangeSent,
    ChallengeRequested,
    ChallengeReceived,
    ResponseSent,
    Authenticated,
    AuthFailed,
}

impl AuthState {
    /// States with a handshake step in flight
    fn is_mid_handshake(self) -> bool {
        matches!(
            self,
            AuthState::KeyExchangeSent
                | AuthState::ChallengeRequested
                | AuthState::ChallengeReceived
                | AuthState::ResponseSent
        )
    }
}

/// Per-connection session state
pub struct Session {
    auth_state: AuthState,
    random_challenge: Option<[u8; 16]>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            auth_state: AuthState::Disconnected,
            random_challenge: None,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth_state
    }

    /// Gate for every non-auth command
    pub(crate) fn ensure_authenticated(&self) -> Result<()> {
        match self.auth_state {
            AuthState::Authenticated => Ok(()),
            _ => Err(BandError::NotAuthenticated),
        }
    }

    /// Return to the initial state after a disconnect
    pub(crate) fn reset(&mut self) {
        self.auth_state = AuthState::Disconnected;
        self.random_challenge = None;
    }

    /// Run the full handshake
    ///
    /// The key is borrowed for the duration of this call only. Key length is
    /// validated before the session state or the transport is touched.
    pub(crate) async fn authenticate(
        &mut self,
        key: &Key,
        io: &Exchange<'_>,
        config: &ProtocolConfig,
    ) -> Result<AuthStatus> {
        let key_material: [u8; 16] = key
            .material()
            .try_into()
            .map_err(|_| BandError::InvalidKeyLength(key.material().len()))?;

        if self.auth_state.is_mid_handshake() {
            return Err(BandError::RequestInFlight);
        }

        self.auth_state = AuthState::AwaitingAuthStart;
        let result = self.run_handshake(&key_material, key.reset, io, config).await;
        self.random_challenge = None;

        match result {
            Ok(AuthStatus::Authenticated) => {
                self.auth_state = AuthState::Authenticated;
                info!("authentication complete");
                Ok(AuthStatus::Authenticated)
            }
            Ok(status) => {
                self.auth_state = AuthState::AuthFailed;
                warn!("device rejected authentication: {}", status);
                Err(BandError::AuthFailed(status))
            }
            Err(err) => {
                self.auth_state = AuthState::AuthFailed;
                Err(err)
            }
        }
    }

    async fn run_handshake(
        &mut self,
        key: &[u8; 16],
        reset: bool,
        io: &Exchange<'_>,
        config: &ProtocolConfig,
    ) -> Result<AuthStatus> {
        let ops = &config.op_codes;

        if reset {
            debug!("registering key with the device");
            let frame = codec::encode(&Command::AuthKeyExchange { key: *key }, config)?;
            self.auth_state = AuthState::KeyExchangeSent;
            let (status, _) = auth_step(io, config, &frame, ops.auth_key_exchange).await?;
            if status != ops.status_success {
                return auth_status(status, config);
            }
        }

        debug!("requesting challenge");
        let frame = codec::encode(&Command::RequestChallenge, config)?;
        self.auth_state = AuthState::ChallengeRequested;
        let (status, payload) = auth_step(io, config, &frame, ops.auth_request_challenge).await?;
        if status != ops.status_success {
            return auth_status(status, config);
        }

        let challenge: [u8; 16] = payload.as_slice().try_into().map_err(|_| {
            BandError::Protocol(format!(
                "challenge has {} bytes, expected 16",
                payload.len()
            ))
        })?;
        self.auth_state = AuthState::ChallengeReceived;
        self.random_challenge = Some(challenge);

        let response = crypto::compute_response(key, &challenge)?;
        self.random_challenge = None;

        debug!("submitting challenge response");
        let frame = codec::encode(&Command::SubmitResponse { response }, config)?;
        self.auth_state = AuthState::ResponseSent;
        let (status, _) = auth_step(io, config, &frame, ops.auth_submit_response).await?;
        auth_status(status, config)
    }
}

/// Send one handshake frame and verify the reply answers this step
///
/// The device echoes the step op in its reply; anything else means the
/// sequence is broken and the handshake aborts rather than waiting for a
/// reply that will never come.
async fn auth_step(
    io: &Exchange<'_>,
    config: &ProtocolConfig,
    frame: &[u8],
    expected_op: u8,
) -> Result<(u8, Vec<u8>)> {
    let reply = io
        .request(config.auth_endpoint, frame, ExpectedReply::AuthReply)
        .await?;

    match reply {
        Notification::AuthReply { op, status, payload } if op == expected_op => {
            Ok((status, payload))
        }
        Notification::AuthReply { op, .. } => Err(BandError::Protocol(format!(
            "out-of-order auth reply: expected op {:#04x}, got {:#04x}",
            expected_op, op
        ))),
        other => Err(BandError::Protocol(format!(
            "unexpected reply to auth step: {:?}",
            other
        ))),
    }
}

fn auth_status(status: u8, config: &ProtocolConfig) -> Result<AuthStatus> {
    let ops = &config.op_codes;
    if status == ops.status_success {
        Ok(AuthStatus::Authenticated)
    } else if status == ops.status_key_mismatch {
        Ok(AuthStatus::KeyMismatch)
    } else if status == ops.status_aborted {
        Ok(AuthStatus::Aborted)
    } else {
        Err(BandError::Protocol(format!(
            "unknown auth status code: {:#04x}",
            status
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_disconnected() {
        let session = Session::new();
        assert_eq!(session.auth_state(), AuthState::Disconnected);
        assert!(matches!(
            session.ensure_authenticated(),
            Err(BandError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_reset_clears_challenge() {
        let mut session = Session::new();
        session.auth_state = AuthState::Authenticated;
        session.random_challenge = Some([0xAA; 16]);

        session.reset();
        assert_eq!(session.auth_state(), AuthState::Disconnected);
        assert!(session.random_challenge.is_none());
    }

    #[test]
    fn test_auth_status_mapping() {
        let config = ProtocolConfig::default();
        assert_eq!(auth_status(0x01, &config).unwrap(), AuthStatus::Authenticated);
        assert_eq!(auth_status(0x04, &config).unwrap(), AuthStatus::KeyMismatch);
        assert_eq!(auth_status(0x02, &config).unwrap(), AuthStatus::Aborted);
        assert!(matches!(
            auth_status(0x7F, &config),
            Err(BandError::Protocol(_))
        ));
    }

    #[test]
    fn test_mid_handshake_states() {
        assert!(AuthState::ResponseSent.is_mid_handshake());
        assert!(AuthState::KeyExchangeSent.is_mid_handshake());
        assert!(!AuthState::Authenticated.is_mid_handshake());
        assert!(!AuthState::Disconnected.is_mid_handshake());
    }
}
