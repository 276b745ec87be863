//! AuthProtocol: the connect handshake for a phone.
//!
//! ```text
//! Pending ──(address blacklisted)──────────────────────────► Blacklisted
//!    │
//!    └──► Challenged ──(accept)──► Authorized   (session created, `authorized` sent)
//!              │
//!              └──(decline / timeout / hang-up)──► Rejected     (address now warned)
//!                                             └──► Blacklisted  (address was already warned)
//! ```
//!
//! The PIN the phone sent is shown to the operator as-is; there is no local
//! secret to compare it to.  The operator's answer is the only input to the
//! decision, and the warn-then-blacklist escalation is kept in
//! [`TrustRegistry`] independently of how the answer was obtained.
//!
//! A challenge that ends without an explicit accept counts as a decline,
//! including one whose phone hung up before the operator answered, so a
//! client that keeps connecting and hanging up is warned and then
//! blacklisted like one the operator declines.
//!
//! This use case depends only on traits ([`ChallengePrompt`],
//! [`OperatorNotifier`]) so it can be driven by scripted answers in tests.

use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use xpalm_core::{ChallengeDecision, ConnectionId, Escalation, ServerMessage};

use super::actuator::FeedbackReceiver;
use super::sessions::{Outbox, SessionError, SessionTable};
use super::trust::TrustRegistry;

/// Default bound on how long the operator has to answer.
pub const DEFAULT_CHALLENGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything known about a connection when it arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub connection_id: ConnectionId,
    pub source: IpAddr,
    /// The `pin` header of the upgrade request, empty when absent.
    pub pin: String,
}

/// Authorization state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Pending,
    Challenged,
    Authorized,
    Rejected,
    Blacklisted,
}

/// The operator's answer to a PIN challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeAnswer {
    Accept,
    Decline,
}

/// Asks the operator whether to let a phone in.
///
/// Implementations must be cancel-safe: the future is dropped if the phone
/// disconnects or the challenge times out.
#[async_trait]
pub trait ChallengePrompt: Send + Sync {
    async fn ask(&self, request: &ConnectRequest) -> ChallengeAnswer;
}

/// Informational notices surfaced to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Running,
    Connected(IpAddr),
    Disconnected(IpAddr),
}

impl Notice {
    pub fn title(&self) -> &'static str {
        match self {
            Notice::Running => "xPalm is running",
            Notice::Connected(_) => "Phone connected",
            Notice::Disconnected(_) => "Phone disconnected",
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            Notice::Running => "Open the xPalm app on your phone to connect",
            Notice::Connected(_) => "Your phone has connected to xPalm",
            Notice::Disconnected(_) => "Your phone has been disconnected from xPalm",
        }
    }
}

/// Sink for operator notices.
#[cfg_attr(test, mockall::automock)]
pub trait OperatorNotifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Result of the handshake.
#[derive(Debug)]
pub enum AuthOutcome {
    /// Session created; the receiver carries the gamepad's vibration edges.
    Authorized(FeedbackReceiver),
    /// Declined; the address is now warned.
    Rejected,
    /// The address is blacklisted, either already or as a result of this
    /// decline.
    Blacklisted,
    /// The operator accepted but the session could not be created.
    Aborted(SessionError),
}

impl AuthOutcome {
    /// Terminal [`AuthState`] for this outcome.
    pub fn state(&self) -> AuthState {
        match self {
            AuthOutcome::Authorized(_) => AuthState::Authorized,
            AuthOutcome::Rejected | AuthOutcome::Aborted(_) => AuthState::Rejected,
            AuthOutcome::Blacklisted => AuthState::Blacklisted,
        }
    }
}

/// Runs the connect handshake against shared trust and session state.
pub struct AuthProtocol {
    trust: Arc<TrustRegistry>,
    sessions: Arc<SessionTable>,
    prompt: Arc<dyn ChallengePrompt>,
    notifier: Arc<dyn OperatorNotifier>,
    challenge_timeout: Duration,
}

impl AuthProtocol {
    pub fn new(
        trust: Arc<TrustRegistry>,
        sessions: Arc<SessionTable>,
        prompt: Arc<dyn ChallengePrompt>,
        notifier: Arc<dyn OperatorNotifier>,
        challenge_timeout: Duration,
    ) -> Self {
        Self {
            trust,
            sessions,
            prompt,
            notifier,
            challenge_timeout,
        }
    }

    /// Authorizes `request`, sending `authorized` through `outbox` on success.
    ///
    /// The connection must already be open in the session table.  Rejection
    /// is never signalled in-band; the caller closes the connection for any
    /// outcome other than [`AuthOutcome::Authorized`].
    pub async fn authorize(&self, request: &ConnectRequest, outbox: Outbox) -> AuthOutcome {
        self.authorize_until_hang_up(request, outbox, std::future::pending::<()>())
            .await
    }

    /// Like [`authorize`](Self::authorize), but `hung_up` resolving while the
    /// operator is being asked ends the challenge as a decline.
    ///
    /// Only the unanswered challenge is raced against `hung_up`; once the
    /// operator has answered, the outcome is carried through.
    pub async fn authorize_until_hang_up<F>(
        &self,
        request: &ConnectRequest,
        outbox: Outbox,
        hung_up: F,
    ) -> AuthOutcome
    where
        F: Future<Output = ()>,
    {
        let ConnectRequest {
            connection_id: id,
            source,
            ..
        } = *request;
        let mut state = AuthState::Pending;

        if self.trust.check(source).await == ChallengeDecision::Refuse {
            info!(
                "{id}: {source} is blacklisted, refusing without a challenge ({} blacklisted)",
                self.trust.blacklisted_count().await
            );
            return AuthOutcome::Blacklisted;
        }
        if !self.sessions.is_open(id).await {
            return AuthOutcome::Aborted(SessionError::ConnectionClosed(id));
        }

        transition(id, &mut state, AuthState::Challenged);
        let asked = tokio::time::timeout(self.challenge_timeout, self.prompt.ask(request));
        let answer = tokio::select! {
            answered = asked => match answered {
                Ok(answer) => answer,
                Err(_) => {
                    warn!(
                        "{id}: challenge for {source} unanswered after {:?}, treating as declined",
                        self.challenge_timeout
                    );
                    ChallengeAnswer::Decline
                }
            },
            () = hung_up => {
                info!("{id}: {source} hung up during the challenge, treating as declined");
                ChallengeAnswer::Decline
            }
        };

        match answer {
            ChallengeAnswer::Accept => {
                self.trust.on_accepted(source).await;
                match self.sessions.create(id, source, outbox.clone()).await {
                    Ok((_actuator, feedback)) => {
                        transition(id, &mut state, AuthState::Authorized);
                        // A closed outbox means the socket is already gone;
                        // the caller's cleanup removes the session.
                        let _ = outbox.send(ServerMessage::Authorized);
                        self.notifier.notify(Notice::Connected(source));
                        AuthOutcome::Authorized(feedback)
                    }
                    Err(e) => {
                        warn!("{id}: accepted but session not created: {e}");
                        AuthOutcome::Aborted(e)
                    }
                }
            }
            ChallengeAnswer::Decline => match self.trust.on_rejected(source).await {
                Escalation::Warned => {
                    transition(id, &mut state, AuthState::Rejected);
                    AuthOutcome::Rejected
                }
                Escalation::Blacklisted => {
                    transition(id, &mut state, AuthState::Blacklisted);
                    AuthOutcome::Blacklisted
                }
            },
        }
    }
}

fn transition(id: ConnectionId, state: &mut AuthState, next: AuthState) {
    debug!("{id}: {state:?} -> {next:?}");
    *state = next;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
