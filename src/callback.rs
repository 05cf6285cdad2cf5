//! Control-client callback contract and wire types.
//!
//! The control client registers one callback object at `init_offload` time;
//! the session delivers two kinds of asynchronous traffic through it:
//! offload lifecycle events (verbatim) and translated NAT timeout refreshes.
//! The client may die at any point, so the callback also carries the
//! death-notification hooks the session arms and disarms in lockstep with
//! the registration.

use std::sync::{Arc, Weak};
use thiserror::Error;

use crate::engine::OffloadEvent;
use crate::session::OffloadSession;

/// L4 protocol tag on the wire. Values are the IPPROTO numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkProtocol {
    /// TCP (IPPROTO 6).
    Tcp = 6,
    /// UDP (IPPROTO 17).
    Udp = 17,
}

/// One side of a translated NAT flow: dotted-decimal address plus port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrPortPair {
    /// IPv4 address in dotted-decimal text.
    pub addr: String,
    /// L4 port, copied verbatim from the conntrack record.
    pub port: u16,
}

/// Wire-format NAT timeout refresh delivered to the control client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutUpdate {
    /// Translated source of the tracked flow.
    pub src: AddrPortPair,
    /// Translated destination of the tracked flow.
    pub dst: AddrPortPair,
    /// L4 protocol of the flow.
    pub proto: NetworkProtocol,
}

/// Error reported by the callback transport (e.g. a dead remote).
#[derive(Debug, Clone, Error)]
#[error("callback transport error: {0}")]
pub struct CallbackError(pub String);

/// The control client's callback object.
///
/// Both delivery methods are fire-and-forget from the session's point of
/// view: a transport failure is logged by the caller and otherwise ignored,
/// since the event sources have no feedback channel.
pub trait ControlCallback: Send + Sync {
    /// Deliver an offload lifecycle event.
    fn on_event(&self, event: OffloadEvent) -> Result<(), CallbackError>;

    /// Deliver a translated NAT timeout refresh.
    fn update_timeout(&self, update: TimeoutUpdate) -> Result<(), CallbackError>;

    /// Arm a death notification for the client process behind this callback.
    /// Returns false if the link could not be established.
    fn link_to_death(&self, recipient: DeathRecipient) -> bool;

    /// Disarm a previously armed death notification.
    fn unlink_from_death(&self);
}

/// Weak back-reference from a client-death watcher to the session.
///
/// Never owns the session. Notifying after the session is gone, or after the
/// session already tore down, is a no-op.
#[derive(Clone)]
pub struct DeathRecipient {
    session: Weak<OffloadSession>,
}

impl DeathRecipient {
    pub(crate) fn new(session: &Arc<OffloadSession>) -> Self {
        Self {
            session: Arc::downgrade(session),
        }
    }

    /// The client process died: run the same teardown as an explicit
    /// `stop_offload`.
    pub fn notify(&self) {
        if let Some(session) = self.session.upgrade() {
            session.on_client_death();
        }
    }
}
