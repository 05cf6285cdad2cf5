//! Listener relays between the offload engine and the control client.
//!
//! `EventRelay` forwards offload lifecycle events verbatim. `CtUpdateRelay`
//! translates conntrack NAT timeout refreshes into the wire shape. Both are
//! fire-and-forget: a malformed record or a failed delivery is logged and
//! dropped, never surfaced back to the engine's listener thread, which has
//! no recovery path for a single event.

use log::warn;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::callback::{AddrPortPair, ControlCallback, NetworkProtocol, TimeoutUpdate};
use crate::engine::{
    CtTimeoutListener, EventListener, FlowTuple, NatTimeoutUpdate, OffloadEvent, IPPROTO_TCP,
    IPPROTO_UDP,
};

/// Forwards offload lifecycle events to the control client unchanged.
pub struct EventRelay {
    callback: Arc<dyn ControlCallback>,
}

impl EventRelay {
    /// Create a relay delivering to `callback`.
    pub fn new(callback: Arc<dyn ControlCallback>) -> Self {
        Self { callback }
    }
}

impl EventListener for EventRelay {
    fn on_event(&self, event: OffloadEvent) {
        if let Err(err) = self.callback.on_event(event) {
            warn!("Failed to deliver offload event {event:?}: {err}");
        }
    }
}

/// Translates conntrack NAT timeout refreshes and delivers them to the
/// control client.
pub struct CtUpdateRelay {
    callback: Arc<dyn ControlCallback>,
}

impl CtUpdateRelay {
    /// Create a relay delivering to `callback`.
    pub fn new(callback: Arc<dyn ControlCallback>) -> Self {
        Self { callback }
    }

    /// Translate one internal record into the wire shape.
    ///
    /// Only TCP and UDP flows are translatable; any other protocol number is
    /// a translation failure and drops the whole event.
    fn translate(update: &NatTimeoutUpdate) -> Option<TimeoutUpdate> {
        let proto = match update.proto {
            IPPROTO_TCP => NetworkProtocol::Tcp,
            IPPROTO_UDP => NetworkProtocol::Udp,
            other => {
                warn!("Dropping NAT timeout update with unsupported protocol {other}");
                return None;
            }
        };
        Some(TimeoutUpdate {
            src: format_tuple(update.src),
            dst: format_tuple(update.dst),
            proto,
        })
    }
}

impl CtTimeoutListener for CtUpdateRelay {
    fn on_timeout_update(&self, update: &NatTimeoutUpdate) {
        let Some(translated) = Self::translate(update) else {
            return;
        };
        if let Err(err) = self.callback.update_timeout(translated) {
            warn!("Failed to deliver NAT timeout update: {err}");
        }
    }
}

/// Format one flow tuple: dotted-decimal address, port copied verbatim.
fn format_tuple(tuple: FlowTuple) -> AddrPortPair {
    AddrPortPair {
        addr: Ipv4Addr::from(tuple.addr).to_string(),
        port: tuple.port,
    }
}
