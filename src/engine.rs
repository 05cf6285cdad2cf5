//! Contract with the packet-offload engine.
//!
//! The engine itself (kernel-bypass acceleration for tethered traffic) is an
//! external component; this module pins the shape of its contract: the
//! outcome taxonomy every engine call collapses to, the listener traits the
//! session registers for asynchronous events, and the conntrack netlink
//! multicast group masks that ride along with the descriptor hand-off.

use ipnet::IpNet;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::os::fd::BorrowedFd;
use std::sync::Arc;

// ============================================================================
// Conntrack netlink groups (wire contract with the kernel)
// ============================================================================

/// Conntrack event group bit: new connection.
pub const NF_NETLINK_CONNTRACK_NEW: u32 = 0x1;
/// Conntrack event group bit: connection state updated.
pub const NF_NETLINK_CONNTRACK_UPDATE: u32 = 0x2;
/// Conntrack event group bit: connection destroyed.
pub const NF_NETLINK_CONNTRACK_DESTROY: u32 = 0x4;

/// Subscription mask for the UDP-class conntrack socket (new + destroy).
pub const UDP_SUBSCRIPTIONS: u32 = NF_NETLINK_CONNTRACK_NEW | NF_NETLINK_CONNTRACK_DESTROY;
/// Subscription mask for the TCP-class conntrack socket (update + destroy).
pub const TCP_SUBSCRIPTIONS: u32 = NF_NETLINK_CONNTRACK_UPDATE | NF_NETLINK_CONNTRACK_DESTROY;

/// IPPROTO number for TCP.
pub const IPPROTO_TCP: u8 = 6;
/// IPPROTO number for UDP.
pub const IPPROTO_UDP: u8 = 17;

// ============================================================================
// Engine call outcomes
// ============================================================================

/// Outcome of a call into the offload engine.
///
/// The set of outcomes and their success/failure split are a contract of the
/// engine interface. The split is enumerated in [`is_success`] and must stay
/// exactly as written; it replaces the engine's ordinal comparison against
/// its first success value.
///
/// [`is_success`]: EngineOutcome::is_success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    /// More prefixes than the hardware tables can hold.
    FailTooManyPrefixes,
    /// Request not supported by the hardware.
    FailUnsupported,
    /// Request failed the engine's own input checks.
    FailInputCheck,
    /// Hardware refused the request.
    FailHardware,
    /// Transient contention; the caller may retry.
    FailTryAgain,
    /// Unclassified failure.
    FailUnknown,
    /// Request applied.
    Success,
    /// Request matched configuration already in place.
    SuccessDuplicateConfig,
    /// Request required no action.
    SuccessNoOp,
    /// Request satisfied by an existing optimization.
    SuccessOptimized,
}

impl EngineOutcome {
    /// Whether this outcome counts as overall success.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            EngineOutcome::Success
                | EngineOutcome::SuccessDuplicateConfig
                | EngineOutcome::SuccessNoOp
                | EngineOutcome::SuccessOptimized
        )
    }

    /// Fixed human-readable text for this outcome.
    pub fn message(self) -> &'static str {
        match self {
            EngineOutcome::FailTooManyPrefixes => "Too Many Prefixes Provided",
            EngineOutcome::FailUnsupported => "Unsupported by Hardware",
            EngineOutcome::FailInputCheck => "Failed Input Checks",
            EngineOutcome::FailHardware => "Hardware Did Not Accept",
            EngineOutcome::FailTryAgain => "Try Again",
            EngineOutcome::FailUnknown => "Unknown Error",
            EngineOutcome::Success => "Successful",
            EngineOutcome::SuccessDuplicateConfig => "Successful: Duplicate Config Provided",
            EngineOutcome::SuccessNoOp => "Successful: No Action Needed",
            EngineOutcome::SuccessOptimized => "Successful: Optimized Away",
        }
    }
}

/// Uniform internal result record: success flag plus human-readable message.
///
/// Every validation and engine-call path collapses to one of these; the
/// public API layer converts it into an `Ok(())` or a [`ServiceError`].
///
/// [`ServiceError`]: crate::error::ServiceError
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    /// Overall success flag.
    pub success: bool,
    /// Descriptive text for the outcome.
    pub message: String,
}

impl CallResult {
    /// Create a success result.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Create a failure result.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl From<EngineOutcome> for CallResult {
    fn from(outcome: EngineOutcome) -> Self {
        Self {
            success: outcome.is_success(),
            message: outcome.message().to_string(),
        }
    }
}

// ============================================================================
// Statistics and asynchronous events
// ============================================================================

/// Cumulative forwarded traffic totals for one upstream interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardedStats {
    /// Bytes received from the upstream and forwarded downstream.
    pub rx_bytes: u64,
    /// Bytes received from downstreams and forwarded upstream.
    pub tx_bytes: u64,
}

/// Offload lifecycle events, forwarded verbatim to the control client.
///
/// Discriminants are the wire values of the callback interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffloadEvent {
    /// Offload started operating.
    Started = 1,
    /// Offload stopped due to an error.
    StoppedError = 2,
    /// Offload stopped: configuration no longer supported.
    StoppedUnsupported = 3,
    /// Offload support has (re)become available.
    SupportAvailable = 4,
    /// Offload stopped: data limit reached.
    StoppedLimitReached = 5,
    /// Data warning threshold reached; offload keeps running.
    WarningReached = 6,
}

/// One side of a NAT flow as read off the conntrack socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTuple {
    /// IPv4 address, first octet in the most significant byte.
    pub addr: u32,
    /// L4 port.
    pub port: u16,
}

/// One NAT timeout refresh as reported by conntrack.
///
/// `proto` is the raw IPPROTO number; only TCP and UDP are translatable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NatTimeoutUpdate {
    /// Source address/port of the tracked flow.
    pub src: FlowTuple,
    /// Destination address/port of the tracked flow.
    pub dst: FlowTuple,
    /// IPPROTO number of the flow.
    pub proto: u8,
}

// ============================================================================
// Engine interface
// ============================================================================

/// Listener for generic offload lifecycle events.
pub trait EventListener: Send + Sync {
    /// Called by the engine when an offload lifecycle event fires.
    fn on_event(&self, event: OffloadEvent);
}

/// Listener for conntrack NAT timeout refreshes.
pub trait CtTimeoutListener: Send + Sync {
    /// Called by the engine for each NAT timeout refresh it observes.
    fn on_timeout_update(&self, update: &NatTimeoutUpdate);
}

/// The packet-offload engine, treated as an opaque synchronous service.
pub trait OffloadEngine: Send + Sync {
    /// Hand a duplicated conntrack socket to the engine together with the
    /// netlink multicast group mask it is subscribed to.
    fn provide_fd(&self, fd: BorrowedFd<'_>, groups: u32) -> EngineOutcome;

    /// Stop all offload activity.
    fn stop_all_offload(&self) -> EngineOutcome;

    /// Drop every descriptor previously handed over via [`provide_fd`].
    ///
    /// [`provide_fd`]: OffloadEngine::provide_fd
    fn clear_all_fds(&self) -> EngineOutcome;

    /// Configure (or, with `iface == None`, tear down) the upstream path.
    fn set_upstream(
        &self,
        iface: Option<&str>,
        v4_gateway: Option<Ipv4Addr>,
        v6_gateway: Option<Ipv6Addr>,
    ) -> EngineOutcome;

    /// Start offloading traffic for a downstream interface/prefix pair.
    fn add_downstream(&self, iface: &str, prefix: &IpNet) -> EngineOutcome;

    /// Stop offloading traffic for a downstream interface/prefix pair.
    fn remove_downstream(&self, iface: &str, prefix: &IpNet) -> EngineOutcome;

    /// Read forwarded-traffic statistics for an upstream interface.
    /// `cumulative` selects totals since engine start rather than deltas.
    fn get_stats(&self, upstream: &str, cumulative: bool) -> Result<ForwardedStats, EngineOutcome>;

    /// Program the data warning/limit thresholds for an upstream interface.
    /// The engine takes the limit before the warning.
    fn set_quota_warning(&self, upstream: &str, limit_bytes: u64, warning_bytes: u64)
        -> EngineOutcome;

    /// Register the listener for generic offload events.
    fn register_event_listener(&self, listener: Arc<dyn EventListener>) -> EngineOutcome;

    /// Unregister the listener for generic offload events.
    fn unregister_event_listener(&self) -> EngineOutcome;

    /// Register the listener for conntrack NAT timeout refreshes.
    fn register_ct_timeout_listener(&self, listener: Arc<dyn CtTimeoutListener>) -> EngineOutcome;

    /// Unregister the listener for conntrack NAT timeout refreshes.
    fn unregister_ct_timeout_listener(&self) -> EngineOutcome;
}
