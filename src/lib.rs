//! offload-rs
//!
//! Control bridge between a kernel-side packet-offload engine and the
//! tethering control client. This crate owns the narrow state machine in the
//! middle:
//!
//! - **Session lifecycle**: a single offload session per process, started by
//!   `init_offload` (which hands two duplicated conntrack netlink sockets to
//!   the engine) and torn down by `stop_offload` or client death, both of
//!   which run the identical path.
//! - **Request validation and translation**: CIDR/address checks before any
//!   engine call, and the fixed engine-outcome-to-result mapping.
//! - **Asynchronous relay**: offload lifecycle events forwarded verbatim, and
//!   conntrack NAT timeout refreshes translated into the client's wire shape
//!   (fire-and-forget; a malformed or undeliverable event is dropped).
//!
//! The offload engine itself and the RPC runtime hosting this service are
//! external: the engine is abstracted as the [`OffloadEngine`] trait, the
//! client as [`ControlCallback`].

pub mod callback;
pub mod config;
pub mod engine;
pub mod error;
pub mod local_log;
pub mod prefix;
pub mod relay;
pub mod session;

// Re-exports for convenience
pub use callback::{
    AddrPortPair, CallbackError, ControlCallback, DeathRecipient, NetworkProtocol, TimeoutUpdate,
};
pub use config::{load_service_config, ServiceConfig};
pub use engine::{
    CallResult, CtTimeoutListener, EngineOutcome, EventListener, FlowTuple, ForwardedStats,
    NatTimeoutUpdate, OffloadEngine, OffloadEvent,
};
pub use error::{ServiceError, ServiceResult};
pub use local_log::LocalLog;
pub use prefix::{Family, PrefixParser};
pub use relay::{CtUpdateRelay, EventRelay};
pub use session::OffloadSession;
