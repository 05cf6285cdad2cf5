//! Offload session lifecycle and request validation.
//!
//! One `OffloadSession` exists per service process. It owns the single
//! offload session's state: the registered control callback, the two
//! duplicated conntrack socket handles, and the listener relays. The session
//! has exactly two states, UNINITIALIZED and INITIALIZED; a failure partway
//! through `init_offload` fully reverts to UNINITIALIZED before returning,
//! and client death runs the identical teardown as an explicit
//! `stop_offload`.
//!
//! The RPC runtime delivering these calls may be multi-threaded, so all
//! session state sits behind one mutex, and every operation holds the guard
//! across its initialized-check, validation, and engine call. A teardown can
//! therefore never interleave with an in-flight configuration call.

use log::{info, warn};
use std::os::fd::{AsFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::callback::{ControlCallback, DeathRecipient};
use crate::config::ServiceConfig;
use crate::engine::{
    CallResult, EngineOutcome, ForwardedStats, OffloadEngine, TCP_SUBSCRIPTIONS,
    UDP_SUBSCRIPTIONS,
};
use crate::error::{ServiceError, ServiceResult};
use crate::local_log::LocalLog;
use crate::prefix::{Family, PrefixParser};
use crate::relay::{CtUpdateRelay, EventRelay};

/// Mutable session state. `initialized` is exactly `callback.is_some()`;
/// the handles and relays are populated and cleared in lockstep with it.
struct SessionState {
    callback: Option<Arc<dyn ControlCallback>>,
    handle1: Option<OwnedFd>,
    handle2: Option<OwnedFd>,
    event_relay: Option<Arc<EventRelay>>,
    ct_relay: Option<Arc<CtUpdateRelay>>,
}

impl SessionState {
    fn empty() -> Self {
        Self {
            callback: None,
            handle1: None,
            handle2: None,
            event_relay: None,
            ct_relay: None,
        }
    }

    fn initialized(&self) -> bool {
        self.callback.is_some()
    }
}

/// The offload session manager.
///
/// Validates every inbound request, forwards validated requests to the
/// offload engine, and keeps the duplicated descriptors, registered
/// listeners, and callback reference consistent at all times.
pub struct OffloadSession {
    engine: Arc<dyn OffloadEngine>,
    state: Mutex<SessionState>,
    local_log: Mutex<LocalLog>,
}

impl OffloadSession {
    /// Create an uninitialized session bound to `engine`.
    pub fn new(engine: Arc<dyn OffloadEngine>) -> Arc<Self> {
        Self::with_config(engine, ServiceConfig::default())
    }

    /// Create an uninitialized session with an explicit configuration.
    pub fn with_config(engine: Arc<dyn OffloadEngine>, config: ServiceConfig) -> Arc<Self> {
        Arc::new(Self {
            engine,
            state: Mutex::new(SessionState::empty()),
            local_log: Mutex::new(LocalLog::new(config.local_log_capacity)),
        })
    }

    /// Whether a control callback is currently registered.
    pub fn is_initialized(&self) -> bool {
        self.lock_state().initialized()
    }

    /// Diagnostic call log, oldest entry first.
    pub fn dump(&self) -> Vec<String> {
        self.local_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dump()
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Start the offload session.
    ///
    /// Duplicates both conntrack socket descriptors (the caller keeps its
    /// own), hands them to the engine with the fixed UDP/TCP netlink
    /// subscription masks, registers the event and conntrack listeners, and
    /// arms a death notification on the callback. Any failure reverts the
    /// session fully to UNINITIALIZED.
    pub fn init_offload(
        self: &Arc<Self>,
        fd1: RawFd,
        fd2: RawFd,
        callback: Option<Arc<dyn ControlCallback>>,
    ) -> ServiceResult<()> {
        let result = self.do_init_offload(fd1, fd2, callback);
        self.record(format!(
            "init_offload(fd1={fd1}, fd2={fd2}) -> {}",
            outcome_text(&result)
        ));
        result
    }

    fn do_init_offload(
        self: &Arc<Self>,
        fd1: RawFd,
        fd2: RawFd,
        callback: Option<Arc<dyn ControlCallback>>,
    ) -> ServiceResult<()> {
        let mut state = self.lock_state();
        if state.initialized() {
            return Err(ServiceError::illegal_state("Already initialized"));
        }
        let callback = callback
            .ok_or_else(|| ServiceError::illegal_argument("No control callback provided"))?;
        if fd1 < 0 || fd2 < 0 {
            return Err(ServiceError::illegal_argument(format!(
                "Invalid file descriptor (fd1={fd1}, fd2={fd2})"
            )));
        }

        let handle1 = dup_fd(fd1)?;
        let handle2 = dup_fd(fd2)?;

        // Hand over the UDP-class socket first; the TCP-class socket only if
        // that succeeded. On either failure both duplicates are released
        // together (drop on early return), leaving no partial state.
        let ret = self.engine.provide_fd(handle1.as_fd(), UDP_SUBSCRIPTIONS);
        if !ret.is_success() {
            return Err(ServiceError::illegal_argument(format!(
                "Unable to provide UDP conntrack socket to engine: {}",
                ret.message()
            )));
        }
        let ret = self.engine.provide_fd(handle2.as_fd(), TCP_SUBSCRIPTIONS);
        if !ret.is_success() {
            return Err(ServiceError::illegal_argument(format!(
                "Unable to provide TCP conntrack socket to engine: {}",
                ret.message()
            )));
        }

        let event_relay = Arc::new(EventRelay::new(Arc::clone(&callback)));
        let ct_relay = Arc::new(CtUpdateRelay::new(Arc::clone(&callback)));

        let ret = self.engine.register_event_listener(event_relay.clone());
        if !ret.is_success() {
            return Err(ServiceError::illegal_argument(format!(
                "Unable to register event listener: {}",
                ret.message()
            )));
        }
        let ret = self.engine.register_ct_timeout_listener(ct_relay.clone());
        if !ret.is_success() {
            self.engine.unregister_event_listener();
            return Err(ServiceError::illegal_argument(format!(
                "Unable to register conntrack timeout listener: {}",
                ret.message()
            )));
        }

        if !callback.link_to_death(DeathRecipient::new(self)) {
            self.engine.unregister_event_listener();
            self.engine.unregister_ct_timeout_listener();
            return Err(ServiceError::illegal_argument(
                "Unable to arm death notification on callback",
            ));
        }

        state.callback = Some(callback);
        state.handle1 = Some(handle1);
        state.handle2 = Some(handle2);
        state.event_relay = Some(event_relay);
        state.ct_relay = Some(ct_relay);
        info!("Offload session initialized");
        Ok(())
    }

    /// Stop the offload session and tear down all registrations.
    pub fn stop_offload(&self) -> ServiceResult<()> {
        let result = {
            let mut state = self.lock_state();
            if !state.initialized() {
                Err(ServiceError::illegal_state("Was not initialized"))
            } else {
                self.teardown_locked(&mut state)
            }
        };
        self.record(format!("stop_offload() -> {}", outcome_text(&result)));
        result
    }

    /// Client death entry point; identical teardown to `stop_offload`.
    pub(crate) fn on_client_death(&self) {
        let result = {
            let mut state = self.lock_state();
            if !state.initialized() {
                // Already stopped; nothing to tear down.
                None
            } else {
                warn!("Control client died, stopping offload");
                Some(self.teardown_locked(&mut state))
            }
        };
        if let Some(result) = result {
            self.record(format!("client_died() -> {}", outcome_text(&result)));
        }
    }

    /// Validate a list of local CIDR prefixes.
    ///
    /// Validation only: the engine learns local prefixes through its own
    /// configuration channel, not through this call.
    pub fn set_local_prefixes(&self, prefixes: &[String]) -> ServiceResult<()> {
        let result = self.do_set_local_prefixes(prefixes);
        self.record(format!(
            "set_local_prefixes({prefixes:?}) -> {}",
            outcome_text(&result)
        ));
        result
    }

    fn do_set_local_prefixes(&self, prefixes: &[String]) -> ServiceResult<()> {
        let guard = self.lock_state();
        if !guard.initialized() {
            return Err(not_initialized());
        }
        if prefixes.is_empty() {
            return Err(ServiceError::illegal_argument(
                "Failed Input Checks: No prefixes provided",
            ));
        }
        for prefix in prefixes {
            if !prefix.contains('/') {
                return Err(ServiceError::illegal_argument(format!(
                    "Failed Input Checks: Invalid prefix {prefix}"
                )));
            }
        }
        PrefixParser::parse_cidrs(prefixes, Family::Any)
            .map_err(ServiceError::IllegalArgument)?;
        Ok(())
    }

    /// Read cumulative forwarded statistics for `upstream`.
    ///
    /// Never fails: any engine error, and the uninitialized state, degrade
    /// to a zeroed record so the client's periodic accounting loop is never
    /// disrupted.
    pub fn get_forwarded_stats(&self, upstream: &str) -> ForwardedStats {
        let stats = self.do_get_forwarded_stats(upstream);
        self.record(format!(
            "get_forwarded_stats({upstream}) -> rx={} tx={}",
            stats.rx_bytes, stats.tx_bytes
        ));
        stats
    }

    fn do_get_forwarded_stats(&self, upstream: &str) -> ForwardedStats {
        let guard = self.lock_state();
        if !guard.initialized() {
            warn!("Forwarded stats requested while not initialized, reporting zeros");
            return ForwardedStats::default();
        }
        // Always cumulative totals, never deltas.
        match self.engine.get_stats(upstream, true) {
            Ok(stats) => stats,
            Err(outcome) => {
                warn!(
                    "Failed to read forwarded stats for {upstream}: {}",
                    outcome.message()
                );
                ForwardedStats::default()
            }
        }
    }

    /// Configure the upstream path, or signal upstream-down with an empty
    /// interface name.
    pub fn set_upstream_parameters(
        &self,
        iface: &str,
        v4_addr: &str,
        v4_gw: &str,
        v6_gws: &[String],
    ) -> ServiceResult<()> {
        let result = self.do_set_upstream_parameters(iface, v4_addr, v4_gw, v6_gws);
        self.record(format!(
            "set_upstream_parameters(iface={iface:?}, v4_addr={v4_addr:?}, v4_gw={v4_gw:?}, v6_gws={v6_gws:?}) -> {}",
            outcome_text(&result)
        ));
        result
    }

    fn do_set_upstream_parameters(
        &self,
        iface: &str,
        v4_addr: &str,
        v4_gw: &str,
        v6_gws: &[String],
    ) -> ServiceResult<()> {
        let guard = self.lock_state();
        if !guard.initialized() {
            return Err(not_initialized());
        }

        // All three parameters use the bare-address parse mode.
        if !v4_addr.is_empty() {
            PrefixParser::parse_addrs(&[v4_addr.to_string()], Family::V4)
                .map_err(ServiceError::IllegalArgument)?;
        }
        let v4_gw_parser = if v4_gw.is_empty() {
            None
        } else {
            Some(
                PrefixParser::parse_addrs(&[v4_gw.to_string()], Family::V4)
                    .map_err(ServiceError::IllegalArgument)?,
            )
        };
        let v6_parser = if v6_gws.is_empty() {
            None
        } else {
            Some(
                PrefixParser::parse_addrs(v6_gws, Family::V6)
                    .map_err(ServiceError::IllegalArgument)?,
            )
        };

        let v4_gateway = v4_gw_parser.as_ref().and_then(|p| p.first_v4_addr());
        let ret = if !iface.is_empty() {
            // First-parsed accessor on the v6 gateway list.
            let v6_gateway = v6_parser
                .as_ref()
                .and_then(|p| p.first_addr())
                .and_then(|addr| match addr {
                    std::net::IpAddr::V6(v6) => Some(v6),
                    std::net::IpAddr::V4(_) => None,
                });
            self.engine.set_upstream(Some(iface), v4_gateway, v6_gateway)
        } else {
            // Upstream-down signal: no interface, but any gateways that
            // parsed are still passed so the engine can clear its state.
            // This branch uses the family-qualified v6 accessor.
            let v6_gateway = v6_parser.as_ref().and_then(|p| p.first_v6_addr());
            self.engine.set_upstream(None, v4_gateway, v6_gateway)
        };
        self.map_engine(ret)
    }

    /// Start offloading a downstream interface/prefix pair.
    pub fn add_downstream(&self, iface: &str, prefix: &str) -> ServiceResult<()> {
        let result = self.do_downstream(iface, prefix, true);
        self.record(format!(
            "add_downstream({iface}, {prefix}) -> {}",
            outcome_text(&result)
        ));
        result
    }

    /// Stop offloading a downstream interface/prefix pair.
    pub fn remove_downstream(&self, iface: &str, prefix: &str) -> ServiceResult<()> {
        let result = self.do_downstream(iface, prefix, false);
        self.record(format!(
            "remove_downstream({iface}, {prefix}) -> {}",
            outcome_text(&result)
        ));
        result
    }

    fn do_downstream(&self, iface: &str, prefix: &str, add: bool) -> ServiceResult<()> {
        let guard = self.lock_state();
        if !guard.initialized() {
            return Err(not_initialized());
        }
        let parser = PrefixParser::parse_cidrs(&[prefix.to_string()], Family::Any)
            .map_err(ServiceError::IllegalArgument)?;
        let net = parser.first_prefix().ok_or_else(|| {
            ServiceError::illegal_argument("Failed Input Checks: Invalid prefix")
        })?;
        let ret = if add {
            self.engine.add_downstream(iface, &net)
        } else {
            self.engine.remove_downstream(iface, &net)
        };
        self.map_engine(ret)
    }

    /// Program data warning/limit thresholds for `upstream`.
    pub fn set_data_warning_and_limit(
        &self,
        upstream: &str,
        warning_bytes: i64,
        limit_bytes: i64,
    ) -> ServiceResult<()> {
        let result = self.do_set_data_warning_and_limit(upstream, warning_bytes, limit_bytes);
        self.record(format!(
            "set_data_warning_and_limit({upstream}, warning={warning_bytes}, limit={limit_bytes}) -> {}",
            outcome_text(&result)
        ));
        result
    }

    fn do_set_data_warning_and_limit(
        &self,
        upstream: &str,
        warning_bytes: i64,
        limit_bytes: i64,
    ) -> ServiceResult<()> {
        let guard = self.lock_state();
        if !guard.initialized() {
            return Err(not_initialized());
        }
        if warning_bytes < 0 || limit_bytes < 0 {
            return Err(ServiceError::illegal_argument(
                "Failed Input Checks: Byte thresholds must be non-negative",
            ));
        }
        // Engine argument order is limit before warning.
        let mut ret =
            self.engine
                .set_quota_warning(upstream, limit_bytes as u64, warning_bytes as u64);
        if ret == EngineOutcome::FailTryAgain {
            // Documented policy: quota programming is repeated by the client
            // on its next accounting pass, so transient contention is
            // reported as accepted here.
            ret = EngineOutcome::Success;
        }
        self.map_engine(ret)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        // A poisoned lock cannot hold a partial state: every mutation path
        // restores the initialized/handle/callback invariant before
        // returning, so recovering the guard is safe.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, entry: String) {
        self.local_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(entry);
    }

    fn map_engine(&self, outcome: EngineOutcome) -> ServiceResult<()> {
        let result = CallResult::from(outcome);
        if result.success {
            Ok(())
        } else {
            Err(ServiceError::IllegalArgument(result.message))
        }
    }

    /// Shared teardown for `stop_offload` and client death.
    ///
    /// Reports the mapped result of `stop_all_offload`; `clear_all_fds` runs
    /// regardless and only its success allows closing the duplicated
    /// handles.
    fn teardown_locked(&self, state: &mut SessionState) -> ServiceResult<()> {
        if let Some(callback) = state.callback.take() {
            callback.unlink_from_death();
        }
        state.event_relay = None;
        state.ct_relay = None;
        self.engine.unregister_event_listener();
        self.engine.unregister_ct_timeout_listener();

        let stop_ret = self.engine.stop_all_offload();
        let clear_ret = self.engine.clear_all_fds();

        let handle1 = state.handle1.take();
        let handle2 = state.handle2.take();
        if clear_ret.is_success() {
            drop(handle1);
            drop(handle2);
        } else {
            // The engine may still be reading these sockets; keep them open
            // for the life of the process rather than closing them out from
            // under it.
            warn!(
                "Engine failed to clear descriptors ({}); conntrack socket handles will not be released",
                clear_ret.message()
            );
            if let Some(fd) = handle1 {
                let _ = fd.into_raw_fd();
            }
            if let Some(fd) = handle2 {
                let _ = fd.into_raw_fd();
            }
        }

        info!("Offload session stopped");
        if stop_ret.is_success() {
            Ok(())
        } else {
            Err(ServiceError::IllegalState(stop_ret.message().to_string()))
        }
    }
}

/// Duplicate a caller-supplied descriptor into a session-owned handle.
fn dup_fd(fd: RawFd) -> ServiceResult<OwnedFd> {
    // The caller retains ownership of `fd`; non-negativity was checked by
    // the caller, and the borrow lives only for the dup call.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    borrowed.try_clone_to_owned().map_err(|e| {
        ServiceError::illegal_argument(format!("Unable to duplicate file descriptor {fd}: {e}"))
    })
}

fn not_initialized() -> ServiceError {
    ServiceError::illegal_state("Offload not initialized")
}

fn outcome_text(result: &ServiceResult<()>) -> String {
    match result {
        Ok(()) => "Successful".to_string(),
        Err(err) => err.to_string(),
    }
}
