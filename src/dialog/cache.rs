//! Call-state cache.
//!
//! # Responsibilities
//! - Map Call-ID to the dialog entry, creating it on the first request
//! - Pick the next hop for every message of a known dialog
//! - Rewrite Via: push our branch on requests, pop it on responses
//! - Run the timeout/clear timers that retire entries
//! - Hold health-probe entries and turn their outcome into node liveness
//!
//! # Locking
//! The map (sharded, one RW lock per shard) guards membership. Each entry has
//! its own mutex for its fields. The entry lock is never held while the map
//! is touched, so the two can be taken in any order without deadlock.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;

use crate::config::TimerConfig;
use crate::dialog::entry::{self, CallEntry, CallState, CallStatus, Direction, EntrySnapshot};
use crate::dialog::timer::Timer;
use crate::error::SlbError;
use crate::load_balancer::node::SipNode;
use crate::load_balancer::registry::NodeRegistry;
use crate::observability::metrics;
use crate::security::rate_limit::AdmissionLimiter;
use crate::sip::builder::{self, ProbeIds};
use crate::sip::{ident, Method, SipMessage};

/// Timer windows and the address written into our Via headers.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub timeout: Duration,
    pub clear: Duration,
    pub probe_timeout: Duration,
    pub local_address: String,
}

impl CacheSettings {
    pub fn new(timers: &TimerConfig, local_address: impl Into<String>) -> Self {
        Self {
            timeout: timers.timeout(),
            clear: timers.clear(),
            probe_timeout: timers.probe_timeout(),
            local_address: local_address.into(),
        }
    }
}

/// Outcome of routing one message.
#[derive(Debug)]
pub enum Route {
    /// Send the (rewritten) message on to `destination`.
    Forward {
        entry: Arc<CallEntry>,
        destination: SocketAddr,
    },
    /// Answer the sender with a synthesized response instead.
    Reject {
        response: SipMessage,
        destination: SocketAddr,
        cause: SlbError,
    },
    /// Consumed by the balancer (health probe reply).
    Absorbed,
}

#[derive(Debug)]
struct CacheInner {
    entries: DashMap<String, Arc<CallEntry>>,
    registry: Arc<NodeRegistry>,
    limiter: Arc<AdmissionLimiter>,
    settings: CacheSettings,
    runtime: Handle,
}

/// Shared handle to the call-state cache.
#[derive(Debug, Clone)]
pub struct CallCache {
    inner: Arc<CacheInner>,
}

impl CallCache {
    /// `runtime` is where timer callbacks run.
    pub fn new(
        registry: Arc<NodeRegistry>,
        limiter: Arc<AdmissionLimiter>,
        settings: CacheSettings,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                registry,
                limiter,
                settings,
                runtime,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.inner.registry
    }

    pub fn limiter(&self) -> &Arc<AdmissionLimiter> {
        &self.inner.limiter
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<CallEntry>> {
        self.inner.entries.get(call_id).map(|e| e.value().clone())
    }

    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        let entries: Vec<Arc<CallEntry>> =
            self.inner.entries.iter().map(|e| e.value().clone()).collect();
        entries.iter().map(|e| e.snapshot()).collect()
    }

    /// Route `msg`, received from `source`, and rewrite its Via stack.
    ///
    /// Messages that are dropped come back as `Err`; the caller logs and
    /// counts them.
    pub fn resolve(&self, msg: &mut SipMessage, source: SocketAddr) -> Result<Route, SlbError> {
        if msg.call_id.is_empty() {
            return Err(SlbError::ProtocolViolation(format!(
                "{} without Call-ID",
                msg.summary()
            )));
        }

        if let Some(method) = msg.method() {
            if let Some(cseq) = &msg.cseq {
                if !cseq.method.eq_ignore_ascii_case(method.as_str()) {
                    let cause = SlbError::ProtocolViolation(format!(
                        "CSeq method {} does not match {}",
                        cseq.method, method
                    ));
                    return Ok(self.reject(msg, source, 400, "Bad Request", None, cause));
                }
            }
        }

        let existing = self.get(&msg.call_id);
        match existing {
            Some(entry) => self.continue_dialog(entry, msg, source),
            None => self.open_dialog(msg, source),
        }
    }

    fn continue_dialog(
        &self,
        entry: Arc<CallEntry>,
        msg: &mut SipMessage,
        source: SocketAddr,
    ) -> Result<Route, SlbError> {
        let mut state = entry.lock();

        if entry.is_probe {
            let answered = state.timeout_timer.as_ref().is_some_and(|t| t.stop());
            drop(state);
            if answered {
                entry.node.set_alive(true);
                self.evict(&entry);
            }
            return Ok(Route::Absorbed);
        }

        let duplicate = state.record(msg);

        if let Some(code) = msg.status_code() {
            msg.headers.pop_via();

            // A timer that already fired owns the outcome.
            let timed_out = state
                .timeout_timer
                .as_ref()
                .is_some_and(|t| !t.stop() && t.has_fired());
            if !timed_out {
                match code {
                    100..=199 => {
                        if !state.status.is_final() {
                            self.arm_timeout(&entry, &mut state);
                        }
                    }
                    200..=299 => {
                        state.advance(CallStatus::Answered);
                        self.arm_clear(&entry, &mut state);
                    }
                    _ => {
                        state.advance(CallStatus::Rejected);
                        self.arm_clear(&entry, &mut state);
                    }
                }
            }
            tracing::debug!(call_id = %entry.call_id, status = code, state = ?state.status, "Response in dialog");
        } else {
            let toward_node = source == entry.peer;
            if toward_node && duplicate && !entry.node.is_alive() {
                drop(state);
                let cause = SlbError::Unroutable(format!("node {} is down", entry.node.addr));
                return Ok(self.reject(msg, source, 504, "Server Time-out", None, cause));
            }
            if msg.method() == Some(Method::Cancel) {
                state.advance(CallStatus::Cancelled);
            }
            msg.headers
                .push_via(builder::via_value(&self.inner.settings.local_address, &entry.branch));
        }
        drop(state);

        let destination = entry.destination_for(source);
        Ok(Route::Forward { entry, destination })
    }

    fn open_dialog(&self, msg: &mut SipMessage, source: SocketAddr) -> Result<Route, SlbError> {
        let inner = &self.inner;

        // Retransmissions arrive unmodified; log the first copy as received.
        let summary = msg.summary();
        let received = entry::fingerprint(msg);

        // Name resolution can block, so it stays outside the map's write lock.
        let outbound = match (inner.registry.find(source), msg.method()) {
            (Some(node), Some(method)) if method.is_dialog_initiating() => {
                Some((node, resolve_target(msg)))
            }
            _ => None,
        };

        let entry = match inner.entries.entry(msg.call_id.clone()) {
            Entry::Occupied(occupied) => {
                // Lost the race to a concurrent first packet.
                let entry = occupied.get().clone();
                drop(occupied);
                return self.continue_dialog(entry, msg, source);
            }
            Entry::Vacant(vacant) => {
                match msg.method() {
                    Some(method) if method.is_dialog_initiating() => {}
                    _ => return Err(SlbError::OutOfDialog(msg.summary())),
                }

                if !msg.take_hop() {
                    let cause = SlbError::ProtocolViolation("Max-Forwards exhausted".to_string());
                    return Ok(self.reject(msg, source, 483, "Too Many Hops", None, cause));
                }

                let (node, peer, direction) = match outbound {
                    Some((node, target)) => (node, target?, Direction::Outbound),
                    None => {
                        if !inner.limiter.try_admit() {
                            let cause = SlbError::AdmissionRejected("call rate limit reached".to_string());
                            return Ok(self.reject(msg, source, 429, "Too Many Requests", Some(1), cause));
                        }
                        let Some(node) = inner.registry.select() else {
                            let cause = SlbError::AdmissionRejected("no live node".to_string());
                            return Ok(self.reject(msg, source, 503, "Service Unavailable", None, cause));
                        };
                        (node, source, Direction::Inbound)
                    }
                };

                let entry = Arc::new(CallEntry::new(
                    msg.call_id.clone(),
                    node,
                    peer,
                    direction,
                    msg.from_tag.clone(),
                    ident::new_branch(),
                    false,
                ));
                {
                    let mut state = entry.lock();
                    state.record_received(summary, received);
                    self.arm_timeout(&entry, &mut state);
                }
                vacant.insert(entry.clone());
                entry
            }
        };

        metrics::dialog_opened();
        tracing::debug!(
            call_id = %entry.call_id,
            direction = ?entry.direction,
            node = %entry.node.addr,
            peer = %entry.peer,
            "Dialog opened"
        );

        msg.headers
            .push_via(builder::via_value(&inner.settings.local_address, &entry.branch));
        let destination = entry.destination_for(source);
        Ok(Route::Forward { entry, destination })
    }

    /// Register a health probe for `node` and return the OPTIONS to send.
    pub fn open_probe(&self, node: &Arc<SipNode>) -> SipMessage {
        let ids = ProbeIds::generate();
        let request = builder::probe_request(&self.inner.settings.local_address, node.addr, &ids);

        let entry = Arc::new(CallEntry::new(
            ids.call_id.clone(),
            node.clone(),
            node.addr,
            Direction::Outbound,
            ids.from_tag,
            ids.branch,
            true,
        ));
        {
            let mut state = entry.lock();
            state.record(&request);
            let timer = self.schedule(&entry, self.inner.settings.probe_timeout, Self::on_timeout);
            state.timeout_timer = Some(timer);
        }
        self.inner.entries.insert(ids.call_id, entry);
        request
    }

    /// Remove `entry` if it is still the one registered under its Call-ID.
    pub fn evict(&self, entry: &Arc<CallEntry>) -> bool {
        let removed = self
            .inner
            .entries
            .remove_if(&entry.call_id, |_, current| Arc::ptr_eq(current, entry))
            .is_some();
        if removed {
            if !entry.is_probe {
                metrics::dialog_closed();
            }
            tracing::debug!(call_id = %entry.call_id, probe = entry.is_probe, "Entry removed");
        }
        removed
    }

    fn reject(
        &self,
        request: &SipMessage,
        source: SocketAddr,
        code: u16,
        reason: &str,
        retry_after: Option<u32>,
        cause: SlbError,
    ) -> Route {
        tracing::info!(call_id = %request.call_id, peer = %source, status = code, error = %cause, "Rejecting request");
        metrics::record_rejection(code);
        Route::Reject {
            response: builder::reject(request, code, reason, retry_after),
            destination: source,
            cause,
        }
    }

    fn arm_timeout(&self, entry: &Arc<CallEntry>, state: &mut CallState) {
        if let Some(old) = state.timeout_timer.take() {
            old.stop();
        }
        let timer = self.schedule(entry, self.inner.settings.timeout, Self::on_timeout);
        state.timeout_timer = Some(timer);
    }

    /// Schedule removal. Replaces any earlier clear timer.
    fn arm_clear(&self, entry: &Arc<CallEntry>, state: &mut CallState) {
        if let Some(old) = state.clear_timer.take() {
            old.stop();
        }
        let timer = self.schedule(entry, self.inner.settings.clear, Self::on_clear);
        state.clear_timer = Some(timer);
    }

    fn schedule(
        &self,
        entry: &Arc<CallEntry>,
        delay: Duration,
        callback: fn(&CallCache, &Arc<CallEntry>),
    ) -> Timer {
        let cache: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let entry = entry.clone();
        Timer::schedule(&self.inner.runtime, delay, move || {
            if let Some(inner) = cache.upgrade() {
                callback(&CallCache { inner }, &entry);
            }
        })
    }

    fn on_timeout(&self, entry: &Arc<CallEntry>) {
        let mut state = entry.lock();
        if entry.is_probe {
            state.advance(CallStatus::Timedout);
            drop(state);
            tracing::debug!(call_id = %entry.call_id, node = %entry.node.addr, "Probe timed out");
            entry.node.set_alive(false);
            self.evict(entry);
            return;
        }

        if state.advance(CallStatus::Timedout) {
            tracing::info!(call_id = %entry.call_id, node = %entry.node.addr, "Dialog timed out");
        }
        self.arm_clear(entry, &mut state);
    }

    fn on_clear(&self, entry: &Arc<CallEntry>) {
        // Serialize with any message still being handled on this entry.
        drop(entry.lock());
        self.evict(entry);
    }
}

/// Socket address named by an outbound request's URI.
fn resolve_target(msg: &SipMessage) -> Result<SocketAddr, SlbError> {
    let Some((host, port)) = msg.target() else {
        return Err(SlbError::Unroutable(format!("{} has no target host", msg.summary())));
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| SlbError::Unroutable(format!("cannot resolve {host}:{port}")))
}
