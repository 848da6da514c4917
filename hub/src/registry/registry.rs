use std::collections::HashMap;
use std::net::SocketAddr;

use log::{debug, error, info, warn};

use lumen_shared::{
    token_hash32, Hello, HwAddr, Keepalive, LifecycleOp, Micros, NodeId, NodeLifecycle, OtaPhase,
    Welcome, DRIFT_DEGRADED_US, INVARIANT_CHECK_PERIOD_MS, KEEPALIVE_TIMEOUT_MS,
    LOSS_DEGRADED_CENTI_PCT, LOST_GRACE_MS, MAX_NODES,
};

use super::{LinkMetrics, NodeRecord, RegistryError};

/// Result of a hello: the stable nodeId plus whether an existing record
/// was reset rather than a new one created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterOutcome {
    pub node_id: NodeId,
    pub rejoined: bool,
}

/// Result of a keepalive: the lifecycle transition it caused, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeepaliveOutcome {
    pub node_id: NodeId,
    pub transition: Option<(NodeLifecycle, NodeLifecycle)>,
}

/// A record erased at the end of its grace period, with final lifetime
/// stats for the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErasedNode {
    pub node_id: NodeId,
    pub addr: HwAddr,
    pub keepalives: u64,
    pub lifetime_s: u64,
}

/// Everything one maintenance tick did.
#[derive(Clone, Debug, Default)]
pub struct TickReport {
    pub lost: Vec<NodeId>,
    pub erased: Vec<ErasedNode>,
    pub invariants_checked: bool,
    pub invariant_failures: Vec<InvariantViolation>,
}

/// A registry self-check failure. Logged loudly, never fatal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Invariant A: token hash must be zero iff the node is PENDING.
    TokenState {
        node_id: NodeId,
        state: NodeLifecycle,
        token_hash: u32,
    },
    /// Invariant B: token hashes must be unique among non-LOST records.
    TokenCollision {
        first: NodeId,
        second: NodeId,
        token_hash: u32,
    },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvariantViolation::TokenState {
                node_id,
                state,
                token_hash,
            } => write!(
                f,
                "invariant A: node {} in {} holds token hash {:#010x}",
                node_id,
                state.name(),
                token_hash
            ),
            InvariantViolation::TokenCollision {
                first,
                second,
                token_hash,
            } => write!(
                f,
                "invariant B: nodes {} and {} share token hash {:#010x}",
                first, second, token_hash
            ),
        }
    }
}

// Registry
//
// The authoritative node table. Keyed by nodeId with a hardware-address
// index for rejoin detection; nodeIds are allocated once and never
// reused while the record exists. Callers are expected to hold whatever
// lock guards the hub: the registry itself performs no I/O and no
// blocking, so holding that lock across any call here is cheap.
pub struct Registry {
    records: HashMap<NodeId, NodeRecord>,
    addr_index: HashMap<HwAddr, NodeId>,
    next_node_id: u8,
    token_counter: u32,
    capacity: usize,
    last_invariant_check_us: Option<Micros>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_capacity(MAX_NODES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: HashMap::new(),
            addr_index: HashMap::new(),
            next_node_id: 1,
            token_counter: 0,
            capacity,
            last_invariant_check_us: None,
        }
    }

    /// Handle a hello. A new hardware address gets the next nodeId and
    /// a PENDING record; a known address keeps its nodeId and has its
    /// record reset to PENDING with the token cleared and any firmware
    /// sub-state back to idle.
    pub fn register(
        &mut self,
        hello: &Hello,
        now_us: Micros,
    ) -> Result<RegisterOutcome, RegistryError> {
        if let Some(node_id) = self.addr_index.get(&hello.mac).copied() {
            let Some(record) = self.records.get_mut(&node_id) else {
                // Index and table disagree; heal the index and fall
                // through to a fresh registration.
                warn!("addr index pointed at missing record {}, repairing", node_id);
                self.addr_index.remove(&hello.mac);
                return self.register(hello, now_us);
            };

            let from = record.state();
            let to = from.try_transition(LifecycleOp::Rejoin)?;
            record.set_state(to, now_us);
            record.clear_token();
            record.set_ota_phase(OtaPhase::Idle);
            record.set_hello(hello.caps, hello.topo, hello.fw.clone());
            record.touch(now_us);

            info!(
                "node {} rejoined from {} ({} -> {})",
                node_id,
                hello.mac,
                from.name(),
                to.name()
            );
            return Ok(RegisterOutcome {
                node_id,
                rejoined: true,
            });
        }

        if self.records.len() >= self.capacity || self.next_node_id == u8::MAX {
            warn!(
                "refusing hello from {}: fleet is full ({}/{})",
                hello.mac,
                self.records.len(),
                self.capacity
            );
            return Err(RegistryError::FleetFull {
                capacity: self.capacity,
            });
        }

        let node_id = NodeId::new(self.next_node_id);
        self.next_node_id += 1;

        self.records.insert(
            node_id,
            NodeRecord::new(
                node_id,
                hello.mac,
                hello.caps,
                hello.topo,
                hello.fw.clone(),
                now_us,
            ),
        );
        self.addr_index.insert(hello.mac, node_id);

        info!("node {} registered from {} (fw {})", node_id, hello.mac, hello.fw);
        Ok(RegisterOutcome {
            node_id,
            rejoined: false,
        })
    }

    /// Issue a fresh session token and move the node PENDING -> AUTHED.
    /// The token hash is rolled up to three times if it collides with
    /// another live record or comes out zero; a collision that survives
    /// all retries is kept under loud protest rather than blocking the
    /// join.
    pub fn issue_welcome(
        &mut self,
        node_id: NodeId,
        stream_port: u16,
        now_us: Micros,
    ) -> Result<Welcome, RegistryError> {
        let Some(record) = self.records.get(&node_id) else {
            return Err(RegistryError::UnknownNode { node_id });
        };
        let from = record.state();
        let to = from.try_transition(LifecycleOp::Welcome)?;

        let mut token = String::new();
        let mut hash = 0u32;
        for attempt in 0..3 {
            token = self.generate_token(now_us);
            hash = token_hash32(&token);
            if hash != 0 && !self.hash_in_use(node_id, hash) {
                break;
            }
            warn!(
                "token hash {:#010x} for node {} collides (attempt {}), rolling again",
                hash,
                node_id,
                attempt + 1
            );
        }
        if hash == 0 || self.hash_in_use(node_id, hash) {
            error!(
                "node {} keeps colliding token hash {:#010x} after retries; issuing anyway",
                node_id, hash
            );
        }

        // Both lookups above succeeded; this one cannot fail.
        let Some(record) = self.records.get_mut(&node_id) else {
            return Err(RegistryError::UnknownNode { node_id });
        };
        record.set_token(token.clone(), hash);
        record.set_state(to, now_us);
        record.touch(now_us);

        info!("node {} authed (token hash {:#010x})", node_id, hash);
        Ok(Welcome {
            node_id,
            token,
            stream_port,
            hub_epoch_us: now_us,
        })
    }

    /// Handle a keepalive. Unknown ids and token mismatches are typed
    /// errors the caller downgrades to logged no-ops; valid keepalives
    /// refresh metrics and may promote or demote the node.
    pub fn keepalive(
        &mut self,
        ka: &Keepalive,
        now_us: Micros,
    ) -> Result<KeepaliveOutcome, RegistryError> {
        let Some(record) = self.records.get_mut(&ka.node_id) else {
            return Err(RegistryError::UnknownNode {
                node_id: ka.node_id,
            });
        };

        if token_hash32(&ka.token) != record.token_hash() {
            return Err(RegistryError::TokenMismatch {
                node_id: ka.node_id,
            });
        }

        let metrics = LinkMetrics {
            rssi: ka.rssi,
            loss_pct: ka.loss_pct,
            drift_us: ka.drift_us,
            uptime_s: ka.uptime_s,
        };
        let healthy = metrics.loss_pct <= LOSS_DEGRADED_CENTI_PCT
            && metrics.drift_us.unsigned_abs() <= DRIFT_DEGRADED_US.unsigned_abs();

        let from = record.state();
        let op = match (from, healthy) {
            (NodeLifecycle::Authed, _) => Some(LifecycleOp::MarkReady),
            (NodeLifecycle::Ready, false) => Some(LifecycleOp::MarkDegraded),
            (NodeLifecycle::Ready, true) => None,
            (NodeLifecycle::Degraded, true) => Some(LifecycleOp::MarkReady),
            (NodeLifecycle::Degraded, false) => None,
            // PENDING and LOST nodes have no business sending
            // keepalives; let the transition table refuse them.
            (NodeLifecycle::Pending, _) | (NodeLifecycle::Lost, _) => {
                Some(LifecycleOp::MarkReady)
            }
        };

        let transition = match op {
            Some(op) => {
                let to = from.try_transition(op)?;
                if to != from {
                    record.set_state(to, now_us);
                    info!(
                        "node {} {} -> {} (loss {} c%, drift {} us)",
                        ka.node_id,
                        from.name(),
                        to.name(),
                        metrics.loss_pct,
                        metrics.drift_us
                    );
                    Some((from, to))
                } else {
                    None
                }
            }
            None => None,
        };

        record.record_keepalive(metrics, now_us);
        Ok(KeepaliveOutcome {
            node_id: ka.node_id,
            transition,
        })
    }

    /// Mark a node LOST (transport dropped, or the timeout sweep found
    /// it silent). Idempotent; returns the prior state when a
    /// transition actually happened.
    pub fn mark_lost(
        &mut self,
        node_id: NodeId,
        now_us: Micros,
    ) -> Result<Option<NodeLifecycle>, RegistryError> {
        let Some(record) = self.records.get_mut(&node_id) else {
            return Err(RegistryError::UnknownNode { node_id });
        };
        let from = record.state();
        let to = from.try_transition(LifecycleOp::MarkLost)?;
        if to == from {
            return Ok(None);
        }
        record.set_state(to, now_us);
        info!("node {} {} -> LOST", node_id, from.name());
        Ok(Some(from))
    }

    /// Periodic maintenance: time out silent nodes, erase expired LOST
    /// records, and self-check invariants on their own cadence.
    pub fn tick(&mut self, now_us: Micros) -> TickReport {
        let mut report = TickReport::default();

        let timeout_us = KEEPALIVE_TIMEOUT_MS * 1_000;
        let silent: Vec<NodeId> = self
            .records
            .values()
            .filter(|r| r.state().is_live())
            .filter(|r| now_us.saturating_sub(r.last_seen_us()) > timeout_us)
            .map(|r| r.node_id())
            .collect();
        for node_id in silent {
            match self.mark_lost(node_id, now_us) {
                Ok(Some(_)) => report.lost.push(node_id),
                Ok(None) => {}
                Err(err) => warn!("timeout sweep could not mark {} lost: {}", node_id, err),
            }
        }

        let grace_us = LOST_GRACE_MS * 1_000;
        let expired: Vec<NodeId> = self
            .records
            .values()
            .filter_map(|r| r.lost_at_us().map(|lost_at| (r.node_id(), lost_at)))
            .filter(|(_, lost_at)| now_us.saturating_sub(*lost_at) > grace_us)
            .map(|(node_id, _)| node_id)
            .collect();
        for node_id in expired {
            if let Some(record) = self.records.remove(&node_id) {
                self.addr_index.remove(&record.addr());
                let erased = ErasedNode {
                    node_id,
                    addr: record.addr(),
                    keepalives: record.keepalive_count(),
                    lifetime_s: now_us.saturating_sub(record.joined_at_us()) / 1_000_000,
                };
                info!(
                    "erased node {} ({}) after grace: {} keepalives over {}s",
                    erased.node_id, erased.addr, erased.keepalives, erased.lifetime_s
                );
                report.erased.push(erased);
            }
        }

        let due = match self.last_invariant_check_us {
            None => true,
            Some(last) => now_us.saturating_sub(last) >= INVARIANT_CHECK_PERIOD_MS * 1_000,
        };
        if due {
            self.last_invariant_check_us = Some(now_us);
            report.invariants_checked = true;
            report.invariant_failures = self.check_invariants();
            if report.invariant_failures.is_empty() {
                debug!("registry invariants hold ({} records)", self.records.len());
            } else {
                for violation in &report.invariant_failures {
                    error!("registry invariant violated: {}", violation);
                }
                self.dump_records();
            }
        }

        report
    }

    /// Invariant A: token hash zero iff PENDING. Invariant B: token
    /// hashes unique among non-LOST records.
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        for record in self.records.values() {
            let hash = record.token_hash();
            let ok = match record.state() {
                NodeLifecycle::Pending => hash == 0,
                NodeLifecycle::Lost => true,
                _ => hash != 0,
            };
            if !ok {
                violations.push(InvariantViolation::TokenState {
                    node_id: record.node_id(),
                    state: record.state(),
                    token_hash: hash,
                });
            }
        }

        let mut seen: HashMap<u32, NodeId> = HashMap::new();
        let mut live: Vec<&NodeRecord> = self
            .records
            .values()
            .filter(|r| r.state().is_live() && r.token_hash() != 0)
            .collect();
        live.sort_by_key(|r| r.node_id());
        for record in live {
            if let Some(first) = seen.get(&record.token_hash()) {
                violations.push(InvariantViolation::TokenCollision {
                    first: *first,
                    second: record.node_id(),
                    token_hash: record.token_hash(),
                });
            } else {
                seen.insert(record.token_hash(), record.node_id());
            }
        }

        violations
    }

    // Accessors

    pub fn get(&self, node_id: NodeId) -> Option<&NodeRecord> {
        self.records.get(&node_id)
    }

    pub fn node_id_for_addr(&self, addr: &HwAddr) -> Option<NodeId> {
        self.addr_index.get(addr).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.records.values()
    }

    pub fn ready_nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.records.values().filter(|r| r.state().is_ready())
    }

    pub fn live_nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.records.values().filter(|r| r.state().is_live())
    }

    pub fn count_in(&self, state: NodeLifecycle) -> usize {
        self.records.values().filter(|r| r.state() == state).count()
    }

    // Field updates from the transport and firmware layers

    pub fn set_stream_addr(
        &mut self,
        node_id: NodeId,
        addr: SocketAddr,
    ) -> Result<(), RegistryError> {
        let Some(record) = self.records.get_mut(&node_id) else {
            return Err(RegistryError::UnknownNode { node_id });
        };
        record.set_stream_addr(addr);
        Ok(())
    }

    pub fn set_ota_phase(&mut self, node_id: NodeId, phase: OtaPhase) -> Result<(), RegistryError> {
        let Some(record) = self.records.get_mut(&node_id) else {
            return Err(RegistryError::UnknownNode { node_id });
        };
        record.set_ota_phase(phase);
        Ok(())
    }

    pub(crate) fn count_stream_send(&mut self, node_id: NodeId) {
        if let Some(record) = self.records.get_mut(&node_id) {
            record.count_stream_send();
        }
    }

    // Private

    fn generate_token(&mut self, now_us: Micros) -> String {
        self.token_counter = self.token_counter.wrapping_add(1);
        format!(
            "tok_{}_{}_{}",
            now_us / 1_000,
            self.token_counter,
            fastrand::u32(..)
        )
    }

    fn hash_in_use(&self, node_id: NodeId, hash: u32) -> bool {
        self.records
            .values()
            .any(|r| r.node_id() != node_id && r.state().is_live() && r.token_hash() == hash)
    }

    fn dump_records(&self) {
        let mut rows: Vec<&NodeRecord> = self.records.values().collect();
        rows.sort_by_key(|r| r.node_id());
        for r in rows {
            error!(
                "  node {} {} addr {} token_hash {:#010x} last_seen {}us",
                r.node_id(),
                r.state().name(),
                r.addr(),
                r.token_hash(),
                r.last_seen_us()
            );
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
