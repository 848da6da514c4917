use std::{mem, vec::IntoIter};

use lumen_shared::{HwAddr, NodeId};

use crate::error::HubError;
use crate::ota::OtaOutcome;

/// Everything that happened since the caller last drained the queue.
/// Read with `events.read::<SomeEvent>()`; each read takes the backing
/// list, so a second read of the same kind comes back empty.
pub struct FleetEvents {
    joins: Vec<(NodeId, HwAddr, bool)>,
    auths: Vec<NodeId>,
    readies: Vec<NodeId>,
    degrades: Vec<NodeId>,
    losses: Vec<NodeId>,
    erasures: Vec<(NodeId, HwAddr)>,
    update_outcomes: Vec<OtaOutcome>,
    errors: Vec<HubError>,

    empty: bool,
}

impl FleetEvents {
    pub(crate) fn new() -> Self {
        Self {
            joins: Vec::new(),
            auths: Vec::new(),
            readies: Vec::new(),
            degrades: Vec::new(),
            losses: Vec::new(),
            erasures: Vec::new(),
            update_outcomes: Vec::new(),
            errors: Vec::new(),

            empty: true,
        }
    }

    // Public

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn read<V: FleetEvent>(&mut self) -> V::Iter {
        V::iter(self)
    }

    pub fn has<V: FleetEvent>(&self) -> bool {
        V::has(self)
    }

    // Crate-public

    pub(crate) fn push_join(&mut self, node_id: NodeId, addr: HwAddr, rejoined: bool) {
        self.joins.push((node_id, addr, rejoined));
        self.empty = false;
    }

    pub(crate) fn push_auth(&mut self, node_id: NodeId) {
        self.auths.push(node_id);
        self.empty = false;
    }

    pub(crate) fn push_ready(&mut self, node_id: NodeId) {
        self.readies.push(node_id);
        self.empty = false;
    }

    pub(crate) fn push_degrade(&mut self, node_id: NodeId) {
        self.degrades.push(node_id);
        self.empty = false;
    }

    pub(crate) fn push_lost(&mut self, node_id: NodeId) {
        self.losses.push(node_id);
        self.empty = false;
    }

    pub(crate) fn push_erasure(&mut self, node_id: NodeId, addr: HwAddr) {
        self.erasures.push((node_id, addr));
        self.empty = false;
    }

    pub(crate) fn push_update_outcome(&mut self, outcome: OtaOutcome) {
        self.update_outcomes.push(outcome);
        self.empty = false;
    }

    pub(crate) fn push_error(&mut self, error: HubError) {
        self.errors.push(error);
        self.empty = false;
    }
}

// Event Trait
pub trait FleetEvent {
    type Iter;

    fn iter(events: &mut FleetEvents) -> Self::Iter;

    fn has(events: &FleetEvents) -> bool;
}

// JoinEvent
pub struct JoinEvent;
impl FleetEvent for JoinEvent {
    type Iter = IntoIter<(NodeId, HwAddr, bool)>;

    fn iter(events: &mut FleetEvents) -> Self::Iter {
        let list = mem::take(&mut events.joins);
        IntoIterator::into_iter(list)
    }

    fn has(events: &FleetEvents) -> bool {
        !events.joins.is_empty()
    }
}

// AuthEvent
pub struct AuthEvent;
impl FleetEvent for AuthEvent {
    type Iter = IntoIter<NodeId>;

    fn iter(events: &mut FleetEvents) -> Self::Iter {
        let list = mem::take(&mut events.auths);
        IntoIterator::into_iter(list)
    }

    fn has(events: &FleetEvents) -> bool {
        !events.auths.is_empty()
    }
}

// ReadyEvent
pub struct ReadyEvent;
impl FleetEvent for ReadyEvent {
    type Iter = IntoIter<NodeId>;

    fn iter(events: &mut FleetEvents) -> Self::Iter {
        let list = mem::take(&mut events.readies);
        IntoIterator::into_iter(list)
    }

    fn has(events: &FleetEvents) -> bool {
        !events.readies.is_empty()
    }
}

// DegradeEvent
pub struct DegradeEvent;
impl FleetEvent for DegradeEvent {
    type Iter = IntoIter<NodeId>;

    fn iter(events: &mut FleetEvents) -> Self::Iter {
        let list = mem::take(&mut events.degrades);
        IntoIterator::into_iter(list)
    }

    fn has(events: &FleetEvents) -> bool {
        !events.degrades.is_empty()
    }
}

// LostEvent
pub struct LostEvent;
impl FleetEvent for LostEvent {
    type Iter = IntoIter<NodeId>;

    fn iter(events: &mut FleetEvents) -> Self::Iter {
        let list = mem::take(&mut events.losses);
        IntoIterator::into_iter(list)
    }

    fn has(events: &FleetEvents) -> bool {
        !events.losses.is_empty()
    }
}

// EraseEvent
pub struct EraseEvent;
impl FleetEvent for EraseEvent {
    type Iter = IntoIter<(NodeId, HwAddr)>;

    fn iter(events: &mut FleetEvents) -> Self::Iter {
        let list = mem::take(&mut events.erasures);
        IntoIterator::into_iter(list)
    }

    fn has(events: &FleetEvents) -> bool {
        !events.erasures.is_empty()
    }
}

// UpdateOutcomeEvent
pub struct UpdateOutcomeEvent;
impl FleetEvent for UpdateOutcomeEvent {
    type Iter = IntoIter<OtaOutcome>;

    fn iter(events: &mut FleetEvents) -> Self::Iter {
        let list = mem::take(&mut events.update_outcomes);
        IntoIterator::into_iter(list)
    }

    fn has(events: &FleetEvents) -> bool {
        !events.update_outcomes.is_empty()
    }
}

// ErrorEvent
pub struct ErrorEvent;
impl FleetEvent for ErrorEvent {
    type Iter = IntoIter<HubError>;

    fn iter(events: &mut FleetEvents) -> Self::Iter {
        let list = mem::take(&mut events.errors);
        IntoIterator::into_iter(list)
    }

    fn has(events: &FleetEvents) -> bool {
        !events.errors.is_empty()
    }
}
