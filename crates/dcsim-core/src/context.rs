//! Component-side handle to the running simulation.

use std::cell::RefCell;
use std::rc::Rc;

use crate::component::Id;
use crate::event::{EventData, EventId};
use crate::state::SimulationState;

/// Handle owned by a simulation component.
///
/// Gives read access to the clock and lets the component schedule and withdraw events. All events
/// scheduled through the handle carry the component as their source unless [`emit_as`](Self::emit_as) is used.
pub struct SimulationContext {
    id: Id,
    name: String,
    state: Rc<RefCell<SimulationState>>,
}

impl SimulationContext {
    pub(crate) fn new(id: Id, name: &str, state: Rc<RefCell<SimulationState>>) -> Self {
        Self {
            id,
            name: name.to_owned(),
            state,
        }
    }

    /// Identifier of the owning component.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Name of the owning component, also used as the log target.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.state.borrow().time()
    }

    /// Schedules `data` for delivery to `dst` after `delay`.
    ///
    /// Panics if `delay` is negative.
    pub fn emit<T: EventData>(&mut self, data: T, dst: Id, delay: f64) -> EventId {
        self.schedule(data, self.id, dst, delay)
    }

    /// Schedules `data` for delivery to the owning component after `delay`.
    pub fn emit_self<T: EventData>(&mut self, data: T, delay: f64) -> EventId {
        self.schedule(data, self.id, self.id, delay)
    }

    /// Schedules `data` for delivery to the owning component at the current time.
    ///
    /// The event is still queued, so events already pending for this time are delivered first.
    pub fn emit_self_now<T: EventData>(&mut self, data: T) -> EventId {
        self.schedule(data, self.id, self.id, 0.)
    }

    /// Schedules `data` as if it was sent by `src`.
    ///
    /// Used by control code which acts on behalf of a component, e.g. a user issuing requests through its broker.
    pub fn emit_as<T: EventData>(&mut self, data: T, src: Id, dst: Id, delay: f64) -> EventId {
        self.schedule(data, src, dst, delay)
    }

    /// Withdraws a pending event. Does nothing if the event was already delivered or withdrawn.
    pub fn cancel_event(&mut self, id: EventId) {
        self.state.borrow_mut().cancel_event(id);
    }

    fn schedule<T: EventData>(&self, data: T, src: Id, dst: Id, delay: f64) -> EventId {
        self.state.borrow_mut().add_event(data, src, dst, delay)
    }
}
