//! Component registry and the event loop.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::Level::Trace;
use log::{debug, log_enabled};
use rand::distributions::uniform::{SampleRange, SampleUniform};

use crate::component::Id;
use crate::context::SimulationContext;
use crate::event::Event;
use crate::handler::EventHandler;
use crate::log::{log_delivery, log_undelivered_event};
use crate::state::SimulationState;

struct Component {
    name: String,
    handler: Option<Rc<RefCell<dyn EventHandler>>>,
}

/// Discrete-event simulation: a clock, a queue of pending events and a set of named components.
///
/// Components are registered by name. The first registration of a name assigns the next free [`Id`],
/// later registrations of the same name return that ID. A component receives events once a handler is added
/// for it, events addressed to a component without handler are logged and dropped.
pub struct Simulation {
    state: Rc<RefCell<SimulationState>>,
    ids: HashMap<String, Id>,
    components: Vec<Component>,
}

impl Simulation {
    /// Creates a simulation with the clock at zero.
    pub fn new(seed: u64) -> Self {
        Self::with_start_time(seed, 0.)
    }

    /// Creates a simulation with the clock at `start_time`.
    ///
    /// ```rust
    /// use dcsim_core::Simulation;
    ///
    /// let sim = Simulation::with_start_time(7, 30.);
    /// assert_eq!(sim.time(), 30.);
    /// ```
    pub fn with_start_time(seed: u64, start_time: f64) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimulationState::new(seed, start_time))),
            ids: HashMap::new(),
            components: Vec::new(),
        }
    }

    fn register(&mut self, name: &str) -> Id {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = self.components.len() as Id;
        self.ids.insert(name.to_owned(), id);
        self.components.push(Component {
            name: name.to_owned(),
            handler: None,
        });
        debug!(target: "simulation", "[{:.3} simulation] registered component {} as #{}", self.time(), name, id);
        id
    }

    /// Returns the ID of a registered component.
    pub fn component_id(&self, name: &str) -> Option<Id> {
        self.ids.get(name).copied()
    }

    /// Returns the name of a registered component.
    pub fn component_name(&self, id: Id) -> Option<&str> {
        self.components.get(id as usize).map(|c| c.name.as_str())
    }

    /// Registers the component name if needed and returns a context for it.
    ///
    /// ```rust
    /// use dcsim_core::Simulation;
    ///
    /// let mut sim = Simulation::new(7);
    /// let first = sim.create_context("first");
    /// let second = sim.create_context("second");
    /// assert_eq!((first.id(), second.id()), (0, 1));
    /// assert_eq!(sim.component_id("second"), Some(1));
    /// assert_eq!(sim.component_id("third"), None);
    /// ```
    pub fn create_context<S: AsRef<str>>(&mut self, name: S) -> SimulationContext {
        let id = self.register(name.as_ref());
        SimulationContext::new(id, name.as_ref(), self.state.clone())
    }

    /// Sets the handler receiving events of the named component and returns the component ID.
    ///
    /// A component which already has a context keeps its ID.
    pub fn add_handler<S: AsRef<str>>(&mut self, name: S, handler: Rc<RefCell<dyn EventHandler>>) -> Id {
        let id = self.register(name.as_ref());
        self.components[id as usize].handler = Some(handler);
        id
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.state.borrow().time()
    }

    /// Delivers the next pending event, moving the clock to its time.
    ///
    /// Returns `false` if the queue is empty.
    ///
    /// ```rust
    /// use serde::Serialize;
    /// use dcsim_core::Simulation;
    ///
    /// #[derive(Clone, Serialize)]
    /// struct Wake {}
    ///
    /// let mut sim = Simulation::new(7);
    /// let mut ctx = sim.create_context("sleeper");
    /// ctx.emit_self(Wake {}, 2.5);
    /// assert!(sim.step());
    /// assert_eq!(sim.time(), 2.5);
    /// assert!(!sim.step());
    /// ```
    pub fn step(&mut self) -> bool {
        let next = self.state.borrow_mut().next_event();
        match next {
            Some(event) => {
                self.deliver(event);
                true
            }
            None => false,
        }
    }

    fn deliver(&mut self, event: Event) {
        let handler = self
            .components
            .get(event.dst as usize)
            .and_then(|c| c.handler.clone());
        match handler {
            Some(handler) => {
                if log_enabled!(Trace) {
                    let src_name = self.component_name(event.src).unwrap_or("?");
                    let dst_name = self.component_name(event.dst).unwrap_or("?");
                    log_delivery(&event, src_name, dst_name);
                }
                handler.borrow_mut().on(event);
            }
            None => log_undelivered_event(&event),
        }
    }

    /// Performs up to `step_count` steps. Returns `false` if the queue became empty.
    pub fn steps(&mut self, step_count: u64) -> bool {
        (0..step_count).all(|_| self.step())
    }

    /// Runs until the queue is empty.
    pub fn step_until_no_events(&mut self) {
        while self.step() {}
    }

    /// Delivers events with time not later than `time() + duration`.
    ///
    /// Returns `false` if the queue became empty, `true` if later events remain.
    pub fn step_for_duration(&mut self, duration: f64) -> bool {
        let end_time = self.time() + duration;
        loop {
            let next_time = self.state.borrow_mut().peek_event().map(|e| e.time);
            match next_time {
                Some(time) if time <= end_time => {
                    self.step();
                }
                Some(_) => return true,
                None => return false,
            }
        }
    }

    /// Draws a value from the simulation-wide seeded generator.
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.state.borrow_mut().gen_range(range)
    }

    /// Number of events created so far, including canceled ones.
    pub fn event_count(&self) -> u64 {
        self.state.borrow().event_count()
    }

    /// Withdraws all pending events matching the predicate.
    pub fn cancel_events<F: Fn(&Event) -> bool>(&mut self, pred: F) {
        self.state.borrow_mut().cancel_events(pred);
    }

    /// Returns pending events in delivery order.
    pub fn dump_events(&self) -> Vec<Event> {
        self.state.borrow().dump_events()
    }
}
