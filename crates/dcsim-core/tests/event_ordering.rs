use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use dcsim_core::{cast, Event, EventHandler, Id, Simulation, SimulationContext};

#[derive(Clone, Serialize)]
struct Tick {
    seq: u32,
}

#[derive(Clone, Serialize)]
struct Spawn {
    count: u32,
    delay: f64,
}

struct Recorder {
    received: Vec<(f64, u32, Id)>,
    ctx: SimulationContext,
}

impl EventHandler for Recorder {
    fn on(&mut self, event: Event) {
        let src = event.src;
        cast!(match event.data {
            Tick { seq } => {
                self.received.push((self.ctx.time(), seq, src));
            }
            Spawn { count, delay } => {
                for seq in 0..count {
                    self.ctx.emit_self(Tick { seq }, delay);
                }
            }
        })
    }
}

fn recorder(sim: &mut Simulation, name: &str) -> (Rc<RefCell<Recorder>>, Id) {
    let rec = Rc::new(RefCell::new(Recorder {
        received: Vec::new(),
        ctx: sim.create_context(name),
    }));
    let id = sim.add_handler(name, rec.clone());
    (rec, id)
}

#[test]
fn test_same_time_events_are_delivered_in_creation_order() {
    let mut sim = Simulation::new(123);
    let (rec, rec_id) = recorder(&mut sim, "rec");
    let mut client = sim.create_context("client");

    for seq in 0..10 {
        client.emit(Tick { seq }, rec_id, 5.);
    }
    sim.step_until_no_events();

    let seqs: Vec<u32> = rec.borrow().received.iter().map(|(_, seq, _)| *seq).collect();
    assert_eq!(seqs, (0..10).collect::<Vec<u32>>());
    assert!(rec.borrow().received.iter().all(|(time, _, _)| *time == 5.));
}

#[test]
fn test_events_are_delivered_in_time_order() {
    let mut sim = Simulation::new(123);
    let (rec, rec_id) = recorder(&mut sim, "rec");
    let mut client = sim.create_context("client");

    client.emit(Tick { seq: 0 }, rec_id, 3.);
    client.emit(Tick { seq: 1 }, rec_id, 1.);
    client.emit(Tick { seq: 2 }, rec_id, 2.);
    client.emit(Tick { seq: 3 }, rec_id, 1.);
    sim.step_until_no_events();

    let received = rec.borrow().received.clone();
    let seqs: Vec<u32> = received.iter().map(|(_, seq, _)| *seq).collect();
    assert_eq!(seqs, vec![1, 3, 2, 0]);
    for pair in received.windows(2) {
        assert!(pair[0].0 <= pair[1].0);
    }
    assert_eq!(sim.time(), 3.);
}

#[test]
fn test_events_emitted_by_handlers_keep_fifo_order() {
    let mut sim = Simulation::new(123);
    let (rec, rec_id) = recorder(&mut sim, "rec");
    let mut client = sim.create_context("client");

    client.emit(Spawn { count: 3, delay: 0. }, rec_id, 1.);
    client.emit(Tick { seq: 100 }, rec_id, 1.);
    sim.step_until_no_events();

    // Tick 100 was created before the spawned ticks, so it is delivered first.
    let seqs: Vec<u32> = rec.borrow().received.iter().map(|(_, seq, _)| *seq).collect();
    assert_eq!(seqs, vec![100, 0, 1, 2]);
}

#[test]
fn test_cancelled_event_is_not_delivered() {
    let mut sim = Simulation::new(123);
    let (rec, rec_id) = recorder(&mut sim, "rec");
    let mut client = sim.create_context("client");

    client.emit(Tick { seq: 0 }, rec_id, 1.);
    let cancelled = client.emit(Tick { seq: 1 }, rec_id, 2.);
    client.emit(Tick { seq: 2 }, rec_id, 3.);
    client.cancel_event(cancelled);
    assert_eq!(sim.dump_events().len(), 2);
    sim.step_until_no_events();

    let seqs: Vec<u32> = rec.borrow().received.iter().map(|(_, seq, _)| *seq).collect();
    assert_eq!(seqs, vec![0, 2]);
    assert_eq!(sim.event_count(), 3);
}

#[test]
fn test_cancel_events_by_predicate() {
    let mut sim = Simulation::new(123);
    let (rec, rec_id) = recorder(&mut sim, "rec");
    let mut client = sim.create_context("client");

    for seq in 0..5 {
        client.emit(Tick { seq }, rec_id, seq as f64);
    }
    sim.cancel_events(|e| e.time >= 3.);
    sim.step_until_no_events();

    assert_eq!(rec.borrow().received.len(), 3);
    assert_eq!(sim.time(), 2.);
}

#[test]
fn test_start_time() {
    let mut sim = Simulation::with_start_time(123, 100.);
    let (rec, rec_id) = recorder(&mut sim, "rec");
    let mut client = sim.create_context("client");

    client.emit(Tick { seq: 0 }, rec_id, 2.5);
    sim.step_until_no_events();

    assert_eq!(rec.borrow().received[0].0, 102.5);
}

#[test]
fn test_emit_as_keeps_source() {
    let mut sim = Simulation::new(123);
    let (rec, rec_id) = recorder(&mut sim, "rec");
    let mut client = sim.create_context("client");
    let other = sim.create_context("other");

    client.emit_as(Tick { seq: 0 }, other.id(), rec_id, 0.);
    sim.step();

    assert_eq!(rec.borrow().received[0].2, other.id());
}

#[test]
fn test_event_to_component_without_handler_is_dropped() {
    let mut sim = Simulation::new(123);
    let mut client = sim.create_context("client");
    let nobody = sim.create_context("nobody");

    client.emit(Tick { seq: 0 }, nobody.id(), 1.);
    assert!(sim.step());
    assert!(!sim.step());
    assert_eq!(sim.time(), 1.);
}

#[test]
#[should_panic]
fn test_negative_delay_is_rejected() {
    let mut sim = Simulation::new(123);
    let mut client = sim.create_context("client");
    client.emit_self(Tick { seq: 0 }, -1.);
}

#[test]
fn test_random_numbers_are_reproducible() {
    let mut sim1 = Simulation::new(42);
    let mut sim2 = Simulation::new(42);
    let seq1: Vec<u32> = (0..10).map(|_| sim1.gen_range(0..1000)).collect();
    let seq2: Vec<u32> = (0..10).map(|_| sim2.gen_range(0..1000)).collect();
    assert_eq!(seq1, seq2);
}

#[derive(Clone, Serialize)]
struct Unknown {}

#[test]
fn test_unmatched_payload_is_skipped() {
    let mut sim = Simulation::new(123);
    let (rec, rec_id) = recorder(&mut sim, "rec");
    let mut client = sim.create_context("client");

    client.emit(Unknown {}, rec_id, 1.);
    client.emit(Tick { seq: 7 }, rec_id, 2.);
    sim.step_until_no_events();

    let seqs: Vec<u32> = rec.borrow().received.iter().map(|(_, seq, _)| *seq).collect();
    assert_eq!(seqs, vec![7]);
}

#[test]
fn test_component_names_map_to_stable_ids() {
    let mut sim = Simulation::new(123);
    let client = sim.create_context("client");
    let (_, rec_id) = recorder(&mut sim, "rec");

    assert_eq!(sim.component_id("client"), Some(client.id()));
    assert_eq!(sim.component_id("rec"), Some(rec_id));
    assert_eq!(sim.component_id("missing"), None);
    assert_eq!(sim.component_name(rec_id), Some("rec"));
    // registering a known name again returns the same ID
    assert_eq!(sim.create_context("client").id(), client.id());
}
