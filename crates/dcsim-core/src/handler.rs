//! Delivering events to components.

use crate::event::Event;

/// Component side of event delivery.
///
/// The engine calls [`on`](Self::on) once per event addressed to the component, in the order of event time
/// and, for equal times, in the order of event creation. The payload is usually dispatched with [`cast!`](crate::cast!).
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use serde::Serialize;
/// use dcsim_core::{cast, Event, EventHandler, Simulation};
///
/// #[derive(Clone, Serialize)]
/// struct Deposit {
///     amount: u64,
/// }
///
/// #[derive(Clone, Serialize)]
/// struct Reset {}
///
/// struct Account {
///     balance: u64,
/// }
///
/// impl EventHandler for Account {
///     fn on(&mut self, event: Event) {
///         cast!(match event.data {
///             Deposit { amount } => {
///                 self.balance += amount;
///             }
///             Reset {} => {
///                 self.balance = 0;
///             }
///         })
///     }
/// }
///
/// let mut sim = Simulation::new(1);
/// let account = Rc::new(RefCell::new(Account { balance: 0 }));
/// let account_id = sim.add_handler("account", account.clone());
/// let mut bank = sim.create_context("bank");
/// bank.emit(Deposit { amount: 5 }, account_id, 1.);
/// bank.emit(Deposit { amount: 7 }, account_id, 2.);
/// sim.step_until_no_events();
/// assert_eq!(account.borrow().balance, 12);
/// ```
pub trait EventHandler {
    /// Processes an event addressed to the component.
    fn on(&mut self, event: Event);
}

/// Dispatches the event payload by its concrete type.
///
/// Each arm names a payload struct and destructures it. Arms are tried in order and the payload is moved
/// into the first matching one. A payload matching no arm is logged as unhandled at the `ERROR` level.
/// Arm bodies must evaluate to `()`.
#[macro_export]
macro_rules! cast {
    ( match $event:ident.data { $( $type:ident { $($tt:tt)* } => { $($expr:tt)* } )+ } ) => {{
        let mut __payload: Option<Box<dyn $crate::event::EventData>> = Some($event.data);
        $(
            if let Some(__data) = __payload.take() {
                match __data.downcast::<$type>() {
                    Ok(__value) => {
                        let $type { $($tt)* } = *__value;
                        $($expr)*
                    }
                    Err(__data) => __payload = Some(__data),
                }
            }
        )+
        if let Some(__data) = __payload {
            $crate::log::log_unhandled_event($event.time, $event.src, $event.dst, &*__data);
        }
    }};
}
