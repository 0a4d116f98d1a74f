//! Logging of component messages and engine diagnostics.
//!
//! Component messages have the form `[12.500 INFO  broker] started`: simulation time, level and component
//! name, with the component name also used as the log target. Level labels are colored only when stderr
//! is a terminal.
//!
//! ```rust
//! use dcsim_core::{log_info, log_warn, Simulation};
//!
//! let mut sim = Simulation::new(1);
//! let ctx = sim.create_context("broker");
//! log_info!(ctx, "started with {} vms", 3);
//! log_warn!(ctx, "no datacenter is set");
//! ```

use atty::Stream;
use colored::{Color, ColoredString, Colorize};
use log::{error, trace};
use serde_json::{json, Value};
use serde_type_name::type_name;

use crate::component::Id;
use crate::event::{Event, EventData};

/// Returns the level label, colored if the log goes to a terminal.
pub fn level_label(label: &str, color: Color) -> ColoredString {
    if atty::is(Stream::Stderr) {
        label.color(color)
    } else {
        label.normal()
    }
}

/// Shared body of the component logging macros.
#[doc(hidden)]
#[macro_export]
macro_rules! __log_component {
    ($level:ident, $label:literal, $color:ident, $ctx:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {
        log::$level!(
            target: $ctx.name(),
            concat!("[{:.3} {} {}] ", $fmt),
            $ctx.time(),
            $crate::log::level_label($label, $crate::colored::Color::$color),
            $ctx.name()
            $(, $arg)*
        )
    };
    ($level:ident, $label:literal, $color:ident, $ctx:expr, $msg:expr) => {
        $crate::__log_component!($level, $label, $color, $ctx, "{}", $msg)
    };
}

/// Logs a component message at the error level.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::__log_component!(error, "ERROR", Red, $ctx, $($arg)+)
    };
}

/// Logs a component message at the warn level.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::__log_component!(warn, "WARN ", Yellow, $ctx, $($arg)+)
    };
}

/// Logs a component message at the info level.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::__log_component!(info, "INFO ", Green, $ctx, $($arg)+)
    };
}

/// Logs a component message at the debug level.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::__log_component!(debug, "DEBUG", Blue, $ctx, $($arg)+)
    };
}

/// Logs a component message at the trace level.
#[macro_export]
macro_rules! log_trace {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::__log_component!(trace, "TRACE", Cyan, $ctx, $($arg)+)
    };
}

fn describe(data: &dyn EventData, src: Value, dst: Value) -> Value {
    json!({"type": type_name(&data).unwrap_or("?"), "data": data, "src": src, "dst": dst})
}

/// Reports a payload which matched no arm of [`cast!`](crate::cast!).
pub fn log_unhandled_event(time: f64, src: Id, dst: Id, data: &dyn EventData) {
    error!(
        target: "simulation",
        "[{:.3} {} simulation] unhandled event {}",
        time,
        level_label("ERROR", Color::Red),
        describe(data, json!(src), json!(dst))
    );
}

pub(crate) fn log_undelivered_event(event: &Event) {
    error!(
        target: "simulation",
        "[{:.3} {} simulation] no handler for event {}",
        event.time,
        level_label("ERROR", Color::Red),
        describe(&*event.data, json!(event.src), json!(event.dst))
    );
}

pub(crate) fn log_rejected_event(event: &Event, reason: &str) {
    error!(
        target: "simulation",
        "[{:.3} {} simulation] rejected event ({}) {}",
        event.time,
        level_label("ERROR", Color::Red),
        reason,
        describe(&*event.data, json!(event.src), json!(event.dst))
    );
}

pub(crate) fn log_delivery(event: &Event, src_name: &str, dst_name: &str) {
    trace!(
        target: dst_name,
        "[{:.3} {} {}] {}",
        event.time,
        level_label("EVENT", Color::BrightBlack),
        dst_name,
        describe(&*event.data, json!(src_name), json!(dst_name))
    );
}
