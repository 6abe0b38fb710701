//! Script execution lifecycle control.
//!
//! The controller is a single task that owns the selected script, its arguments and the
//! current execution. Callers talk to it through a [`ControllerHandle`]; transport events
//! for the current execution arrive on the same loop, so commands and events are applied
//! one at a time and a superseded execution can never write results.

mod controller;

pub use controller::{spawn_controller, Command, Controller, ControllerHandle, Dependencies, ScriptView};
