//! Execution lifecycle control for live script views.
//!
//! A [`orchestrator::Controller`] turns "run this script with these arguments" into a
//! managed, cancellable remote execution and folds the transport's lifecycle events into
//! a shared [`results::ResultsStore`].

pub mod args;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod pxl;
pub mod results;
pub mod route;
pub mod telemetry;
pub mod transport;
pub mod vis;

pub use config::ControllerConfig;
pub use error::ControllerError;
pub use orchestrator::{spawn_controller, ControllerHandle, Dependencies, ScriptView};
pub use results::{Results, ResultsSnapshot, ResultsStore};
