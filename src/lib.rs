//! orderbot -- order dispatch for a service counter.
//!
//! Orders of two priority classes are served by a pool of bots that can grow
//! and shrink while work is in flight. The [`dispatch`] module holds the
//! engine; [`runtime`] drives it against the wall clock; [`board`] and
//! [`script`] are the thin text front end used by the CLI.

pub mod board;
pub mod config;
pub mod dispatch;
pub mod runtime;
pub mod script;

pub use config::OrderbotConfig;
pub use dispatch::{DispatchError, Dispatcher, Priority};
