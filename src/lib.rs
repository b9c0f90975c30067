//! Device dashboard synchronization library.
//!
//! Keeps dashboard widgets and remote smart-home devices in agreement:
//! device state is rendered without ever being echoed back, and user
//! gestures are coalesced into a bounded stream of commands.

pub mod binding;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod instance_lock;
pub mod remote;
pub mod sync;
pub mod ui;
