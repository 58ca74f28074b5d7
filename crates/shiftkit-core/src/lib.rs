//! shiftkit-core: domain types and pure state machines for the shift
//! coordinator.
//!
//! No IO, no async, no clocks: every time-dependent decision takes `now`
//! as a parameter, so all of it is testable with plain unit tests.

pub mod guard;
pub mod state;
pub mod status;
pub mod throttle;
pub mod tracking;
pub mod types;
