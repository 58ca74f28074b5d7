//! shiftkit-client: REST adapter for the attendance backend.
//!
//! Owns transport, token injection, and wire decoding. Everything above
//! this crate speaks `shiftkit-core` types through the [`ShiftApi`]
//! trait, so the backend can be swapped out in tests.

pub mod api;
pub mod error;

pub use api::{ClientConfig, HttpShiftApi, ShiftApi};
pub use error::ApiError;
