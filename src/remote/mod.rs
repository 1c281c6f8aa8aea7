//! The hosted backend's REST surface: a client implementing `RecordStore`
//! and a warp server exposing a `RosterDb` the same way.

pub mod api;
pub mod client;
pub mod types;

pub use client::RestStore;
pub use types::ErrorBody;
