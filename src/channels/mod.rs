//! Social network I/O.
//!
//! `XApiClient` talks to the X API v2; `SimulatedXClient` serves canned data
//! when no bearer token is configured. Both implement the pipeline's
//! `MentionSource`, `ThreadSource` and `ActionExecutor` traits.

pub mod simulated;
pub mod x_api;
pub mod x_types;

pub use simulated::SimulatedXClient;
pub use x_api::XApiClient;
