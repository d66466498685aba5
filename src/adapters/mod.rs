//! Adapters - implementations of the collaborator ports.
//!
//! - `memory` - in-memory implementations of every port, for tests and
//!   development
//! - `rest` - the real identity provider and profile store over their
//!   REST surfaces
//! - `clock` - real (tokio) and manual clocks

pub mod clock;
pub mod memory;
pub mod rest;

pub use clock::{ManualClock, TokioClock};
pub use rest::{RestIdentityProvider, RestProfileStore};
