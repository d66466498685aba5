//! Gatherly session bootstrap and pending-intent reconciliation.
//!
//! Establishes an authenticated session after password login, registration,
//! or an OAuth redirect; waits out the trigger-created profile row; and
//! replays the action the user queued up before authenticating (joining an
//! event by code, resuming a ticket purchase). The identity provider, the
//! profile store, and the event service are external collaborators behind
//! ports; this crate owns the coordination between them.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
