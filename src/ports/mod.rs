//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Collaborator Ports
//!
//! - `IdentityProvider` - session issuance, sign-in/out, pushed transitions
//! - `ProfileStore` - the durable user record, created by a backend trigger
//! - `EventGateway` - the handler a deferred join intent is replayed against
//!
//! ## Infrastructure Ports
//!
//! - `ScopedStorage` - the short-lived and durable client-side key/value scopes
//! - `Clock` - time observation and suspension, for fake-clock testing

mod clock;
mod event_gateway;
mod identity_provider;
mod profile_store;
mod scoped_storage;

pub use clock::Clock;
pub use event_gateway::{EventGateway, EventGatewayError};
pub use identity_provider::{
    AuthChange, AuthChangeEvent, Credentials, IdentityProvider, OAuthProvider, OAuthRequest,
    Session, SessionUser, SignOutScope, SignUpRequest,
};
pub use profile_store::{ProfilePatch, ProfileRow, ProfileStore, ProfileStoreError};
pub use scoped_storage::{ScopedStorage, StorageError, StorageScope};
