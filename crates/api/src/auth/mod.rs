//! Authorization gate
//!
//! Session resolution against the identity provider plus the per-request
//! routing decision. The gate is the sole source of truth for the current
//! tenant: the resolved [`PortalUser`] carries the server-derived
//! `TenantId`, and client input is never trusted for it.

pub mod gate;
pub mod session;

pub use gate::{gate_action, session_gate, GateAction};
pub use session::{new_session_cache, AuthError, AuthState, PortalUser, Role, SessionCache};
