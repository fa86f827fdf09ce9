//! # Gates
//!
//! The [`Stage`](crate::pipeline::Stage) implementations shipped with the
//! service. A dispatcher endpoint runs [`TraceStage`] then
//! [`AuthenticationGate`], followed by whatever stages were added for it.

pub mod authentication;
pub mod authorization;
pub mod network;
pub mod trace;
pub mod user;
pub mod whitelist;

pub use authentication::AuthenticationGate;
pub use authorization::{AmbientRoleGate, RoleGate};
pub use network::{LocalNetworks, Subnet};
pub use trace::TraceStage;
pub use user::UserLookup;
pub use whitelist::Whitelist;
