#![deny(missing_docs)]

//! # gatekit-core: Foundational Types for gatekit
//!
//! This crate defines the types every other gatekit crate builds on. It has
//! no transport dependency: nothing here knows about axum, hyper, or reqwest.
//!
//! ## Contents
//!
//! - [`ListQuery`]: validated pagination/filter/sort descriptor and its parser.
//! - [`FilterParam`]: entity-supplied storage predicates (e.g. parent scoping).
//! - [`Identity`], [`User`] and [`TraceId`]: ambient state attached by the
//!   gate chain.
//! - [`RequestContext`]: per-request state handed to entity logic.
//! - [`capability`]: the five independent capability traits a resource
//!   implements to be dispatched (`List`, `Get`, `Create`, `Update`, `Delete`).
//! - [`MemoryStore`]: an in-process implementation of the storage
//!   collaborator contract, used by the demo binary and the tests.
//!
//! ## Design Principles
//!
//! 1. **Validation at construction.** A `ListQuery` with `limit` outside
//!    `1..=100` cannot exist.
//! 2. **Capabilities, not a god-interface.** A resource implements only the
//!    verbs it supports; the dispatcher registers only those endpoints.
//! 3. **Structured errors with `thiserror`.** No `.unwrap()` outside tests.

pub mod capability;
pub mod context;
pub mod error;
pub mod filter;
pub mod identity;
pub mod query;
pub mod store;

pub use capability::{Create, Decoded, Delete, Get, List, Page, Resource, Update, Verb};
pub use context::{PathParams, RequestContext};
pub use error::{ListQueryError, ResourceError};
pub use filter::{FilterOperator, FilterParam};
pub use identity::{Identity, TraceId, User};
pub use query::ListQuery;
pub use store::{MemoryStore, Record};
