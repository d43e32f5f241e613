//! Reconciliation of the *owned* subset of a remote object's custom fields and
//! tags.
//!
//! A configuration snapshot names the attributes it manages. Everything else
//! that exists on the remote object is left alone: it is never written in
//! partial-merge mode, it is forwarded verbatim in full-replace mode, and it is
//! filtered out of every read. Ownership is recomputed from the configuration
//! on every call; nothing about it is persisted.
//!
//! The three entry points are [`ownership::extract_ownership`],
//! [`reconcile::plan_write`] and [`project::project_read`]. The
//! [`engine::Reconciler`] strings them together around a
//! [`accessor::RemoteObjectAccessor`].

pub mod accessor;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod import;
pub mod memory;
pub mod model;
pub mod ownership;
pub mod plan;
pub mod project;
pub mod reconcile;
pub mod value;
