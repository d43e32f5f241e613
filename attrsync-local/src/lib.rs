//! A local stand-in for a remote attribute store.
//!
//! The store is a single file holding a stream of JSON patch events. Folding
//! them yields a [`document::RemoteDocument`] with field definitions, tag
//! definitions and objects. Writes go through an exclusive advisory lock.

pub mod accessor;
pub mod document;
pub mod state;
pub mod store;
