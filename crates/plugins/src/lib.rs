//! Plugin marketplace: registry resolution, installation and bookkeeping.
//!
//! Plugins are gzip tarballs listed in a JSON registry. They install to a
//! local plugin store (one directory per plugin with a `.version` marker),
//! are mirrored into a per-version cache, and are optionally recorded in a
//! host application's installed-plugins ledger.

pub mod archive;
pub mod error;
pub mod fetch;
pub mod host_registry;
pub mod install;
pub mod registry;
pub mod service;
pub mod store;

pub use {
    error::{Error, Result},
    service::{Listing, Marketplace, SyncReport, UpdateOutcome},
};
