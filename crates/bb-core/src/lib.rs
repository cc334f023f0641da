//! bb-core: Tunnel lifecycle and persistent state for BastionBuddy
//!
//! This crate owns the saved connection profiles, the supervision of
//! `az network bastion tunnel` processes and the registry that tracks them
//! across runs. The CLI crate is a thin surface over [`init::LazyContext`]
//! and the [`connect`] helpers.

pub mod auth;
pub mod config;
pub mod connect;
pub mod directory;
pub mod error;
pub mod init;
pub mod process;
pub mod registry;
pub mod store;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{BastionError, Result};
pub use init::{AppContext, LazyContext};
pub use registry::{Registry, StopAllReport};
pub use types::{ConnectionKind, TunnelId, TunnelSession, TunnelStatus};
