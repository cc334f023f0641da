//! Core trait definitions

mod auth;
mod directory;
mod supervisor;

pub use auth::{AuthProvider, Credential};
pub use directory::{ResourceDirectory, Selection};
pub use supervisor::{PidKill, TunnelProcess, TunnelSupervisor};
