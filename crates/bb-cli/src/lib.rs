//! bb-cli: Command-line interface for BastionBuddy
//!
//! Provides the `bastion-buddy` binary for starting, listing and stopping
//! Azure Bastion tunnels and for handing off to SSH and RDP sessions.

pub mod commands;
pub mod output;
