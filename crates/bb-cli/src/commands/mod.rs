//! CLI command implementations

mod config;
mod handoff;
mod list;
mod open;
mod start;
mod status;
mod stop;

pub use config::{config_init, config_path, config_show};
pub use handoff::{handoff_command, SessionArgs};
pub use list::list_command;
pub use open::{open_command, OpenArgs};
pub use start::start_command;
pub use status::status_command;
pub use stop::{stop_all_command, stop_command};

use bb_core::TunnelSession;

use crate::output::print_success;

pub(crate) fn announce_tunnel(session: &TunnelSession) {
    print_success(&format!(
        "Tunnel {} running: localhost:{} -> {}:{}",
        session.id, session.local_port, session.target.name, session.remote_port
    ));
    println!("Stop it with: bastion-buddy stop {}", session.id);
}
