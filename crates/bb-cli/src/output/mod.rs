//! Output formatting utilities for the CLI
//!
//! Tables for saved profiles and tracked tunnels, plus colored status lines.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use tabled::{settings::Style, Table, Tabled};

use bb_core::types::{SavedConnectionProfile, TunnelSession, TunnelStatus};

/// Format saved connection profiles as a table, most recently used first
pub fn format_profiles(profiles: &[SavedConnectionProfile]) -> String {
    if profiles.is_empty() {
        return "No saved configurations".to_string();
    }

    #[derive(Tabled)]
    struct ProfileRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "KIND")]
        kind: String,
        #[tabled(rename = "RESOURCE")]
        resource: String,
        #[tabled(rename = "BASTION")]
        bastion: String,
        #[tabled(rename = "PORTS")]
        ports: String,
        #[tabled(rename = "LAST USED")]
        last_used: String,
    }

    let mut profiles: Vec<_> = profiles.iter().collect();
    profiles.sort_by(|a, b| b.last_used.cmp(&a.last_used));

    let rows: Vec<ProfileRow> = profiles
        .into_iter()
        .map(|p| ProfileRow {
            name: p.name.clone(),
            kind: p.kind().to_string(),
            resource: truncate(&p.resource_name, 32),
            bastion: format!("{} ({})", p.bastion_name, p.bastion_resource_group),
            ports: if p.local_port == 0 {
                "-".to_string()
            } else {
                format!("{} -> {}", p.local_port, p.remote_port)
            },
            last_used: p.last_used.format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format tracked tunnels as a table
pub fn format_tunnels(sessions: &[TunnelSession], now: DateTime<Utc>) -> String {
    if sessions.is_empty() {
        return "No active tunnels".to_string();
    }

    #[derive(Tabled)]
    struct TunnelRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "LOCAL")]
        local: String,
        #[tabled(rename = "TARGET")]
        target: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "UPTIME")]
        uptime: String,
    }

    let rows: Vec<TunnelRow> = sessions
        .iter()
        .map(|s| TunnelRow {
            id: s.id.to_string(),
            local: format!("localhost:{}", s.local_port),
            target: format!("{}:{}", truncate(&s.target.name, 32), s.remote_port),
            status: s.status.to_string(),
            pid: s
                .pid
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            uptime: match s.status {
                TunnelStatus::Stale => "-".to_string(),
                _ => format_duration((now - s.start_time).num_seconds().max(0) as u64),
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format duration in human-readable form
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn print_colored<W: Write>(mut out: W, color: Color, prefix: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(prefix),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    print_colored(io::stdout(), Color::Green, "✓ ", msg);
}

/// Print a warning message to stderr in yellow
pub fn print_warning(msg: &str) {
    print_colored(io::stderr(), Color::Yellow, "⚠ ", msg);
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    print_colored(io::stdout(), Color::Cyan, "ℹ ", msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_core::types::{BastionHost, TargetResource, TunnelId};
    use chrono::Duration;

    fn session(status: TunnelStatus, age_secs: i64, now: DateTime<Utc>) -> TunnelSession {
        TunnelSession {
            id: TunnelId::from("0b9d6a8e-1111-4222-8333-444455556666"),
            local_port: 5432,
            remote_port: 5432,
            target: TargetResource {
                id: "/subscriptions/s/vm-db".to_string(),
                name: "vm-db".to_string(),
                subscription_id: "s".to_string(),
            },
            bastion: BastionHost::default(),
            start_time: now - Duration::seconds(age_secs),
            status,
            pid: Some(4242),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(3720), "1h 2m");
        assert_eq!(format_duration(90000), "1d 1h");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-resource-name", 10), "a-very-...");
    }

    #[test]
    fn test_format_tunnels() {
        let now = Utc::now();
        let table = format_tunnels(&[session(TunnelStatus::Running, 125, now)], now);
        assert!(table.contains("localhost:5432"));
        assert!(table.contains("vm-db:5432"));
        assert!(table.contains("running"));
        assert!(table.contains("2m 5s"));
    }

    #[test]
    fn test_stale_tunnel_has_no_uptime() {
        let now = Utc::now();
        let table = format_tunnels(&[session(TunnelStatus::Stale, 125, now)], now);
        assert!(table.contains("stale"));
        assert!(!table.contains("2m 5s"));
    }

    #[test]
    fn test_empty_tables() {
        assert_eq!(format_tunnels(&[], Utc::now()), "No active tunnels");
        assert_eq!(format_profiles(&[]), "No saved configurations");
    }
}
