//! Tunnel registry
//!
//! The `Registry` is the only stateful coordinator for tunnels. It composes
//! the [`Store`] and a [`TunnelSupervisor`] behind a single `RwLock`, which
//! guards both the in-memory session map and the store files.
//!
//! # Locking
//!
//! `list`, `get` and profile reads take the read lock. `start` spawns and
//! verifies the process with no lock held and only takes the write lock to
//! persist and insert the session. `stop` and `stop_all` hold the write lock
//! for the whole teardown; each kill is bounded by the supervisor's
//! terminate timeout.
//!
//! # Consistency
//!
//! A session is in the map exactly when its active record is in the store:
//!
//! - a failed `start` kills the process and persists nothing; this includes
//!   a failure to write the active record or the tunnel profile
//! - `stop` requires the process to be gone before the record and the
//!   session are dropped, so a failed kill leaves the tunnel visible for retry
//! - `stop_all` always empties the map and the store, reporting kill
//!   failures as warnings; a process that refused to die is orphaned
//!
//! Records loaded at startup have no process handle. They are `restored`
//! when their pid is alive and their local port still answers, and `stale`
//! otherwise. Stopping a stale record never signals its pid.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{BastionError, NotFound, Result};
use crate::store::Store;
use crate::traits::{PidKill, TunnelProcess, TunnelSupervisor};
use crate::types::{
    default_tunnel_name, ConnectionKind, SavedConnectionProfile, TunnelId, TunnelSession,
    TunnelSpec, TunnelStatus,
};

/// Session plus the process handle, if this run launched it
struct Tracked {
    session: TunnelSession,
    process: Option<Box<dyn TunnelProcess>>,
}

struct RegistryState {
    sessions: HashMap<TunnelId, Tracked>,
    store: Store,
}

/// A tunnel `stop_all` could not cleanly stop
#[derive(Debug)]
pub struct StopWarning {
    /// Tunnel concerned, or `None` for a store failure covering the whole sweep
    pub id: Option<TunnelId>,
    pub error: BastionError,
}

/// Outcome of [`Registry::stop_all`]
#[derive(Debug, Default)]
pub struct StopAllReport {
    pub stopped: Vec<TunnelId>,
    pub warnings: Vec<StopWarning>,
}

impl StopAllReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// In-memory, lock-protected registry of tunnels
pub struct Registry {
    supervisor: Arc<dyn TunnelSupervisor>,
    state: RwLock<RegistryState>,
}

impl Registry {
    /// Build a registry over `store`, restoring its persisted active records
    ///
    /// A record is `restored` only when its pid is alive and its local port
    /// still accepts connections; anything else is `stale`. With
    /// `discard_stale`, stale records are removed from the store instead.
    pub async fn open(
        mut store: Store,
        supervisor: Arc<dyn TunnelSupervisor>,
        discard_stale: bool,
    ) -> Result<Self> {
        let mut sessions = HashMap::new();
        let mut discarded = Vec::new();

        for record in store.list_active() {
            let status = match record.pid {
                Some(pid) if supervisor.is_alive(pid) => {
                    if supervisor.is_listening(record.local_port).await {
                        TunnelStatus::Restored
                    } else {
                        tracing::warn!(
                            "Tunnel {}: pid {} is alive but port {} is not listening",
                            record.id,
                            pid,
                            record.local_port
                        );
                        TunnelStatus::Stale
                    }
                }
                _ => TunnelStatus::Stale,
            };

            if status == TunnelStatus::Stale {
                tracing::warn!(
                    "Tunnel {} on port {} (pid {:?}) is no longer running",
                    record.id,
                    record.local_port,
                    record.pid
                );
                if discard_stale {
                    discarded.push(record.id.clone());
                    continue;
                }
            }

            sessions.insert(
                record.id.clone(),
                Tracked {
                    session: TunnelSession::restored(record, status),
                    process: None,
                },
            );
        }

        if !discarded.is_empty() {
            let removed = store.remove_active_many(&discarded)?;
            tracing::info!("Discarded {} stale tunnel record(s)", removed);
        }

        tracing::debug!("Registry restored {} tunnel(s)", sessions.len());
        Ok(Self {
            supervisor,
            state: RwLock::new(RegistryState { sessions, store }),
        })
    }

    /// Start a tunnel and remember it under the default profile name
    pub async fn start(&self, spec: &TunnelSpec) -> Result<TunnelSession> {
        self.start_named(spec, &default_tunnel_name(&spec.target.name))
            .await
    }

    /// Start a tunnel and record it under the tunnel profile `profile_name`
    ///
    /// Launch and verification run without the registry lock. On any
    /// failure after the process started, the process is killed and nothing
    /// is persisted.
    pub async fn start_named(&self, spec: &TunnelSpec, profile_name: &str) -> Result<TunnelSession> {
        if let Some(existing) = self.session_on_port(spec.local_port).await {
            return Err(BastionError::StartupFailure {
                port: spec.local_port,
                reason: format!("local port already used by tunnel {}", existing),
                output: String::new(),
            });
        }

        let id = TunnelId::generate();
        let mut process = self.supervisor.launch(&id, spec).await?;
        let mut session = TunnelSession::starting(id.clone(), spec, process.pid());

        if let Err(e) = self
            .supervisor
            .verify_listening(process.as_mut(), spec.local_port)
            .await
        {
            tracing::warn!("Tunnel {} failed to start: {}", id, e);
            self.discard(&id, process).await;
            return Err(e);
        }
        session.status = TunnelStatus::Running;

        let mut state = self.state.write().await;
        if let Err(e) = state.store.save_active(session.to_record()) {
            drop(state);
            tracing::warn!("Failed to persist tunnel {}, stopping it: {}", id, e);
            self.discard(&id, process).await;
            return Err(e);
        }

        let profile = merge_profile(
            state
                .store
                .find_profile(profile_name, Some(ConnectionKind::Tunnel))
                .cloned(),
            profile_name,
            spec,
        );
        if let Err(e) = state.store.save_profile(profile) {
            if let Err(undo) = state.store.remove_active(&id) {
                tracing::warn!("Failed to remove record of tunnel {}: {}", id, undo);
            }
            drop(state);
            tracing::warn!(
                "Failed to save tunnel configuration {}, stopping tunnel {}: {}",
                profile_name,
                id,
                e
            );
            self.discard(&id, process).await;
            return Err(e);
        }

        evict_same_pid(&mut *state, &session);

        state.sessions.insert(
            id.clone(),
            Tracked {
                session: session.clone(),
                process: Some(process),
            },
        );
        tracing::info!(
            "Tunnel {} running: localhost:{} -> {}:{}",
            id,
            spec.local_port,
            spec.target.name,
            spec.remote_port
        );
        Ok(session)
    }

    /// Snapshot of all tracked tunnels, oldest first
    pub async fn list(&self) -> Vec<TunnelSession> {
        let state = self.state.read().await;
        let mut sessions: Vec<_> = state.sessions.values().map(|t| t.session.clone()).collect();
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// Look up one tracked tunnel
    pub async fn get(&self, id: &TunnelId) -> Option<TunnelSession> {
        let state = self.state.read().await;
        state.sessions.get(id).map(|t| t.session.clone())
    }

    /// Stop one tunnel
    ///
    /// The process is killed first; if that fails the tunnel stays tracked.
    /// Restored tunnels are killed by pid, or simply forgotten when the pid
    /// is no longer alive.
    pub async fn stop(&self, id: &TunnelId) -> Result<()> {
        let mut state = self.state.write().await;
        let tracked = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| NotFound::Tunnel(id.clone()))?;

        tracing::info!("Stopping tunnel {}", id);
        self.terminate(tracked).await?;

        state.store.remove_active(id)?;
        state.sessions.remove(id);
        self.supervisor.release(id);
        Ok(())
    }

    /// Stop every tunnel, best effort
    ///
    /// Kill failures are collected as warnings and do not halt the sweep.
    /// The map and the active records are cleared regardless.
    pub async fn stop_all(&self) -> StopAllReport {
        let mut state = self.state.write().await;
        let mut report = StopAllReport::default();

        let mut drained: Vec<_> = std::mem::take(&mut state.sessions).into_iter().collect();
        drained.sort_by(|a, b| a.1.session.start_time.cmp(&b.1.session.start_time));
        let ids: Vec<_> = drained.iter().map(|(id, _)| id.clone()).collect();

        for (id, mut tracked) in drained {
            match self.terminate(&mut tracked).await {
                Ok(()) => report.stopped.push(id.clone()),
                Err(error) => {
                    tracing::warn!("Failed to stop tunnel {}: {}", id, error);
                    report.warnings.push(StopWarning {
                        id: Some(id.clone()),
                        error,
                    });
                }
            }
            self.supervisor.release(&id);
        }

        if let Err(error) = state.store.remove_active_many(&ids) {
            tracing::warn!("Failed to clear active tunnel records: {}", error);
            report.warnings.push(StopWarning { id: None, error });
        }

        report
    }

    /// Saved profiles, optionally filtered by kind
    pub async fn saved_profiles(&self, kind: Option<ConnectionKind>) -> Vec<SavedConnectionProfile> {
        self.state.read().await.store.list_profiles(kind)
    }

    /// Find a saved profile by name
    pub async fn find_profile(
        &self,
        name: &str,
        kind: Option<ConnectionKind>,
    ) -> Option<SavedConnectionProfile> {
        self.state.read().await.store.find_profile(name, kind).cloned()
    }

    /// Insert or replace a saved profile
    pub async fn save_profile(&self, profile: SavedConnectionProfile) -> Result<()> {
        self.state.write().await.store.save_profile(profile)
    }

    async fn session_on_port(&self, port: u16) -> Option<TunnelId> {
        let state = self.state.read().await;
        state
            .sessions
            .values()
            .find(|t| {
                t.session.local_port == port
                    && matches!(
                        t.session.status,
                        TunnelStatus::Running | TunnelStatus::Restored
                    )
            })
            .map(|t| t.session.id.clone())
    }

    async fn terminate(&self, tracked: &mut Tracked) -> Result<()> {
        let id = &tracked.session.id;
        if let Some(process) = tracked.process.as_mut() {
            return process.terminate().await.map_err(|e| with_id(e, id));
        }

        // Without a handle the pid is only trusted while the tunnel still
        // looks like ours; a stale or reused pid is never signalled.
        let pid = match tracked.session.pid {
            Some(pid) if tracked.session.status == TunnelStatus::Restored => pid,
            _ => {
                tracing::info!("Tunnel {} is not running, forgetting it", id);
                return Ok(());
            }
        };
        if !self.supervisor.is_alive(pid)
            || !self.supervisor.is_listening(tracked.session.local_port).await
        {
            tracing::info!("Tunnel {} (pid {}) has gone away, forgetting it", id, pid);
            return Ok(());
        }

        match self.supervisor.kill_pid(pid).await.map_err(|e| with_id(e, id))? {
            PidKill::Killed => tracing::info!("Killed restored tunnel {} (pid {})", id, pid),
            PidKill::NotRunning => {
                tracing::info!("Tunnel {} (pid {}) was not running, forgetting it", id, pid)
            }
        }
        Ok(())
    }

    async fn discard(&self, id: &TunnelId, mut process: Box<dyn TunnelProcess>) {
        if let Err(e) = process.terminate().await {
            tracing::warn!("Failed to clean up tunnel {}: {}", id, e);
        }
        self.supervisor.release(id);
    }
}

/// Records left over from a previous run cannot own the pid of a process we just started
fn evict_same_pid(state: &mut RegistryState, session: &TunnelSession) {
    let Some(pid) = session.pid else {
        return;
    };
    let stale: Vec<_> = state
        .sessions
        .values()
        .filter(|t| t.process.is_none() && t.session.pid == Some(pid))
        .map(|t| t.session.id.clone())
        .collect();
    if stale.is_empty() {
        return;
    }

    for id in &stale {
        tracing::warn!("Dropping tunnel record {}: pid {} now belongs to {}", id, pid, session.id);
        state.sessions.remove(id);
    }
    if let Err(e) = state.store.remove_active_many(&stale) {
        tracing::warn!("Failed to remove outdated tunnel records: {}", e);
    }
}

fn merge_profile(
    existing: Option<SavedConnectionProfile>,
    name: &str,
    spec: &TunnelSpec,
) -> SavedConnectionProfile {
    let fresh = SavedConnectionProfile::for_tunnel(
        &spec.target,
        &spec.bastion,
        spec.local_port,
        spec.remote_port,
    );
    match existing {
        Some(existing) => SavedConnectionProfile {
            name: existing.name,
            username: existing.username,
            auth_type: existing.auth_type,
            last_used: Utc::now(),
            ..fresh
        },
        None => SavedConnectionProfile {
            name: name.to_string(),
            ..fresh
        },
    }
}

fn with_id(error: BastionError, id: &TunnelId) -> BastionError {
    match error {
        BastionError::TerminationFailure { reason, .. } => BastionError::TerminationFailure {
            id: id.to_string(),
            reason,
        },
        other => other,
    }
}
