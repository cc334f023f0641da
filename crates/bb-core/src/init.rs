//! One-time initialization of the shared application context
//!
//! `LazyContext` is built once in `main` and handed to every command by
//! reference. The first `get` verifies the login, opens the store and
//! restores the registry; later calls share the result. A failed
//! initialization is cached too, so every caller sees the same cause.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::error::{BastionError, Result};
use crate::process::{Supervisor, LOG_DIR_NAME};
use crate::registry::Registry;
use crate::store::Store;
use crate::traits::{AuthProvider, Credential, TunnelSupervisor};

/// Everything a command needs once initialization succeeded
pub struct AppContext {
    pub config: AppConfig,
    pub config_dir: PathBuf,
    pub credential: Credential,
    pub registry: Arc<Registry>,
}

type Slot = Option<std::result::Result<Arc<AppContext>, Arc<BastionError>>>;

/// Lazily initialized, exactly-once [`AppContext`]
pub struct LazyContext {
    config_dir: PathBuf,
    config: AppConfig,
    auth: Arc<dyn AuthProvider>,
    supervisor: Arc<dyn TunnelSupervisor>,
    slot: RwLock<Slot>,
}

impl LazyContext {
    pub fn new(
        config_dir: impl Into<PathBuf>,
        config: AppConfig,
        auth: Arc<dyn AuthProvider>,
        supervisor: Arc<dyn TunnelSupervisor>,
    ) -> Self {
        Self {
            config_dir: config_dir.into(),
            config,
            auth,
            supervisor,
            slot: RwLock::new(None),
        }
    }

    /// Use the real process supervisor, logging under `<config_dir>/logs`
    pub fn with_supervisor_defaults(
        config_dir: impl Into<PathBuf>,
        config: AppConfig,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        let config_dir = config_dir.into();
        let supervisor = Arc::new(Supervisor::new(&config, config_dir.join(LOG_DIR_NAME)));
        Self::new(config_dir, config, auth, supervisor)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// The shared context, initializing it on first use
    pub async fn get(&self) -> Result<Arc<AppContext>> {
        if let Some(cached) = self.slot.read().await.as_ref() {
            return unpack(cached);
        }

        let mut slot = self.slot.write().await;
        // Another caller may have finished while we waited for the write lock
        if let Some(cached) = slot.as_ref() {
            return unpack(cached);
        }

        let result = self.initialize().await.map(Arc::new).map_err(Arc::new);
        if let Err(e) = &result {
            tracing::warn!("Initialization failed: {}", e);
        }
        let out = unpack(&result);
        *slot = Some(result);
        out
    }

    /// Shortcut for `get().await?.registry`
    pub async fn registry(&self) -> Result<Arc<Registry>> {
        Ok(self.get().await?.registry.clone())
    }

    pub async fn is_initialized(&self) -> bool {
        self.slot.read().await.is_some()
    }

    async fn initialize(&self) -> Result<AppContext> {
        tracing::debug!("Initializing from {:?}", self.config_dir);
        let credential = self.auth.credential().await?;
        if !credential.user.is_empty() {
            tracing::info!("Logged in as {}", credential.user);
        }

        let store = Store::open(&self.config_dir)?;
        let registry = Registry::open(
            store,
            self.supervisor.clone(),
            self.config.discard_stale_on_restore,
        )
        .await?;

        Ok(AppContext {
            config: self.config.clone(),
            config_dir: self.config_dir.clone(),
            credential,
            registry: Arc::new(registry),
        })
    }
}

fn unpack(
    cached: &std::result::Result<Arc<AppContext>, Arc<BastionError>>,
) -> Result<Arc<AppContext>> {
    match cached {
        Ok(ctx) => Ok(ctx.clone()),
        Err(e) => Err(BastionError::Initialization(e.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, FakeAuth, FakeSupervisor};
    use crate::types::TunnelStatus;
    use tempfile::TempDir;

    fn lazy(dir: &TempDir, auth: Arc<FakeAuth>, supervisor: Arc<FakeSupervisor>) -> LazyContext {
        LazyContext::new(dir.path(), AppConfig::default(), auth, supervisor)
    }

    #[tokio::test]
    async fn test_initializes_once() {
        let dir = TempDir::new().unwrap();
        let auth = Arc::new(FakeAuth::default());
        let ctx = Arc::new(lazy(&dir, auth.clone(), Arc::new(FakeSupervisor::default())));
        assert!(!ctx.is_initialized().await);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ctx = ctx.clone();
                tokio::spawn(async move { ctx.get().await.map(|c| Arc::as_ptr(&c.registry) as usize) })
            })
            .collect();
        let mut pointers = Vec::new();
        for handle in handles {
            pointers.push(handle.await.unwrap().unwrap());
        }

        assert!(pointers.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(*auth.calls.lock().unwrap(), 1);
        assert!(ctx.is_initialized().await);
    }

    #[tokio::test]
    async fn test_failure_is_cached() {
        let dir = TempDir::new().unwrap();
        let auth = Arc::new(FakeAuth {
            logged_out: true,
            ..Default::default()
        });
        let ctx = lazy(&dir, auth.clone(), Arc::new(FakeSupervisor::default()));

        let first = ctx.get().await.err().unwrap();
        let second = ctx.registry().await.err().unwrap();

        assert!(matches!(first, BastionError::Initialization(_)));
        assert!(first.is_auth_required());
        assert!(second.is_auth_required());
        assert_eq!(*auth.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restores_active_records() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = Store::open(dir.path()).unwrap();
            store.save_active(record("live", 6000, Some(4242))).unwrap();
        }
        let supervisor = Arc::new(FakeSupervisor::default());
        supervisor.set_alive(4242, true);
        supervisor.set_listening(6000, true);

        let ctx = lazy(&dir, Arc::new(FakeAuth::default()), supervisor);
        let sessions = ctx.registry().await.unwrap().list().await;

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, TunnelStatus::Restored);
        assert_eq!(ctx.get().await.unwrap().credential.user, "ops@example.com");
    }

    #[tokio::test]
    async fn test_corrupt_store_fails_initialization() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("active.json"), "{not json").unwrap();

        let ctx = lazy(&dir, Arc::new(FakeAuth::default()), Arc::new(FakeSupervisor::default()));
        let err = ctx.get().await.err().unwrap();
        assert!(matches!(err.root(), BastionError::PersistenceFailure { .. }));
    }
}
