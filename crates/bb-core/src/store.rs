//! File-backed store of saved profiles and active tunnel records
//!
//! One JSON file per partition lives in the config directory:
//!
//! | partition      | file           |
//! |----------------|----------------|
//! | tunnel profiles | `tunnels.json` |
//! | ssh profiles    | `ssh.json`     |
//! | rdp profiles    | `rdp.json`     |
//! | active tunnels  | `active.json`  |
//!
//! Every mutation rewrites the whole partition through a temp file and a
//! rename, so a crash mid-write leaves the previous contents intact. The
//! in-memory copy is only updated once the write has succeeded.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{BastionError, Result};
use crate::types::{ActiveTunnelRecord, ConnectionKind, SavedConnectionProfile, TunnelId};

/// A single file in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Profiles(ConnectionKind),
    Active,
}

impl Partition {
    pub fn file_name(&self) -> &'static str {
        match self {
            Partition::Profiles(ConnectionKind::Tunnel) => "tunnels.json",
            Partition::Profiles(ConnectionKind::Ssh) => "ssh.json",
            Partition::Profiles(ConnectionKind::Rdp) => "rdp.json",
            Partition::Active => "active.json",
        }
    }
}

/// Durable, partitioned storage for profiles and active records
#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    tunnels: Vec<SavedConnectionProfile>,
    ssh: Vec<SavedConnectionProfile>,
    rdp: Vec<SavedConnectionProfile>,
    active: Vec<ActiveTunnelRecord>,
}

impl Store {
    /// Open the store in `dir`, creating the directory if needed, and load every partition
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| BastionError::persistence("create", &dir, e))?;

        let mut store = Self {
            dir,
            tunnels: Vec::new(),
            ssh: Vec::new(),
            rdp: Vec::new(),
            active: Vec::new(),
        };
        store.load_all()?;
        Ok(store)
    }

    /// Directory holding the partition files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a partition file
    pub fn path(&self, partition: Partition) -> PathBuf {
        self.dir.join(partition.file_name())
    }

    /// Read every partition from disk, replacing the in-memory copy
    ///
    /// Missing files are empty partitions; malformed files are an error.
    pub fn load_all(&mut self) -> Result<()> {
        let tunnels = read_partition(&self.path(Partition::Profiles(ConnectionKind::Tunnel)))?;
        let ssh = read_partition(&self.path(Partition::Profiles(ConnectionKind::Ssh)))?;
        let rdp = read_partition(&self.path(Partition::Profiles(ConnectionKind::Rdp)))?;
        let active = read_partition(&self.path(Partition::Active))?;

        self.tunnels = tunnels;
        self.ssh = ssh;
        self.rdp = rdp;
        self.active = active;

        tracing::debug!(
            "Loaded store from {:?}: {} tunnel, {} ssh, {} rdp profiles, {} active",
            self.dir,
            self.tunnels.len(),
            self.ssh.len(),
            self.rdp.len(),
            self.active.len()
        );
        Ok(())
    }

    /// Insert or replace (by name) a profile in its kind's partition
    pub fn save_profile(&mut self, profile: SavedConnectionProfile) -> Result<()> {
        let kind = profile.kind();
        let mut updated = self.profiles(kind).to_vec();
        match updated.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => updated.push(profile),
        }

        write_partition(&self.path(Partition::Profiles(kind)), &updated)?;
        *self.profiles_mut(kind) = updated;
        Ok(())
    }

    /// All profiles, or only those of `kind`
    pub fn list_profiles(&self, kind: Option<ConnectionKind>) -> Vec<SavedConnectionProfile> {
        match kind {
            Some(kind) => self.profiles(kind).to_vec(),
            None => ConnectionKind::ALL
                .iter()
                .flat_map(|k| self.profiles(*k).iter().cloned())
                .collect(),
        }
    }

    /// Find a profile by name, optionally restricted to one kind
    pub fn find_profile(
        &self,
        name: &str,
        kind: Option<ConnectionKind>,
    ) -> Option<&SavedConnectionProfile> {
        let kinds: &[ConnectionKind] = match kind {
            Some(ref k) => std::slice::from_ref(k),
            None => &ConnectionKind::ALL,
        };
        kinds
            .iter()
            .flat_map(|k| self.profiles(*k).iter())
            .find(|p| p.name == name)
    }

    /// Append an active record
    pub fn save_active(&mut self, record: ActiveTunnelRecord) -> Result<()> {
        let mut updated = self.active.clone();
        updated.push(record);

        write_partition(&self.path(Partition::Active), &updated)?;
        self.active = updated;
        Ok(())
    }

    /// Remove an active record by id
    ///
    /// Returns whether a record was removed; an unknown id is a no-op.
    pub fn remove_active(&mut self, id: &TunnelId) -> Result<bool> {
        if !self.active.iter().any(|r| &r.id == id) {
            return Ok(false);
        }

        let updated: Vec<_> = self.active.iter().filter(|r| &r.id != id).cloned().collect();
        write_partition(&self.path(Partition::Active), &updated)?;
        self.active = updated;
        Ok(true)
    }

    /// Remove every active record whose id is in `ids` with a single rewrite
    pub fn remove_active_many(&mut self, ids: &[TunnelId]) -> Result<usize> {
        let updated: Vec<_> = self
            .active
            .iter()
            .filter(|r| !ids.contains(&r.id))
            .cloned()
            .collect();
        let removed = self.active.len() - updated.len();
        if removed == 0 {
            return Ok(0);
        }

        write_partition(&self.path(Partition::Active), &updated)?;
        self.active = updated;
        Ok(removed)
    }

    /// All persisted active records
    pub fn list_active(&self) -> &[ActiveTunnelRecord] {
        &self.active
    }

    fn profiles(&self, kind: ConnectionKind) -> &[SavedConnectionProfile] {
        match kind {
            ConnectionKind::Tunnel => &self.tunnels,
            ConnectionKind::Ssh => &self.ssh,
            ConnectionKind::Rdp => &self.rdp,
        }
    }

    fn profiles_mut(&mut self, kind: ConnectionKind) -> &mut Vec<SavedConnectionProfile> {
        match kind {
            ConnectionKind::Tunnel => &mut self.tunnels,
            ConnectionKind::Ssh => &mut self.ssh,
            ConnectionKind::Rdp => &mut self.rdp,
        }
    }
}

fn read_partition<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(BastionError::persistence("read", path, e)),
    };

    serde_json::from_slice(&data)
        .map_err(|e| BastionError::persistence("parse", path, io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn write_partition<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let json = serde_json::to_vec_pretty(items)
        .map_err(|e| BastionError::persistence("serialize", path, io::Error::new(io::ErrorKind::InvalidData, e)))?;

    write_atomic(path, &json).map_err(|e| BastionError::persistence("write", path, e))?;
    tracing::debug!("Wrote {} record(s) to {:?}", items.len(), path);
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)
}
