//! In-memory fakes for registry and initializer tests

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::BastionError;
use crate::traits::{AuthProvider, Credential, PidKill, TunnelProcess, TunnelSupervisor};
use crate::types::{ActiveTunnelRecord, BastionHost, TargetResource, TunnelId, TunnelSpec};

pub fn spec(resource: &str, local_port: u16) -> TunnelSpec {
    TunnelSpec {
        target: TargetResource {
            id: format!("/subscriptions/sub/virtualMachines/{}", resource),
            name: resource.to_string(),
            subscription_id: "sub".to_string(),
        },
        bastion: BastionHost {
            name: "hub-bastion".to_string(),
            resource_group: "rg-hub".to_string(),
            subscription_id: "hub".to_string(),
        },
        local_port,
        remote_port: 22,
    }
}

pub fn record(id: &str, local_port: u16, pid: Option<u32>) -> ActiveTunnelRecord {
    let spec = spec("vm-restored", local_port);
    ActiveTunnelRecord {
        id: TunnelId::from(id),
        local_port,
        remote_port: spec.remote_port,
        resource_id: spec.target.id,
        resource_name: spec.target.name,
        subscription_id: spec.target.subscription_id,
        bastion_name: spec.bastion.name,
        bastion_resource_group: spec.bastion.resource_group,
        bastion_subscription_id: spec.bastion.subscription_id,
        start_time: Utc::now(),
        status: "running".to_string(),
        pid,
    }
}

#[derive(Default)]
struct FakeState {
    next_pid: u32,
    launched: usize,
    terminated: usize,
    stick_new: bool,
    stuck: HashSet<u32>,
    alive: HashSet<u32>,
    listening: HashSet<u16>,
    killed: Vec<u32>,
    released: Vec<TunnelId>,
    fail_verification: bool,
}

/// Supervisor that hands out fake processes with pids from 1000 upwards
#[derive(Clone, Default)]
pub struct FakeSupervisor {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSupervisor {
    pub fn fail_next_verification(&self) {
        self.state.lock().unwrap().fail_verification = true;
    }

    /// Processes launched from now on refuse to terminate
    pub fn refuse_termination(&self, refuse: bool) {
        self.state.lock().unwrap().stick_new = refuse;
    }

    /// Let every stuck process terminate again
    pub fn release_stuck(&self) {
        self.state.lock().unwrap().stuck.clear();
    }

    pub fn set_alive(&self, pid: u32, alive: bool) {
        let mut state = self.state.lock().unwrap();
        if alive {
            state.alive.insert(pid);
        } else {
            state.alive.remove(&pid);
        }
    }

    pub fn set_listening(&self, port: u16, listening: bool) {
        let mut state = self.state.lock().unwrap();
        if listening {
            state.listening.insert(port);
        } else {
            state.listening.remove(&port);
        }
    }

    pub fn launched(&self) -> usize {
        self.state.lock().unwrap().launched
    }

    /// Successful terminations of launched processes
    pub fn terminated(&self) -> usize {
        self.state.lock().unwrap().terminated
    }

    pub fn killed_pids(&self) -> Vec<u32> {
        self.state.lock().unwrap().killed.clone()
    }

    pub fn released(&self) -> Vec<TunnelId> {
        self.state.lock().unwrap().released.clone()
    }
}

struct FakeProcess {
    pid: u32,
    exited: bool,
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl TunnelProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn has_exited(&mut self) -> bool {
        self.exited
    }

    fn output(&self) -> String {
        format!("fake tunnel {}\n", self.pid)
    }

    async fn terminate(&mut self) -> Result<(), BastionError> {
        let mut state = self.state.lock().unwrap();
        if state.stuck.contains(&self.pid) {
            return Err(BastionError::TerminationFailure {
                id: format!("pid {}", self.pid),
                reason: "operation not permitted".to_string(),
            });
        }
        state.terminated += 1;
        state.alive.remove(&self.pid);
        self.exited = true;
        Ok(())
    }
}

#[async_trait]
impl TunnelSupervisor for FakeSupervisor {
    async fn launch(
        &self,
        _id: &TunnelId,
        _spec: &TunnelSpec,
    ) -> Result<Box<dyn TunnelProcess>, BastionError> {
        let mut state = self.state.lock().unwrap();
        let pid = 1000 + state.next_pid;
        state.next_pid += 1;
        state.launched += 1;
        state.alive.insert(pid);
        if state.stick_new {
            state.stuck.insert(pid);
        }
        Ok(Box::new(FakeProcess {
            pid,
            exited: false,
            state: self.state.clone(),
        }))
    }

    async fn verify_listening(
        &self,
        process: &mut dyn TunnelProcess,
        local_port: u16,
    ) -> Result<(), BastionError> {
        let fail = std::mem::take(&mut self.state.lock().unwrap().fail_verification);
        if fail {
            return Err(BastionError::StartupFailure {
                port: local_port,
                reason: "tunnel process exited immediately".to_string(),
                output: process.output(),
            });
        }
        Ok(())
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().unwrap().alive.contains(&pid)
    }

    async fn is_listening(&self, local_port: u16) -> bool {
        self.state.lock().unwrap().listening.contains(&local_port)
    }

    async fn kill_pid(&self, pid: u32) -> Result<PidKill, BastionError> {
        let mut state = self.state.lock().unwrap();
        if !state.alive.remove(&pid) {
            return Ok(PidKill::NotRunning);
        }
        state.killed.push(pid);
        Ok(PidKill::Killed)
    }

    fn release(&self, id: &TunnelId) {
        self.state.lock().unwrap().released.push(id.clone());
    }
}

/// Auth provider that counts calls and can be told to fail
#[derive(Default)]
pub struct FakeAuth {
    pub calls: Mutex<usize>,
    pub logged_out: bool,
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn credential(&self) -> Result<Credential, BastionError> {
        *self.calls.lock().unwrap() += 1;
        if self.logged_out {
            return Err(BastionError::AuthRequired("run az login".to_string()));
        }
        Ok(Credential {
            subscription_id: "sub".to_string(),
            tenant_id: "tenant".to_string(),
            user: "ops@example.com".to_string(),
        })
    }
}
