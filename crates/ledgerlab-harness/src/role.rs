//! Phase driver: Plan, then Execute, then Retro, each at most once

use tracing::{error, info, warn};

use ledgerlab_core::{HarnessError, Result};

use crate::follower::Follower;
use crate::leader::Leader;
use crate::retro::RetroReport;

/// Where a role is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pending,
    Planned,
    Executed,
    Finished,
    Aborted,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Pending => write!(f, "pending"),
            Phase::Planned => write!(f, "planned"),
            Phase::Executed => write!(f, "executed"),
            Phase::Finished => write!(f, "finished"),
            Phase::Aborted => write!(f, "aborted"),
        }
    }
}

/// A participant's role in the run
#[derive(Debug)]
pub enum Role {
    Leader(Leader),
    Follower(Follower),
}

impl Role {
    pub fn name(&self) -> &str {
        match self {
            Role::Leader(leader) => leader.name(),
            Role::Follower(follower) => follower.name(),
        }
    }

    async fn plan(&mut self) -> Result<()> {
        match self {
            Role::Leader(leader) => leader.plan().await,
            Role::Follower(follower) => follower.plan().await,
        }
    }

    async fn execute(&mut self) -> Result<()> {
        match self {
            Role::Leader(leader) => leader.execute().await,
            Role::Follower(follower) => follower.execute().await,
        }
    }

    /// Only the leader scans the chain
    async fn retro(&mut self) -> Result<Option<RetroReport>> {
        match self {
            Role::Leader(leader) => leader.retro().await.map(Some),
            Role::Follower(follower) => follower.retro().await.map(|_| None),
        }
    }

    async fn abort(&mut self) {
        match self {
            Role::Leader(leader) => leader.abort().await,
            Role::Follower(follower) => follower.abort().await,
        }
    }
}

/// Drives a role through its phases and rejects out-of-order calls
#[derive(Debug)]
pub struct PhaseDriver {
    role: Role,
    phase: Phase,
}

impl PhaseDriver {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            phase: Phase::Pending,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn into_role(self) -> Role {
        self.role
    }

    pub async fn plan(&mut self) -> Result<()> {
        self.expect(Phase::Pending, "plan")?;
        info!(participant = %self.role.name(), "Plan phase");
        match self.role.plan().await {
            Ok(()) => {
                self.phase = Phase::Planned;
                Ok(())
            }
            Err(e) => {
                error!(participant = %self.role.name(), "Plan failed: {}", e);
                self.role.abort().await;
                self.phase = Phase::Aborted;
                Err(e)
            }
        }
    }

    /// The phase advances even when execution fails so that Retro can run
    pub async fn execute(&mut self) -> Result<()> {
        self.expect(Phase::Planned, "execute")?;
        info!(participant = %self.role.name(), "Execute phase");
        let result = self.role.execute().await;
        self.phase = Phase::Executed;
        result
    }

    pub async fn retro(&mut self) -> Result<Option<RetroReport>> {
        self.expect(Phase::Executed, "retro")?;
        info!(participant = %self.role.name(), "Retro phase");
        let result = self.role.retro().await;
        self.phase = Phase::Finished;
        result
    }

    fn expect(&self, phase: Phase, operation: &str) -> Result<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(HarnessError::Phase(format!(
                "cannot {} {} while {}",
                operation,
                self.role.name(),
                self.phase
            )))
        }
    }
}

/// What a completed run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub participant: String,
    pub execute: Result<()>,
    pub retro: Result<Option<RetroReport>>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.execute.is_ok() && self.retro.is_ok()
    }
}

/// Run a role through Plan, Execute and Retro
///
/// A Plan failure is returned directly after the role is torn down. Once
/// Plan succeeds, Retro always runs and both results are reported.
pub async fn run(role: Role) -> Result<RunOutcome> {
    let mut driver = PhaseDriver::new(role);
    driver.plan().await?;

    let execute = driver.execute().await;
    if let Err(e) = &execute {
        warn!(participant = %driver.role().name(), "Execute failed: {}", e);
    }
    let retro = driver.retro().await;

    Ok(RunOutcome {
        participant: driver.role().name().to_string(),
        execute,
        retro,
    })
}
