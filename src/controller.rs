//! Per-machine VirtualKD integration status and the enable/disable toggle.
//!
//! Status is never stored: every read goes back to the machine's extra data.
//! Mutations go through VBoxManage, only while no VirtualBox process is
//! running, and are followed by a fresh read plus a notification so views
//! re-query instead of trusting what they showed before.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::access::PayloadAccess;
use crate::config::Settings;
use crate::directory::{Machine, MachineDirectory};
use crate::error::VkdError;
use crate::guard::PreconditionGuard;
use crate::host;
use crate::runner::{CommandRunner, RunOutcome};

// ── Types ───────────────────────────────────────────────────────────

/// What the controller needs to build and run a toggle command.
#[derive(Debug, Clone)]
pub struct ToggleSettings {
    pub manage_exe: PathBuf,
    pub payload_dir: PathBuf,
    pub config_key: String,
    pub timeout: Duration,
}

impl ToggleSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            manage_exe: settings.manage_exe.clone(),
            payload_dir: settings.payload_dir.clone(),
            config_key: settings.config_key.clone(),
            timeout: settings.timeout,
        }
    }

    pub fn payload_path(&self) -> String {
        self.payload_dir.to_string_lossy().into_owned()
    }
}

/// Derived integration status of one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationStatus {
    /// The key is unset or empty.
    Disabled,
    /// The key holds exactly this installation's payload path.
    Enabled,
    /// The key points at some other payload directory. Counts as not
    /// integrated: Enable re-points it, Disable is refused.
    EnabledElsewhere { path: String },
}

impl IntegrationStatus {
    /// Plain string equality against the payload path, no normalization.
    pub fn derive(value: &str, payload_path: &str) -> Self {
        if value.is_empty() {
            IntegrationStatus::Disabled
        } else if value == payload_path {
            IntegrationStatus::Enabled
        } else {
            IntegrationStatus::EnabledElsewhere {
                path: value.to_string(),
            }
        }
    }

    pub fn is_integrated(&self) -> bool {
        matches!(self, IntegrationStatus::Enabled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            IntegrationStatus::Disabled => "Disabled",
            IntegrationStatus::Enabled => "Enabled",
            IntegrationStatus::EnabledElsewhere { .. } => "Enabled elsewhere",
        }
    }
}

impl fmt::Display for IntegrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrationStatus::EnabledElsewhere { path } => write!(f, "{} ({path})", self.label()),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Enable,
    Disable,
}

impl Action {
    /// An action is permitted only when it would change the status.
    pub fn permitted(self, status: &IntegrationStatus) -> bool {
        match self {
            Action::Enable => !status.is_integrated(),
            Action::Disable => status.is_integrated(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Enable => "enable",
            Action::Disable => "disable",
        })
    }
}

/// A machine tracked for one refresh cycle. Holds no status of its own.
#[derive(Debug)]
pub struct IntegrationEntry {
    machine: Machine,
}

impl IntegrationEntry {
    pub(crate) fn new(machine: Machine) -> Self {
        Self { machine }
    }

    pub fn name(&self) -> &str {
        &self.machine.name
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }
}

/// Signals to views that something they display may be stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The whole entry set was rebuilt.
    ListReplaced { count: usize },
    /// Status and permitted actions of one machine must be re-queried.
    EntryInvalidated { machine: String },
}

/// Arguments for `VBoxManage`; omitting the path clears the key.
pub fn setextradata_args(machine: &str, key: &str, payload_path: Option<&str>) -> Vec<String> {
    let mut args = vec!["setextradata".to_string(), machine.to_string(), key.to_string()];
    if let Some(path) = payload_path {
        args.push(path.to_string());
    }
    args
}

// ── Controller ──────────────────────────────────────────────────────

pub struct IntegrationController<D, G, R, P> {
    directory: D,
    guard: G,
    runner: R,
    access: P,
    settings: ToggleSettings,
    host_version: String,
    entries: Vec<Arc<IntegrationEntry>>,
    notify: broadcast::Sender<Notification>,
}

impl<D, G, R, P> IntegrationController<D, G, R, P>
where
    D: MachineDirectory,
    G: PreconditionGuard,
    R: CommandRunner,
    P: PayloadAccess,
{
    /// Check the host version once and build a controller with no entries.
    /// Hosts older than `min_major_version` end the session here.
    pub async fn start(
        directory: D,
        guard: G,
        runner: R,
        access: P,
        settings: ToggleSettings,
        min_major_version: u32,
    ) -> Result<Self, VkdError> {
        let host_version = directory.host_version().await?;
        let major = host::check_version(&host_version, min_major_version)?;
        tracing::info!(version = %host_version, major, "VirtualBox host accepted");

        let (notify, _) = broadcast::channel(64);
        Ok(Self {
            directory,
            guard,
            runner,
            access,
            settings,
            host_version,
            entries: Vec::new(),
            notify,
        })
    }

    pub fn host_version(&self) -> &str {
        &self.host_version
    }

    pub fn settings(&self) -> &ToggleSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notify.subscribe()
    }

    pub fn entries(&self) -> &[Arc<IntegrationEntry>] {
        &self.entries
    }

    pub fn find(&self, name: &str) -> Option<Arc<IntegrationEntry>> {
        self.entries.iter().find(|e| e.name() == name).cloned()
    }

    /// Replace the entry set with one fresh entry per registered machine.
    ///
    /// On failure the previous set is kept so the caller can retry.
    pub async fn refresh(&mut self) -> Result<usize, VkdError> {
        let machines = self.directory.list().await?;
        self.entries = machines
            .into_iter()
            .map(|machine| Arc::new(IntegrationEntry::new(machine)))
            .collect();

        let count = self.entries.len();
        tracing::debug!(count, "machine list replaced");
        let _ = self.notify.send(Notification::ListReplaced { count });
        Ok(count)
    }

    pub async fn status(&self, entry: &IntegrationEntry) -> Result<IntegrationStatus, VkdError> {
        let value = self
            .directory
            .get_config(entry.machine(), &self.settings.config_key)
            .await?;
        Ok(IntegrationStatus::derive(&value, &self.settings.payload_path()))
    }

    pub async fn is_integrated(&self, entry: &IntegrationEntry) -> Result<bool, VkdError> {
        Ok(self.status(entry).await?.is_integrated())
    }

    pub async fn can_enable(&self, entry: &IntegrationEntry) -> Result<bool, VkdError> {
        Ok(Action::Enable.permitted(&self.status(entry).await?))
    }

    pub async fn can_disable(&self, entry: &IntegrationEntry) -> Result<bool, VkdError> {
        Ok(Action::Disable.permitted(&self.status(entry).await?))
    }

    pub async fn enable(&self, entry: &IntegrationEntry) -> Result<IntegrationStatus, VkdError> {
        self.toggle(entry, Action::Enable).await
    }

    pub async fn disable(&self, entry: &IntegrationEntry) -> Result<IntegrationStatus, VkdError> {
        self.toggle(entry, Action::Disable).await
    }

    /// Run one toggle. Returns the freshly re-read status on success.
    pub async fn toggle(
        &self,
        entry: &IntegrationEntry,
        action: Action,
    ) -> Result<IntegrationStatus, VkdError> {
        let machine = entry.name();
        let before = self.status(entry).await?;
        if !action.permitted(&before) {
            return Err(VkdError::ActionNotPermitted {
                machine: machine.to_string(),
                action: action.to_string(),
            });
        }

        if self.guard.is_host_running() {
            tracing::warn!(machine, %action, "refused: VirtualBox is running");
            self.invalidate(entry);
            return Err(VkdError::HostRunning);
        }

        let outcome = self.apply(entry, action).await;

        // Whatever happened, the store is the source of truth.
        let after = self.status(entry).await;
        self.invalidate(entry);

        let outcome = outcome?;
        let after = after?;
        tracing::info!(machine, %action, ?outcome, status = %after, "toggle finished");

        match outcome {
            RunOutcome::Exited(0) => Ok(after),
            RunOutcome::Exited(code) => Err(VkdError::CommandFailed {
                machine: machine.to_string(),
                code,
            }),
            RunOutcome::TimedOut => Err(VkdError::CommandTimeout {
                machine: machine.to_string(),
                seconds: self.settings.timeout.as_secs(),
            }),
        }
    }

    async fn apply(&self, entry: &IntegrationEntry, action: Action) -> Result<RunOutcome, VkdError> {
        let payload = match action {
            Action::Enable => {
                self.access.ensure_readable(&self.settings.payload_dir)?;
                Some(self.settings.payload_path())
            }
            Action::Disable => None,
        };
        let args = setextradata_args(entry.name(), &self.settings.config_key, payload.as_deref());
        tracing::info!(machine = entry.name(), %action, ?args, "running VBoxManage");
        self.runner
            .run(&self.settings.manage_exe, &args, self.settings.timeout)
            .await
    }

    fn invalidate(&self, entry: &IntegrationEntry) {
        let _ = self.notify.send(Notification::EntryInvalidated {
            machine: entry.name().to_string(),
        });
    }
}
