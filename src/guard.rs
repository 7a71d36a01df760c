//! The "no VirtualBox running" precondition for configuration changes.

use sysinfo::{ProcessesToUpdate, System};

/// Executables whose presence means VirtualBox may hold machine settings open.
pub const HOST_PROCESS_FAMILY: &[&str] = &["VirtualBox", "VirtualBoxVM", "VBoxHeadless", "VBoxSDL"];

pub trait PreconditionGuard {
    /// Whether any process of the host family is running right now.
    fn is_host_running(&self) -> bool;
}

/// Checks the live process table on every call.
#[derive(Debug, Clone)]
pub struct ProcessGuard {
    family: Vec<String>,
}

impl ProcessGuard {
    pub fn new(family: Vec<String>) -> Self {
        Self { family }
    }
}

impl PreconditionGuard for ProcessGuard {
    fn is_host_running(&self) -> bool {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let found = system.processes().values().find(|process| {
            let name = process.name().to_string_lossy();
            belongs_to_family(&name, &self.family)
        });

        match found {
            Some(process) => {
                tracing::debug!(
                    pid = process.pid().as_u32(),
                    name = %process.name().to_string_lossy(),
                    "VirtualBox process is running"
                );
                true
            }
            None => false,
        }
    }
}

/// Case-insensitive match of a process name against the family, ignoring a
/// trailing `.exe`.
pub fn belongs_to_family(process_name: &str, family: &[String]) -> bool {
    let lower = process_name.to_ascii_lowercase();
    let stem = lower.strip_suffix(".exe").unwrap_or(&lower);
    family.iter().any(|member| member.eq_ignore_ascii_case(stem))
}
