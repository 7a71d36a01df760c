//! Read-only view of the machines VirtualBox knows about.
//!
//! Writes never go through here: they are performed by VBoxManage via the
//! controller's `CommandRunner`.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::VkdError;
use crate::runner;

/// One registered virtual machine, as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub name: String,
    pub uuid: Option<String>,
}

impl Machine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: None,
        }
    }
}

#[allow(async_fn_in_trait)] // trait is internal-only
pub trait MachineDirectory {
    /// The host's version string, e.g. `7.0.14r161095`.
    async fn host_version(&self) -> Result<String, VkdError>;

    /// All currently registered machines.
    async fn list(&self) -> Result<Vec<Machine>, VkdError>;

    /// Extra-data value stored under `key`; empty when unset.
    async fn get_config(&self, machine: &Machine, key: &str) -> Result<String, VkdError>;
}

/// Directory backed by `VBoxManage` queries.
#[derive(Debug, Clone)]
pub struct VBoxManageDirectory {
    manage_exe: PathBuf,
    timeout: Duration,
}

impl VBoxManageDirectory {
    pub fn new(manage_exe: PathBuf, timeout: Duration) -> Self {
        Self {
            manage_exe,
            timeout,
        }
    }

    async fn query(&self, args: &[&str]) -> Result<String, VkdError> {
        let output = runner::capture(&self.manage_exe, args, self.timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VkdError::HostUnreachable {
                message: format!(
                    "VBoxManage {} failed: {}",
                    args.first().copied().unwrap_or_default(),
                    stderr.trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl MachineDirectory for VBoxManageDirectory {
    async fn host_version(&self) -> Result<String, VkdError> {
        let stdout = self.query(&["--version"]).await?;
        parse_version_output(&stdout).ok_or_else(|| VkdError::HostUnreachable {
            message: "VBoxManage --version printed nothing".into(),
        })
    }

    async fn list(&self) -> Result<Vec<Machine>, VkdError> {
        let stdout = self.query(&["list", "vms"]).await?;
        let machines = parse_vm_list(&stdout);
        tracing::debug!(count = machines.len(), "listed machines");
        Ok(machines)
    }

    async fn get_config(&self, machine: &Machine, key: &str) -> Result<String, VkdError> {
        let target = machine.uuid.as_deref().unwrap_or(&machine.name);
        let stdout = self.query(&["getextradata", target, key]).await?;
        Ok(parse_extradata(&stdout))
    }
}

// ── output parsing ────────────────────────────────────────

/// Last non-empty line of `--version`; earlier lines are driver warnings.
pub fn parse_version_output(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .map(str::to_string)
}

/// Parse `list vms` lines of the form `"name" {uuid}`.
///
/// Names may themselves contain quotes, so the split is on the last `" {`.
/// Inaccessible machines are skipped.
pub fn parse_vm_list(stdout: &str) -> Vec<Machine> {
    let mut machines = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(rest) = line.strip_prefix('"') else {
            continue;
        };
        let (name, uuid) = match rest.rfind("\" {") {
            Some(i) => {
                let uuid = rest[i + 3..].trim_end_matches('}').to_string();
                (&rest[..i], Some(uuid))
            }
            None => (rest.trim_end_matches('"'), None),
        };
        if name == "<inaccessible>" {
            tracing::warn!(uuid = ?uuid, "skipping inaccessible machine");
            continue;
        }
        machines.push(Machine {
            name: name.to_string(),
            uuid,
        });
    }
    machines
}

/// Parse `getextradata` output: `Value: <v>` or `No value set!`.
pub fn parse_extradata(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|l| l.strip_prefix("Value:"))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_skips_warnings() {
        let out = "WARNING: The vboxdrv kernel module is not loaded.\n\n7.0.14r161095\n";
        assert_eq!(parse_version_output(out).as_deref(), Some("7.0.14r161095"));
        assert_eq!(parse_version_output("\n  \n"), None);
    }

    #[test]
    fn vm_list_parses_names_and_uuids() {
        let out = "\"Windows 10\" {0b0f5a7e-1c2d-4e5f-8a9b-0c1d2e3f4a5b}\n\"VM1\" {11111111-2222-3333-4444-555555555555}\n";
        let machines = parse_vm_list(out);
        assert_eq!(machines.len(), 2);
        assert_eq!(machines[0].name, "Windows 10");
        assert_eq!(
            machines[0].uuid.as_deref(),
            Some("0b0f5a7e-1c2d-4e5f-8a9b-0c1d2e3f4a5b")
        );
        assert_eq!(machines[1].name, "VM1");
    }

    #[test]
    fn vm_list_keeps_quotes_in_names() {
        let machines = parse_vm_list("\"my \"test\" vm\" {abc}\n");
        assert_eq!(machines[0].name, "my \"test\" vm");
        assert_eq!(machines[0].uuid.as_deref(), Some("abc"));
    }

    #[test]
    fn vm_list_skips_inaccessible_and_noise() {
        let out = "\"<inaccessible>\" {dead}\nsome warning\n\n\"ok\" {beef}\n";
        let machines = parse_vm_list(out);
        assert_eq!(machines, vec![Machine {
            name: "ok".into(),
            uuid: Some("beef".into()),
        }]);
    }

    #[test]
    fn extradata_value_is_returned() {
        assert_eq!(
            parse_extradata("Value: C:\\Program Files\\VirtualKD\n"),
            "C:\\Program Files\\VirtualKD"
        );
    }

    #[test]
    fn unset_extradata_is_empty() {
        assert_eq!(parse_extradata("No value set!\n"), "");
        assert_eq!(parse_extradata(""), "");
    }
}
