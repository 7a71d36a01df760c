//! Machine list rendering and the interactive picker.
//!
//! The view never trusts what it rendered before: it keeps a row cache that
//! is rebuilt from the controller whenever a notification says it is stale.

use std::io::IsTerminal;
use std::path::Path;

use facet::Facet;
use inquire::Select;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::access::PayloadAccess;
use crate::controller::{Action, IntegrationController, IntegrationEntry, IntegrationStatus, Notification};
use crate::directory::MachineDirectory;
use crate::error::VkdError;
use crate::guard::PreconditionGuard;
use crate::host;
use crate::progress::{ActionProgress, OutputMode};
use crate::runner::CommandRunner;

/// One rendered line of the machine list.
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct MachineRow {
    pub name: String,
    pub uuid: Option<String>,
    pub status: String,
    pub integrated: bool,
    pub can_enable: bool,
    pub can_disable: bool,
    pub configured_path: Option<String>,
}

impl MachineRow {
    /// Predicates come from the same single read as the status.
    pub fn new(entry: &IntegrationEntry, status: &IntegrationStatus, payload_path: &str) -> Self {
        let configured_path = match status {
            IntegrationStatus::Disabled => None,
            IntegrationStatus::Enabled => Some(payload_path.to_string()),
            IntegrationStatus::EnabledElsewhere { path } => Some(path.clone()),
        };
        Self {
            name: entry.name().to_string(),
            uuid: entry.machine().uuid.clone(),
            status: status.label().to_string(),
            integrated: status.is_integrated(),
            can_enable: Action::Enable.permitted(status),
            can_disable: Action::Disable.permitted(status),
            configured_path,
        }
    }
}

pub async fn row_for<D, G, R, P>(
    controller: &IntegrationController<D, G, R, P>,
    entry: &IntegrationEntry,
) -> Result<MachineRow, VkdError>
where
    D: MachineDirectory,
    G: PreconditionGuard,
    R: CommandRunner,
    P: PayloadAccess,
{
    let status = controller.status(entry).await?;
    Ok(MachineRow::new(
        entry,
        &status,
        &controller.settings().payload_path(),
    ))
}

pub async fn snapshot<D, G, R, P>(
    controller: &IntegrationController<D, G, R, P>,
) -> Result<Vec<MachineRow>, VkdError>
where
    D: MachineDirectory,
    G: PreconditionGuard,
    R: CommandRunner,
    P: PayloadAccess,
{
    let mut rows = Vec::with_capacity(controller.entries().len());
    for entry in controller.entries() {
        rows.push(row_for(controller, entry).await?);
    }
    Ok(rows)
}

// ── rendering ────────────────────────────────────────────

pub fn render_plain(rows: &[MachineRow], color: bool) -> String {
    if rows.is_empty() {
        return "No virtual machines registered.\n".to_string();
    }

    let width = rows.iter().map(|r| r.name.chars().count()).max().unwrap_or(0).max(4);
    let mut out = format!("{:<width$}  STATUS\n", "NAME");
    for row in rows {
        let status = match (&row.configured_path, row.integrated) {
            (Some(path), false) => format!("{} ({path})", row.status),
            _ => row.status.clone(),
        };
        let status = if !color {
            status
        } else if row.integrated {
            console::style(status).green().to_string()
        } else if row.configured_path.is_some() {
            console::style(status).yellow().to_string()
        } else {
            console::style(status).dim().to_string()
        };
        out.push_str(&format!("{:<width$}  {status}\n", row.name));
    }
    out
}

pub fn render_json(rows: &[MachineRow]) -> Result<String, VkdError> {
    let rows = rows.to_vec();
    facet_json::to_string(&rows).map_err(|e| VkdError::Render {
        message: e.to_string(),
    })
}

fn choice_label(row: &MachineRow) -> String {
    format!("{}  [{}]", row.name, row.status)
}

// ── notifications ────────────────────────────────────────

/// Log every notification until the controller goes away.
pub async fn watch_notifications(mut rx: broadcast::Receiver<Notification>) {
    loop {
        match rx.recv().await {
            Ok(Notification::ListReplaced { count }) => {
                tracing::debug!(count, "machine list replaced");
            }
            Ok(Notification::EntryInvalidated { machine }) => {
                tracing::debug!(machine = %machine, "machine status invalidated");
            }
            Err(RecvError::Lagged(n)) => {
                tracing::warn!("notification watcher lagged, missed {n} notifications");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Rebuild stale rows. Returns the number of notifications handled.
async fn apply_notifications<D, G, R, P>(
    controller: &IntegrationController<D, G, R, P>,
    rx: &mut broadcast::Receiver<Notification>,
    rows: &mut Vec<MachineRow>,
) -> Result<usize, VkdError>
where
    D: MachineDirectory,
    G: PreconditionGuard,
    R: CommandRunner,
    P: PayloadAccess,
{
    let mut handled = 0;
    loop {
        match rx.try_recv() {
            Ok(Notification::EntryInvalidated { machine }) => {
                let fresh = match controller.find(&machine) {
                    Some(entry) => Some(row_for(controller, &entry).await?),
                    None => None,
                };
                let position = rows.iter().position(|r| r.name == machine);
                match (position, fresh) {
                    (Some(i), Some(row)) => rows[i] = row,
                    _ => *rows = snapshot(controller).await?,
                }
            }
            Ok(Notification::ListReplaced { .. }) | Err(TryRecvError::Lagged(_)) => {
                *rows = snapshot(controller).await?;
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
        handled += 1;
    }
    Ok(handled)
}

// ── interactive picker ───────────────────────────────────

const REFRESH: &str = "\u{21bb} Refresh";
const LAUNCH: &str = "\u{25b6} Launch VirtualBox";
const QUIT: &str = "Quit";
const BACK: &str = "Back";

fn map_inquire_err(e: inquire::InquireError) -> VkdError {
    match e {
        inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted => {
            VkdError::Cancelled
        }
        other => VkdError::Prompt {
            message: other.to_string(),
        },
    }
}

/// Pick a machine, pick a permitted action, repeat until the user quits.
/// Action failures are printed and the loop continues.
pub async fn interactive<D, G, R, P>(
    controller: &mut IntegrationController<D, G, R, P>,
    install_dir: &Path,
    mode: OutputMode,
) -> Result<(), VkdError>
where
    D: MachineDirectory,
    G: PreconditionGuard,
    R: CommandRunner,
    P: PayloadAccess,
{
    if !std::io::stdin().is_terminal() || !std::io::stdout().is_terminal() {
        return Err(VkdError::Validation {
            message: "`select` needs an interactive terminal; use enable/disable instead".into(),
        });
    }

    let mut rx = controller.subscribe();
    let mut rows = snapshot(controller).await?;
    let progress = ActionProgress::new(mode);

    println!("VirtualBox {}", controller.host_version());
    loop {
        match apply_notifications(controller, &mut rx, &mut rows).await {
            Ok(0) => {}
            Ok(handled) => tracing::debug!(handled, "re-queried stale rows"),
            Err(e) => eprintln!("{e}"),
        }

        let mut choices: Vec<String> = rows.iter().map(choice_label).collect();
        let machine_count = choices.len();
        choices.extend([REFRESH, LAUNCH, QUIT].map(String::from));

        let picked = match Select::new("Select a virtual machine:", choices)
            .with_help_message("Use ↑↓ to navigate, type to filter, Esc to quit")
            .raw_prompt()
        {
            Ok(picked) => picked,
            Err(e) => match map_inquire_err(e) {
                VkdError::Cancelled => return Ok(()),
                other => return Err(other),
            },
        };

        if picked.index < machine_count {
            let row = rows[picked.index].clone();
            if let Err(e) = pick_action(controller, &row, &progress).await {
                if e.is_fatal() {
                    return Err(e);
                }
                eprintln!("{e}");
            }
            continue;
        }

        match picked.value.as_str() {
            REFRESH => {
                if let Err(e) = controller.refresh().await {
                    eprintln!("{e}");
                }
            }
            LAUNCH => {
                if let Err(e) = host::launch_gui(install_dir) {
                    eprintln!("{e}");
                }
            }
            _ => return Ok(()),
        }
    }
}

async fn pick_action<D, G, R, P>(
    controller: &IntegrationController<D, G, R, P>,
    row: &MachineRow,
    progress: &ActionProgress,
) -> Result<(), VkdError>
where
    D: MachineDirectory,
    G: PreconditionGuard,
    R: CommandRunner,
    P: PayloadAccess,
{
    let mut actions = Vec::new();
    if row.can_enable {
        actions.push(Action::Enable);
    }
    if row.can_disable {
        actions.push(Action::Disable);
    }
    let mut labels: Vec<String> = actions
        .iter()
        .map(|a| match a {
            Action::Enable => "Enable VirtualKD".to_string(),
            Action::Disable => "Disable VirtualKD".to_string(),
        })
        .collect();
    labels.push(BACK.to_string());

    let prompt = format!("{} is {}:", row.name, row.status);
    let picked = match Select::new(&prompt, labels).raw_prompt() {
        Ok(picked) => picked,
        Err(e) => match map_inquire_err(e) {
            VkdError::Cancelled => return Ok(()),
            other => return Err(other),
        },
    };
    let Some(&action) = actions.get(picked.index) else {
        return Ok(());
    };

    let entry = controller
        .find(&row.name)
        .ok_or_else(|| VkdError::MachineNotFound {
            name: row.name.clone(),
        })?;
    let label = format!("{action} {}", row.name);
    let status = progress.run(&label, controller.toggle(&entry, action)).await?;
    println!("{}: {status}", row.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Machine;

    fn row(name: &str, status: IntegrationStatus) -> MachineRow {
        let entry = IntegrationEntry::new(Machine::new(name));
        MachineRow::new(&entry, &status, "/opt/virtualkd")
    }

    #[test]
    fn row_predicates_follow_status() {
        let off = row("VM1", IntegrationStatus::Disabled);
        assert!(off.can_enable && !off.can_disable && !off.integrated);
        assert_eq!(off.configured_path, None);

        let on = row("VM1", IntegrationStatus::Enabled);
        assert!(!on.can_enable && on.can_disable && on.integrated);
        assert_eq!(on.configured_path.as_deref(), Some("/opt/virtualkd"));

        let other = row(
            "VM1",
            IntegrationStatus::EnabledElsewhere {
                path: "/old".into(),
            },
        );
        assert!(other.can_enable && !other.can_disable && !other.integrated);
        assert_eq!(other.configured_path.as_deref(), Some("/old"));
    }

    #[test]
    fn plain_rendering_aligns_columns() {
        let rows = vec![
            row("VM1", IntegrationStatus::Enabled),
            row("Windows 10", IntegrationStatus::Disabled),
        ];
        let out = render_plain(&rows, false);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "NAME        STATUS");
        assert_eq!(lines[1], "VM1         Enabled");
        assert_eq!(lines[2], "Windows 10  Disabled");
    }

    #[test]
    fn plain_rendering_shows_foreign_path() {
        let rows = vec![row(
            "VM1",
            IntegrationStatus::EnabledElsewhere {
                path: "C:\\old".into(),
            },
        )];
        assert!(render_plain(&rows, false).contains("Enabled elsewhere (C:\\old)"));
    }

    #[test]
    fn empty_list_renders_message() {
        assert_eq!(render_plain(&[], false), "No virtual machines registered.\n");
    }

    #[test]
    fn json_rendering_includes_predicates() {
        let rows = vec![row("VM1", IntegrationStatus::Disabled)];
        let json = render_json(&rows).unwrap();
        assert!(json.contains("\"name\":\"VM1\""));
        assert!(json.contains("\"can_enable\":true"));
        assert!(json.contains("\"can_disable\":false"));
    }
}
