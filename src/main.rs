use std::io::IsTerminal;

use clap::Parser;

use vboxkd::cli::{Cli, Command, OutputFormat};
use vboxkd::config::{self, Settings};
use vboxkd::controller::Action;
use vboxkd::error::VkdError;
use vboxkd::progress::{ActionProgress, OutputMode};
use vboxkd::session::{self, HostController};
use vboxkd::view::{self, MachineRow};
use vboxkd::{host, logging, paths};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    let audit = logging::init(cli.verbose);

    let config = config::load_or_default(cli.config.as_deref())?;
    let settings = Settings::resolve(&config)?;

    if cli.command.mutates() {
        let log_path = paths::log_path();
        if let Err(e) = audit.attach(&log_path) {
            tracing::warn!(path = %log_path.display(), "audit log unavailable: {e}");
        }
    }

    // Launching the GUI needs the installation only, not a session
    if matches!(cli.command, Command::Launch) {
        host::launch_gui(&settings.install_dir)?;
        return Ok(());
    }

    let mut controller = session::open(&settings).await?;
    let watcher = tokio::spawn(view::watch_notifications(controller.subscribe()));

    let result = run(&cli, &mut controller, &settings).await;

    // Dropping the controller closes the notification channel
    drop(controller);
    let _ = watcher.await;

    result.map_err(Into::into)
}

async fn run(
    cli: &Cli,
    controller: &mut HostController,
    settings: &Settings,
) -> Result<(), VkdError> {
    match &cli.command {
        Command::List => {
            let rows = view::snapshot(controller).await?;
            print_rows(&rows, cli.output)?;
        }
        Command::Status { machine } => {
            let entry = lookup(controller, machine)?;
            let row = view::row_for(controller, &entry).await?;
            print_rows(std::slice::from_ref(&row), cli.output)?;
        }
        Command::Enable { machine } => {
            toggle(controller, machine, Action::Enable, cli.output).await?;
        }
        Command::Disable { machine } => {
            toggle(controller, machine, Action::Disable, cli.output).await?;
        }
        Command::Select => {
            view::interactive(controller, &settings.install_dir, progress_mode(cli.output)).await?;
        }
        Command::Launch => host::launch_gui(&settings.install_dir)?,
        Command::Version => print_version(controller, settings, cli.output)?,
    }
    Ok(())
}

fn lookup(
    controller: &HostController,
    machine: &str,
) -> Result<std::sync::Arc<vboxkd::controller::IntegrationEntry>, VkdError> {
    controller
        .find(machine)
        .ok_or_else(|| VkdError::MachineNotFound {
            name: machine.to_string(),
        })
}

/// Run one toggle, then print the re-read row. A failed command still
/// leaves the caller with a fresh status on stderr before the error.
async fn toggle(
    controller: &HostController,
    machine: &str,
    action: Action,
    format: OutputFormat,
) -> Result<(), VkdError> {
    let entry = lookup(controller, machine)?;
    let progress = ActionProgress::new(progress_mode(format));
    let label = format!("{action} VirtualKD for {machine}");

    match progress.run(&label, controller.toggle(&entry, action)).await {
        Ok(_) => {
            let row = view::row_for(controller, &entry).await?;
            print_rows(std::slice::from_ref(&row), format)
        }
        Err(e) => {
            if matches!(
                e,
                VkdError::CommandFailed { .. } | VkdError::CommandTimeout { .. }
            ) && let Ok(status) = controller.status(&entry).await
            {
                eprintln!("{machine} is {status}");
            }
            Err(e)
        }
    }
}

fn print_rows(rows: &[MachineRow], format: OutputFormat) -> Result<(), VkdError> {
    match format {
        OutputFormat::Json => println!("{}", view::render_json(rows)?),
        OutputFormat::Plain => print!("{}", view::render_plain(rows, false)),
        OutputFormat::Auto => {
            print!("{}", view::render_plain(rows, std::io::stdout().is_terminal()))
        }
    }
    Ok(())
}

#[derive(facet::Facet)]
struct VersionJson {
    host_version: String,
    install_dir: String,
    payload_dir: String,
    config_key: String,
}

fn print_version(
    controller: &HostController,
    settings: &Settings,
    format: OutputFormat,
) -> Result<(), VkdError> {
    if format == OutputFormat::Json {
        let json = facet_json::to_string(&VersionJson {
            host_version: controller.host_version().to_string(),
            install_dir: settings.install_dir.display().to_string(),
            payload_dir: settings.payload_path(),
            config_key: settings.config_key.clone(),
        })
        .map_err(|e| VkdError::Render {
            message: e.to_string(),
        })?;
        println!("{json}");
    } else {
        println!("VirtualBox {}", controller.host_version());
        println!("  Install dir: {}", settings.install_dir.display());
        println!("  Payload dir: {}", settings.payload_path());
        println!("  Config key:  {}", settings.config_key);
    }
    Ok(())
}

/// Spinners only when a human is watching stderr and stdout is not JSON.
fn progress_mode(format: OutputFormat) -> OutputMode {
    match format {
        OutputFormat::Json => OutputMode::Quiet,
        OutputFormat::Plain => OutputMode::Plain,
        OutputFormat::Auto => {
            if std::io::stderr().is_terminal() {
                OutputMode::Normal
            } else {
                OutputMode::Quiet
            }
        }
    }
}
