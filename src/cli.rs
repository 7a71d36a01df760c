use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "vboxkd",
    version,
    about = "Enable or disable VirtualKD kernel debugging integration for VirtualBox machines"
)]
pub struct Cli {
    /// Path to config file (default: ~/.config/vboxkd/vboxkd.toml, optional)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Auto)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Colors and spinners on a terminal, plain text otherwise
    Auto,
    /// No ANSI escapes
    Plain,
    /// JSON on stdout
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List machines and their integration status
    List,

    /// Show the integration status of one machine
    Status {
        /// Machine name
        machine: String,
    },

    /// Point the machine at this VirtualKD installation
    Enable {
        /// Machine name
        machine: String,
    },

    /// Remove VirtualKD integration from the machine
    Disable {
        /// Machine name
        machine: String,
    },

    /// Interactively pick machines and toggle integration
    Select,

    /// Start the VirtualBox GUI
    Launch,

    /// Show the detected VirtualBox version and payload directory
    Version,
}

impl Command {
    /// Commands that change machine settings get an audit log.
    pub fn mutates(&self) -> bool {
        matches!(
            self,
            Command::Enable { .. } | Command::Disable { .. } | Command::Select
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn machine_names_with_spaces_parse() {
        let cli = Cli::try_parse_from(["vboxkd", "enable", "Windows 10 (debug)"]).unwrap();
        match cli.command {
            Command::Enable { machine } => assert_eq!(machine, "Windows 10 (debug)"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["vboxkd", "list", "--output", "json", "-v"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(cli.verbose);
        assert!(!cli.command.mutates());
    }

    #[test]
    fn toggles_are_mutating() {
        let cli = Cli::try_parse_from(["vboxkd", "disable", "VM1"]).unwrap();
        assert!(cli.command.mutates());
    }
}
