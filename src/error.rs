use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum VkdError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("VirtualBox directory not found")]
    #[diagnostic(help(
        "searched: {searched}. Set [host] install_dir in the config or VBOX_MSI_INSTALL_PATH"
    ))]
    HostInstallationNotFound { searched: String },

    #[error(
        "VirtualBox older than {minimum}.0 detected (found {version}). Please install VirtualBox {minimum}.0 or later to use this version of VirtualKD."
    )]
    HostVersionUnsupported { version: String, minimum: u32 },

    #[error("VirtualBox is not reachable: {message}")]
    #[diagnostic(help("check that VBoxManage works from this account"))]
    HostUnreachable { message: String },

    #[error("Please close ALL VirtualBox instances before changing the settings.")]
    HostRunning,

    #[error("cannot {action} integration for '{machine}': it is already {action}d")]
    ActionNotPermitted { machine: String, action: String },

    #[error("Failed to update machine properties for '{machine}' (VBoxManage exited with {code})")]
    CommandFailed { machine: String, code: i32 },

    #[error("VBoxManage did not finish within {seconds}s while updating '{machine}'")]
    #[diagnostic(help("raise [command] timeout_s in the config if the host is slow"))]
    CommandTimeout { machine: String, seconds: u64 },

    #[error("no virtual machine named '{name}'")]
    #[diagnostic(help("run `vboxkd list` to see registered machines"))]
    MachineNotFound { name: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("prompt error: {message}")]
    Prompt { message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("failed to render output: {message}")]
    Render { message: String },
}

impl VkdError {
    /// Fatal errors end the session; everything else is reported per action.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VkdError::HostInstallationNotFound { .. }
                | VkdError::HostVersionUnsupported { .. }
                | VkdError::ConfigLoad { .. }
                | VkdError::ConfigParse { .. }
                | VkdError::Validation { .. }
        )
    }
}
