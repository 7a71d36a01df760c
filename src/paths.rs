use std::path::{Path, PathBuf};

/// Default config file: `~/.config/vboxkd/vboxkd.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vboxkd")
        .join("vboxkd.toml")
}

/// Audit log written by mutating commands: `~/.local/share/vboxkd/vboxkd.log`
pub fn log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("vboxkd")
        .join("vboxkd.log")
}

/// Path to the management tool inside a VirtualBox installation.
pub fn manage_exe(install_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        install_dir.join("VBoxManage.exe")
    } else {
        install_dir.join("VBoxManage")
    }
}

/// Path to the VirtualBox GUI inside an installation.
pub fn gui_exe(install_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        install_dir.join("VirtualBox.exe")
    } else {
        install_dir.join("VirtualBox")
    }
}

/// Directory holding the running executable; the payload VirtualBox loads.
pub fn exe_dir() -> std::io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "executable path has no parent directory",
        )
    })
}

/// Well-known install locations, tried after the config override and the
/// installer's environment variables.
pub fn default_install_dirs(env: &dyn Fn(&str) -> Option<String>) -> Vec<PathBuf> {
    if cfg!(windows) {
        let program_files = env("ProgramW6432").or_else(|| env("ProgramFiles"));
        program_files
            .map(|p| vec![PathBuf::from(p).join("Oracle").join("VirtualBox")])
            .unwrap_or_default()
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from("/Applications/VirtualBox.app/Contents/MacOS")]
    } else {
        vec![
            PathBuf::from("/usr/lib/virtualbox"),
            PathBuf::from("/usr/bin"),
        ]
    }
}
