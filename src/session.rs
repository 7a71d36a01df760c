use crate::access::FsPayloadAccess;
use crate::config::Settings;
use crate::controller::{IntegrationController, ToggleSettings};
use crate::directory::VBoxManageDirectory;
use crate::error::VkdError;
use crate::guard::ProcessGuard;
use crate::runner::ProcessRunner;

/// Controller wired to the real VirtualBox installation.
pub type HostController =
    IntegrationController<VBoxManageDirectory, ProcessGuard, ProcessRunner, FsPayloadAccess>;

/// Open a session: version gate, then the first enumeration.
pub async fn open(settings: &Settings) -> Result<HostController, VkdError> {
    let directory = VBoxManageDirectory::new(settings.manage_exe.clone(), settings.timeout);
    let mut controller = IntegrationController::start(
        directory,
        ProcessGuard::new(settings.process_family.clone()),
        ProcessRunner,
        FsPayloadAccess,
        ToggleSettings::from_settings(settings),
        settings.min_major_version,
    )
    .await?;
    controller.refresh().await?;
    Ok(controller)
}
