use std::future::Future;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::error::VkdError;

/// Controls how action progress is rendered on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Spinner while running, checkmark or cross afterwards.
    Normal,
    /// No ANSI, one line before and after (for piped/non-TTY).
    Plain,
    /// Nothing; the caller reports the result itself.
    Quiet,
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn done_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("\u{2713} {msg:.green}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn failed_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("\u{2717} {msg:.red}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Wraps one blocking external action (a VBoxManage call) in a spinner.
pub struct ActionProgress {
    mode: OutputMode,
}

impl ActionProgress {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub async fn run<Fut, T>(&self, label: &str, fut: Fut) -> Result<T, VkdError>
    where
        Fut: Future<Output = Result<T, VkdError>>,
    {
        match self.mode {
            OutputMode::Quiet => fut.await,
            OutputMode::Plain => {
                eprintln!("{label}...");
                let result = fut.await;
                match &result {
                    Ok(_) => eprintln!("{label}: done"),
                    Err(_) => eprintln!("{label}: failed"),
                }
                result
            }
            OutputMode::Normal => {
                let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
                bar.set_style(spinner_style());
                bar.set_message(label.to_string());
                bar.enable_steady_tick(std::time::Duration::from_millis(80));

                let result = fut.await;

                let style = if result.is_ok() {
                    done_style()
                } else {
                    failed_style()
                };
                bar.set_style(style);
                bar.finish_with_message(label.to_string());
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn quiet_passes_result_through() {
        let progress = ActionProgress::new(OutputMode::Quiet);
        let ok = progress.run("noop", async { Ok::<_, VkdError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = progress
            .run("fail", async { Err::<(), _>(VkdError::HostRunning) })
            .await;
        assert!(matches!(err, Err(VkdError::HostRunning)));
    }

    #[tokio::test]
    async fn normal_mode_returns_inner_result() {
        let progress = ActionProgress::new(OutputMode::Normal);
        let out = progress.run("spin", async { Ok::<_, VkdError>("x") }).await;
        assert_eq!(out.unwrap(), "x");
    }
}
