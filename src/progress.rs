//! Progress UI (spinner) fed by pipeline events.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use jobsweep_core::{ProgressEvent, ProgressLevel};
use tokio::sync::mpsc;

/// Spawns the renderer task for a run's event stream.
///
/// Counted info events update the spinner message in place; warnings,
/// errors and successes are printed above it. The task ends when every
/// reporter clone has been dropped. With `quiet` set it only drains the
/// channel.
pub fn spawn_renderer(
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
    quiet: bool,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if quiet {
            while rx.recv().await.is_some() {}
            return;
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while let Some(event) = rx.recv().await {
            match event.level {
                ProgressLevel::Info => {
                    if let (Some(current), Some(total)) = (event.current, event.total) {
                        spinner.set_message(format!("[{current}/{total}] {}", event.message));
                    } else {
                        spinner.set_message(event.message);
                    }
                }
                ProgressLevel::Warn => spinner.println(format!("! {}", event.message)),
                ProgressLevel::Error => spinner.println(format!("✗ {}", event.message)),
                ProgressLevel::Success => spinner.println(format!("✓ {}", event.message)),
            }
        }

        spinner.finish_and_clear();
    })
}

#[cfg(test)]
mod tests {
    use jobsweep_core::ProgressReporter;

    use super::*;

    #[tokio::test]
    async fn test_renderer_exits_when_every_reporter_is_dropped() {
        let (reporter, rx) = ProgressReporter::channel();
        let handle = spawn_renderer(rx, true);

        reporter.info("采集中");
        reporter.success("完成");
        drop(reporter);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_renderer_quiet_mode_drains_without_rendering() {
        let (reporter, rx) = ProgressReporter::channel();
        let handle = spawn_renderer(rx, true);

        for i in 0..100 {
            reporter.step("投递", i, 100);
        }
        drop(reporter);

        handle.await.unwrap();
    }
}
