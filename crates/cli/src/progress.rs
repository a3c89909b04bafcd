use events::ProgressEvent;
use indicatif::{ProgressBar, ProgressStyle};

/// Terminal rendering of one install's progress channel.
pub struct InstallProgressBar {
    bar: ProgressBar,
}

impl InstallProgressBar {
    pub fn new(app_id: &str) -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos:>3}% {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(format!("Waiting to install {}", app_id));

        Self { bar }
    }

    /// Returns true once the event ends the install.
    pub fn apply(&self, event: &ProgressEvent) -> bool {
        match event {
            ProgressEvent::Connected => false,
            ProgressEvent::Progress {
                progress,
                status,
                details,
            } => {
                self.bar.set_position(u64::from(*progress));
                self.bar.set_message(format!("{}: {}", status, details));
                false
            }
            ProgressEvent::Complete { details, .. } => {
                self.bar.set_position(100);
                self.bar.finish_with_message(details.clone());
                true
            }
            ProgressEvent::Error { message } => {
                self.bar.abandon_with_message(message.clone());
                true
            }
        }
    }

    pub fn abandon(&self, message: impl Into<String>) {
        self.bar.abandon_with_message(message.into());
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_follows_events() {
        let bar = InstallProgressBar::new("git");

        assert!(!bar.apply(&ProgressEvent::Connected));
        assert!(!bar.apply(&ProgressEvent::progress(30, "Installing", "Git")));
        assert_eq!(bar.position(), 30);
        assert!(bar.apply(&ProgressEvent::complete("Git installed")));
        assert_eq!(bar.position(), 100);
    }

    #[test]
    fn test_error_is_terminal() {
        let bar = InstallProgressBar::new("figma");
        assert!(bar.apply(&ProgressEvent::timed_out()));
    }
}
