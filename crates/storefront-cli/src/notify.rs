use storefront_core::{Notification, NotificationLevel, Notifier};

/// Prints session notifications for the person at the terminal
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info => eprintln!("{}", notification.message),
            NotificationLevel::Error => eprintln!("error: {}", notification.message),
        }
    }
}
