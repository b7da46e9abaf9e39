/*
Visibility Adapters

Always Visible is for hosts without a notion of being hidden, such as the daemon binary.
Watch Visibility is driven by the host: it flips the flag when its window or tab is hidden or
shown, and schedulers that pause while hidden follow along.
*/

use tokio::sync::watch;

use crate::application::ports::output::scheduler_port::VisibilityPort;

#[derive(Debug)]
pub struct AlwaysVisible {
    sender: watch::Sender<bool>,
}

impl AlwaysVisible {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(true);
        Self { sender }
    }
}

impl Default for AlwaysVisible {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityPort for AlwaysVisible {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

#[derive(Debug)]
pub struct WatchVisibility {
    sender: watch::Sender<bool>,
}

impl WatchVisibility {
    pub fn new(visible: bool) -> Self {
        let (sender, _) = watch::channel(visible);
        Self { sender }
    }

    /// Publish a visibility change. Repeating the current value wakes nobody.
    pub fn set_visible(&self, visible: bool) {
        self.sender.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });
    }
}

impl VisibilityPort for WatchVisibility {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_visible() {
        assert!(AlwaysVisible::new().is_visible());
    }

    #[tokio::test]
    async fn test_watch_visibility_notifies_on_change_only() {
        let visibility = WatchVisibility::new(true);
        let mut receiver = visibility.subscribe();

        visibility.set_visible(true);
        assert!(!receiver.has_changed().unwrap());

        visibility.set_visible(false);
        receiver.changed().await.unwrap();
        assert!(!*receiver.borrow_and_update());
        assert!(!visibility.is_visible());
    }
}
