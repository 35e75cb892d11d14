use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// A user-visible, non-blocking message (a toast in the browser client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Bounded queue of notifications; the oldest is dropped when full.
#[derive(Debug)]
pub struct NotificationCenter {
    capacity: usize,
    queue: VecDeque<Notification>,
}

impl NotificationCenter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            queue: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, notification: Notification) {
        if self.queue.len() == self.capacity
            && let Some(dropped) = self.queue.pop_front()
        {
            tracing::debug!("notification queue full, dropping '{}'", dropped.message);
        }
        self.queue.push_back(notification);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn latest(&self) -> Option<&Notification> {
        self.queue.back()
    }

    pub fn drain(&mut self) -> Vec<Notification> {
        self.queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_notification_is_dropped_when_full() {
        let mut center = NotificationCenter::new(2);
        center.push(Notification::info("one"));
        center.push(Notification::error("two"));
        center.push(Notification::error("three"));

        let drained = center.drain();
        assert_eq!(
            drained
                .iter()
                .map(|notification| notification.message.as_str())
                .collect::<Vec<_>>(),
            ["two", "three"]
        );
        assert!(center.is_empty());
    }

    #[test]
    fn zero_capacity_still_keeps_the_latest() {
        let mut center = NotificationCenter::new(0);
        center.push(Notification::info("a"));
        center.push(Notification::info("b"));

        assert_eq!(center.len(), 1);
        assert_eq!(center.latest().map(|n| n.message.as_str()), Some("b"));
    }
}
