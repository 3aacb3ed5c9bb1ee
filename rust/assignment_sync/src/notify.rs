//! Change notification to the collaborator that owns the parent entity.

use std::sync::{Mutex, PoisonError};

use crate::types::{AssignableItem, Notification};

/// Receives engine output. Both callbacks run synchronously on the task that
/// settled the operation, after the operation lock has been released.
pub trait AssignmentListener: Send + Sync {
    /// The resolved assigned items changed.
    fn on_assigned_change(&self, _items: &[AssignableItem]) {}

    /// A transient user-facing message.
    fn on_notification(&self, _notification: &Notification) {}
}

/// Listener that records every callback, for tests and batch callers.
#[derive(Debug, Default)]
pub struct RecordingListener {
    changes: Mutex<Vec<Vec<AssignableItem>>>,
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<Vec<AssignableItem>> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sorted ids of the most recent change, if any was emitted.
    pub fn last_change_ids(&self) -> Option<Vec<String>> {
        let changes = self.changes.lock().unwrap_or_else(PoisonError::into_inner);
        changes.last().map(|items| sorted_ids(items))
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn error_count(&self) -> usize {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|n| n.is_error())
            .count()
    }
}

impl AssignmentListener for RecordingListener {
    fn on_assigned_change(&self, items: &[AssignableItem]) {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(items.to_vec());
    }

    fn on_notification(&self, notification: &Notification) {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
    }
}

pub fn sorted_ids(items: &[AssignableItem]) -> Vec<String> {
    let mut ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
    ids.sort();
    ids
}

/// Suppresses emissions whose sorted id set equals the previous one.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    last_emitted: Option<Vec<String>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record ids the collaborator already has (a seed or resync snapshot).
    pub fn set_baseline(&mut self, sorted_ids: Vec<String>) {
        self.last_emitted = Some(sorted_ids);
    }

    /// Whether `sorted_ids` differs from the last emission. Records it if so.
    pub fn should_emit(&mut self, sorted_ids: Vec<String>) -> bool {
        if self.last_emitted.as_ref() == Some(&sorted_ids) {
            return false;
        }
        self.last_emitted = Some(sorted_ids);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identical_payload_is_suppressed() {
        let mut notifier = ChangeNotifier::new();
        notifier.set_baseline(ids(&["1", "2"]));
        assert!(!notifier.should_emit(ids(&["1", "2"])));
        assert!(notifier.should_emit(ids(&["1"])));
        assert!(!notifier.should_emit(ids(&["1"])));
        assert!(notifier.should_emit(ids(&["1", "2"])));
    }

    #[test]
    fn test_first_emission_without_baseline() {
        let mut notifier = ChangeNotifier::new();
        assert!(notifier.should_emit(Vec::new()));
        assert!(!notifier.should_emit(Vec::new()));
    }

    #[test]
    fn test_recording_listener() {
        let listener = RecordingListener::new();
        listener.on_notification(&Notification::error("nope"));
        listener.on_notification(&Notification::success("ok"));
        listener.on_assigned_change(&[
            AssignableItem::new("b", None, "B"),
            AssignableItem::new("a", None, "A"),
        ]);
        assert_eq!(listener.error_count(), 1);
        assert_eq!(listener.last_change_ids(), Some(ids(&["a", "b"])));
        assert_eq!(listener.changes().len(), 1);
    }
}
