use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use strum::Display;
use taskboard_core::EntityRef;

/// The kind of user-initiated mutation an optimistic operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    AddList,
    RenameList,
    DeleteList,
    ReorderList,
    AddTask,
    RenameTask,
    ToggleCompletion,
    DeleteTask,
    MoveTask,
}

/// A dismissible, user-visible report of a failed remote sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub entity: EntityRef,
    pub operation: MutationKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NotificationCenter {
    entries: VecDeque<Notification>,
    next_id: u64,
    capacity: usize,
}

impl NotificationCenter {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 1,
            capacity: capacity.max(1),
        }
    }

    /// Records a notification, dropping the oldest once the cap is reached.
    pub fn raise(&mut self, entity: EntityRef, operation: MutationKind, message: String) -> Notification {
        let notification = Notification {
            id: self.next_id,
            entity,
            operation,
            message,
            raised_at: Utc::now(),
        };
        self.next_id += 1;

        if self.entries.len() >= self.capacity {
            if let Some(dropped) = self.entries.pop_front() {
                tracing::debug!("Dropping oldest notification {}", dropped.id);
            }
        }
        self.entries.push_back(notification.clone());
        notification
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|notification| notification.id != id);
        self.entries.len() != before
    }

    pub fn list(&self) -> Vec<Notification> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskboard_core::TaskId;

    #[test]
    fn test_cap_drops_oldest() {
        let mut center = NotificationCenter::new(2);
        let entity = EntityRef::Task(TaskId(1));
        let first = center.raise(entity, MutationKind::RenameTask, "a".into());
        center.raise(entity, MutationKind::MoveTask, "b".into());
        center.raise(entity, MutationKind::DeleteTask, "c".into());

        let ids: Vec<u64> = center.list().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(!center.dismiss(first.id));
        assert!(center.dismiss(3));
        assert_eq!(center.len(), 1);
    }

    #[test]
    fn test_mutation_kind_display() {
        assert_eq!(MutationKind::ToggleCompletion.to_string(), "toggle_completion");
        assert_eq!(
            serde_json::to_value(MutationKind::AddList).unwrap(),
            serde_json::json!("add_list")
        );
    }
}
