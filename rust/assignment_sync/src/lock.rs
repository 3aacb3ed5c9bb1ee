//! Single-slot operation lock.
//!
//! At most one mutating operation (one item or one category) may be in
//! flight per engine. A second attempt while the lock is held is dropped by
//! the caller, never queued.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OperationLock {
    #[default]
    Idle,
    /// A single-item assign/unassign is in flight for this item id.
    SavingItem(String),
    /// A bulk select/deselect is in flight for this category.
    SavingCategory(String),
}

impl OperationLock {
    pub fn is_busy(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Take the lock for one item. Fails with the current holder if busy.
    pub fn try_acquire_item(&mut self, id: &str) -> Result<(), OperationLock> {
        self.try_acquire(Self::SavingItem(id.to_string()))
    }

    /// Take the lock for one category. Fails with the current holder if busy.
    pub fn try_acquire_category(&mut self, category: &str) -> Result<(), OperationLock> {
        self.try_acquire(Self::SavingCategory(category.to_string()))
    }

    fn try_acquire(&mut self, next: OperationLock) -> Result<(), OperationLock> {
        if self.is_busy() {
            return Err(self.clone());
        }
        *self = next;
        Ok(())
    }

    pub fn release(&mut self) {
        *self = Self::Idle;
    }
}

impl fmt::Display for OperationLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::SavingItem(id) => write!(f, "saving item {}", id),
            Self::SavingCategory(category) => write!(f, "saving category {}", category),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_and_category_are_mutually_exclusive() {
        let mut lock = OperationLock::default();
        assert!(!lock.is_busy());

        lock.try_acquire_item("7").unwrap();
        assert_eq!(lock, OperationLock::SavingItem("7".into()));
        assert_eq!(
            lock.try_acquire_category("Users"),
            Err(OperationLock::SavingItem("7".into()))
        );
        assert!(lock.try_acquire_item("8").is_err());

        lock.release();
        lock.try_acquire_category("Users").unwrap();
        assert_eq!(lock, OperationLock::SavingCategory("Users".into()));
        assert!(lock.try_acquire_item("7").is_err());
        assert!(lock.try_acquire_category("Users").is_err());
    }

    #[test]
    fn test_release_returns_to_idle() {
        let mut lock = OperationLock::SavingCategory("Sales".into());
        assert_eq!(lock.to_string(), "saving category Sales");
        lock.release();
        assert_eq!(lock, OperationLock::Idle);
    }
}
