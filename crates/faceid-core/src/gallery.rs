//! In-memory identity gallery.
//!
//! A dumb store: label-keyed records in stable first-seen order, guarded by
//! one coarse lock. Validation of what goes in belongs to the matcher.

use crate::types::IdentityRecord;
use std::sync::Mutex;

/// The set of registered identities for the current session.
///
/// Re-registering an existing label overwrites the record in place, keeping
/// its original position so snapshot order stays stable.
#[derive(Default)]
pub struct Gallery {
    records: Mutex<Vec<(String, IdentityRecord)>>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// A consistent point-in-time snapshot of all records, in first-seen order.
    pub fn snapshot(&self) -> Vec<IdentityRecord> {
        self.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Insert or overwrite the record stored under `label`.
    pub fn register(&self, label: &str, record: IdentityRecord) {
        let mut records = self.lock();
        match records.iter_mut().find(|(l, _)| l == label) {
            Some(entry) => entry.1 = record,
            None => records.push((label.to_string(), record)),
        }
    }

    /// Remove every record. Session reset.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, IdentityRecord)>> {
        // A poisoned lock still holds structurally valid data; recover it.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}
