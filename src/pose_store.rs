//! Shared store for the latest camera pose set.
//!
//! Writers swap the whole snapshot under the write lock. Readers clone the
//! `Arc` and release the lock immediately, so they see either the previous
//! set or the new one, never a mix.

use std::sync::{Arc, PoisonError, RwLock};

use crate::protocol::CameraPose;

#[derive(Debug, Default)]
struct Snapshot {
    poses: Arc<[CameraPose]>,
    revision: u64,
}

/// Cloneable handle to the current pose set.
#[derive(Debug, Clone, Default)]
pub struct PoseStore {
    inner: Arc<RwLock<Snapshot>>,
}

impl PoseStore {
    /// Create an empty store at revision 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pose set. Returns the new revision.
    pub fn replace(&self, poses: Vec<CameraPose>) -> u64 {
        let mut snapshot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        snapshot.poses = poses.into();
        snapshot.revision += 1;
        log::debug!(
            "Pose set replaced: {} cameras (revision {})",
            snapshot.poses.len(),
            snapshot.revision
        );
        snapshot.revision
    }

    /// Remove every pose. Returns the new revision.
    pub fn clear(&self) -> u64 {
        self.replace(Vec::new())
    }

    /// Current pose set.
    pub fn current(&self) -> Arc<[CameraPose]> {
        Arc::clone(&self.inner.read().unwrap_or_else(PoisonError::into_inner).poses)
    }

    /// Revision of the current pose set. Bumped on every mutation.
    pub fn revision(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .revision
    }

    /// Current pose set together with its revision, read atomically.
    pub fn snapshot(&self) -> (Arc<[CameraPose]>, u64) {
        let snapshot = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        (Arc::clone(&snapshot.poses), snapshot.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CameraId;

    fn pose(id: &str, x: f64) -> CameraPose {
        CameraPose {
            camera_id: CameraId::from(id),
            position: [x, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn test_replace_and_clear_bump_revision() {
        let store = PoseStore::new();
        assert_eq!(store.revision(), 0);
        assert!(store.current().is_empty());

        assert_eq!(store.replace(vec![pose("1", 1.0), pose("2", 2.0)]), 1);
        assert_eq!(store.current().len(), 2);

        assert_eq!(store.clear(), 2);
        assert!(store.current().is_empty());
    }

    #[test]
    fn test_old_snapshot_survives_replace() {
        let store = PoseStore::new();
        store.replace(vec![pose("1", 1.0)]);
        let before = store.current();
        store.replace(vec![pose("1", 5.0), pose("2", 2.0)]);
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].position[0], 1.0);
        assert_eq!(store.current().len(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let store = PoseStore::new();
        let panel = store.clone();
        store.replace(vec![pose("1", 1.0)]);
        let (poses, revision) = panel.snapshot();
        assert_eq!(poses.len(), 1);
        assert_eq!(revision, 1);
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_sets() {
        let store = PoseStore::new();
        let writer = store.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..200 {
                if i % 2 == 0 {
                    writer.replace(vec![pose("1", 1.0), pose("2", 2.0), pose("3", 3.0)]);
                } else {
                    writer.clear();
                }
            }
        });
        for _ in 0..200 {
            let len = store.current().len();
            assert!(len == 0 || len == 3);
        }
        handle.join().unwrap();
    }
}
