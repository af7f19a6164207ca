use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{SyncSender, TrySendError};

use super::Notification;
use crate::error::{Error, Result};

/// Map a raw watch event onto the two notifications the coordinator knows.
pub fn classify(kind: &EventKind) -> Option<Notification> {
    match kind {
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(Notification::Modified),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(Notification::WriteFinalized),
        _ => None,
    }
}

/// Keeps the catalog watch alive; dropping it ends the notification stream.
pub struct CatalogWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl CatalogWatcher {
    pub fn start(db_path: &Path, tx: SyncSender<Notification>) -> Result<Self> {
        let stream_failure = |e: notify::Error| Error::NotificationStreamFailure(e.to_string());

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    let Some(notification) = classify(&event.kind) else {
                        return;
                    };
                    match tx.try_send(notification) {
                        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                        Err(TrySendError::Full(dropped)) => {
                            tracing::debug!(notification = ?dropped, "Rescan queue full, dropping notification");
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Notification::Failed(e.to_string()));
                }
            },
            notify::Config::default(),
        )
        .map_err(stream_failure)?;

        watcher
            .watch(db_path, RecursiveMode::NonRecursive)
            .map_err(stream_failure)?;

        tracing::info!(path = %db_path.display(), "Watching catalog for changes");
        Ok(Self {
            path: db_path.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind};
    use std::sync::mpsc;

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(Notification::Modified)
        );
        assert_eq!(classify(&EventKind::Modify(ModifyKind::Any)), Some(Notification::Modified));
        assert_eq!(
            classify(&EventKind::Access(AccessKind::Close(AccessMode::Write))),
            Some(Notification::WriteFinalized)
        );
        assert_eq!(classify(&EventKind::Access(AccessKind::Close(AccessMode::Read))), None);
        assert_eq!(classify(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))), None);
        assert_eq!(classify(&EventKind::Create(CreateKind::File)), None);
    }

    #[test]
    fn test_missing_catalog_fails_to_watch() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::sync_channel(1);
        let result = CatalogWatcher::start(&dir.path().join("missing.db"), tx);
        assert!(matches!(result, Err(Error::NotificationStreamFailure(_))));
    }
}
