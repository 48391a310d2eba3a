use std::fmt;
use std::path::{Path, PathBuf};

use notify::EventKind;
use notify::event::ModifyKind;

/// Kind of change reported for a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    /// Attribute change. On Linux an unlink or a rename over the file shows up
    /// here first, as a link-count change on the watched inode.
    Metadata,
    Removed,
    Renamed,
}

impl ChangeKind {
    /// Map a notify event kind. Access events (open/close/read) return `None`:
    /// they never describe a content change, and hashing the watched files
    /// would otherwise feed back into the watcher.
    pub fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Access(_) => None,
            EventKind::Create(_) => Some(ChangeKind::Created),
            EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
            EventKind::Modify(ModifyKind::Metadata(_)) => Some(ChangeKind::Metadata),
            EventKind::Modify(_) => Some(ChangeKind::Modified),
            EventKind::Remove(_) => Some(ChangeKind::Removed),
            EventKind::Any | EventKind::Other => Some(ChangeKind::Modified),
        }
    }

    /// Whether a watch handle that reported this kind may have stopped
    /// delivering events for its path.
    pub fn invalidates_watch(self) -> bool {
        matches!(
            self,
            ChangeKind::Removed | ChangeKind::Renamed | ChangeKind::Metadata
        )
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Metadata => "metadata",
            ChangeKind::Removed => "removed",
            ChangeKind::Renamed => "renamed",
        };
        f.write_str(name)
    }
}

/// A single per-path change notification, consumed once by the debouncer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl RawChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Build an event for a path watched on its own. The notify event's path
    /// list is ignored: a per-path handle only ever reports its own path.
    pub fn from_notify(path: &Path, event: &notify::Event) -> Option<Self> {
        ChangeKind::from_notify(&event.kind).map(|kind| Self::new(path, kind))
    }
}

impl fmt::Display for RawChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};

    #[test]
    fn test_access_events_are_dropped() {
        assert_eq!(ChangeKind::from_notify(&EventKind::Access(AccessKind::Any)), None);
    }

    #[test]
    fn test_notify_kinds_map_to_change_kinds() {
        let cases = [
            (EventKind::Create(CreateKind::File), ChangeKind::Created),
            (
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                ChangeKind::Modified,
            ),
            (
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)),
                ChangeKind::Metadata,
            ),
            (
                EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                ChangeKind::Renamed,
            ),
            (EventKind::Remove(RemoveKind::File), ChangeKind::Removed),
            (EventKind::Other, ChangeKind::Modified),
        ];
        for (kind, expected) in cases {
            assert_eq!(ChangeKind::from_notify(&kind), Some(expected), "{kind:?}");
        }
    }

    #[test]
    fn test_only_identity_changes_invalidate_watch() {
        assert!(ChangeKind::Removed.invalidates_watch());
        assert!(ChangeKind::Renamed.invalidates_watch());
        assert!(ChangeKind::Metadata.invalidates_watch());
        assert!(!ChangeKind::Modified.invalidates_watch());
        assert!(!ChangeKind::Created.invalidates_watch());
    }

    #[test]
    fn test_event_display() {
        let event = RawChangeEvent::new("/etc/certs/key.pem", ChangeKind::Removed);
        assert_eq!(event.to_string(), "removed /etc/certs/key.pem");
    }
}
