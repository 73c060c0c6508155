//! Transactional restore
//!
//! 1. check the snapshot has `nodes/` and `edges/` directories
//! 2. copy both into a staging directory inside the data directory
//! 3. move the live trees into `.pre-restore-<uuid>/`
//! 4. move the staged trees into place
//! 5. delete the safety copy
//!
//! Staging lives on the same filesystem as the data, so steps 3 and 4 are
//! plain renames. If step 3 or 4 fails, whatever was moved is put back.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::fs_util::{copy_tree, remove_tree, rename};
use crate::error::{ChronoError, Result};
use crate::model::EntityKind;
use crate::store::persistence::DiskLayout;

const KINDS: [EntityKind; 2] = [EntityKind::Node, EntityKind::Edge];

/// Prefix of the directory holding live data during a swap
pub(crate) const SAFETY_PREFIX: &str = ".pre-restore-";

/// Both kind directories are present
pub(crate) fn has_snapshot_shape(snapshot: &Path) -> bool {
    KINDS
        .iter()
        .all(|kind| snapshot.join(kind.dir_name()).is_dir())
}

pub(crate) fn restore(layout: &DiskLayout, snapshot: &Path) -> Result<()> {
    if !has_snapshot_shape(snapshot) {
        return Err(ChronoError::InvalidArgument(format!(
            "{} is not a backup: expected nodes/ and edges/ directories",
            snapshot.display()
        )));
    }
    let root = layout.root();
    std::fs::create_dir_all(root).map_err(|e| ChronoError::io(root, e))?;

    let staging = tempfile::Builder::new()
        .prefix(".restore-")
        .tempdir_in(root)
        .map_err(|e| ChronoError::io(root, e))?;
    for kind in KINDS {
        copy_tree(&snapshot.join(kind.dir_name()), &staging.path().join(kind.dir_name()))?;
    }

    let safety = root.join(format!("{}{}", SAFETY_PREFIX, Uuid::new_v4()));
    std::fs::create_dir(&safety).map_err(|e| ChronoError::io(&safety, e))?;

    let mut swap = Swap {
        layout,
        safety: &safety,
        parked: Vec::new(),
        installed: Vec::new(),
    };
    if let Err(e) = swap.run(staging.path()) {
        tracing::warn!(snapshot = %snapshot.display(), error = %e, "restore failed; rolling back");
        swap.roll_back();
        return Err(e);
    }

    if let Err(e) = remove_tree(&safety) {
        tracing::warn!(path = %safety.display(), error = %e, "could not remove pre-restore copy");
    }
    tracing::info!(snapshot = %snapshot.display(), data_dir = %root.display(), "restore complete");
    Ok(())
}

/// Bookkeeping for one swap so a failure can be undone step by step
struct Swap<'a> {
    layout: &'a DiskLayout,
    safety: &'a Path,
    /// Live trees moved into the safety directory
    parked: Vec<EntityKind>,
    /// Staged trees moved into the live location
    installed: Vec<EntityKind>,
}

impl Swap<'_> {
    fn live(&self, kind: EntityKind) -> PathBuf {
        self.layout.kind_dir(kind)
    }

    fn parked_path(&self, kind: EntityKind) -> PathBuf {
        self.safety.join(kind.dir_name())
    }

    fn run(&mut self, staging: &Path) -> Result<()> {
        for kind in KINDS {
            let live = self.live(kind);
            if live.exists() {
                rename(&live, &self.parked_path(kind))?;
                self.parked.push(kind);
            }
        }
        for kind in KINDS {
            rename(&staging.join(kind.dir_name()), &self.live(kind))?;
            self.installed.push(kind);
        }
        Ok(())
    }

    fn roll_back(&self) {
        for kind in &self.installed {
            if let Err(e) = remove_tree(&self.live(*kind)) {
                tracing::error!(kind = %kind, error = %e, "roll-back could not remove restored data");
            }
        }
        for kind in &self.parked {
            let live = self.live(*kind);
            if live.exists() {
                if let Err(e) = remove_tree(&live) {
                    tracing::error!(kind = %kind, error = %e, "roll-back could not clear live directory");
                    continue;
                }
            }
            match rename(&self.parked_path(*kind), &live) {
                Ok(()) => tracing::info!(kind = %kind, "roll-back restored live data"),
                Err(e) => tracing::error!(
                    kind = %kind,
                    safety = %self.safety.display(),
                    error = %e,
                    "roll-back failed; live data left in safety directory"
                ),
            }
        }
        if self.parked.is_empty() {
            let _ = remove_tree(self.safety);
        } else if self.safety.read_dir().map(|mut d| d.next().is_none()).unwrap_or(false) {
            let _ = std::fs::remove_dir(self.safety);
        }
    }
}
