//! Out-of-band record of the transform identity a cached file was built
//! from.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::MarkerKind;
use crate::paths::XATTR_TRANSFORM_ID;

const SIDECAR_SUFFIX: &str = "transform_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMarker {
    Xattr,
    Sidecar,
}

impl From<MarkerKind> for IdentityMarker {
    fn from(kind: MarkerKind) -> Self {
        match kind {
            MarkerKind::Xattr => IdentityMarker::Xattr,
            MarkerKind::Sidecar => IdentityMarker::Sidecar,
        }
    }
}

impl IdentityMarker {
    /// The recorded identity, or `None` if there is none or it is unreadable.
    pub fn read(&self, file: &Path) -> Option<String> {
        match self {
            IdentityMarker::Xattr => match xattr::get(file, XATTR_TRANSFORM_ID) {
                Ok(Some(value)) => String::from_utf8(value).ok(),
                Ok(None) => None,
                Err(e) => {
                    tracing::debug!(path = ?file, error = %e, "Could not read identity xattr");
                    None
                }
            },
            IdentityMarker::Sidecar => fs::read_to_string(sidecar_path(file))
                .ok()
                .map(|s| s.trim().to_string()),
        }
    }

    /// Whether a marker written on a file survives renaming that file.
    pub fn follows_rename(&self) -> bool {
        matches!(self, IdentityMarker::Xattr)
    }

    pub fn write(&self, file: &Path, identity: &str) -> io::Result<()> {
        match self {
            IdentityMarker::Xattr => xattr::set(file, XATTR_TRANSFORM_ID, identity.as_bytes()),
            IdentityMarker::Sidecar => {
                let sidecar = sidecar_path(file);
                let dir = sidecar.parent().unwrap_or_else(|| Path::new("."));
                let mut temp = tempfile::NamedTempFile::new_in(dir)?;
                temp.write_all(identity.as_bytes())?;
                temp.persist(&sidecar).map_err(|e| e.error)?;
                Ok(())
            }
        }
    }
}

fn sidecar_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".");
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Whether `dir` accepts user extended attributes.
pub fn xattrs_supported(dir: &Path) -> bool {
    if !xattr::SUPPORTED_PLATFORM {
        return false;
    }
    let Ok(probe) = tempfile::NamedTempFile::new_in(dir) else {
        return false;
    };
    xattr::set(probe.path(), "user.shotwell.probe", b"1").is_ok()
}
