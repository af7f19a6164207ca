//! Composite source references.
//!
//! Shotwell identifies a catalog row from another table with a string made
//! of a kind prefix followed by the row id in hexadecimal: photos are
//! `thumb` + 16 hex digits, videos are `video-` + 16 hex digits. Event
//! primary sources and tag membership lists both use this encoding.

use std::fmt;

use crate::error::{Error, Result};

const PHOTO_PREFIX: &str = "thumb";
const VIDEO_PREFIX: &str = "video-";

/// Which catalog table an asset lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Photo,
    Video,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Photo => "photo",
            AssetKind::Video => "video",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "photo" => Some(AssetKind::Photo),
            "video" => Some(AssetKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded `kind + hex id` reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub kind: AssetKind,
    pub id: i64,
}

impl SourceRef {
    pub fn new(kind: AssetKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let (kind, digits) = if let Some(rest) = value.strip_prefix(VIDEO_PREFIX) {
            (AssetKind::Video, rest)
        } else if let Some(rest) = value.strip_prefix(PHOTO_PREFIX) {
            (AssetKind::Photo, rest)
        } else {
            return Err(Error::MalformedDescriptor(format!(
                "unknown source reference {:?}",
                value
            )));
        };

        let id = i64::from_str_radix(digits, 16).map_err(|e| {
            Error::MalformedDescriptor(format!("bad source id in {:?}: {}", value, e))
        })?;

        Ok(Self { kind, id })
    }

    /// Parse a comma-separated reference list, skipping empty items and
    /// entries that fail to decode.
    pub fn parse_list(list: &str) -> impl Iterator<Item = SourceRef> + '_ {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .filter_map(|item| match SourceRef::parse(item) {
                Ok(source) => Some(source),
                Err(e) => {
                    tracing::debug!(item, error = %e, "Skipping undecodable source reference");
                    None
                }
            })
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AssetKind::Photo => write!(f, "{}{:016x}", PHOTO_PREFIX, self.id),
            AssetKind::Video => write!(f, "{}{:016x}", VIDEO_PREFIX, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_photo_and_video() {
        let photo = SourceRef::parse("thumb000000000000002a").unwrap();
        assert_eq!(photo, SourceRef::new(AssetKind::Photo, 42));

        let video = SourceRef::parse("video-00000000000000ff").unwrap();
        assert_eq!(video, SourceRef::new(AssetKind::Video, 255));
    }

    #[test]
    fn test_format_matches_catalog_encoding() {
        assert_eq!(
            SourceRef::new(AssetKind::Photo, 42).to_string(),
            "thumb000000000000002a"
        );
        assert_eq!(
            SourceRef::new(AssetKind::Video, 7).to_string(),
            "video-0000000000000007"
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SourceRef::parse("event0001").is_err());
        assert!(SourceRef::parse("thumbxyz").is_err());
        assert!(SourceRef::parse("").is_err());
    }

    #[test]
    fn test_parse_list_skips_empty_and_bad_items() {
        let refs: Vec<_> =
            SourceRef::parse_list("thumb0000000000000001,,video-0000000000000002,bogus,").collect();
        assert_eq!(
            refs,
            vec![
                SourceRef::new(AssetKind::Photo, 1),
                SourceRef::new(AssetKind::Video, 2),
            ]
        );
    }
}
