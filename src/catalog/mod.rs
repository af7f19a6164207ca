//! Read-only access to a Shotwell `photo.db`.
//!
//! Rows are decoded once at the query boundary into fixed structs so the
//! rest of the crate never deals with loosely typed records.

pub mod source_ref;

#[cfg(test)]
pub(crate) mod schema;

use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use source_ref::{AssetKind, SourceRef};

const ASSET_SQL: &str = r#"
    SELECT 'photo' AS kind, P.id, P.filename, P.title, P.comment, P.rating,
           P.exposure_time, P.event_id, P.transformations
    FROM phototable P
    WHERE P.rating >= ?1 AND P.event_id > 0
    UNION ALL
    SELECT 'video' AS kind, V.id, V.filename, V.title, V.comment, V.rating,
           V.exposure_time, V.event_id, NULL
    FROM videotable V
    WHERE V.rating >= ?1 AND V.event_id > 0
    ORDER BY kind, id
"#;

const EVENT_SQL: &str = r#"
    SELECT E.id, E.name, E.comment, P.exposure_time
    FROM eventtable E, phototable P
    WHERE source_type(E.primary_source_id) = 'photo'
      AND source_id(E.primary_source_id) = P.id
    UNION ALL
    SELECT E.id, E.name, E.comment, V.exposure_time
    FROM eventtable E, videotable V
    WHERE source_type(E.primary_source_id) = 'video'
      AND source_id(E.primary_source_id) = V.id
"#;

const TAG_SQL: &str = "SELECT name, photo_id_list FROM tagtable ORDER BY id";

/// One qualifying photo or video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRow {
    pub id: i64,
    pub kind: AssetKind,
    pub filename: PathBuf,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub rating: i64,
    pub exposure_time: i64,
    pub event_id: i64,
    pub transformations: Option<String>,
}

/// An event joined to the exposure time of its primary source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub id: i64,
    pub name: Option<String>,
    pub comment: Option<String>,
    pub exposure_time: i64,
}

/// A hierarchical tag name and its raw, comma-separated member list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub name: String,
    pub source_list: Option<String>,
}

pub struct Catalog {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Catalog {
    /// Open the catalog database read-only.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let catalog = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        catalog.register_functions()?;
        Ok(catalog)
    }

    /// Wrap an already-open connection (used for in-memory catalogs).
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let catalog = Self { conn, path: None };
        catalog.register_functions()?;
        Ok(catalog)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Expose the source reference decoder to SQL as `source_type(ref)` and
    /// `source_id(ref)`. Undecodable references yield NULL so they simply
    /// fail to join.
    pub fn register_functions(&self) -> Result<()> {
        let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

        self.conn
            .create_scalar_function("source_type", 1, flags, |ctx| {
                let value = ctx.get::<Option<String>>(0)?;
                Ok(value
                    .and_then(|v| SourceRef::parse(&v).ok())
                    .map(|source| source.kind.as_str()))
            })?;

        self.conn
            .create_scalar_function("source_id", 1, flags, |ctx| {
                let value = ctx.get::<Option<String>>(0)?;
                Ok(value
                    .and_then(|v| SourceRef::parse(&v).ok())
                    .map(|source| source.id))
            })?;

        Ok(())
    }

    /// All photos and videos rated at least `min_rating` that belong to an
    /// event, ordered by kind then id.
    pub fn assets(&self, min_rating: i64) -> Result<Vec<AssetRow>> {
        let mut stmt = self.conn.prepare(ASSET_SQL)?;
        let rows = stmt.query_map([min_rating], |row| {
            let kind: String = row.get(0)?;
            let filename: String = row.get(2)?;
            Ok(AssetRow {
                id: row.get(1)?,
                kind: AssetKind::from_name(&kind).unwrap_or(AssetKind::Photo),
                filename: PathBuf::from(filename),
                title: row.get(3)?,
                comment: row.get(4)?,
                rating: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
                exposure_time: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
                event_id: row.get(7)?,
                transformations: row.get(8)?,
            })
        })?;

        let mut assets = Vec::new();
        for row in rows {
            match row {
                Ok(asset) => assets.push(asset),
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable asset row"),
            }
        }
        Ok(assets)
    }

    pub fn events(&self) -> Result<Vec<EventRow>> {
        let mut stmt = self.conn.prepare(EVENT_SQL)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(EventRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    comment: row.get(2)?,
                    exposure_time: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn tags(&self) -> Result<Vec<TagRow>> {
        let mut stmt = self.conn.prepare(TAG_SQL)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TagRow {
                    name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    source_list: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::{fixture_catalog, insert_event, insert_photo, insert_video};

    #[test]
    fn test_source_functions_in_sql() {
        let catalog = fixture_catalog();
        let (kind, id): (String, i64) = catalog
            .conn
            .query_row(
                "SELECT source_type('video-000000000000000a'), source_id('video-000000000000000a')",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(kind, "video");
        assert_eq!(id, 10);

        let bad: Option<i64> = catalog
            .conn
            .query_row("SELECT source_id('nonsense')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(bad, None);
    }

    #[test]
    fn test_assets_filter_rating_and_event() {
        let catalog = fixture_catalog();
        insert_event(&catalog.conn, 1, Some("Party"), None, "thumb0000000000000001");
        insert_photo(&catalog.conn, 1, "/photos/a.JPG", 1_700_000_000, 3, 1, None);
        insert_photo(&catalog.conn, 2, "/photos/b.jpg", 1_700_000_000, 0, 1, None);
        insert_photo(&catalog.conn, 3, "/photos/c.jpg", 1_700_000_000, 5, 0, None);
        insert_video(&catalog.conn, 4, "/videos/d.MP4", 1_700_000_000, 2, 1);

        let assets = catalog.assets(1).unwrap();
        let ids: Vec<_> = assets.iter().map(|a| (a.kind, a.id)).collect();
        assert_eq!(ids, vec![(AssetKind::Photo, 1), (AssetKind::Video, 4)]);
        assert_eq!(assets[1].transformations, None);
    }

    #[test]
    fn test_events_join_primary_source() {
        let catalog = fixture_catalog();
        insert_photo(&catalog.conn, 5, "/photos/a.jpg", 1_000, 0, 1, None);
        insert_video(&catalog.conn, 6, "/videos/b.mp4", 2_000, 0, 2);
        insert_event(&catalog.conn, 1, Some("Beach"), Some("sandy"), "thumb0000000000000005");
        insert_event(&catalog.conn, 2, None, None, "video-0000000000000006");

        let mut events = catalog.events().unwrap();
        events.sort_by_key(|e| e.id);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].exposure_time, 1_000);
        assert_eq!(events[0].name.as_deref(), Some("Beach"));
        assert_eq!(events[1].exposure_time, 2_000);
        assert_eq!(events[1].name, None);
    }
}
