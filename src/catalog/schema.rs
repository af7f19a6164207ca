//! The subset of the Shotwell schema the catalog queries, for seeding
//! in-memory catalogs in tests.

use rusqlite::{params, Connection};

use super::Catalog;

pub const SCHEMA: &str = r#"
CREATE TABLE phototable (
    id INTEGER PRIMARY KEY,
    filename TEXT UNIQUE NOT NULL,
    exposure_time INTEGER,
    title TEXT,
    comment TEXT,
    rating INTEGER DEFAULT 0,
    event_id INTEGER DEFAULT -1,
    transformations TEXT
);

CREATE TABLE videotable (
    id INTEGER PRIMARY KEY,
    filename TEXT UNIQUE NOT NULL,
    exposure_time INTEGER,
    title TEXT,
    comment TEXT,
    rating INTEGER DEFAULT 0,
    event_id INTEGER DEFAULT -1
);

CREATE TABLE eventtable (
    id INTEGER PRIMARY KEY,
    name TEXT,
    comment TEXT,
    primary_source_id TEXT
);

CREATE TABLE tagtable (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    photo_id_list TEXT
);
"#;

pub fn fixture_catalog() -> Catalog {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    Catalog::from_connection(conn).unwrap()
}

impl Catalog {
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

pub fn insert_photo(
    conn: &Connection,
    id: i64,
    filename: &str,
    exposure_time: i64,
    rating: i64,
    event_id: i64,
    transformations: Option<&str>,
) {
    conn.execute(
        "INSERT INTO phototable (id, filename, exposure_time, title, comment, rating, event_id, transformations)
         VALUES (?, ?, ?, NULL, NULL, ?, ?, ?)",
        params![id, filename, exposure_time, rating, event_id, transformations],
    )
    .unwrap();
}

pub fn insert_video(
    conn: &Connection,
    id: i64,
    filename: &str,
    exposure_time: i64,
    rating: i64,
    event_id: i64,
) {
    conn.execute(
        "INSERT INTO videotable (id, filename, exposure_time, rating, event_id)
         VALUES (?, ?, ?, ?, ?)",
        params![id, filename, exposure_time, rating, event_id],
    )
    .unwrap();
}

pub fn insert_event(
    conn: &Connection,
    id: i64,
    name: Option<&str>,
    comment: Option<&str>,
    primary_source_id: &str,
) {
    conn.execute(
        "INSERT INTO eventtable (id, name, comment, primary_source_id) VALUES (?, ?, ?, ?)",
        params![id, name, comment, primary_source_id],
    )
    .unwrap();
}

pub fn insert_tag(conn: &Connection, id: i64, name: &str, photo_id_list: Option<&str>) {
    conn.execute(
        "INSERT INTO tagtable (id, name, photo_id_list) VALUES (?, ?, ?)",
        params![id, name, photo_id_list],
    )
    .unwrap();
}
