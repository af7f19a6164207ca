use std::collections::HashMap;

use crate::catalog::{Catalog, EventRow};
use crate::error::Result;
use crate::paths::{event_attributes, Attributes, PathSynthesizer};

/// An event with its synthesized directory and attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: i64,
    pub path: String,
    pub time: i64,
    pub attributes: Attributes,
}

impl Event {
    pub fn from_row(row: &EventRow, paths: &PathSynthesizer) -> Self {
        let event_path = paths.event_path(row);
        Self {
            id: row.id,
            attributes: event_attributes(row, &event_path.name),
            path: event_path.path,
            time: row.exposure_time,
        }
    }
}

#[derive(Debug, Default)]
pub struct EventIndex {
    events: HashMap<i64, Event>,
}

impl EventIndex {
    pub fn build(catalog: &Catalog, paths: &PathSynthesizer) -> Result<Self> {
        Ok(Self::from_rows(&catalog.events()?, paths))
    }

    pub fn from_rows(rows: &[EventRow], paths: &PathSynthesizer) -> Self {
        let events = rows
            .iter()
            .map(|row| (row.id, Event::from_row(row, paths)))
            .collect();
        Self { events }
    }

    pub fn get(&self, id: i64) -> Option<&Event> {
        self.events.get(&id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::{fixture_catalog, insert_event, insert_photo};
    use crate::config::{PathConfig, TimeZoneChoice};
    use crate::paths::{XATTR_EVENT_ID, XATTR_EVENT_NAME};

    #[test]
    fn test_build_events() {
        let catalog = fixture_catalog();
        insert_photo(catalog.conn(), 1, "/p/a.jpg", 1_710_504_000, 0, 3, None);
        insert_event(catalog.conn(), 3, None, None, "thumb0000000000000001");
        // primary source missing from the catalog: no row joins
        insert_event(catalog.conn(), 4, Some("Ghost"), None, "thumb00000000000000ff");

        let paths = PathSynthesizer::new(&PathConfig::default(), TimeZoneChoice::Utc).unwrap();
        let index = EventIndex::build(&catalog, &paths).unwrap();

        assert_eq!(index.len(), 1);
        let event = index.get(3).unwrap();
        assert_eq!(event.path, "2024-03 15 Fri");
        assert_eq!(event.time, 1_710_504_000);
        assert_eq!(event.attributes[XATTR_EVENT_ID], "3");
        assert_eq!(event.attributes[XATTR_EVENT_NAME], "15 Fri");
        assert!(index.get(4).is_none());
    }
}
