//! Path and extended-attribute synthesis for events and assets.

pub mod template;

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use indexmap::IndexSet;
use std::collections::BTreeMap;

use crate::catalog::{AssetKind, AssetRow, EventRow};
use crate::config::{PathConfig, TimeZoneChoice};
use crate::error::Result;

pub use template::{Fields, Template};

pub const EVENT_FIELDS: &[&str] = &["id", "name", "comment"];
pub const ASSET_FIELDS: &[&str] = &["id", "title", "comment", "rating"];

pub const XATTR_EVENT_ID: &str = "user.shotwell.event_id";
pub const XATTR_EVENT_NAME: &str = "user.shotwell.event_name";
pub const XATTR_EVENT_COMMENT: &str = "user.shotwell.event_comment";
pub const XATTR_TITLE: &str = "user.shotwell.title";
pub const XATTR_COMMENT: &str = "user.shotwell.comment";
pub const XATTR_ID: &str = "user.shotwell.id";
pub const XATTR_KEYWORDS: &str = "user.shotwell.keywords";
pub const XATTR_RATING: &str = "user.shotwell.rating";
pub const XATTR_TRANSFORM_ID: &str = "user.shotwell.transform_id";

pub type Attributes = BTreeMap<String, String>;

/// Event fields after the name fallback has been applied.
struct EventFields<'a> {
    row: &'a EventRow,
    name: &'a str,
}

impl Fields for EventFields<'_> {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.row.id.to_string()),
            "name" => Some(self.name.to_string()),
            "comment" => self.row.comment.clone(),
            _ => None,
        }
    }
}

impl Fields for AssetRow {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.to_string()),
            "title" => self.title.clone(),
            "comment" => self.comment.clone(),
            "rating" => Some(self.rating.to_string()),
            _ => None,
        }
    }
}

/// A synthesized event directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPath {
    pub path: String,
    pub name: String,
}

/// Compiled path templates plus the zone used to expand their timestamps.
#[derive(Debug, Clone)]
pub struct PathSynthesizer {
    event_name: Template,
    event_path: Template,
    photo_path: Template,
    video_path: Template,
    zone: TimeZoneChoice,
}

impl PathSynthesizer {
    pub fn new(config: &PathConfig, zone: TimeZoneChoice) -> Result<Self> {
        let photo_path = Template::parse(&config.photo_path, ASSET_FIELDS)?;
        let video_path = match &config.video_path {
            Some(video) => Template::parse(video, ASSET_FIELDS)?,
            None => photo_path.clone(),
        };

        Ok(Self {
            event_name: Template::parse(&config.event_name, &[])?,
            event_path: Template::parse(&config.event_path, EVENT_FIELDS)?,
            photo_path,
            video_path,
            zone,
        })
    }

    pub fn datetime(&self, timestamp: i64) -> DateTime<FixedOffset> {
        let utc = Utc
            .timestamp_opt(timestamp, 0)
            .single()
            .unwrap_or_default();
        match self.zone {
            TimeZoneChoice::Utc => utc.fixed_offset(),
            TimeZoneChoice::Local => utc.with_timezone(&Local).fixed_offset(),
        }
    }

    /// Directory path for an event. Unnamed events take their name from the
    /// event-name template applied to the event time.
    pub fn event_path(&self, event: &EventRow) -> EventPath {
        let time = self.datetime(event.exposure_time);
        let name = match event.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.event_name.render(&time, &NoFields),
        };
        let path = self.event_path.render(
            &time,
            &EventFields {
                row: event,
                name: &name,
            },
        );
        EventPath { path, name }
    }

    /// `{directory}/{formatted name}{lowercased source extension}`
    pub fn file_path(&self, directory: &str, asset: &AssetRow) -> String {
        let template = match asset.kind {
            AssetKind::Photo => &self.photo_path,
            AssetKind::Video => &self.video_path,
        };
        let name = template.render(&self.datetime(asset.exposure_time), asset);
        let extension = asset
            .filename
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        format!("{}/{}{}", directory, name, extension)
    }

    /// Example mappings for a placeholder event, photo and video.
    pub fn preview(&self) -> Vec<String> {
        let now = Utc::now().timestamp();
        let event = EventRow {
            id: 1,
            name: Some("<event name>".to_string()),
            comment: Some("<event comment>".to_string()),
            exposure_time: 0,
        };
        let directory = self.event_path(&event).path;

        [
            (AssetKind::Photo, "photo.jpg"),
            (AssetKind::Video, "video.mp4"),
        ]
        .into_iter()
        .map(|(kind, filename)| {
            let asset = AssetRow {
                id: 1000,
                kind,
                filename: filename.into(),
                title: Some(format!("<{} title>", kind)),
                comment: Some(format!("<{} comment>", kind)),
                rating: 5,
                exposure_time: now,
                event_id: 1,
                transformations: None,
            };
            self.file_path(&directory, &asset)
        })
        .collect()
    }
}

struct NoFields;

impl Fields for NoFields {
    fn field(&self, _name: &str) -> Option<String> {
        None
    }
}

pub fn event_attributes(event: &EventRow, name: &str) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(XATTR_EVENT_ID.to_string(), event.id.to_string());
    attrs.insert(XATTR_EVENT_NAME.to_string(), name.to_string());
    attrs.insert(
        XATTR_EVENT_COMMENT.to_string(),
        event.comment.clone().unwrap_or_default(),
    );
    attrs
}

pub fn asset_attributes(asset: &AssetRow, keywords: &IndexSet<String>, identity: &str) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(XATTR_TITLE.to_string(), asset.title.clone().unwrap_or_default());
    attrs.insert(XATTR_COMMENT.to_string(), asset.comment.clone().unwrap_or_default());
    attrs.insert(XATTR_ID.to_string(), asset.id.to_string());
    attrs.insert(
        XATTR_KEYWORDS.to_string(),
        keywords.iter().map(String::as_str).collect::<Vec<_>>().join(","),
    );
    attrs.insert(XATTR_RATING.to_string(), asset.rating.to_string());
    attrs.insert(XATTR_TRANSFORM_ID.to_string(), identity.to_string());
    attrs
}
