//! Builds one tree generation from the catalog.

use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{DerivedAssetCache, Resolution};
use crate::catalog::{AssetRow, Catalog};
use crate::error::Result;
use crate::index::{Event, EventIndex, TagIndex};
use crate::paths::{asset_attributes, PathSynthesizer};
use crate::vfs::{Insert, Tree, TreeBuilder};

/// Counts reported after each scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub scan_id: u64,
    pub files: usize,
    pub replaced: usize,
    pub skipped: usize,
    pub derived: usize,
}

pub struct Scanner {
    catalog: Catalog,
    paths: PathSynthesizer,
    cache: Arc<DerivedAssetCache>,
    min_rating: i64,
    scan_count: u64,
    last: ScanSummary,
}

impl Scanner {
    pub fn new(catalog: Catalog, paths: PathSynthesizer, cache: Arc<DerivedAssetCache>, min_rating: i64) -> Self {
        Self {
            catalog,
            paths,
            cache,
            min_rating,
            scan_count: 0,
            last: ScanSummary::default(),
        }
    }

    pub fn last_summary(&self) -> ScanSummary {
        self.last
    }

    pub fn scan(&mut self) -> Result<Tree> {
        self.scan_count += 1;
        let scan_id = self.scan_count;
        let started = Instant::now();
        tracing::info!(scan_id, "Scan #{} started", scan_id);

        self.catalog.register_functions()?;
        let tags = TagIndex::build(&self.catalog)?;
        let events = EventIndex::build(&self.catalog, &self.paths)?;
        let assets = self.catalog.assets(self.min_rating)?;

        let mut summary = ScanSummary {
            scan_id,
            ..ScanSummary::default()
        };

        let placed: Vec<(&AssetRow, &Event)> = assets
            .iter()
            .filter_map(|asset| match events.get(asset.event_id) {
                Some(event) => Some((asset, event)),
                None => {
                    tracing::warn!(
                        asset_id = asset.id,
                        event_id = asset.event_id,
                        "Skipping asset whose event has no primary source"
                    );
                    summary.skipped += 1;
                    None
                }
            })
            .collect();

        let cache = &self.cache;
        let resolutions: Vec<Resolution> = placed
            .par_iter()
            .map(|(asset, _)| cache.resolve(asset))
            .collect();

        let mut builder = TreeBuilder::new(scan_id);
        for ((asset, event), resolution) in placed.into_iter().zip(resolutions) {
            if builder
                .directory(&event.path, &event.attributes, event.time)
                .is_none()
            {
                tracing::warn!(event_id = event.id, path = %event.path, "Event directory blocked by a file");
                summary.skipped += 1;
                continue;
            }

            let path = self.paths.file_path(&event.path, asset);
            let keywords = tags.keywords(asset.kind, asset.id);
            let attributes = asset_attributes(asset, keywords, &resolution.identity);
            if resolution.derived {
                summary.derived += 1;
            }

            match builder.insert_file(&path, resolution.backing, attributes, asset.exposure_time) {
                Insert::Added => summary.files += 1,
                Insert::Replaced { previous } => {
                    tracing::warn!(
                        asset_id = asset.id,
                        path = %path,
                        previous = ?previous,
                        "Path collision, keeping the later asset"
                    );
                    summary.replaced += 1;
                }
                Insert::Conflict => {
                    tracing::warn!(asset_id = asset.id, path = %path, "Path conflicts with a directory");
                    summary.skipped += 1;
                }
            }
        }

        let tree = builder.finish();
        tracing::info!(
            scan_id,
            files = summary.files,
            directories = tree.directory_count(),
            derived = summary.derived,
            skipped = summary.skipped,
            replaced = summary.replaced,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan #{} complete",
            scan_id
        );
        self.last = summary;
        Ok(tree)
    }
}
