use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::catalog::{AssetKind, Catalog, SourceRef, TagRow};
use crate::error::Result;

static NO_KEYWORDS: LazyLock<IndexSet<String>> = LazyLock::new(IndexSet::new);

/// Keywords per `(kind, asset id)` in tag-table order, built once per scan.
#[derive(Debug, Default)]
pub struct TagIndex {
    keywords: HashMap<(AssetKind, i64), IndexSet<String>>,
}

impl TagIndex {
    pub fn build(catalog: &Catalog) -> Result<Self> {
        Ok(Self::from_rows(catalog.tags()?))
    }

    pub fn from_rows(rows: impl IntoIterator<Item = TagRow>) -> Self {
        let mut index = Self::default();

        for row in rows {
            let Some(list) = row.source_list.as_deref() else {
                continue;
            };
            let keyword = leaf_name(&row.name);
            for source in SourceRef::parse_list(list) {
                index.insert(source, keyword);
            }
        }

        index
    }

    /// Add `keyword` to the set for `source`, creating the set if needed.
    pub fn insert(&mut self, source: SourceRef, keyword: &str) {
        self.keywords
            .entry((source.kind, source.id))
            .or_default()
            .insert(keyword.to_string());
    }

    pub fn keywords(&self, kind: AssetKind, id: i64) -> &IndexSet<String> {
        self.keywords.get(&(kind, id)).unwrap_or(&NO_KEYWORDS)
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

/// Last segment of a slash-delimited hierarchical tag name.
fn leaf_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
