//! Serialization sink for rendered queries.

use std::fs;
use std::path::Path;

use pqgen_core::{Query, Result};
use tracing::info;

/// Rendered queries separated by a blank line. Empty renderings are skipped.
pub fn render_queries<'q>(queries: impl IntoIterator<Item = &'q Query>) -> String {
    queries
        .into_iter()
        .map(Query::rendered)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn save_queries<'q>(path: impl AsRef<Path>, queries: impl IntoIterator<Item = &'q Query>) -> Result<()> {
    let path = path.as_ref();
    let mut text = render_queries(queries);
    if !text.is_empty() {
        text.push('\n');
    }
    fs::write(path, text)?;
    info!(path = %path.display(), "Saved queries");
    Ok(())
}
