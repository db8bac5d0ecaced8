// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loading page specs from a pages directory.
//!
//! Markdown rendering is the front-end's concern; the backend consumes a
//! `page.json` manifest per page directory. A page is interactive when a
//! `Dockerfile` sits next to its manifest — that is what the room image is
//! built from.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::id::PageUrl;
use crate::page::{PageMetadata, PageSpec, WidgetSpec};

/// Source of page specifications.
pub trait Parser {
    fn pages(&self) -> anyhow::Result<Vec<PageSpec>>;
}

/// Name of the per-page manifest file.
const MANIFEST_NAME: &str = "page.json";

/// On-disk manifest format: title plus the ordered widget list.
#[derive(Debug, Deserialize)]
struct PageManifest {
    title: String,
    #[serde(default)]
    widgets: Vec<WidgetSpec>,
}

/// Parses every page below a root directory. The page URL is the directory
/// path relative to the root (`/` for the root itself).
pub struct DirectoryParser {
    pages_directory: PathBuf,
}

impl DirectoryParser {
    pub fn new(pages_directory: impl Into<PathBuf>) -> Self {
        Self { pages_directory: pages_directory.into() }
    }

    fn load_page(&self, directory: &Path) -> anyhow::Result<PageSpec> {
        let manifest_path = directory.join(MANIFEST_NAME);
        let contents = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("failed to read {}", manifest_path.display()))?;
        let manifest: PageManifest = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", manifest_path.display()))?;

        let url = page_url_for(&self.pages_directory, directory)?;
        let is_interactive = directory.join("Dockerfile").exists();

        Ok(PageSpec {
            metadata: PageMetadata {
                is_interactive,
                base_path: directory.to_path_buf(),
                url,
                title: manifest.title,
            },
            widgets: manifest.widgets,
        })
    }

    fn visit(&self, directory: &Path, pages: &mut Vec<PageSpec>) -> anyhow::Result<()> {
        if directory.join(MANIFEST_NAME).is_file() {
            pages.push(self.load_page(directory)?);
        }

        let entries = std::fs::read_dir(directory)
            .with_context(|| format!("failed to read directory {}", directory.display()))?;
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                self.visit(&entry.path(), pages)?;
            }
        }
        Ok(())
    }
}

impl Parser for DirectoryParser {
    fn pages(&self) -> anyhow::Result<Vec<PageSpec>> {
        let mut pages = Vec::new();
        self.visit(&self.pages_directory, &mut pages)?;
        pages.sort_by(|a, b| a.url().as_str().cmp(b.url().as_str()));
        Ok(pages)
    }
}

/// Page URL for a page directory: its path relative to the pages root.
fn page_url_for(root: &Path, directory: &Path) -> anyhow::Result<PageUrl> {
    let relative = directory
        .strip_prefix(root)
        .with_context(|| format!("page directory {} escapes pages root", directory.display()))?;

    let mut url = String::from("/");
    for component in relative.components() {
        if url.len() > 1 {
            url.push('/');
        }
        url.push_str(&component.as_os_str().to_string_lossy());
    }
    Ok(PageUrl::parse(&url)?)
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
