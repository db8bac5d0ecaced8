// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Page and widget specifications as produced by the parser.
//!
//! A page is an ordered list of widgets; only interactive widgets are ever
//! instantiated. Specs are immutable once loaded.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::id::{PageUrl, WidgetIndex};

/// One widget on a page, tagged the way the wire and manifests spell it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WidgetSpec {
    /// Inert markdown block; never instantiated.
    Markdown { contents: String },
    /// Read-only live view of a file inside the room volume.
    Text { file: String },
    /// Read-only live view of an image file; MIME bound at parse time.
    Image { file: String, mime: String },
    /// Click triggers one bounded command run.
    Button { label: String, command: String },
    /// Bidirectional file editor.
    Editor { file: String },
    /// Bidirectional PTY shell.
    Terminal {
        #[serde(rename = "workingDirectory")]
        working_directory: String,
    },
}

impl WidgetSpec {
    pub fn is_interactive(&self) -> bool {
        !matches!(self, Self::Markdown { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Markdown { .. } => "markdown",
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Button { .. } => "button",
            Self::Editor { .. } => "editor",
            Self::Terminal { .. } => "terminal",
        }
    }
}

/// Metadata served on the page-listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PageMetadata {
    #[serde(rename = "isInteractive")]
    pub is_interactive: bool,
    /// Container build context for this page; not serialized.
    #[serde(skip)]
    pub base_path: PathBuf,
    pub url: PageUrl,
    pub title: String,
}

/// A fully parsed page: metadata plus its ordered widgets.
#[derive(Debug, Clone, Serialize)]
pub struct PageSpec {
    #[serde(flatten)]
    pub metadata: PageMetadata,
    pub widgets: Vec<WidgetSpec>,
}

impl PageSpec {
    pub fn url(&self) -> &PageUrl {
        &self.metadata.url
    }

    pub fn is_interactive(&self) -> bool {
        self.metadata.is_interactive
    }

    /// Interactive widgets with their page-order indices.
    pub fn interactive_widgets(&self) -> impl Iterator<Item = (WidgetIndex, &WidgetSpec)> {
        self.widgets
            .iter()
            .enumerate()
            .filter(|(_, widget)| widget.is_interactive())
            .map(|(index, widget)| (WidgetIndex(index), widget))
    }
}

/// Search the loaded pages for the one with the given URL.
pub fn page_from_url<'a>(pages: &'a [PageSpec], url: &PageUrl) -> Option<&'a PageSpec> {
    pages.iter().find(|page| page.url() == url)
}

#[cfg(test)]
#[path = "page_tests.rs"]
mod tests;
