// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document metadata record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::DocumentFormat;

/// Text rendered at the boundary for any absent optional field.
pub const UNKNOWN: &str = "unknown";

/// Descriptive metadata for one document.
///
/// Only `page_count`, `byte_size` and `mime_type` are always present. A
/// `page_count` of 0 means the parser could not determine it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Vec<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    /// ISO-8601 / RFC 3339 creation timestamp.
    pub created_at: Option<String>,
    /// ISO-8601 / RFC 3339 modification timestamp.
    pub modified_at: Option<String>,
    pub page_count: u32,
    pub byte_size: u64,
    pub mime_type: String,
    pub custom: BTreeMap<String, String>,
}

impl DocumentMetadata {
    /// Fallback record used when extraction fails or has not run yet.
    pub fn sentinel(format: DocumentFormat, byte_size: u64) -> Self {
        Self {
            byte_size,
            mime_type: format.mime_type().to_owned(),
            ..Self::default()
        }
    }

    /// Whether the page count is known.
    pub fn has_page_count(&self) -> bool {
        self.page_count > 0
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = page_count;
        self
    }

    /// Add a keyword unless it is already present.
    pub fn add_keyword(&mut self, keyword: impl Into<String>) {
        let keyword = keyword.into();
        if !keyword.is_empty() && !self.keywords.contains(&keyword) {
            self.keywords.push(keyword);
        }
    }

    pub fn set_custom(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom.insert(key.into(), value.into());
    }
}
