//! Output of the upstream HTML extraction filter.
//!
//! The filter turns an HTML page into `{title?, text, author?, date?,
//! language?}` and emits `{}` when extraction fails. [`ExtractedPage`]
//! accepts either shape; [`ExtractedPage::into_document`] is where a missing
//! body becomes a validation error.

use serde::{Deserialize, Serialize};

use crate::document::{Document, URL_METADATA_KEY};
use crate::error::{Result, SemanticError};

/// Structured text extracted from an HTML page. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedPage {
    /// Page title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Main body text with boilerplate removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Author byline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Publication date as reported by the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Detected language code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl ExtractedPage {
    /// Parse the filter's JSON output.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::Validation`] if `json` is not an object of the
    /// expected shape.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| SemanticError::Validation(format!("malformed extraction output: {e}")))
    }

    /// Whether extraction produced no usable body text.
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(|t| t.trim().is_empty())
    }

    /// Convert into an indexable [`Document`].
    ///
    /// Present optional fields are copied into metadata under their own
    /// names, and `url` (if given) under `"url"`.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::Validation`] if the page has no body text or
    /// `id` is empty.
    pub fn into_document(self, id: impl Into<String>, url: Option<&str>) -> Result<Document> {
        let id = id.into();
        if self.is_empty() {
            return Err(SemanticError::Validation(format!("extracted page '{id}' has no text")));
        }
        let mut document = Document::new(id, self.text.unwrap_or_default());
        let optional = [
            ("title", self.title),
            ("author", self.author),
            ("date", self.date),
            ("language", self.language),
        ];
        for (key, value) in optional {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                document.metadata.insert(key.to_string(), value);
            }
        }
        if let Some(url) = url {
            document.metadata.insert(URL_METADATA_KEY.to_string(), url.to_string());
        }
        document.validate()?;
        Ok(document)
    }
}

/// An [`ExtractedPage`] addressed for indexing.
///
/// On the wire the page fields sit alongside `id` and `url`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedDocument {
    /// Document ID to index the page under.
    pub id: String,
    /// Source URL, cited alongside the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// The extracted content.
    #[serde(flatten)]
    pub page: ExtractedPage,
}

impl ExtractedDocument {
    /// Convert into an indexable [`Document`]. See [`ExtractedPage::into_document`].
    pub fn into_document(self) -> Result<Document> {
        self.page.into_document(self.id, self.url.as_deref())
    }
}
