//! Summarizer trait and a deterministic extractive implementation.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::document::ScoredDocument;
use crate::error::Result;

/// Level name for a one-sentence answer.
pub const LEVEL_SENTENCE: &str = "sentence";
/// Level name for a bulleted answer, one line per document.
pub const LEVEL_BULLET: &str = "bullet";
/// Level name for a single-paragraph answer.
pub const LEVEL_PARAGRAPH: &str = "paragraph";

/// Produces natural-language answers grounded in retrieved documents.
///
/// Implementations return one text per requested level, keyed by the level
/// name exactly as requested. Callers never pass an empty document list.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `documents` as an answer to `query` at each of `levels`.
    async fn summarize(
        &self,
        query: &str,
        documents: &[ScoredDocument],
        levels: &[String],
    ) -> Result<HashMap<String, String>>;
}

/// A model-free summarizer that quotes the leading sentence of each document.
///
/// - `sentence`: the lead sentence of the top-ranked document.
/// - `bullet`: one `- <lead sentence> [id]` line per document.
/// - `paragraph` and any other level: lead sentences joined into one
///   paragraph, each followed by its `[id]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    fn render(level: &str, documents: &[ScoredDocument]) -> String {
        match level {
            LEVEL_SENTENCE => {
                documents.first().map(|d| lead_sentence(&d.document.text)).unwrap_or_default()
            }
            LEVEL_BULLET => documents
                .iter()
                .map(|d| format!("- {} [{}]", lead_sentence(&d.document.text), d.document.id))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => documents
                .iter()
                .map(|d| format!("{} [{}]", lead_sentence(&d.document.text), d.document.id))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(
        &self,
        _query: &str,
        documents: &[ScoredDocument],
        levels: &[String],
    ) -> Result<HashMap<String, String>> {
        Ok(levels.iter().map(|level| (level.clone(), Self::render(level, documents))).collect())
    }
}

/// The first sentence of `text`, whitespace-collapsed.
fn lead_sentence(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let end = collapsed
        .char_indices()
        .find(|(i, c)| {
            matches!(c, '.' | '!' | '?')
                && collapsed[i + c.len_utf8()..].chars().next().is_none_or(char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8());
    match end {
        Some(end) => collapsed[..end].to_string(),
        None => collapsed,
    }
}
