//! Document partitioning — splits a staged file into typed blocks and
//! renders them to markdown for downstream prompting.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::UpstreamError;
use crate::search::html_to_text;

/// Structural category of a parsed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCategory {
    Title,
    ListItem,
    Text,
}

/// One parsed unit of a document.
#[derive(Debug, Clone)]
pub struct Block {
    pub category: BlockCategory,
    pub text: String,
}

impl Block {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            category: BlockCategory::Text,
            text: text.into(),
        }
    }
}

/// Parses staged files into blocks. Swapped out in tests.
#[async_trait]
pub trait DocumentPartitioner: Send + Sync {
    async fn partition_file(&self, path: &Path) -> Result<Vec<Block>, UpstreamError>;
}

/// Default partitioner for text-based formats. Binary formats (pdf, office
/// documents) are rejected with an unsupported-content error.
pub struct TextPartitioner;

const TEXT_TYPES: &[&str] = &["text/plain", "text/csv", "application/xml", "text/xml"];

#[async_trait]
impl DocumentPartitioner for TextPartitioner {
    async fn partition_file(&self, path: &Path) -> Result<Vec<Block>, UpstreamError> {
        let content_type = super::detect_content_type(path)
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let raw = match content_type.as_str() {
            "text/markdown" => {
                let text = tokio::fs::read_to_string(path).await?;
                return Ok(partition_markdown(&text));
            }
            "text/html" => html_to_text(&tokio::fs::read_to_string(path).await?),
            t if TEXT_TYPES.contains(&t) => tokio::fs::read_to_string(path).await?,
            other => {
                return Err(UpstreamError::UnsupportedContent {
                    path: path.to_string_lossy().to_string(),
                    content_type: other.to_string(),
                });
            }
        };

        Ok(partition_plain(&raw))
    }
}

/// Split plain text on blank lines into text blocks.
fn partition_plain(raw: &str) -> Vec<Block> {
    raw.split("\n\n")
        .map(clean_text)
        .filter(|p| !p.is_empty())
        .map(Block::text)
        .collect()
}

/// Split markdown into blocks, tagging headings and list items.
fn partition_markdown(raw: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph = String::new();

    let mut flush = |paragraph: &mut String, blocks: &mut Vec<Block>| {
        let text = clean_text(paragraph);
        if !text.is_empty() {
            blocks.push(Block::text(text));
        }
        paragraph.clear();
    };

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix('#') {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block {
                category: BlockCategory::Title,
                text: heading.trim_start_matches('#').trim().to_string(),
            });
        } else if trimmed.starts_with("- ") || trimmed.starts_with("* ") {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block {
                category: BlockCategory::ListItem,
                text: trimmed[2..].trim().to_string(),
            });
        } else if trimmed.is_empty() {
            flush(&mut paragraph, &mut blocks);
        } else {
            if !paragraph.is_empty() {
                paragraph.push(' ');
            }
            paragraph.push_str(trimmed);
        }
    }
    flush(&mut paragraph, &mut blocks);
    blocks
}

/// Collapse runs of whitespace into single spaces.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render blocks to a single markdown document, prefixed with a source
/// header so the model can cite where the content came from.
pub fn blocks_to_markdown(source_name: &str, blocks: &[Block]) -> String {
    let mut out = format!(
        "Source: {source_name}\nIngested: {}\n\n",
        Utc::now().format("%Y-%m-%d")
    );
    for block in blocks {
        match block.category {
            BlockCategory::Title => {
                out.push_str("## ");
                out.push_str(&block.text);
            }
            BlockCategory::ListItem => {
                out.push_str("- ");
                out.push_str(&block.text);
            }
            BlockCategory::Text => out.push_str(&block.text),
        }
        out.push('\n');
    }
    out
}

/// Group blocks into character-bounded chunks, starting a fresh chunk at
/// each title so sections stay together.
pub fn chunk_blocks(blocks: &[Block], max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for block in blocks {
        let starts_section = block.category == BlockCategory::Title;
        let would_overflow = !current.is_empty() && current.len() + block.text.len() > max_chars;
        if (starts_section || would_overflow) && !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
            current = String::new();
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&block.text);
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }
    chunks
}
