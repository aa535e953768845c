//! Text extraction and chunking (§4.6).
//!
//! Extraction is dispatched by file extension: HTML is reduced to plain
//! text by stripping tags, PDF is parsed page-by-page with `pdf-extract`,
//! DOCX paragraphs are walked with `docx-rs`, and every other format is
//! treated as already-text.

use docx_rs::{DocumentChild, ParagraphChild, RunChild};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static pattern"))
}

pub fn extract_text(filename: &str, bytes: &[u8]) -> String {
    match extension(filename).as_str() {
        "html" | "htm" => strip_html(&String::from_utf8_lossy(bytes)),
        "pdf" => extract_pdf(bytes).unwrap_or_else(|| {
            warn!(filename, "pdf extraction failed, falling back to lossy text");
            String::from_utf8_lossy(bytes).into_owned()
        }),
        "docx" => extract_docx(bytes).unwrap_or_else(|| {
            warn!(filename, "docx extraction failed, falling back to lossy text");
            String::from_utf8_lossy(bytes).into_owned()
        }),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn extension(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn strip_html(html: &str) -> String {
    let without_tags = tag_pattern().replace_all(html, " ");
    without_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_pdf(bytes: &[u8]) -> Option<String> {
    pdf_extract::extract_text_from_mem(bytes).ok()
}

fn extract_docx(bytes: &[u8]) -> Option<String> {
    let docx = docx_rs::read_docx(bytes).ok()?;
    let mut text = String::new();
    for child in docx.document.children {
        if let DocumentChild::Paragraph(paragraph) = child {
            for run in paragraph.children {
                if let ParagraphChild::Run(run) = run {
                    for part in run.children {
                        if let RunChild::Text(t) = part {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            text.push('\n');
        }
    }
    Some(text)
}

/// Token-aware chunking, approximating tokens as whitespace-separated words
/// (a structure-aware chunker would split on headings/paragraphs first;
/// this worker degrades to sliding windows over words).
pub fn chunk_text(text: &str, target_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let step = target_tokens.saturating_sub(overlap_tokens).max(1);
    while start < words.len() {
        let end = (start + target_tokens).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_html_tags_and_collapses_whitespace() {
        let html = "<html><body><h1>Hi</h1><p>there   friend</p></body></html>";
        assert_eq!(strip_html(html), "Hi there friend");
    }

    #[test]
    fn passthrough_for_plain_text() {
        assert_eq!(extract_text("notes.txt", b"hello world"), "hello world");
    }

    #[test]
    fn malformed_pdf_falls_back_to_lossy_text() {
        assert_eq!(extract_text("broken.pdf", b"not a real pdf"), "not a real pdf");
    }

    #[test]
    fn chunk_text_splits_with_overlap() {
        let text = (0..20).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&text, 10, 2);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].split_whitespace().count() == 10);
    }

    #[test]
    fn chunk_text_of_empty_input_is_empty() {
        assert!(chunk_text("", 10, 2).is_empty());
    }
}
