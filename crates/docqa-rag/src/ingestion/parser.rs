//! Text extraction for the supported document formats

use pulldown_cmark::{Event, Options, Parser, TagEnd};
use std::panic::{self, AssertUnwindSafe};

use crate::error::{Error, Result};
use crate::types::DocumentFormat;

/// Clean up PDF text by replacing typographic characters with plain ones
fn cleanup_pdf_text(text: &str) -> String {
    let text = text
        .replace('\0', "")
        .replace(['\u{2010}', '\u{2011}', '\u{2013}'], "-") // Hyphens and en dash
        .replace('\u{2014}', "--") // Em dash
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{2022}', "* ") // Bullet
        .replace('\u{2026}', "...")
        .replace('\u{00A0}', " ")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl");

    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run a parser backend, turning a panic into an extraction error.
///
/// Relies on the unwinding panic strategy; the release profile keeps it.
fn contain_panic<T>(document_id: &str, parse: impl FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(parse))
        .map_err(|_| Error::extraction(document_id, "parser panicked on malformed input"))
}

/// Extracted text plus where each page begins
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    /// `(char offset, 1-based page)` for every non-empty page, ascending
    pages: Vec<(usize, u32)>,
}

impl ExtractedText {
    fn unpaged(text: String) -> Self {
        Self {
            text,
            pages: Vec::new(),
        }
    }

    /// Join cleaned pages with blank lines, skipping pages with no text
    fn from_pages<I>(pages: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut out = Self::default();
        let mut chars = 0;

        for (i, page) in pages.into_iter().enumerate() {
            if page.is_empty() {
                continue;
            }
            if !out.text.is_empty() {
                out.text.push_str("\n\n");
                chars += 2;
            }
            out.pages.push((chars, i as u32 + 1));
            chars += page.chars().count();
            out.text.push_str(&page);
        }
        out
    }

    /// Page holding character `offset`, if the source had pages
    pub fn page_at(&self, offset: usize) -> Option<u32> {
        let after = self.pages.partition_point(|&(start, _)| start <= offset);
        self.pages
            .get(after.saturating_sub(1))
            .map(|&(_, page)| page)
    }
}

/// Format-dispatching text extractor
pub struct FileParser;

impl FileParser {
    /// Extract plain text from document bytes.
    ///
    /// Blocking; PDF extraction in particular can take a while, so async
    /// callers should run this on the blocking pool.
    pub fn extract(document_id: &str, data: &[u8], format: DocumentFormat) -> Result<String> {
        Self::extract_pages(document_id, data, format).map(|extracted| extracted.text)
    }

    /// Like [`FileParser::extract`], keeping page boundaries for PDFs
    pub fn extract_pages(
        document_id: &str,
        data: &[u8],
        format: DocumentFormat,
    ) -> Result<ExtractedText> {
        let extracted = match format {
            DocumentFormat::Pdf => Self::parse_pdf(document_id, data)?,
            DocumentFormat::Txt => ExtractedText::unpaged(Self::parse_text(document_id, data)?),
            DocumentFormat::Markdown => {
                ExtractedText::unpaged(render_markdown(&Self::parse_text(document_id, data)?))
            }
        };

        tracing::debug!(
            "Extracted {} characters from {} ({})",
            extracted.text.chars().count(),
            document_id,
            format
        );
        Ok(extracted)
    }

    /// Parse PDF document page by page
    fn parse_pdf(document_id: &str, data: &[u8]) -> Result<ExtractedText> {
        // pdf-extract panics on some malformed fonts instead of returning an error
        let pages = contain_panic(document_id, || {
            pdf_extract::extract_text_from_mem_by_pages(data)
        })?
        .map_err(|e| Error::extraction(document_id, e.to_string()))?;

        let extracted = ExtractedText::from_pages(pages.iter().map(|page| cleanup_pdf_text(page)));
        if extracted.text.is_empty() {
            return Err(Error::extraction(
                document_id,
                "No text content could be extracted from PDF",
            ));
        }

        Ok(extracted)
    }

    /// Decode strict UTF-8, dropping a leading byte-order mark
    fn parse_text(document_id: &str, data: &[u8]) -> Result<String> {
        let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
        String::from_utf8(data.to_vec()).map_err(|e| {
            Error::extraction(
                document_id,
                format!("invalid UTF-8 at byte {}", e.utf8_error().valid_up_to()),
            )
        })
    }
}

/// Render markdown to plain text, keeping block structure as blank lines
fn render_markdown(source: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let mut out = String::with_capacity(source.len());

    for event in Parser::new_ext(source, options) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock) => {
                out.push_str("\n\n")
            }
            Event::End(TagEnd::Item | TagEnd::TableHead | TagEnd::TableRow) => out.push('\n'),
            Event::End(TagEnd::TableCell) => out.push(' '),
            _ => {}
        }
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_strict_utf8() {
        let text = FileParser::extract("a.txt", "héllo".as_bytes(), DocumentFormat::Txt).unwrap();
        assert_eq!(text, "héllo");

        let err = FileParser::extract("b.txt", &[0x68, 0xFF, 0x69], DocumentFormat::Txt).unwrap_err();
        match err {
            Error::Extraction { document_id, .. } => assert_eq!(document_id, "b.txt"),
            other => panic!("expected extraction error, got {other:?}"),
        }
    }

    #[test]
    fn test_bom_is_dropped() {
        let text = FileParser::extract("a.txt", b"\xEF\xBB\xBFhi", DocumentFormat::Txt).unwrap();
        assert_eq!(text, "hi");
    }

    #[test]
    fn test_markdown_rendered_to_plain_text() {
        let md = "# Title\n\nSome *emphasis* and `code`.\n\n- one\n- two\n";
        let text = FileParser::extract("doc.md", md.as_bytes(), DocumentFormat::Markdown).unwrap();

        assert!(text.starts_with("Title\n\n"));
        assert!(text.contains("Some emphasis and code."));
        assert!(text.contains("one\ntwo"));
        assert!(!text.contains('#'));
        assert!(!text.contains('*'));
    }

    #[test]
    fn test_backend_panic_is_extraction_error() {
        let result: Result<()> = contain_panic("broken.pdf", || panic!("bad font table"));
        assert!(matches!(result, Err(Error::Extraction { .. })));
        assert_eq!(contain_panic("ok.pdf", || 7).unwrap(), 7);
    }

    #[test]
    fn test_corrupt_pdf_is_extraction_error() {
        let err = FileParser::extract("broken.pdf", b"not a pdf at all", DocumentFormat::Pdf)
            .unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn test_pages_map_offsets_to_page_numbers() {
        let extracted = ExtractedText::from_pages(vec![
            "first".to_string(),
            String::new(),
            "third".to_string(),
        ]);

        assert_eq!(extracted.text, "first\n\nthird");
        assert_eq!(extracted.page_at(0), Some(1));
        assert_eq!(extracted.page_at(4), Some(1));
        assert_eq!(extracted.page_at(7), Some(3));
        assert_eq!(extracted.page_at(100), Some(3));
    }

    #[test]
    fn test_text_formats_have_no_pages() {
        let extracted = FileParser::extract_pages("a.txt", b"hello", DocumentFormat::Txt).unwrap();
        assert_eq!(extracted.page_at(0), None);
    }

    #[test]
    fn test_cleanup_pdf_text() {
        let cleaned = cleanup_pdf_text("  \u{FB01}rst\u{2014}line  \n\n\u{201C}quoted\u{201D}\0\n");
        assert_eq!(cleaned, "first--line\n\"quoted\"");
    }
}
