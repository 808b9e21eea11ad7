use crate::error::EngineError;
use crate::traits::TextExtractor;
use lopdf::Document;

const PDF_MAGIC: &[u8] = b"%PDF";

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, source: &[u8]) -> Result<String, EngineError> {
        let document =
            Document::load_mem(source).map_err(|error| EngineError::Extraction(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| EngineError::Extraction(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(text);
            }
        }

        Ok(pages.join("\n"))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, source: &[u8]) -> Result<String, EngineError> {
        std::str::from_utf8(source)
            .map(str::to_string)
            .map_err(|error| EngineError::Extraction(format!("source is not utf-8: {error}")))
    }
}

/// Picks the PDF extractor for `%PDF` sources and plain text otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoExtractor {
    pdf: PdfTextExtractor,
    plain: PlainTextExtractor,
}

impl TextExtractor for AutoExtractor {
    fn extract_text(&self, source: &[u8]) -> Result<String, EngineError> {
        if source.starts_with(PDF_MAGIC) {
            self.pdf.extract_text(source)
        } else {
            self.plain.extract_text(source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() -> Result<(), EngineError> {
        let text = PlainTextExtractor.extract_text("Line one\nLine two".as_bytes())?;
        assert_eq!(text, "Line one\nLine two");
        Ok(())
    }

    #[test]
    fn blank_plain_text_is_returned_as_is() -> Result<(), EngineError> {
        assert_eq!(PlainTextExtractor.extract_text(b"  \n\t ")?, "  \n\t ");
        Ok(())
    }

    #[test]
    fn invalid_utf8_is_an_extraction_error() {
        assert!(matches!(
            PlainTextExtractor.extract_text(&[0xff, 0xfe, 0x00]),
            Err(EngineError::Extraction(_))
        ));
    }

    #[test]
    fn broken_pdf_is_an_extraction_error() {
        let result = AutoExtractor::default().extract_text(b"%PDF-1.4\n%broken");
        assert!(matches!(result, Err(EngineError::Extraction(_))));
    }

    #[test]
    fn auto_extractor_reads_non_pdf_as_text() -> Result<(), EngineError> {
        let text = AutoExtractor::default().extract_text(b"plain notes")?;
        assert_eq!(text, "plain notes");
        Ok(())
    }
}
