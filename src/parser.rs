//! Verse XML parsing
//!
//! Expected shape:
//!
//! ```xml
//! <verses>
//!   <verse><text>...</text><reference>John 3:16</reference><category>Hope</category></verse>
//! </verses>
//! ```

use crate::error::VerseError;
use crate::verse::VerseRecord;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

/// Number of leading characters inspected by the HTML sniff
const SNIFF_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Text,
    Reference,
    Category,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"text" => Some(Field::Text),
            b"reference" => Some(Field::Reference),
            b"category" => Some(Field::Category),
            _ => None,
        }
    }
}

#[derive(Default)]
struct PendingVerse {
    text: String,
    reference: String,
    category: String,
}

impl PendingVerse {
    fn push(&mut self, field: Field, chunk: &str) {
        match field {
            Field::Text => self.text.push_str(chunk),
            Field::Reference => self.reference.push_str(chunk),
            Field::Category => self.category.push_str(chunk),
        }
    }

    fn finish(self) -> Option<VerseRecord> {
        let text = self.text.trim();
        let reference = self.reference.trim();
        if text.is_empty() || reference.is_empty() {
            return None;
        }
        let category = self.category.trim();
        Some(VerseRecord {
            text: text.to_string(),
            reference: reference.to_string(),
            categories: if category.is_empty() {
                Vec::new()
            } else {
                vec![category.to_string()]
            },
        })
    }
}

/// Detect an HTML page served in place of verse XML (misconfigured endpoint,
/// SPA fallback route, error page).
pub fn looks_like_html(raw: &str) -> bool {
    let head: String = raw
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(SNIFF_LEN)
        .collect::<String>()
        .to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Parse a verse document into records, in document order.
///
/// Verse elements missing text or reference are skipped with a warning.
pub fn parse_verses(raw: &str) -> Result<Vec<VerseRecord>, VerseError> {
    if raw.trim().is_empty() {
        return Err(VerseError::EmptySource);
    }
    if looks_like_html(raw) {
        return Err(VerseError::WrongFormat);
    }

    let mut reader = Reader::from_str(raw);
    reader.trim_text(true);

    let mut records = Vec::new();
    let mut depth: usize = 0;
    let mut verse_elements = 0usize;
    let mut pending: Option<PendingVerse> = None;
    let mut field: Option<Field> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| VerseError::Parse(format!("at byte {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(ref e) => {
                depth += 1;
                let name = e.name();
                match name.as_ref() {
                    b"html" if depth == 1 => return Err(VerseError::WrongFormat),
                    b"verse" => {
                        verse_elements += 1;
                        pending = Some(PendingVerse::default());
                        field = None;
                    }
                    tag if pending.is_some() => {
                        if let Some(f) = Field::from_tag(tag) {
                            field = Some(f);
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(ref e) => {
                if e.name().as_ref() == b"verse" {
                    verse_elements += 1;
                    warn!("Skipping empty verse element #{}", verse_elements);
                }
            }
            Event::Text(ref e) => {
                if let (Some(verse), Some(f)) = (pending.as_mut(), field) {
                    let chunk = e
                        .unescape()
                        .map_err(|err| VerseError::Parse(err.to_string()))?;
                    verse.push(f, &chunk);
                }
            }
            Event::CData(e) => {
                if let (Some(verse), Some(f)) = (pending.as_mut(), field) {
                    let bytes = e.into_inner();
                    verse.push(f, &String::from_utf8_lossy(&bytes));
                }
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                let name = e.name();
                match name.as_ref() {
                    b"verse" => {
                        if let Some(verse) = pending.take() {
                            match verse.finish() {
                                Some(record) => records.push(record),
                                None => warn!(
                                    "Skipping verse element #{}: missing text or reference",
                                    verse_elements
                                ),
                            }
                        }
                        field = None;
                    }
                    tag if Field::from_tag(tag).is_some() => field = None,
                    _ => {}
                }
            }
            Event::DocType(ref e) => {
                let doctype = String::from_utf8_lossy(&e[..]).trim_start().to_lowercase();
                if doctype.starts_with("html") {
                    return Err(VerseError::WrongFormat);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(VerseError::Parse(
            "unexpected end of document: unclosed elements".to_string(),
        ));
    }

    if records.is_empty() {
        return Err(VerseError::NoRecords);
    }

    debug!(
        "Parsed {} verses from {} verse elements",
        records.len(),
        verse_elements
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<verses>
  <verse>
    <text>For God so loved the world</text>
    <reference>John 3:16</reference>
    <category>Love</category>
  </verse>
  <verse>
    <text>The Lord is my shepherd; I shall not want.</text>
    <reference>Psalm 23:1</reference>
  </verse>
</verses>"#;

    #[test]
    fn test_parses_in_document_order() {
        let verses = parse_verses(SAMPLE).unwrap();
        assert_eq!(verses.len(), 2);
        assert_eq!(verses[0].reference, "John 3:16");
        assert_eq!(verses[0].categories, vec!["Love".to_string()]);
        assert_eq!(verses[1].reference, "Psalm 23:1");
        assert!(verses[1].categories.is_empty());
    }

    #[test]
    fn test_skips_elements_missing_fields() {
        let xml = r#"<verses>
            <verse><text>Kept</text><reference>Gen 1:1</reference></verse>
            <verse><text>No reference</text></verse>
            <verse><text>   </text><reference>Gen 1:3</reference></verse>
            <verse/>
        </verses>"#;
        let verses = parse_verses(xml).unwrap();
        assert_eq!(verses.len(), 1);
        assert!(verses
            .iter()
            .all(|v| !v.text.is_empty() && !v.reference.is_empty()));
    }

    #[test]
    fn test_blank_source() {
        assert_eq!(parse_verses(""), Err(VerseError::EmptySource));
        assert_eq!(parse_verses("  \n\t "), Err(VerseError::EmptySource));
    }

    #[test]
    fn test_html_page_is_wrong_format() {
        let page = "<!DOCTYPE html>\n<html><head><title>404</title></head><body></body></html>";
        assert_eq!(parse_verses(page), Err(VerseError::WrongFormat));
        assert_eq!(
            parse_verses("<html><body>Not found</body></html>"),
            Err(VerseError::WrongFormat)
        );
    }

    #[test]
    fn test_malformed_xml() {
        let xml = "<verses><verse><text>a</reference></verse></verses>";
        assert!(matches!(parse_verses(xml), Err(VerseError::Parse(_))));

        let truncated = "<verses><verse><text>a</text><reference>b</reference></verse>";
        assert!(matches!(parse_verses(truncated), Err(VerseError::Parse(_))));
    }

    #[test]
    fn test_no_verse_elements() {
        assert_eq!(
            parse_verses("<verses></verses>"),
            Err(VerseError::NoRecords)
        );
        assert_eq!(
            parse_verses("<verses><verse><text>only text</text></verse></verses>"),
            Err(VerseError::NoRecords)
        );
    }

    #[test]
    fn test_entities_and_cdata() {
        let xml = r#"<verses><verse>
            <text><![CDATA[Love is patient & kind]]></text>
            <reference>1 Cor 13:4</reference>
            <category>Love &amp; Grace</category>
        </verse></verses>"#;
        let verses = parse_verses(xml).unwrap();
        assert_eq!(verses[0].text, "Love is patient & kind");
        assert_eq!(verses[0].categories, vec!["Love & Grace".to_string()]);
    }

    #[test]
    fn test_html_after_xml_declaration() {
        let xhtml = r#"<?xml version="1.0"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "x">
<html><body/></html>"#;
        assert_eq!(parse_verses(xhtml), Err(VerseError::WrongFormat));
        assert_eq!(
            parse_verses(r#"<?xml version="1.0"?><html><body/></html>"#),
            Err(VerseError::WrongFormat)
        );
    }

    #[test]
    fn test_sniff_ignores_bom() {
        assert!(looks_like_html("\u{feff}  <!doctype HTML><html></html>"));
        assert!(!looks_like_html(SAMPLE));
    }
}
