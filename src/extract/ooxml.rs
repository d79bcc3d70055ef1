//! Office Open XML text extraction (DOCX, PPTX).
//!
//! Both formats are ZIP archives of XML parts. DOCX text lives in
//! `word/document.xml` as `w:p` paragraphs made of `w:t` runs; PPTX text
//! lives in `ppt/slides/slideN.xml` as `p:txBody` frames holding `a:p`
//! paragraphs made of `a:t` runs.

use anyhow::{anyhow, bail, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use super::ExtractionStage;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY: &str = "word/document.xml";
const SLIDE_PREFIX: &str = "ppt/slides/slide";

/// DOCX body paragraphs, one per line.
pub struct DocxStage;

impl ExtractionStage for DocxStage {
    fn name(&self) -> &'static str {
        "docx_paragraphs"
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let mut archive = open_archive(path)?;
        let xml = read_zip_entry_bounded(&mut archive, DOCX_BODY, MAX_XML_ENTRY_BYTES)?;
        Ok(docx_paragraphs(&xml)?.join("\n"))
    }
}

/// PPTX slide text, one slide per line, shapes separated by spaces.
pub struct PptxStage;

impl ExtractionStage for PptxStage {
    fn name(&self) -> &'static str {
        "pptx_slides"
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let mut archive = open_archive(path)?;

        let mut slides = Vec::new();
        for name in slide_entry_names(&archive) {
            let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
            let shapes = slide_shape_texts(&xml).with_context(|| format!("parsing {}", name))?;
            let slide = shapes.join(" ");
            if !slide.is_empty() {
                slides.push(slide);
            }
        }
        Ok(slides.join("\n"))
    }
}

fn open_archive(path: &Path) -> Result<zip::ZipArchive<File>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    zip::ZipArchive::new(file).with_context(|| format!("{} is not a ZIP container", path.display()))
}

fn read_zip_entry_bounded<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|e| anyhow!("ZIP entry {}: {}", name, e))?;
    let mut out = Vec::new();
    entry.take(max_bytes).read_to_end(&mut out)?;
    if out.len() as u64 >= max_bytes {
        bail!("ZIP entry {} exceeds size limit ({} bytes)", name, max_bytes);
    }
    Ok(out)
}

/// `ppt/slides/slideN.xml` entries ordered by N, not lexically.
fn slide_entry_names<R: Read + Seek>(archive: &zip::ZipArchive<R>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(SLIDE_PREFIX) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(SLIDE_PREFIX)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Top-level body paragraphs of a DOCX document part, stripped, blanks dropped.
///
/// Paragraphs nested in tables and text boxes are not part of the body flow
/// and are skipped.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut nested = 0usize;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:tbl" | b"w:txbxContent" => nested += 1,
                b"w:p" if nested == 0 => current = Some(String::new()),
                b"w:t" if nested == 0 => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if nested == 0 => {
                if let Some(p) = current.as_mut() {
                    match e.name().as_ref() {
                        b"w:tab" => p.push('\t'),
                        b"w:br" | b"w:cr" => p.push('\n'),
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(te)) if in_text => {
                if let Some(p) = current.as_mut() {
                    p.push_str(&te.unescape()?);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:tbl" | b"w:txbxContent" => nested = nested.saturating_sub(1),
                b"w:p" if nested == 0 => {
                    if let Some(p) = current.take() {
                        let p = p.trim();
                        if !p.is_empty() {
                            paragraphs.push(p.to_string());
                        }
                    }
                }
                b"w:t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => bail!("malformed {}: {}", DOCX_BODY, e),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

/// Text of every shape text frame on a slide. Within a frame, non-blank
/// paragraphs are joined with spaces; frames with no text are omitted.
fn slide_shape_texts(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut shapes = Vec::new();
    let mut frame: Option<Vec<String>> = None;
    let mut paragraph: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"p:txBody" => frame = Some(Vec::new()),
                b"a:p" if frame.is_some() => paragraph = Some(String::new()),
                b"a:t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"a:br" {
                    if let Some(p) = paragraph.as_mut() {
                        p.push('\n');
                    }
                }
            }
            Ok(Event::Text(te)) if in_text => {
                if let Some(p) = paragraph.as_mut() {
                    p.push_str(&te.unescape()?);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"a:t" => in_text = false,
                b"a:p" => {
                    if let (Some(p), Some(f)) = (paragraph.take(), frame.as_mut()) {
                        let p = p.trim();
                        if !p.is_empty() {
                            f.push(p.to_string());
                        }
                    }
                }
                b"p:txBody" => {
                    if let Some(f) = frame.take() {
                        if !f.is_empty() {
                            shapes.push(f.join(" "));
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => bail!("malformed slide XML: {}", e),
            _ => {}
        }
        buf.clear();
    }
    Ok(shapes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn docx_paragraphs_are_stripped_and_blanks_dropped() {
        let xml = br#"<w:document xmlns:w="w"><w:body>
            <w:p><w:r><w:t xml:space="preserve">  Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p>
            <w:p><w:r><w:t>   </w:t></w:r></w:p>
            <w:p/>
            <w:p><w:r><w:t>Fish &amp; chips</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let paras = docx_paragraphs(xml).unwrap();
        assert_eq!(paras, vec!["Hello world", "Fish & chips"]);
    }

    #[test]
    fn docx_table_paragraphs_are_skipped() {
        let xml = br#"<w:document xmlns:w="w"><w:body>
            <w:p><w:r><w:t>Intro</w:t></w:r></w:p>
            <w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
            <w:p><w:r><w:t>Outro</w:t></w:r></w:p>
        </w:body></w:document>"#;
        assert_eq!(docx_paragraphs(xml).unwrap(), vec!["Intro", "Outro"]);
    }

    #[test]
    fn docx_text_box_content_stays_out_of_body_paragraph() {
        let xml = br#"<w:document xmlns:w="w" xmlns:mc="mc" xmlns:wps="wps" xmlns:v="v"><w:body>
            <w:p>
              <w:r><w:t>Body</w:t></w:r>
              <w:r><mc:AlternateContent>
                <mc:Choice Requires="wps"><w:drawing><wps:txbx><w:txbxContent>
                  <w:p><w:r><w:t>BOXTEXT</w:t><w:br/></w:r></w:p>
                </w:txbxContent></wps:txbx></w:drawing></mc:Choice>
                <mc:Fallback><w:pict><v:textbox><w:txbxContent>
                  <w:p><w:r><w:tab/><w:t>BOXTEXT</w:t></w:r></w:p>
                </w:txbxContent></v:textbox></w:pict></mc:Fallback>
              </mc:AlternateContent></w:r>
              <w:r><w:t xml:space="preserve"> text</w:t></w:r>
            </w:p>
            <w:p><w:r><w:t>Next</w:t></w:r></w:p>
        </w:body></w:document>"#;
        assert_eq!(docx_paragraphs(xml).unwrap(), vec!["Body text", "Next"]);
    }

    #[test]
    fn slide_shapes_join_paragraphs() {
        let xml = br#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree>
            <p:sp><p:txBody><a:p><a:r><a:t>Title</a:t></a:r></a:p></p:txBody></p:sp>
            <p:sp><p:txBody><a:p><a:r><a:t>one</a:t></a:r></a:p><a:p/><a:p><a:r><a:t>two</a:t></a:r></a:p></p:txBody></p:sp>
            <p:sp><p:txBody><a:p><a:r><a:t> </a:t></a:r></a:p></p:txBody></p:sp>
        </p:spTree></p:cSld></p:sld>"#;
        assert_eq!(slide_shape_texts(xml).unwrap(), vec!["Title", "one two"]);
    }

    #[test]
    fn pptx_slides_follow_numeric_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("deck.pptx");
        let slide = |t: &str| {
            format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:sld>"#,
                t
            )
        };
        let (s1, s2, s10) = (slide("first"), slide("second"), slide("tenth"));
        write_zip(
            &path,
            &[
                ("ppt/slides/slide10.xml", &s10),
                ("ppt/slides/slide2.xml", &s2),
                ("ppt/slides/slide1.xml", &s1),
            ],
        );
        let text = PptxStage.extract(&path).unwrap();
        assert_eq!(text, "first\nsecond\ntenth");
    }

    #[test]
    fn docx_without_body_part_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty.docx");
        write_zip(&path, &[("[Content_Types].xml", "<Types/>")]);
        assert!(DocxStage.extract(&path).is_err());
    }

    #[test]
    fn non_zip_input_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fake.docx");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(DocxStage.extract(&path).is_err());
        assert!(PptxStage.extract(&path).is_err());
    }
}
