//! The `[Content_Types].xml` catalog.
//!
//! Implements the OPC content type discovery algorithm: an Override for the
//! exact part name wins, then the Default for the part's extension, and
//! finally `application/octet-stream`. Both lookups are case-insensitive,
//! as part names are.

use crate::common::xml::parser::{self, ElementParser, Parsed, ParserContext};
use crate::common::xml::sax::{Attr, HandlerResult, SaxOptions};
use crate::common::xml::writer::XmlWriter;
use crate::ooxml::opc::constants::{content_type as ct, namespace};
use crate::ooxml::opc::packuri;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    /// `(extension, media type)` in source order
    defaults: Vec<(String, String)>,
    /// `(part name with leading '/', media type)` in source order
    overrides: Vec<(String, String)>,
    default_index: HashMap<String, usize>,
    override_index: HashMap<String, usize>,
    modified: bool,
}

impl ContentTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog for a freshly created package: `rels` and `xml` defaults.
    pub fn with_standard_defaults() -> Self {
        let mut types = Self::new();
        types.add_default("rels", ct::OPC_RELATIONSHIPS);
        types.add_default("xml", ct::XML);
        types
    }

    /// Parse `[Content_Types].xml`.
    ///
    /// Entries missing either attribute are skipped with a warning. A
    /// repeated extension or part name keeps its first mapping.
    pub fn from_xml(xml: &[u8]) -> crate::common::xml::Result<Parsed<Self>> {
        let mut parser = TypesParser::default();
        let warnings = parser::run(&mut parser, xml, SaxOptions::default())?;
        Ok(Parsed {
            value: parser.types,
            warnings,
        })
    }

    /// Media type of a part given by its member name.
    pub fn content_type(&self, part: &str) -> &str {
        self.override_for(part)
            .or_else(|| self.default_for(packuri::extension(part)))
            .unwrap_or(ct::OCTET_STREAM)
    }

    /// Override registered for a member name.
    pub fn override_for(&self, part: &str) -> Option<&str> {
        self.override_index
            .get(&override_key(part))
            .map(|&i| self.overrides[i].1.as_str())
    }

    /// Default registered for an extension.
    pub fn default_for(&self, ext: &str) -> Option<&str> {
        if ext.is_empty() {
            return None;
        }
        self.default_index
            .get(&ext.to_ascii_lowercase())
            .map(|&i| self.defaults[i].1.as_str())
    }

    #[inline]
    pub fn has_default(&self, ext: &str) -> bool {
        self.default_for(ext).is_some()
    }

    pub fn defaults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defaults.iter().map(|(e, t)| (e.as_str(), t.as_str()))
    }

    /// Overrides as `(member name, media type)`.
    pub fn overrides(&self) -> impl Iterator<Item = (&str, &str)> {
        self.overrides
            .iter()
            .map(|(p, t)| (p.strip_prefix('/').unwrap_or(p), t.as_str()))
    }

    /// Register a Default. Returns true when the catalog changed.
    pub fn add_default(&mut self, ext: &str, media_type: &str) -> bool {
        let key = ext.to_ascii_lowercase();
        if let Some(&i) = self.default_index.get(&key) {
            if self.defaults[i].1 == media_type {
                return false;
            }
            self.defaults[i].1 = media_type.to_string();
        } else {
            self.default_index.insert(key, self.defaults.len());
            self.defaults.push((ext.to_string(), media_type.to_string()));
        }
        self.modified = true;
        true
    }

    /// Register (or replace) an Override for a member name. Returns true
    /// when the catalog changed.
    pub fn add_override(&mut self, part: &str, media_type: &str) -> bool {
        let key = override_key(part);
        if let Some(&i) = self.override_index.get(&key) {
            if self.overrides[i].1 == media_type {
                return false;
            }
            self.overrides[i].1 = media_type.to_string();
        } else {
            self.override_index.insert(key, self.overrides.len());
            self.overrides
                .push((packuri::absolute(part.trim_start_matches('/')), media_type.to_string()));
        }
        self.modified = true;
        true
    }

    /// Drop the Override for a member name. Returns true when one existed.
    pub fn remove_override(&mut self, part: &str) -> bool {
        let Some(i) = self.override_index.remove(&override_key(part)) else {
            return false;
        };
        self.overrides.remove(i);
        self.override_index.clear();
        for (i, (name, _)) in self.overrides.iter().enumerate() {
            self.override_index.insert(name.to_ascii_lowercase(), i);
        }
        self.modified = true;
        true
    }

    /// Whether any Default or Override changed since load or the last
    /// [`ContentTypes::clear_modified`].
    #[inline]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    #[inline]
    pub fn clear_modified(&mut self) {
        self.modified = false;
    }

    /// Serialise as `[Content_Types].xml`: Defaults first, then Overrides.
    pub fn to_xml(&self) -> Vec<u8> {
        let mut w = XmlWriter::with_capacity(512 + self.overrides.len() * 160);
        w.declaration()
            .start_element("Types")
            .attribute("xmlns", namespace::OPC_CONTENT_TYPES);
        for (ext, media_type) in &self.defaults {
            w.start_element("Default")
                .attribute("Extension", ext)
                .attribute("ContentType", media_type)
                .end_element();
        }
        for (part, media_type) in &self.overrides {
            w.start_element("Override")
                .attribute("PartName", part)
                .attribute("ContentType", media_type)
                .end_element();
        }
        w.end_element();
        w.into_bytes()
    }
}

fn override_key(part: &str) -> String {
    packuri::absolute(part.trim_start_matches('/')).to_ascii_lowercase()
}

#[derive(Default)]
struct TypesParser {
    types: ContentTypes,
}

impl ElementParser for TypesParser {
    fn start(&mut self, ctx: &mut ParserContext, name: &str, attrs: &[Attr<'_>]) -> HandlerResult {
        match name {
            "Default" => {
                let (Some(ext), Some(media_type)) =
                    (parser::attr_str(attrs, "Extension"), parser::attr_str(attrs, "ContentType"))
                else {
                    ctx.warn("Default element without Extension or ContentType");
                    return Ok(());
                };
                if self.types.has_default(&ext) {
                    ctx.warn(format!("duplicate Default for extension \"{ext}\""));
                } else {
                    self.types.add_default(&ext, &media_type);
                }
            },
            "Override" => {
                let (Some(part), Some(media_type)) =
                    (parser::attr_str(attrs, "PartName"), parser::attr_str(attrs, "ContentType"))
                else {
                    ctx.warn("Override element without PartName or ContentType");
                    return Ok(());
                };
                if self.types.override_for(&part).is_some() {
                    ctx.warn(format!("duplicate Override for \"{part}\""));
                } else {
                    self.types.add_override(&part, &media_type);
                }
            },
            _ => {},
        }
        Ok(())
    }

    fn end(&mut self, _ctx: &mut ParserContext, name: &str) -> HandlerResult {
        if name == "Types" {
            self.types.clear_modified();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Default Extension="PNG" ContentType="image/png"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
  <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#;

    #[test]
    fn test_lookup_order() {
        let types = ContentTypes::from_xml(TYPES.as_bytes()).unwrap().value;
        assert_eq!(types.content_type("xl/workbook.xml"), ct::SML_SHEET_MAIN);
        assert_eq!(types.content_type("xl/Worksheets/Sheet1.xml"), ct::SML_WORKSHEET);
        assert_eq!(types.content_type("xl/styles.xml"), ct::XML);
        assert_eq!(types.content_type("xl/media/image1.png"), ct::PNG);
        assert_eq!(types.content_type("xl/media/blob.bin"), ct::OCTET_STREAM);
        assert_eq!(types.content_type("noext"), ct::OCTET_STREAM);
        assert!(!types.is_modified());
    }

    #[test]
    fn test_edits_track_modification() {
        let mut types = ContentTypes::from_xml(TYPES.as_bytes()).unwrap().value;
        assert!(!types.add_default("png", ct::PNG));
        assert!(!types.is_modified());

        assert!(types.add_override("xl/worksheets/sheet2.xml", ct::SML_WORKSHEET));
        assert!(types.is_modified());
        assert_eq!(types.override_for("/xl/worksheets/sheet2.xml"), Some(ct::SML_WORKSHEET));

        assert!(types.remove_override("xl/worksheets/sheet1.xml"));
        assert!(!types.remove_override("xl/worksheets/sheet1.xml"));
        assert_eq!(types.content_type("xl/worksheets/sheet1.xml"), ct::XML);
        assert_eq!(types.content_type("xl/workbook.xml"), ct::SML_SHEET_MAIN);

        let names: Vec<&str> = types.overrides().map(|(p, _)| p).collect();
        assert_eq!(names, vec!["xl/workbook.xml", "xl/worksheets/sheet2.xml"]);
    }

    #[test]
    fn test_serialise() {
        let mut types = ContentTypes::with_standard_defaults();
        types.add_override("xl/workbook.xml", ct::SML_SHEET_MAIN);
        let xml = String::from_utf8(types.to_xml()).unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n\
             <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
             <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
             <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
             <Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>\
             </Types>"
        );
        let back = ContentTypes::from_xml(xml.as_bytes()).unwrap();
        assert!(back.warnings.is_empty());
        assert_eq!(back.value.content_type("xl/workbook.xml"), ct::SML_SHEET_MAIN);
    }
}
