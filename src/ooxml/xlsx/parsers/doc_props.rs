//! `docProps/core.xml` and `docProps/app.xml`.

use crate::common::xml::{Result, XmlDocument};
use crate::ooxml::xlsx::model::{AppProperties, CoreProperties};

pub fn parse_core_properties(input: &[u8]) -> Result<CoreProperties> {
    let doc = XmlDocument::parse(input)?;
    let Some(root) = doc.root() else {
        return Ok(CoreProperties::default());
    };
    let mut core = CoreProperties::default();
    for node in doc.children(root) {
        let text = Some(node.text.clone());
        match node.local_name() {
            "title" => core.title = text,
            "subject" => core.subject = text,
            "creator" => core.creator = text,
            "keywords" => core.keywords = text,
            "description" => core.description = text,
            "lastModifiedBy" => core.last_modified_by = text,
            "created" => core.created = text,
            "modified" => core.modified = text,
            "category" => core.category = text,
            "revision" => core.revision = text,
            "contentStatus" => core.content_status = text,
            "identifier" => core.identifier = text,
            "language" => core.language = text,
            "lastPrinted" => core.last_printed = text,
            "version" => core.version = text,
            _ => {},
        }
    }
    Ok(core)
}

pub fn parse_app_properties(input: &[u8]) -> Result<AppProperties> {
    let doc = XmlDocument::parse(input)?;
    let Some(root) = doc.root() else {
        return Ok(AppProperties::default());
    };
    let mut app = AppProperties::default();
    for node in doc.children(root) {
        let text = node.text.trim();
        match node.local_name() {
            "Application" => app.application = Some(text.to_string()),
            "AppVersion" => app.app_version = Some(text.to_string()),
            "Company" => app.company = Some(text.to_string()),
            "Manager" => app.manager = Some(text.to_string()),
            "DocSecurity" => app.doc_security = atoi_simd::parse::<u32, false, false>(text.as_bytes()).ok(),
            "HyperlinksChanged" => app.hyperlinks_changed = Some(text == "true" || text == "1"),
            "SharedDoc" => app.shared_doc = Some(text == "true" || text == "1"),
            _ => {},
        }
    }
    if let Some(titles) = doc.child(root, "TitlesOfParts") {
        app.titles = doc
            .descendants(titles, "lpstr")
            .map(|id| doc.node(id).text.clone())
            .collect();
    }
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:title>Budget &amp; Plan</dc:title><dc:creator>Finance</dc:creator>
<dcterms:created xsi:type="dcterms:W3CDTF">2024-01-15T08:00:00Z</dcterms:created>
<cp:revision>3</cp:revision>
</cp:coreProperties>"#;
        let core = parse_core_properties(xml).unwrap();
        assert_eq!(core.title.as_deref(), Some("Budget & Plan"));
        assert_eq!(core.creator.as_deref(), Some("Finance"));
        assert_eq!(core.created.as_deref(), Some("2024-01-15T08:00:00Z"));
        assert_eq!(core.revision.as_deref(), Some("3"));
        assert_eq!(core.subject, None);
    }

    #[test]
    fn test_app() {
        let xml = br#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">
<Application>Microsoft Excel</Application><DocSecurity>0</DocSecurity><Company>ACME</Company>
<TitlesOfParts><vt:vector size="2" baseType="lpstr"><vt:lpstr>Data</vt:lpstr><vt:lpstr>Summary</vt:lpstr></vt:vector></TitlesOfParts>
<SharedDoc>false</SharedDoc></Properties>"#;
        let app = parse_app_properties(xml).unwrap();
        assert_eq!(app.application.as_deref(), Some("Microsoft Excel"));
        assert_eq!(app.company.as_deref(), Some("ACME"));
        assert_eq!(app.doc_security, Some(0));
        assert_eq!(app.shared_doc, Some(false));
        assert_eq!(app.titles, vec!["Data", "Summary"]);
    }
}
