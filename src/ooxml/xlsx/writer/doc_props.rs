//! Document property parts.
//!
//! `core.xml` is small and fully modelled, so it is always regenerated.
//! `app.xml` carries statistics this crate does not track and is updated
//! in place.

use crate::common::xml::{Result, Splice, SpliceRefusal, XmlWriter};
use crate::ooxml::opc::constants::namespace;
use crate::ooxml::xlsx::model::{AppProperties, CoreProperties};
use crate::ooxml::xlsx::parsers::parse_app_properties;

const APP_ORDER: &[&str] = &[
    "Template",
    "Manager",
    "Company",
    "Pages",
    "Words",
    "Characters",
    "PresentationFormat",
    "Lines",
    "Paragraphs",
    "Slides",
    "Notes",
    "TotalTime",
    "HiddenSlides",
    "MMClips",
    "ScaleCrop",
    "HeadingPairs",
    "TitlesOfParts",
    "LinksUpToDate",
    "CharactersWithSpaces",
    "SharedDoc",
    "HyperlinkBase",
    "HLinks",
    "HyperlinksChanged",
    "DigSig",
    "Application",
    "AppVersion",
    "DocSecurity",
];

pub fn write_core_properties(core: &CoreProperties) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(1024);
    w.declaration()
        .start_element("cp:coreProperties")
        .attribute("xmlns:cp", namespace::CORE_PROPERTIES)
        .attribute("xmlns:dc", namespace::DC)
        .attribute("xmlns:dcterms", namespace::DC_TERMS)
        .attribute("xmlns:dcmitype", namespace::DCMI_TYPE)
        .attribute("xmlns:xsi", namespace::XSI);

    let plain = [
        ("dc:title", &core.title),
        ("dc:subject", &core.subject),
        ("dc:creator", &core.creator),
        ("cp:keywords", &core.keywords),
        ("dc:description", &core.description),
        ("cp:lastModifiedBy", &core.last_modified_by),
        ("cp:revision", &core.revision),
        ("cp:lastPrinted", &core.last_printed),
    ];
    for (name, value) in plain {
        if let Some(value) = value {
            w.text_element(name, value);
        }
    }
    for (name, value) in [("dcterms:created", &core.created), ("dcterms:modified", &core.modified)] {
        if let Some(value) = value {
            w.start_element(name)
                .attribute("xsi:type", "dcterms:W3CDTF")
                .text(value)
                .end_element();
        }
    }
    let trailing = [
        ("cp:category", &core.category),
        ("cp:contentStatus", &core.content_status),
        ("dc:identifier", &core.identifier),
        ("dc:language", &core.language),
        ("cp:version", &core.version),
    ];
    for (name, value) in trailing {
        if let Some(value) = value {
            w.text_element(name, value);
        }
    }
    w.end_element();
    w.into_bytes()
}

fn heading_pairs(vt: &str, sheets: usize) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(256);
    w.start_element("HeadingPairs")
        .start_element(&format!("{vt}:vector"))
        .attribute_int("size", 2u32)
        .attribute("baseType", "variant")
        .start_element(&format!("{vt}:variant"))
        .text_element(&format!("{vt}:lpstr"), "Worksheets")
        .end_element()
        .start_element(&format!("{vt}:variant"))
        .start_element(&format!("{vt}:i4"))
        .int(sheets)
        .end_element()
        .end_element()
        .end_element()
        .end_element();
    w.into_bytes()
}

fn titles_of_parts(vt: &str, titles: &[String]) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(128 + titles.len() * 32);
    w.start_element("TitlesOfParts")
        .start_element(&format!("{vt}:vector"))
        .attribute_int("size", titles.len())
        .attribute("baseType", "lpstr");
    let lpstr = format!("{vt}:lpstr");
    for title in titles {
        w.text_element(&lpstr, title);
    }
    w.end_element().end_element();
    w.into_bytes()
}

fn text_fields(app: &AppProperties) -> Vec<(&'static str, String)> {
    let flag = |b: bool| (if b { "true" } else { "false" }).to_string();
    let mut fields = Vec::with_capacity(7);
    if let Some(v) = &app.manager {
        fields.push(("Manager", v.clone()));
    }
    if let Some(v) = &app.company {
        fields.push(("Company", v.clone()));
    }
    if let Some(v) = app.shared_doc {
        fields.push(("SharedDoc", flag(v)));
    }
    if let Some(v) = app.hyperlinks_changed {
        fields.push(("HyperlinksChanged", flag(v)));
    }
    if let Some(v) = &app.application {
        fields.push(("Application", v.clone()));
    }
    if let Some(v) = &app.app_version {
        fields.push(("AppVersion", v.clone()));
    }
    if let Some(v) = app.doc_security {
        fields.push(("DocSecurity", itoa::Buffer::new().format(v).to_string()));
    }
    fields
}

fn text_element(name: &str, value: &str) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(name.len() * 2 + value.len() + 8);
    w.text_element(name, value);
    w.into_bytes()
}

pub fn write_app_properties(app: &AppProperties) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(1024);
    w.declaration()
        .start_element("Properties")
        .attribute("xmlns", namespace::EXTENDED_PROPERTIES)
        .attribute("xmlns:vt", namespace::DOC_PROPS_VTYPES);
    let fields = text_fields(app);
    for name in APP_ORDER {
        match *name {
            "ScaleCrop" | "LinksUpToDate" => {
                w.text_element(name, "false");
            },
            "HeadingPairs" => {
                w.raw_bytes(&heading_pairs("vt", app.titles.len()));
            },
            "TitlesOfParts" => {
                w.raw_bytes(&titles_of_parts("vt", &app.titles));
            },
            _ => {
                if let Some((_, value)) = fields.iter().find(|(n, _)| n == name) {
                    w.text_element(name, value);
                }
            },
        }
    }
    w.end_element();
    w.into_bytes()
}

/// Bring the source `app.xml` in line with `app`, replacing only what
/// differs.
pub fn update_app_properties(src: &[u8], app: &AppProperties) -> Result<(Vec<u8>, Vec<String>)> {
    let mut splice = match Splice::parse(src)? {
        Ok(splice) => splice,
        Err(SpliceRefusal::PrefixedRoot(root)) => {
            return Ok((
                write_app_properties(app),
                vec![format!("extended properties root <{root}> is prefixed; part regenerated")],
            ));
        },
    };
    let source = parse_app_properties(src)?;
    let source_fields = text_fields(&source);
    for (name, value) in text_fields(app) {
        let unchanged = source_fields.iter().any(|(n, v)| *n == name && *v == value);
        if !unchanged {
            splice.replace_or_insert(name, text_element(name, &value), APP_ORDER);
        }
    }
    if source.titles != app.titles {
        let bound = splice.root_prefix_for(namespace::DOC_PROPS_VTYPES).map(str::to_string);
        let vt = match bound {
            Some(prefix) => prefix,
            None => {
                splice.set_root_attr("xmlns:vt", Some(namespace::DOC_PROPS_VTYPES));
                "vt".to_string()
            },
        };
        splice.replace_or_insert("HeadingPairs", heading_pairs(&vt, app.titles.len()), APP_ORDER);
        splice.replace_or_insert("TitlesOfParts", titles_of_parts(&vt, &app.titles), APP_ORDER);
    }
    Ok((splice.finish(), Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::xlsx::parsers::parse_core_properties;

    #[test]
    fn test_core_round_trip() {
        let core = CoreProperties {
            title: Some("Q1 <draft>".into()),
            creator: Some("Ann".into()),
            created: Some("2024-01-15T08:00:00Z".into()),
            modified: Some("2024-02-01T09:30:00Z".into()),
            ..CoreProperties::default()
        };
        let bytes = write_core_properties(&core);
        let xml = std::str::from_utf8(&bytes).unwrap();
        assert!(xml.contains("<dcterms:created xsi:type=\"dcterms:W3CDTF\">2024-01-15T08:00:00Z</dcterms:created>"));
        assert!(xml.contains("<dc:title>Q1 &lt;draft&gt;</dc:title>"));
        assert_eq!(parse_core_properties(&bytes).unwrap(), core);
    }

    #[test]
    fn test_app_titles_update() {
        let src = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes"><Application>Microsoft Excel</Application><DocSecurity>0</DocSecurity><ScaleCrop>false</ScaleCrop><HeadingPairs><vt:vector size="2" baseType="variant"><vt:variant><vt:lpstr>Worksheets</vt:lpstr></vt:variant><vt:variant><vt:i4>1</vt:i4></vt:variant></vt:vector></HeadingPairs><TitlesOfParts><vt:vector size="1" baseType="lpstr"><vt:lpstr>Sheet1</vt:lpstr></vt:vector></TitlesOfParts><Company>ACME</Company><TotalTime>12</TotalTime></Properties>"#;
        let mut app = parse_app_properties(src).unwrap();
        let (same, _) = update_app_properties(src, &app).unwrap();
        assert_eq!(same, src);

        app.titles = vec!["Sheet1".into(), "Report".into()];
        let (bytes, _) = update_app_properties(src, &app).unwrap();
        let xml = String::from_utf8(bytes).unwrap();
        assert!(xml.contains("<vt:i4>2</vt:i4>"));
        assert!(xml.contains("<vt:vector size=\"2\" baseType=\"lpstr\"><vt:lpstr>Sheet1</vt:lpstr><vt:lpstr>Report</vt:lpstr></vt:vector>"));
        assert!(xml.contains("<TotalTime>12</TotalTime>"));
        assert_eq!(parse_app_properties(xml.as_bytes()).unwrap(), app);
    }

    #[test]
    fn test_full_app() {
        let mut app = AppProperties::for_new_package();
        app.titles = vec!["Data".into()];
        let bytes = write_app_properties(&app);
        assert_eq!(parse_app_properties(&bytes).unwrap(), app);
    }
}
