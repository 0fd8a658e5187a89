//! Workbook part output.

use crate::common::xml::splice::{WORKBOOK_ORDER, set_attributes};
use crate::common::xml::{Result, Splice, SpliceRefusal, XmlWriter};
use crate::ooxml::opc::constants::namespace;
use crate::ooxml::xlsx::model::{SheetState, Workbook};
use memchr::memmem;

fn sheets_element(wb: &Workbook) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(64 + wb.sheets.len() * 80);
    w.start_element("sheets");
    for sheet in &wb.sheets {
        w.start_element("sheet")
            .attribute("name", &sheet.name)
            .attribute_int("sheetId", sheet.sheet_id);
        if sheet.state != SheetState::Visible {
            w.attribute("state", sheet.state.as_str());
        }
        w.attribute("r:id", &sheet.rel_id).end_element();
    }
    w.end_element();
    w.into_bytes()
}

fn defined_names_element(wb: &Workbook) -> Option<Vec<u8>> {
    if wb.defined_names.is_empty() {
        return None;
    }
    let mut w = XmlWriter::with_capacity(64 + wb.defined_names.len() * 96);
    w.start_element("definedNames");
    for name in &wb.defined_names {
        w.start_element("definedName").attribute("name", &name.name);
        if let Some(comment) = &name.comment {
            w.attribute("comment", comment);
        }
        if let Some(scope) = name.local_sheet_id {
            w.attribute_int("localSheetId", scope);
        }
        if name.hidden {
            w.attribute_bool("hidden", true);
        }
        w.text(&name.formula).end_element();
    }
    w.end_element();
    Some(w.into_bytes())
}

fn calc_pr_element(wb: &Workbook) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(96);
    w.start_element("calcPr");
    for (k, v) in &wb.calc_pr {
        w.attribute(k, v);
    }
    w.end_element();
    w.into_bytes()
}

fn book_views_element(wb: &Workbook) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(96);
    w.start_element("bookViews").start_element("workbookView");
    if wb.first_sheet > 0 {
        w.attribute_int("firstSheet", wb.first_sheet);
    }
    if wb.active_tab > 0 {
        w.attribute_int("activeTab", wb.active_tab);
    }
    w.end_element().end_element();
    w.into_bytes()
}

/// A complete workbook part.
pub fn write_workbook(wb: &Workbook) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(1024);
    w.declaration()
        .start_element("workbook")
        .attribute("xmlns", namespace::SML_MAIN)
        .attribute("xmlns:r", namespace::OFC_RELATIONSHIPS)
        .raw("<workbookPr defaultThemeVersion=\"124226\"/>")
        .raw_bytes(&book_views_element(wb))
        .raw_bytes(&sheets_element(wb));
    if let Some(names) = defined_names_element(wb) {
        w.raw_bytes(&names);
    }
    if !wb.calc_pr.is_empty() {
        w.raw_bytes(&calc_pr_element(wb));
    }
    w.end_element();
    w.into_bytes()
}

/// Apply the workbook's changes to the source part. Children that did not
/// change are copied verbatim.
pub fn update_workbook(src: &[u8], wb: &Workbook) -> Result<(Vec<u8>, Vec<String>)> {
    let mut splice = match Splice::parse(src)? {
        Ok(splice) => splice,
        Err(SpliceRefusal::PrefixedRoot(root)) => {
            return Ok((
                write_workbook(wb),
                vec![format!("workbook root <{root}> is prefixed; part regenerated")],
            ));
        },
    };

    if wb.sheets_changed() {
        splice.replace_or_insert("sheets", sheets_element(wb), WORKBOOK_ORDER);
    }
    if wb.names_changed() {
        match defined_names_element(wb) {
            Some(names) => splice.replace_or_insert("definedNames", names, WORKBOOK_ORDER),
            None => {
                splice.remove("definedNames");
            },
        }
    }
    if wb.calc_changed() {
        splice.replace_or_insert("calcPr", calc_pr_element(wb), WORKBOOK_ORDER);
    }
    if wb.views_changed() {
        let updated = match splice.child("bookViews") {
            Some(views) => match memmem::find(views, b"<workbookView") {
                Some(at) => {
                    let active = itoa::Buffer::new().format(wb.active_tab).to_string();
                    let first = itoa::Buffer::new().format(wb.first_sheet).to_string();
                    let view = set_attributes(
                        &views[at..],
                        &[("activeTab", Some(&active)), ("firstSheet", Some(&first))],
                    )?;
                    let mut element = views[..at].to_vec();
                    element.extend_from_slice(&view);
                    element
                },
                None => book_views_element(wb),
            },
            None => book_views_element(wb),
        };
        splice.replace_or_insert("bookViews", updated, WORKBOOK_ORDER);
    }
    Ok((splice.finish(), Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::xlsx::model::{DefinedName, WorksheetInfo};
    use crate::ooxml::xlsx::parsers::parse_workbook;

    const SRC: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><fileVersion appName="xl" lastEdited="7"/><workbookPr date1904="0"/><bookViews><workbookView xWindow="0" yWindow="0" activeTab="2"/></bookViews><sheets><sheet name="One" sheetId="1" r:id="rId1"/><sheet name="Two" sheetId="2" r:id="rId2"/><sheet name="Three" sheetId="3" r:id="rId3"/></sheets><definedNames><definedName name="Local" localSheetId="2">Three!$A$1</definedName></definedNames><calcPr calcId="191029"/><extLst><ext uri="{X}"/></extLst></workbook>"#;

    fn parsed() -> Workbook {
        parse_workbook(SRC, &|id: &str| Some(format!("xl/worksheets/{id}.xml"))).unwrap().value
    }

    #[test]
    fn test_untouched_is_identical() {
        let (bytes, _) = update_workbook(SRC, &parsed()).unwrap();
        assert_eq!(bytes, SRC);
    }

    #[test]
    fn test_remove_sheet_updates_children() {
        let mut wb = parsed();
        wb.remove_sheet(2);
        wb.set_calc_attr("fullCalcOnLoad", Some("1"));
        let (bytes, _) = update_workbook(SRC, &wb).unwrap();
        let xml = String::from_utf8(bytes).unwrap();
        assert!(!xml.contains("Three"));
        assert!(!xml.contains("<definedNames"));
        assert!(xml.contains("<calcPr calcId=\"191029\" fullCalcOnLoad=\"1\"/>"));
        assert!(xml.contains("<workbookView xWindow=\"0\" yWindow=\"0\" activeTab=\"1\" firstSheet=\"0\"/>"));
        assert!(xml.contains("<fileVersion appName=\"xl\" lastEdited=\"7\"/>"));
        assert!(xml.contains("<extLst><ext uri=\"{X}\"/></extLst>"));
    }

    #[test]
    fn test_full_workbook() {
        let mut wb = Workbook::new();
        wb.push_sheet(WorksheetInfo {
            name: "R&D".into(),
            sheet_id: 1,
            rel_id: "rId1".into(),
            worksheet_path: "xl/worksheets/sheet1.xml".into(),
            state: SheetState::Visible,
        });
        wb.defined_names.push(DefinedName {
            name: "Area".into(),
            formula: "'R&D'!$A$1".into(),
            ..DefinedName::default()
        });
        let xml = String::from_utf8(write_workbook(&wb)).unwrap();
        assert!(xml.contains("<sheet name=\"R&amp;D\" sheetId=\"1\" r:id=\"rId1\"/>"));
        assert!(xml.contains("<definedName name=\"Area\">'R&amp;D'!$A$1</definedName>"));
        let back = parse_workbook(xml.as_bytes(), &|_: &str| None).unwrap().value;
        assert_eq!(back.sheets[0].name, "R&D");
    }
}
