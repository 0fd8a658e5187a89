//! `xl/workbook.xml`: sheet list, defined names, `calcPr` and the first
//! workbook view.

use crate::common::xml::parser::{self, ElementParser, Parsed, ParserContext, attr, attr_bool, attr_str, attr_u32};
use crate::common::xml::{Attr, HandlerResult, Result, SaxOptions};
use crate::ooxml::xlsx::model::{DefinedName, SheetState, Workbook, WorksheetInfo};

struct WorkbookParser<'r> {
    workbook: Workbook,
    resolve: &'r dyn Fn(&str) -> Option<String>,
    pending_name: Option<DefinedName>,
    seen_view: bool,
}

impl ElementParser for WorkbookParser<'_> {
    fn start(&mut self, ctx: &mut ParserContext, name: &str, attrs: &[Attr<'_>]) -> HandlerResult {
        match name {
            "sheet" if ctx.parent_element() == Some("sheets") => {
                let sheet_name = attr_str(attrs, "name").map(|n| n.into_owned()).unwrap_or_default();
                let sheet_id = attr_u32(attrs, "sheetId").unwrap_or(0);
                let rel_id = attr(attrs, "r:id").unwrap_or_default().to_string();
                let state = attr(attrs, "state").map_or(SheetState::Visible, SheetState::from_attr);
                let worksheet_path = match (self.resolve)(&rel_id) {
                    Some(path) => path,
                    None => {
                        let fallback = format!("xl/worksheets/sheet{sheet_id}.xml");
                        ctx.warn(format!(
                            "sheet '{sheet_name}': relationship '{rel_id}' not found, assuming {fallback}"
                        ));
                        fallback
                    },
                };
                self.workbook.sheets.push(WorksheetInfo {
                    name: sheet_name,
                    sheet_id,
                    rel_id,
                    worksheet_path,
                    state,
                });
            },
            "definedName" => {
                self.pending_name = Some(DefinedName {
                    name: attr_str(attrs, "name").map(|n| n.into_owned()).unwrap_or_default(),
                    formula: String::new(),
                    local_sheet_id: attr_u32(attrs, "localSheetId"),
                    comment: attr_str(attrs, "comment").map(|c| c.into_owned()),
                    hidden: attr_bool(attrs, "hidden").unwrap_or(false),
                });
                ctx.start_text();
            },
            "calcPr" => {
                self.workbook.calc_pr = attrs
                    .iter()
                    .map(|a| (a.name.to_string(), a.unescaped().into_owned()))
                    .collect();
            },
            "workbookView" if !self.seen_view => {
                self.seen_view = true;
                self.workbook.active_tab = attr_u32(attrs, "activeTab").unwrap_or(0);
                self.workbook.first_sheet = attr_u32(attrs, "firstSheet").unwrap_or(0);
            },
            _ => {},
        }
        Ok(())
    }

    fn end(&mut self, ctx: &mut ParserContext, name: &str) -> HandlerResult {
        if name == "definedName"
            && let Some(mut defined) = self.pending_name.take()
        {
            defined.formula = ctx.take_text();
            self.workbook.defined_names.push(defined);
        }
        Ok(())
    }
}

/// Parse the workbook part. `resolve` maps a relationship id of the
/// workbook part to the member name of its target.
pub fn parse_workbook(input: &[u8], resolve: &dyn Fn(&str) -> Option<String>) -> Result<Parsed<Workbook>> {
    let mut parser = WorkbookParser {
        workbook: Workbook::new(),
        resolve,
        pending_name: None,
        seen_view: false,
    };
    let warnings = parser::run(&mut parser, input, SaxOptions::default())?;
    Ok(Parsed {
        value: parser.workbook,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKBOOK: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <bookViews><workbookView activeTab="1" firstSheet="0"/></bookViews>
  <sheets>
    <sheet name="Data &amp; Notes" sheetId="1" r:id="rId1"/>
    <sheet name="Hidden" sheetId="4" state="hidden" r:id="rId9"/>
  </sheets>
  <definedNames>
    <definedName name="Total">'Data &amp; Notes'!$A$1:$A$10</definedName>
    <definedName name="_xlnm.Print_Area" localSheetId="1" hidden="1">Hidden!$A$1</definedName>
  </definedNames>
  <calcPr calcId="191029" fullCalcOnLoad="1"/>
</workbook>"#;

    fn resolve(id: &str) -> Option<String> {
        (id == "rId1").then(|| "xl/worksheets/sheet1.xml".to_string())
    }

    #[test]
    fn test_parse_workbook() {
        let parsed = parse_workbook(WORKBOOK, &resolve).unwrap();
        let wb = parsed.value;
        assert_eq!(wb.sheets.len(), 2);
        assert_eq!(wb.sheets[0].name, "Data & Notes");
        assert_eq!(wb.sheets[0].worksheet_path, "xl/worksheets/sheet1.xml");
        assert_eq!(wb.sheets[1].state, SheetState::Hidden);
        assert_eq!(wb.sheets[1].worksheet_path, "xl/worksheets/sheet4.xml");
        assert_eq!(parsed.warnings.len(), 1);

        assert_eq!(wb.defined_names.len(), 2);
        assert_eq!(wb.defined_names[0].formula, "'Data & Notes'!$A$1:$A$10");
        assert_eq!(wb.defined_names[1].local_sheet_id, Some(1));
        assert!(wb.defined_names[1].hidden);

        assert_eq!(wb.calc_attr("calcId"), Some("191029"));
        assert_eq!(wb.active_tab, 1);
        assert!(!wb.is_modified());
    }
}
