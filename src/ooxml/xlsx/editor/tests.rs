use super::*;
use crate::ooxml::opc::constants::{content_type as ct, relationship_type as rt};
use crate::ooxml::xlsx::error::PackageErrorKind;
use longan_zip::MemorySink;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfixture image payload";

fn rels(entries: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );
    for (id, rel_type, target) in entries {
        xml.push_str(&format!("<Relationship Id=\"{id}\" Type=\"{rel_type}\" Target=\"{target}\"/>"));
    }
    xml.push_str("</Relationships>");
    xml
}

fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

/// Two sheets (`Data` with a picture, `Summary` with a formula), shared
/// strings, styles, a calculation chain and both property parts.
fn fixture(dir: &Path) -> PathBuf {
    let overrides = [
        ("/xl/workbook.xml", ct::SML_SHEET_MAIN),
        ("/xl/worksheets/sheet1.xml", ct::SML_WORKSHEET),
        ("/xl/worksheets/sheet2.xml", ct::SML_WORKSHEET),
        ("/xl/styles.xml", ct::SML_STYLES),
        ("/xl/sharedStrings.xml", ct::SML_SHARED_STRINGS),
        ("/xl/calcChain.xml", ct::SML_CALC_CHAIN),
        ("/xl/drawings/drawing1.xml", ct::DML_DRAWING),
        ("/docProps/core.xml", ct::OPC_CORE_PROPERTIES),
        ("/docProps/app.xml", ct::OFC_EXTENDED_PROPERTIES),
    ];
    let mut types = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
         <Default Extension=\"png\" ContentType=\"image/png\"/>",
    );
    for (part, media_type) in overrides {
        types.push_str(&format!("<Override PartName=\"{part}\" ContentType=\"{media_type}\"/>"));
    }
    types.push_str("</Types>");

    let workbook = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <workbook xmlns=\"{MAIN_NS}\" xmlns:r=\"{REL_NS}\">\
         <bookViews><workbookView activeTab=\"0\"/></bookViews>\
         <sheets><sheet name=\"Data\" sheetId=\"1\" r:id=\"rId1\"/><sheet name=\"Summary\" sheetId=\"2\" r:id=\"rId2\"/></sheets>\
         <definedNames><definedName name=\"Total\">Data!$A$1:$A$3</definedName></definedNames>\
         <calcPr calcId=\"191029\"/></workbook>"
    );
    let data_sheet = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <worksheet xmlns=\"{MAIN_NS}\" xmlns:r=\"{REL_NS}\"><dimension ref=\"A1:B3\"/><sheetData>\
         <row r=\"1\"><c r=\"A1\" t=\"s\"><v>0</v></c><c r=\"B1\"><v>1.5</v></c></row>\
         <row r=\"2\"><c r=\"A2\"><v>2</v></c></row>\
         <row r=\"3\"><c r=\"A3\"><v>3</v></c></row>\
         </sheetData><drawing r:id=\"rId1\"/></worksheet>"
    );
    let summary_sheet = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <worksheet xmlns=\"{MAIN_NS}\" xmlns:r=\"{REL_NS}\"><dimension ref=\"A1:B1\"/><sheetData>\
         <row r=\"1\"><c r=\"A1\"><f>SUM(Data!A1:A3)</f><v>5</v></c><c r=\"B1\" t=\"s\"><v>1</v></c></row>\
         </sheetData></worksheet>"
    );
    let drawing = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <xdr:wsDr xmlns:xdr=\"http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing\" \
         xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" \
         xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
         <xdr:oneCellAnchor><xdr:from><xdr:col>3</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>1</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>\
         <xdr:ext cx=\"100\" cy=\"100\"/><xdr:pic><xdr:nvPicPr><xdr:cNvPr id=\"2\" name=\"Logo\"/><xdr:cNvPicPr/></xdr:nvPicPr>\
         <xdr:blipFill><a:blip r:embed=\"rId1\"/></xdr:blipFill><xdr:spPr/></xdr:pic><xdr:clientData/></xdr:oneCellAnchor></xdr:wsDr>";
    let shared_strings = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <sst xmlns=\"{MAIN_NS}\" count=\"2\" uniqueCount=\"2\"><si><t>alpha</t></si><si><t>beta</t></si></sst>"
    );
    let styles = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <styleSheet xmlns=\"{MAIN_NS}\">\
         <fonts count=\"1\"><font><sz val=\"11\"/><name val=\"Calibri\"/></font></fonts>\
         <fills count=\"2\"><fill><patternFill patternType=\"none\"/></fill><fill><patternFill patternType=\"gray125\"/></fill></fills>\
         <borders count=\"1\"><border><left/><right/><top/><bottom/><diagonal/></border></borders>\
         <cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>\
         <cellXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/></cellXfs>\
         <cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles>\
         </styleSheet>"
    );
    let calc_chain = format!("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><calcChain xmlns=\"{MAIN_NS}\"><c r=\"A1\" i=\"2\"/></calcChain>");
    let core = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
         xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
         <dc:title>Quarterly</dc:title><dc:creator>Finance</dc:creator>\
         <dcterms:modified xsi:type=\"dcterms:W3CDTF\">2024-01-02T03:04:05Z</dcterms:modified></cp:coreProperties>";
    let app = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/extended-properties\" \
         xmlns:vt=\"http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes\">\
         <Application>Microsoft Excel</Application>\
         <HeadingPairs><vt:vector size=\"2\" baseType=\"variant\"><vt:variant><vt:lpstr>Worksheets</vt:lpstr></vt:variant><vt:variant><vt:i4>2</vt:i4></vt:variant></vt:vector></HeadingPairs>\
         <TitlesOfParts><vt:vector size=\"2\" baseType=\"lpstr\"><vt:lpstr>Data</vt:lpstr><vt:lpstr>Summary</vt:lpstr></vt:vector></TitlesOfParts>\
         </Properties>";

    let path = dir.join("source.xlsx");
    write_zip(
        &path,
        &[
            ("[Content_Types].xml", types.into_bytes()),
            (
                "_rels/.rels",
                rels(&[
                    ("rId1", rt::OFFICE_DOCUMENT, "xl/workbook.xml"),
                    ("rId2", rt::CORE_PROPERTIES, "docProps/core.xml"),
                    ("rId3", rt::EXTENDED_PROPERTIES, "docProps/app.xml"),
                ])
                .into_bytes(),
            ),
            ("docProps/core.xml", core.as_bytes().to_vec()),
            ("docProps/app.xml", app.as_bytes().to_vec()),
            ("xl/workbook.xml", workbook.into_bytes()),
            (
                "xl/_rels/workbook.xml.rels",
                rels(&[
                    ("rId1", rt::WORKSHEET, "worksheets/sheet1.xml"),
                    ("rId2", rt::WORKSHEET, "worksheets/sheet2.xml"),
                    ("rId3", rt::STYLES, "styles.xml"),
                    ("rId4", rt::SHARED_STRINGS, "sharedStrings.xml"),
                    ("rId5", rt::CALC_CHAIN, "calcChain.xml"),
                ])
                .into_bytes(),
            ),
            ("xl/worksheets/sheet1.xml", data_sheet.into_bytes()),
            ("xl/worksheets/sheet2.xml", summary_sheet.into_bytes()),
            (
                "xl/worksheets/_rels/sheet1.xml.rels",
                rels(&[("rId1", rt::DRAWING, "../drawings/drawing1.xml")]).into_bytes(),
            ),
            ("xl/drawings/drawing1.xml", drawing.as_bytes().to_vec()),
            (
                "xl/drawings/_rels/drawing1.xml.rels",
                rels(&[("rId1", rt::IMAGE, "../media/image1.png")]).into_bytes(),
            ),
            ("xl/media/image1.png", PNG_BYTES.to_vec()),
            ("xl/sharedStrings.xml", shared_strings.into_bytes()),
            ("xl/styles.xml", styles.into_bytes()),
            ("xl/calcChain.xml", calc_chain.into_bytes()),
        ],
    );
    path
}

/// Every entry of an archive, read with the `zip` crate.
fn entries(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut out = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        assert!(out.insert(file.name().to_string(), data).is_none(), "duplicate entry");
    }
    out
}

fn text(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).unwrap()
}

fn open_quiet(path: &Path) -> (PackageEditor, MemorySink) {
    let sink = MemorySink::new();
    let editor = PackageEditor::open_with(path, WorkbookOptions::default(), sink.shared()).unwrap();
    (editor, sink)
}

#[test]
fn test_create_minimal_workbook() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out.xlsx");
    let mut editor = PackageEditor::create_with(WorkbookOptions::default(), MemorySink::new().shared()).unwrap();
    editor.add_sheet("Sheet1").unwrap();
    editor.set_cell("Sheet1", "A1", "Hello").unwrap();
    editor.set_cell("Sheet1", "B1", 42.0).unwrap();
    assert_eq!(editor.strategy(), CommitStrategy::PureCreate);

    let report = editor.commit(&out).unwrap();
    assert_eq!(report.strategy, CommitStrategy::PureCreate);
    assert!(report.copied.is_empty());

    let written = entries(&out);
    for path in [
        "[Content_Types].xml",
        "_rels/.rels",
        "docProps/app.xml",
        "docProps/core.xml",
        "xl/workbook.xml",
        "xl/_rels/workbook.xml.rels",
        "xl/worksheets/sheet1.xml",
        "xl/styles.xml",
        "xl/theme/theme1.xml",
        "xl/sharedStrings.xml",
    ] {
        assert!(written.contains_key(path), "missing {path}");
    }
    assert_eq!(report.stats.entries_written as usize, written.len());

    let (reopened, sink) = open_quiet(&out);
    assert_eq!(reopened.sheet_names(), vec!["Sheet1".to_string()]);
    assert_eq!(reopened.get_cell("Sheet1", "A1").unwrap(), Value::String("Hello".into()));
    assert_eq!(reopened.get_cell("Sheet1", "B1").unwrap(), Value::Number(42.0));
    assert_eq!(reopened.get_cell("Sheet1", "C1").unwrap(), Value::Empty);
    assert!(sink.warnings().is_empty(), "{:?}", sink.warnings());
}

#[test]
fn test_commit_requires_a_sheet() {
    let dir = TempDir::new().unwrap();
    let mut editor = PackageEditor::create_with(WorkbookOptions::default(), MemorySink::new().shared()).unwrap();
    let err = editor.commit(dir.path().join("empty.xlsx")).unwrap_err();
    assert_eq!(err.kind(), PackageErrorKind::Validation);
    assert!(!dir.path().join("empty.xlsx").exists());
}

#[test]
fn test_commit_without_edits_copies_every_entry() {
    let dir = TempDir::new().unwrap();
    let source = fixture(dir.path());
    let out = dir.path().join("copy.xlsx");
    let (mut editor, sink) = open_quiet(&source);
    assert!(!editor.is_modified());

    let report = editor.commit(&out).unwrap();
    assert_eq!(report.strategy, CommitStrategy::None);
    assert!(report.regenerated.is_empty(), "{:?}", report.regenerated);
    assert!(report.removed.is_empty());

    let before = entries(&source);
    let after = entries(&out);
    assert_eq!(before, after);
    let digest = |bytes: &[u8]| Sha256::digest(bytes).to_vec();
    assert_eq!(
        digest(&after["xl/media/image1.png"]),
        digest(PNG_BYTES),
        "media must survive untouched"
    );
    assert!(sink.warnings().is_empty(), "{:?}", sink.warnings());
    assert_eq!(editor.path(), Some(out.as_path()));
}

#[test]
fn test_open_loads_parts_lazily() {
    let dir = TempDir::new().unwrap();
    let (editor, _) = open_quiet(&fixture(dir.path()));
    assert_eq!(editor.sheet_names(), vec!["Data".to_string(), "Summary".to_string()]);
    assert!(editor.sheets.values().all(|slot| !slot.is_loaded()));
    assert!(!editor.shared_strings.is_loaded());

    assert_eq!(editor.get_cell("Data", "A1").unwrap(), Value::String("alpha".into()));
    assert_eq!(editor.get_cell_at("Data", 0, 1).unwrap(), Value::Number(1.5));
    assert!(editor.sheets["xl/worksheets/sheet1.xml"].is_loaded());
    assert!(!editor.sheets["xl/worksheets/sheet2.xml"].is_loaded());
    assert_eq!(editor.used_range("Data").unwrap(), Some((0, 0, 2, 1)));

    match editor.get_cell("Summary", "A1").unwrap() {
        Value::Formula { formula, cached } => {
            assert_eq!(formula, "SUM(Data!A1:A3)");
            assert_eq!(cached.as_deref(), Some("5"));
        },
        other => panic!("expected a formula, got {other:?}"),
    }
    assert_eq!(editor.defined_names()[0].name, "Total");
}

#[test]
fn test_rename_sheet_rewrites_references() {
    let dir = TempDir::new().unwrap();
    let source = fixture(dir.path());
    let out = dir.path().join("renamed.xlsx");
    let (mut editor, _) = open_quiet(&source);
    editor.rename_sheet("Data", "Numbers").unwrap();
    let report = editor.commit(&out).unwrap();
    assert!(report.regenerated.iter().any(|p| p == "xl/workbook.xml"));

    let before = entries(&source);
    let after = entries(&out);
    assert_eq!(
        after["xl/_rels/workbook.xml.rels"], before["xl/_rels/workbook.xml.rels"],
        "sheet relationships are untouched by a rename"
    );
    assert_eq!(after["xl/worksheets/sheet1.xml"], before["xl/worksheets/sheet1.xml"]);
    assert!(text(&after["xl/workbook.xml"]).contains("name=\"Numbers\""));
    assert!(text(&after["docProps/app.xml"]).contains("<vt:lpstr>Numbers</vt:lpstr>"));

    let (reopened, _) = open_quiet(&out);
    assert_eq!(reopened.sheet_names(), vec!["Numbers".to_string(), "Summary".to_string()]);
    assert_eq!(reopened.defined_names()[0].formula, "Numbers!$A$1:$A$3");
    assert_eq!(reopened.get_cell("Numbers", "A2").unwrap(), Value::Number(2.0));
    match reopened.get_cell("Summary", "A1").unwrap() {
        Value::Formula { formula, .. } => assert_eq!(formula, "SUM(Numbers!A1:A3)"),
        other => panic!("expected a formula, got {other:?}"),
    }
}

#[test]
fn test_shared_strings_are_deduplicated() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("strings.xlsx");
    let mut editor = PackageEditor::create_with(WorkbookOptions::default(), MemorySink::new().shared()).unwrap();
    editor.add_sheet("Sheet1").unwrap();
    for row in 0..1000 {
        editor.set_cell_at("Sheet1", row, 0, "同一字符串").unwrap();
    }
    editor.commit(&out).unwrap();

    let written = entries(&out);
    let sst = text(&written["xl/sharedStrings.xml"]);
    assert_eq!(sst.matches("<si>").count(), 1);
    assert!(sst.contains("同一字符串"));
    let sheet = text(&written["xl/worksheets/sheet1.xml"]);
    assert_eq!(sheet.matches("t=\"s\"").count(), 1000);
    assert_eq!(sheet.matches("<v>0</v>").count(), 1000);
}

#[test]
fn test_inline_strings_when_table_disabled() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("inline.xlsx");
    let options = WorkbookOptions::default().with_shared_strings(false);
    let mut editor = PackageEditor::create_with(options, MemorySink::new().shared()).unwrap();
    editor.add_sheet("Sheet1").unwrap();
    editor.set_cell("Sheet1", "A1", "loose").unwrap();
    editor.commit(&out).unwrap();

    let written = entries(&out);
    assert!(!written.contains_key("xl/sharedStrings.xml"));
    let (reopened, _) = open_quiet(&out);
    assert_eq!(reopened.get_cell("Sheet1", "A1").unwrap(), Value::String("loose".into()));
}

#[test]
fn test_cell_edit_drops_calc_chain() {
    let dir = TempDir::new().unwrap();
    let source = fixture(dir.path());
    let out = dir.path().join("edited.xlsx");
    let (mut editor, _) = open_quiet(&source);
    editor.set_cell("Data", "C1", 7.0).unwrap();
    editor.set_cell("Data", "C2", "gamma").unwrap();
    let report = editor.commit(&out).unwrap();
    assert!(report.removed.iter().any(|p| p == "xl/calcChain.xml"));

    let before = entries(&source);
    let after = entries(&out);
    assert!(!after.contains_key("xl/calcChain.xml"));
    assert!(text(&after["xl/workbook.xml"]).contains("fullCalcOnLoad=\"1\""));
    assert!(!text(&after["[Content_Types].xml"]).contains("calcChain"));
    assert!(!text(&after["xl/_rels/workbook.xml.rels"]).contains("calcChain"));
    for (path, bytes) in &before {
        if path.starts_with("xl/media/") || path.starts_with("xl/drawings/") {
            assert_eq!(&after[path], bytes, "{path} changed");
        }
    }

    let (reopened, _) = open_quiet(&out);
    assert_eq!(reopened.get_cell("Data", "C1").unwrap(), Value::Number(7.0));
    assert_eq!(reopened.get_cell("Data", "C2").unwrap(), Value::String("gamma".into()));
    assert_eq!(reopened.get_cell("Data", "A1").unwrap(), Value::String("alpha".into()));
    assert_eq!(reopened.get_cell("Summary", "B1").unwrap(), Value::String("beta".into()));
    let props = reopened.doc_props().unwrap();
    assert_eq!(props.core.title.as_deref(), Some("Quarterly"));
    assert_ne!(props.core.modified.as_deref(), Some("2024-01-02T03:04:05Z"));
}

#[test]
fn test_formula_values() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("formulas.xlsx");
    let mut editor = PackageEditor::create_with(WorkbookOptions::default(), MemorySink::new().shared()).unwrap();
    editor.add_sheet("Calc").unwrap();
    editor.set_cell("Calc", "A1", 2.0).unwrap();
    editor.set_cell("Calc", "A2", Value::formula("=A1*3")).unwrap();
    editor
        .set_cell(
            "Calc",
            "A3",
            Value::Formula {
                formula: "IF(A1>1,\"big\",\"small\")".into(),
                cached: Some("big".into()),
            },
        )
        .unwrap();
    editor.commit(&out).unwrap();

    let (reopened, _) = open_quiet(&out);
    match reopened.get_cell("Calc", "A2").unwrap() {
        Value::Formula { formula, .. } => assert_eq!(formula, "A1*3"),
        other => panic!("expected a formula, got {other:?}"),
    }
    match reopened.get_cell("Calc", "A3").unwrap() {
        Value::Formula { cached, .. } => assert_eq!(cached.as_deref(), Some("big")),
        other => panic!("expected a formula, got {other:?}"),
    }
}

#[test]
fn test_structure_change_rewrites_catalog() {
    let dir = TempDir::new().unwrap();
    let (mut editor, _) = open_quiet(&fixture(dir.path()));
    editor.add_sheet("Extra").unwrap();
    assert_eq!(editor.strategy(), CommitStrategy::FullRebuild);
    let out = dir.path().join("extra.xlsx");
    let report = editor.commit(&out).unwrap();
    for path in ["xl/workbook.xml", "xl/_rels/workbook.xml.rels", "[Content_Types].xml"] {
        assert!(report.regenerated.iter().any(|p| p == path), "{path} not rewritten");
    }

    let after = entries(&out);
    assert!(after.contains_key("xl/worksheets/sheet3.xml"));
    assert!(text(&after["[Content_Types].xml"]).contains("/xl/worksheets/sheet3.xml"));
    let (reopened, _) = open_quiet(&out);
    assert_eq!(reopened.sheet_names(), vec!["Data", "Summary", "Extra"]);
    assert_eq!(reopened.used_range("Extra").unwrap(), None);
}

#[test]
fn test_remove_sheet_drops_owned_parts() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("removed.xlsx");
    let (mut editor, _) = open_quiet(&fixture(dir.path()));
    editor.remove_sheet("Data").unwrap();
    let report = editor.commit(&out).unwrap();

    let after = entries(&out);
    for gone in [
        "xl/worksheets/sheet1.xml",
        "xl/worksheets/_rels/sheet1.xml.rels",
        "xl/drawings/drawing1.xml",
        "xl/drawings/_rels/drawing1.xml.rels",
        "xl/media/image1.png",
    ] {
        assert!(!after.contains_key(gone), "{gone} still present");
        assert!(report.removed.iter().any(|p| p == gone), "{gone} not reported");
    }
    assert!(!text(&after["[Content_Types].xml"]).contains("sheet1.xml"));
    assert!(!text(&after["xl/_rels/workbook.xml.rels"]).contains("sheet1.xml"));

    let (mut reopened, _) = open_quiet(&out);
    assert_eq!(reopened.sheet_names(), vec!["Summary".to_string()]);
    let err = reopened.remove_sheet("Summary").unwrap_err();
    assert_eq!(err.kind(), PackageErrorKind::Validation);
}

#[test]
fn test_add_image_deduplicates_media() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("pictures.xlsx");
    let (mut editor, _) = open_quiet(&fixture(dir.path()));
    editor.add_image("Summary", "B2:C4", PNG_BYTES, "image/png").unwrap();
    editor
        .add_image("Data", "E5", b"\x89PNG\r\n\x1a\nsecond picture", "image/png")
        .unwrap();
    editor.commit(&out).unwrap();

    let after = entries(&out);
    assert!(after.contains_key("xl/drawings/drawing2.xml"));
    assert!(after.contains_key("xl/media/image2.png"));
    assert!(!after.contains_key("xl/media/image3.png"));
    assert_eq!(after["xl/media/image1.png"], PNG_BYTES);

    let summary = text(&after["xl/worksheets/sheet2.xml"]);
    assert!(summary.contains("<drawing r:id=\"rId1\"/>"));
    let summary_rels = text(&after["xl/worksheets/_rels/sheet2.xml.rels"]);
    assert!(summary_rels.contains("../drawings/drawing2.xml"));
    let new_drawing_rels = text(&after["xl/drawings/_rels/drawing2.xml.rels"]);
    assert!(new_drawing_rels.contains("../media/image1.png"));

    let data_drawing = text(&after["xl/drawings/drawing1.xml"]);
    assert!(data_drawing.contains("name=\"Logo\""));
    assert!(data_drawing.contains("id=\"3\""));
    assert!(data_drawing.contains("r:embed=\"rId2\""));
    let data_drawing_rels = text(&after["xl/drawings/_rels/drawing1.xml.rels"]);
    assert!(data_drawing_rels.contains("../media/image2.png"));
    assert!(text(&after["[Content_Types].xml"]).contains("/xl/drawings/drawing2.xml"));
}

#[test]
fn test_add_image_rejects_bad_input() {
    let dir = TempDir::new().unwrap();
    let (mut editor, _) = open_quiet(&fixture(dir.path()));
    for (range, bytes, mime) in [
        ("B2:C4", PNG_BYTES, "text/plain"),
        ("nope", PNG_BYTES, "image/png"),
        ("B2", &b""[..], "image/png"),
    ] {
        let err = editor.add_image("Summary", range, bytes, mime).unwrap_err();
        assert_eq!(err.kind(), PackageErrorKind::Validation);
    }
    assert!(!editor.is_modified());
}

#[test]
fn test_styles_append_and_assign() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("styled.xlsx");
    let (mut editor, _) = open_quiet(&fixture(dir.path()));
    assert_eq!(editor.style_count().unwrap(), 1);
    let id = editor.append_style(&CellFormat::with_number_format("0.00%")).unwrap();
    assert_eq!(id, 1);
    editor.set_cell_style("Data", "A2", id).unwrap();
    editor.set_column_format("Data", 3, Some(id)).unwrap();
    let err = editor.set_cell_style("Data", "A3", 9).unwrap_err();
    assert_eq!(err.kind(), PackageErrorKind::Validation);
    editor.commit(&out).unwrap();

    let (reopened, _) = open_quiet(&out);
    assert_eq!(reopened.style_count().unwrap(), 2);
    assert_eq!(reopened.cell_style("Data", "A2").unwrap(), Some(1));
    assert_eq!(reopened.column_format("Data", 3).unwrap(), Some(1));
    assert_eq!(reopened.get_cell("Data", "A2").unwrap(), Value::Number(2.0));
}

#[test]
fn test_invalid_edits_change_nothing() {
    let dir = TempDir::new().unwrap();
    let (mut editor, _) = open_quiet(&fixture(dir.path()));
    let cases = [
        editor.set_cell("Data", "A0", 1.0),
        editor.set_cell("Data", "XFE1", 1.0),
        editor.set_cell("Data", "A1", f64::NAN),
        editor.set_cell("Nowhere", "A1", 1.0),
        editor.add_sheet("Bad/Name"),
        editor.add_sheet("summary"),
        editor.rename_sheet("Data", ""),
        editor.rename_sheet("Data", "SUMMARY"),
    ];
    for result in cases {
        assert_eq!(result.unwrap_err().kind(), PackageErrorKind::Validation);
    }
    assert!(!editor.is_modified());
    assert_eq!(editor.sheet_names(), vec!["Data", "Summary"]);
    assert!(!editor.calc_dropped);
}

#[test]
fn test_failed_cell_edit_keeps_old_value() {
    let dir = TempDir::new().unwrap();
    let mut parts = entries(&fixture(dir.path()));
    parts.insert(
        "xl/sharedStrings.xml".to_string(),
        format!("<sst xmlns=\"{MAIN_NS}\"><si><t>alpha</t></si><si><t>beta").into_bytes(),
    );
    let broken = dir.path().join("broken_sst.xlsx");
    let listed: Vec<(&str, Vec<u8>)> = parts.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
    write_zip(&broken, &listed);

    let (mut editor, _) = open_quiet(&broken);
    assert!(editor.set_cell("Data", "A2", "gamma").is_err());
    assert_eq!(editor.get_cell("Data", "A2").unwrap(), Value::Number(2.0));
    assert!(!editor.calc_dropped);
    assert!(editor.graph.contains("xl/calcChain.xml"));

    editor.set_cell("Data", "A2", 9.0).unwrap();
    assert_eq!(editor.get_cell("Data", "A2").unwrap(), Value::Number(9.0));
    assert!(editor.calc_dropped);
    assert!(!editor.graph.contains("xl/calcChain.xml"));
}

#[test]
fn test_open_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = PackageEditor::open(dir.path().join("absent.xlsx")).unwrap_err();
    assert_eq!(err.kind(), PackageErrorKind::FileNotFound);
}

#[test]
fn test_failed_commit_leaves_destination() {
    let dir = TempDir::new().unwrap();
    let source = fixture(dir.path());
    let out = dir.path().join("keep.xlsx");
    std::fs::write(&out, b"previous contents").unwrap();
    let options = WorkbookOptions::default().with_tmpdir(dir.path().join("missing"));
    let mut editor = PackageEditor::open_with(&source, options, MemorySink::new().shared()).unwrap();
    editor.set_cell("Data", "A1", 1.0).unwrap();

    let err = editor.commit(&out).unwrap_err();
    assert_eq!(err.kind(), PackageErrorKind::FileWriteError);
    assert_eq!(std::fs::read(&out).unwrap(), b"previous contents");
    assert_eq!(editor.path(), Some(source.as_path()));
    assert!(editor.is_modified());
}

#[test]
fn test_save_in_place() {
    let dir = TempDir::new().unwrap();
    let source = fixture(dir.path());
    let (mut editor, _) = open_quiet(&source);
    editor.set_cell("Summary", "C1", true).unwrap();
    editor.save().unwrap();
    assert!(!editor.is_modified());
    assert_eq!(editor.get_cell("Summary", "C1").unwrap(), Value::Bool(true));

    let (reopened, _) = open_quiet(&source);
    assert_eq!(reopened.get_cell("Summary", "C1").unwrap(), Value::Bool(true));
    assert_eq!(reopened.get_cell("Data", "B1").unwrap(), Value::Number(1.5));
    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn test_streaming_output() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("streamed.xlsx");
    let options = WorkbookOptions::default()
        .with_constant_memory(true)
        .with_row_buffer_size(7);
    let mut editor = PackageEditor::create_with(options, MemorySink::new().shared()).unwrap();
    editor.add_sheet("Big").unwrap();
    for row in 0..50 {
        editor.set_cell_at("Big", row, 0, f64::from(row)).unwrap();
        editor.set_cell_at("Big", row, 1, format!("row {row}")).unwrap();
    }
    editor.commit(&out).unwrap();

    let (reopened, _) = open_quiet(&out);
    assert_eq!(reopened.get_cell_at("Big", 49, 0).unwrap(), Value::Number(49.0));
    assert_eq!(reopened.get_cell_at("Big", 13, 1).unwrap(), Value::String("row 13".into()));
    assert_eq!(reopened.used_range("Big").unwrap(), Some((0, 0, 49, 1)));
}

#[test]
fn test_doc_props_follow_sheets() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("props.xlsx");
    let mut editor = PackageEditor::create_with(WorkbookOptions::default(), MemorySink::new().shared()).unwrap();
    editor.add_sheet("First").unwrap();
    editor.add_sheet("Second").unwrap();
    let mut props = editor.doc_props().unwrap();
    props.core.title = Some("Budget".into());
    props.app.titles = vec!["ignored".into()];
    editor.set_doc_props(props).unwrap();
    editor.commit(&out).unwrap();

    let (reopened, _) = open_quiet(&out);
    let props = reopened.doc_props().unwrap();
    assert_eq!(props.core.title.as_deref(), Some("Budget"));
    assert_eq!(props.app.titles, vec!["First".to_string(), "Second".to_string()]);
}

#[test]
fn test_second_commit_after_rebind() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.xlsx");
    let second = dir.path().join("second.xlsx");
    let mut editor = PackageEditor::create_with(WorkbookOptions::default(), MemorySink::new().shared()).unwrap();
    editor.add_sheet("Sheet1").unwrap();
    editor.set_cell("Sheet1", "A1", "one").unwrap();
    editor.commit(&first).unwrap();
    assert_eq!(editor.strategy(), CommitStrategy::None);

    editor.set_cell("Sheet1", "A2", "two").unwrap();
    let report = editor.commit(&second).unwrap();
    assert!(report.copied.iter().any(|p| p == "xl/theme/theme1.xml"));

    let (reopened, _) = open_quiet(&second);
    assert_eq!(reopened.get_cell("Sheet1", "A1").unwrap(), Value::String("one".into()));
    assert_eq!(reopened.get_cell("Sheet1", "A2").unwrap(), Value::String("two".into()));
}
