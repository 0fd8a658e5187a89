//! `xl/theme/theme1.xml` for packages created from scratch.
//!
//! Styles refer to theme colours and fonts (`<color theme="1"/>`,
//! `<scheme val="minor"/>`), so a new workbook always carries one.

use crate::common::xml::XmlWriter;
use crate::ooxml::opc::constants::namespace;

/// The twelve theme colours as `RRGGBB`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorScheme {
    pub name: String,
    pub dk1: String,
    pub lt1: String,
    pub dk2: String,
    pub lt2: String,
    pub accents: [String; 6],
    pub hlink: String,
    pub fol_hlink: String,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            name: "Office".to_string(),
            dk1: "000000".to_string(),
            lt1: "FFFFFF".to_string(),
            dk2: "44546A".to_string(),
            lt2: "E7E6E6".to_string(),
            accents: ["4472C4", "ED7D31", "A5A5A5", "FFC000", "5B9BD5", "70AD47"].map(String::from),
            hlink: "0563C1".to_string(),
            fol_hlink: "954F72".to_string(),
        }
    }
}

impl ColorScheme {
    fn write(&self, w: &mut XmlWriter) {
        w.start_element("a:clrScheme").attribute("name", &self.name);
        let fixed = [
            ("a:dk1", &self.dk1),
            ("a:lt1", &self.lt1),
            ("a:dk2", &self.dk2),
            ("a:lt2", &self.lt2),
        ];
        for (slot, rgb) in fixed {
            srgb_slot(w, slot, rgb);
        }
        for (i, rgb) in self.accents.iter().enumerate() {
            srgb_slot(w, &format!("a:accent{}", i + 1), rgb);
        }
        srgb_slot(w, "a:hlink", &self.hlink);
        srgb_slot(w, "a:folHlink", &self.fol_hlink);
        w.end_element();
    }
}

fn srgb_slot(w: &mut XmlWriter, slot: &str, rgb: &str) {
    w.start_element(slot)
        .start_element("a:srgbClr")
        .attribute("val", rgb)
        .end_element()
        .end_element();
}

const FORMAT_SCHEME: &str = concat!(
    "<a:fmtScheme name=\"Office\"><a:fillStyleLst>",
    "<a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill>",
    "<a:gradFill rotWithShape=\"1\"><a:gsLst><a:gs pos=\"0\"><a:schemeClr val=\"phClr\"><a:tint val=\"50000\"/><a:satMod val=\"300000\"/></a:schemeClr></a:gs><a:gs pos=\"100000\"><a:schemeClr val=\"phClr\"><a:tint val=\"15000\"/><a:satMod val=\"350000\"/></a:schemeClr></a:gs></a:gsLst><a:lin ang=\"16200000\" scaled=\"1\"/></a:gradFill>",
    "<a:gradFill rotWithShape=\"1\"><a:gsLst><a:gs pos=\"0\"><a:schemeClr val=\"phClr\"><a:shade val=\"51000\"/><a:satMod val=\"130000\"/></a:schemeClr></a:gs><a:gs pos=\"100000\"><a:schemeClr val=\"phClr\"><a:shade val=\"94000\"/><a:satMod val=\"135000\"/></a:schemeClr></a:gs></a:gsLst><a:lin ang=\"16200000\" scaled=\"0\"/></a:gradFill>",
    "</a:fillStyleLst><a:lnStyleLst>",
    "<a:ln w=\"6350\" cap=\"flat\" cmpd=\"sng\" algn=\"ctr\"><a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill><a:prstDash val=\"solid\"/><a:miter lim=\"800000\"/></a:ln>",
    "<a:ln w=\"12700\" cap=\"flat\" cmpd=\"sng\" algn=\"ctr\"><a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill><a:prstDash val=\"solid\"/><a:miter lim=\"800000\"/></a:ln>",
    "<a:ln w=\"19050\" cap=\"flat\" cmpd=\"sng\" algn=\"ctr\"><a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill><a:prstDash val=\"solid\"/><a:miter lim=\"800000\"/></a:ln>",
    "</a:lnStyleLst><a:effectStyleLst>",
    "<a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle>",
    "<a:effectStyle><a:effectLst><a:outerShdw blurRad=\"57150\" dist=\"19050\" dir=\"5400000\" algn=\"ctr\" rotWithShape=\"0\"><a:srgbClr val=\"000000\"><a:alpha val=\"63000\"/></a:srgbClr></a:outerShdw></a:effectLst></a:effectStyle>",
    "</a:effectStyleLst><a:bgFillStyleLst>",
    "<a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill>",
    "<a:solidFill><a:schemeClr val=\"phClr\"><a:tint val=\"95000\"/><a:satMod val=\"170000\"/></a:schemeClr></a:solidFill>",
    "<a:gradFill rotWithShape=\"1\"><a:gsLst><a:gs pos=\"0\"><a:schemeClr val=\"phClr\"><a:tint val=\"93000\"/><a:satMod val=\"150000\"/></a:schemeClr></a:gs><a:gs pos=\"100000\"><a:schemeClr val=\"phClr\"><a:shade val=\"63000\"/><a:satMod val=\"120000\"/></a:schemeClr></a:gs></a:gsLst><a:lin ang=\"5400000\" scaled=\"0\"/></a:gradFill>",
    "</a:bgFillStyleLst></a:fmtScheme>",
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub name: String,
    /// Heading typeface.
    pub major_font: String,
    /// Body typeface.
    pub minor_font: String,
    pub colors: ColorScheme,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            name: "Office Theme".to_string(),
            major_font: "Calibri Light".to_string(),
            minor_font: "Calibri".to_string(),
            colors: ColorScheme::default(),
        }
    }
}

impl Theme {
    pub fn to_xml(&self) -> Vec<u8> {
        let mut w = XmlWriter::with_capacity(8 * 1024);
        w.declaration()
            .start_element("a:theme")
            .attribute("xmlns:a", namespace::DML_MAIN)
            .attribute("name", &self.name)
            .start_element("a:themeElements");
        self.colors.write(&mut w);
        w.start_element("a:fontScheme").attribute("name", "Office");
        for (slot, typeface) in [("a:majorFont", &self.major_font), ("a:minorFont", &self.minor_font)] {
            w.start_element(slot)
                .start_element("a:latin")
                .attribute("typeface", typeface)
                .end_element()
                .start_element("a:ea")
                .attribute("typeface", "")
                .end_element()
                .start_element("a:cs")
                .attribute("typeface", "")
                .end_element()
                .end_element();
        }
        w.end_element();
        w.raw(FORMAT_SCHEME);
        w.end_element();
        w.raw("<a:objectDefaults/><a:extraClrSchemeLst/>");
        w.end_element();
        w.into_bytes()
    }
}
