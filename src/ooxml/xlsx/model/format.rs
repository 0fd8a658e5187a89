//! Cell format descriptors accepted by `append_style`.

/// Cell format information.
///
/// Every part left as `None` refers to the workbook's default entry
/// (font 0, fill 0, border 0, number format `General`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellFormat {
    pub font: Option<CellFont>,
    pub fill: Option<CellFill>,
    pub border: Option<CellBorder>,
    /// Number format code; built-in codes reuse their built-in id.
    pub number_format: Option<String>,
}

impl CellFormat {
    pub fn with_number_format(code: impl Into<String>) -> Self {
        Self {
            number_format: Some(code.into()),
            ..Self::default()
        }
    }
}

/// Font properties for a cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellFont {
    pub name: Option<String>,
    pub size: Option<f64>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    /// ARGB hex, e.g. `FFFF0000`.
    pub color: Option<String>,
}

/// Fill properties for a cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellFill {
    pub pattern_type: CellFillPatternType,
    pub fg_color: Option<String>,
    pub bg_color: Option<String>,
}

impl CellFill {
    /// A solid fill in one colour.
    pub fn solid(color: impl Into<String>) -> Self {
        Self {
            pattern_type: CellFillPatternType::Solid,
            fg_color: Some(color.into()),
            bg_color: None,
        }
    }
}

/// Cell fill pattern types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFillPatternType {
    None,
    Solid,
    Gray125,
    DarkGray,
    MediumGray,
    LightGray,
    Gray0625,
    DarkHorizontal,
    DarkVertical,
    DarkDown,
    DarkUp,
    DarkGrid,
    DarkTrellis,
}

impl CellFillPatternType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Solid => "solid",
            Self::Gray125 => "gray125",
            Self::DarkGray => "darkGray",
            Self::MediumGray => "mediumGray",
            Self::LightGray => "lightGray",
            Self::Gray0625 => "gray0625",
            Self::DarkHorizontal => "darkHorizontal",
            Self::DarkVertical => "darkVertical",
            Self::DarkDown => "darkDown",
            Self::DarkUp => "darkUp",
            Self::DarkGrid => "darkGrid",
            Self::DarkTrellis => "darkTrellis",
        }
    }
}

/// Border properties for a cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellBorder {
    pub left: Option<CellBorderSide>,
    pub right: Option<CellBorderSide>,
    pub top: Option<CellBorderSide>,
    pub bottom: Option<CellBorderSide>,
    pub diagonal: Option<CellBorderSide>,
}

impl CellBorder {
    /// The same side on all four edges.
    pub fn all(side: CellBorderSide) -> Self {
        Self {
            left: Some(side.clone()),
            right: Some(side.clone()),
            top: Some(side.clone()),
            bottom: Some(side),
            diagonal: None,
        }
    }
}

/// Border side properties.
#[derive(Debug, Clone, PartialEq)]
pub struct CellBorderSide {
    pub style: CellBorderLineStyle,
    pub color: Option<String>,
}

/// Border line styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellBorderLineStyle {
    None,
    Thin,
    Medium,
    Dashed,
    Dotted,
    Thick,
    Double,
    Hair,
    MediumDashed,
    DashDot,
    MediumDashDot,
    DashDotDot,
    MediumDashDotDot,
    SlantDashDot,
}

impl CellBorderLineStyle {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Thin => "thin",
            Self::Medium => "medium",
            Self::Dashed => "dashed",
            Self::Dotted => "dotted",
            Self::Thick => "thick",
            Self::Double => "double",
            Self::Hair => "hair",
            Self::MediumDashed => "mediumDashed",
            Self::DashDot => "dashDot",
            Self::MediumDashDot => "mediumDashDot",
            Self::DashDotDot => "dashDotDot",
            Self::MediumDashDotDot => "mediumDashDotDot",
            Self::SlantDashDot => "slantDashDot",
        }
    }
}
