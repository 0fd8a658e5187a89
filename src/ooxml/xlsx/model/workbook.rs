//! Workbook-level model: the sheet list, defined names and calculation
//! properties.

/// Visibility of a sheet tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SheetState {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

impl SheetState {
    pub fn from_attr(value: &str) -> Self {
        match value {
            "hidden" => SheetState::Hidden,
            "veryHidden" => SheetState::VeryHidden,
            _ => SheetState::Visible,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SheetState::Visible => "visible",
            SheetState::Hidden => "hidden",
            SheetState::VeryHidden => "veryHidden",
        }
    }
}

/// One `<sheet>` of the workbook, with its part resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorksheetInfo {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
    /// Member name of the worksheet part.
    pub worksheet_path: String,
    pub state: SheetState,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DefinedName {
    pub name: String,
    pub formula: String,
    /// Index into the sheet list when the name is sheet-scoped.
    pub local_sheet_id: Option<u32>,
    pub comment: Option<String>,
    pub hidden: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<WorksheetInfo>,
    pub defined_names: Vec<DefinedName>,
    pub active_tab: u32,
    pub first_sheet: u32,
    /// `calcPr` attributes, unescaped, in source order.
    pub calc_pr: Vec<(String, String)>,
    sheets_changed: bool,
    names_changed: bool,
    calc_changed: bool,
    views_changed: bool,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the sheet named `name` (case-insensitive).
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        let folded = name.to_lowercase();
        self.sheets.iter().position(|s| s.name.to_lowercase() == folded)
    }

    pub fn sheet(&self, name: &str) -> Option<&WorksheetInfo> {
        self.sheet_index(name).map(|i| &self.sheets[i])
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.name.as_str())
    }

    /// Smallest `sheetId` larger than every one in use.
    pub fn next_sheet_id(&self) -> u32 {
        self.sheets.iter().map(|s| s.sheet_id).max().unwrap_or(0) + 1
    }

    pub fn push_sheet(&mut self, info: WorksheetInfo) {
        self.sheets.push(info);
        self.sheets_changed = true;
    }

    /// Rename a sheet and rewrite references to it in defined names.
    /// Returns how many defined names changed.
    pub fn rename_sheet(&mut self, index: usize, new_name: &str) -> usize {
        let Some(sheet) = self.sheets.get_mut(index) else {
            return 0;
        };
        let old = std::mem::replace(&mut sheet.name, new_name.to_string());
        self.sheets_changed = true;
        let mut rewritten = 0;
        for name in &mut self.defined_names {
            if let Some(formula) = rename_sheet_in_formula(&name.formula, &old, new_name) {
                name.formula = formula;
                rewritten += 1;
            }
        }
        if rewritten > 0 {
            self.names_changed = true;
        }
        rewritten
    }

    /// Remove a sheet. Names scoped to it are dropped, later scopes shift
    /// down, and the active and first visible tabs are clamped.
    pub fn remove_sheet(&mut self, index: usize) -> Option<WorksheetInfo> {
        if index >= self.sheets.len() {
            return None;
        }
        let removed = self.sheets.remove(index);
        self.sheets_changed = true;

        let idx = index as u32;
        let before = self.defined_names.len();
        self.defined_names.retain(|n| n.local_sheet_id != Some(idx));
        let mut names_changed = before != self.defined_names.len();
        for name in &mut self.defined_names {
            if let Some(scope) = name.local_sheet_id.as_mut()
                && *scope > idx
            {
                *scope -= 1;
                names_changed = true;
            }
        }
        self.names_changed |= names_changed;

        let last = self.sheets.len().saturating_sub(1) as u32;
        let active = clamp_tab(self.active_tab, idx, last);
        let first = clamp_tab(self.first_sheet, idx, last);
        if active != self.active_tab || first != self.first_sheet {
            self.active_tab = active;
            self.first_sheet = first;
            self.views_changed = true;
        }
        Some(removed)
    }

    /// Set (or with `None`, remove) a `calcPr` attribute.
    pub fn set_calc_attr(&mut self, name: &str, value: Option<&str>) {
        let pos = self.calc_pr.iter().position(|(k, _)| k == name);
        match (pos, value) {
            (Some(i), Some(v)) if self.calc_pr[i].1 == v => return,
            (Some(i), Some(v)) => self.calc_pr[i].1 = v.to_string(),
            (Some(i), None) => {
                self.calc_pr.remove(i);
            },
            (None, Some(v)) => self.calc_pr.push((name.to_string(), v.to_string())),
            (None, None) => return,
        }
        self.calc_changed = true;
    }

    pub fn calc_attr(&self, name: &str) -> Option<&str> {
        self.calc_pr.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn sheets_changed(&self) -> bool {
        self.sheets_changed
    }

    pub fn names_changed(&self) -> bool {
        self.names_changed
    }

    pub fn calc_changed(&self) -> bool {
        self.calc_changed
    }

    pub fn views_changed(&self) -> bool {
        self.views_changed
    }

    pub fn is_modified(&self) -> bool {
        self.sheets_changed || self.names_changed || self.calc_changed || self.views_changed
    }

    pub fn clear_changes(&mut self) {
        self.sheets_changed = false;
        self.names_changed = false;
        self.calc_changed = false;
        self.views_changed = false;
    }
}

fn clamp_tab(tab: u32, removed: u32, last: u32) -> u32 {
    let shifted = if tab > removed { tab - 1 } else { tab };
    shifted.min(last)
}

/// Sheet name as it must appear before `!` in a formula.
pub fn quote_sheet_name(name: &str) -> String {
    if needs_quotes(name) {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_string()
    }
}

fn needs_quotes(name: &str) -> bool {
    let Some(first) = name.chars().next() else {
        return true;
    };
    if first.is_ascii_digit() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
        return true;
    }
    // Names that read as cell references (A1, XFD10) need quotes too.
    let letters = name.chars().take_while(char::is_ascii_alphabetic).count();
    let rest = &name[letters..];
    (1..=3).contains(&letters) && !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

#[inline]
fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

/// Rewrite `old!` and `'old'!` sheet prefixes in a formula to `new`.
///
/// String literals and external references (`[1]Sheet!A1`) are left alone.
/// Returns `None` when nothing matched.
pub fn rename_sheet_in_formula(formula: &str, old: &str, new: &str) -> Option<String> {
    let replacement = quote_sheet_name(new);
    let old_folded = old.to_lowercase();
    let chars: Vec<char> = formula.chars().collect();
    let mut out = String::with_capacity(formula.len() + new.len());
    let mut changed = false;
    let mut i = 0;
    let mut prev: Option<char> = None;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                let start = i;
                i += 1;
                while i < chars.len() {
                    if chars[i] == '"' {
                        if chars.get(i + 1) == Some(&'"') {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i = (i + 1).min(chars.len());
                out.extend(&chars[start..i]);
            },
            '\'' => {
                let start = i;
                let mut name = String::new();
                i += 1;
                while i < chars.len() {
                    if chars[i] == '\'' {
                        if chars.get(i + 1) == Some(&'\'') {
                            name.push('\'');
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    name.push(chars[i]);
                    i += 1;
                }
                i = (i + 1).min(chars.len());
                if chars.get(i) == Some(&'!') && prev != Some(']') && name.to_lowercase() == old_folded {
                    out.push_str(&replacement);
                    changed = true;
                } else {
                    out.extend(&chars[start..i]);
                }
            },
            c if is_name_char(c) && !prev.is_some_and(is_name_char) => {
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                let run: String = chars[start..i].iter().collect();
                if chars.get(i) == Some(&'!') && prev != Some(']') && run.to_lowercase() == old_folded {
                    out.push_str(&replacement);
                    changed = true;
                } else {
                    out.push_str(&run);
                }
            },
            _ => {
                out.push(c);
                i += 1;
            },
        }
        prev = out.chars().next_back();
    }
    changed.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, id: u32) -> WorksheetInfo {
        WorksheetInfo {
            name: name.into(),
            sheet_id: id,
            rel_id: format!("rId{id}"),
            worksheet_path: format!("xl/worksheets/sheet{id}.xml"),
            state: SheetState::Visible,
        }
    }

    #[test]
    fn test_rename_in_formula() {
        assert_eq!(
            rename_sheet_in_formula("Data!$A$1:$B$2", "Data", "Numbers").as_deref(),
            Some("Numbers!$A$1:$B$2")
        );
        assert_eq!(
            rename_sheet_in_formula("SUM('My Data'!A1,data!B1)", "my data", "Q1 Figures").as_deref(),
            Some("SUM('Q1 Figures'!A1,data!B1)")
        );
        assert_eq!(
            rename_sheet_in_formula("SUM('My Data'!A1,Other!B1)", "My Data", "Q1 Figures").as_deref(),
            Some("SUM('Q1 Figures'!A1,Other!B1)")
        );
        assert_eq!(
            rename_sheet_in_formula("MyData!A1&\"Data!A1\"", "Data", "X"),
            None
        );
        assert_eq!(rename_sheet_in_formula("[1]Data!A1", "Data", "X"), None);
        assert_eq!(
            rename_sheet_in_formula("'It''s'!A1", "It's", "Plain").as_deref(),
            Some("Plain!A1")
        );
    }

    #[test]
    fn test_quote_sheet_name() {
        assert_eq!(quote_sheet_name("Sheet1"), "Sheet1");
        assert_eq!(quote_sheet_name("My Sheet"), "'My Sheet'");
        assert_eq!(quote_sheet_name("A1"), "'A1'");
        assert_eq!(quote_sheet_name("2024"), "'2024'");
        assert_eq!(quote_sheet_name("Bob's"), "'Bob''s'");
    }

    #[test]
    fn test_rename_sheet_updates_names() {
        let mut wb = Workbook::new();
        wb.push_sheet(info("Data", 1));
        wb.defined_names.push(DefinedName {
            name: "Totals".into(),
            formula: "Data!$B$1:$B$10".into(),
            ..DefinedName::default()
        });
        wb.clear_changes();
        assert_eq!(wb.rename_sheet(0, "Numbers"), 1);
        assert_eq!(wb.defined_names[0].formula, "Numbers!$B$1:$B$10");
        assert!(wb.sheets_changed() && wb.names_changed());
        assert_eq!(wb.sheet_index("NUMBERS"), Some(0));
    }

    #[test]
    fn test_remove_sheet_fixes_scopes_and_tabs() {
        let mut wb = Workbook::new();
        for (i, name) in ["A", "B", "C"].iter().enumerate() {
            wb.push_sheet(info(name, i as u32 + 1));
        }
        wb.active_tab = 2;
        wb.defined_names = vec![
            DefinedName {
                name: "_xlnm.Print_Area".into(),
                formula: "B!$A$1".into(),
                local_sheet_id: Some(1),
                ..DefinedName::default()
            },
            DefinedName {
                name: "_xlnm.Print_Area".into(),
                formula: "C!$A$1".into(),
                local_sheet_id: Some(2),
                ..DefinedName::default()
            },
        ];
        let removed = wb.remove_sheet(1).unwrap();
        assert_eq!(removed.name, "B");
        assert_eq!(wb.defined_names.len(), 1);
        assert_eq!(wb.defined_names[0].local_sheet_id, Some(1));
        assert_eq!(wb.active_tab, 1);
        assert!(wb.views_changed());
        assert_eq!(wb.next_sheet_id(), 4);
    }

    #[test]
    fn test_calc_attrs() {
        let mut wb = Workbook::new();
        wb.calc_pr.push(("calcId".into(), "191029".into()));
        wb.set_calc_attr("calcId", Some("191029"));
        assert!(!wb.calc_changed());
        wb.set_calc_attr("fullCalcOnLoad", Some("1"));
        assert!(wb.calc_changed());
        assert_eq!(wb.calc_attr("fullCalcOnLoad"), Some("1"));
    }
}
