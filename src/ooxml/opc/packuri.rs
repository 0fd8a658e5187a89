//! Part-name arithmetic.
//!
//! Part names are handled in their ZIP member form: forward slashes, no
//! leading slash (`xl/worksheets/sheet1.xml`). The package itself is the
//! empty name `""`. Relationship targets are resolved against the directory
//! of their source part; a target with a leading `/` is package-absolute.

/// Member name of the package-level relationships part.
pub const PACKAGE_RELS: &str = "_rels/.rels";

/// Member name of the content-types catalog.
pub const CONTENT_TYPES: &str = "[Content_Types].xml";

/// Directory portion of a part name.
///
/// For example, "xl/worksheets" for "xl/worksheets/sheet1.xml" and "" for a
/// part at the package root.
pub fn directory(part: &str) -> &str {
    match part.rfind('/') {
        Some(pos) => &part[..pos],
        None => "",
    }
}

/// Filename portion of a part name.
pub fn filename(part: &str) -> &str {
    match part.rfind('/') {
        Some(pos) => &part[pos + 1..],
        None => part,
    }
}

/// Extension without the leading period, or "" when there is none.
pub fn extension(part: &str) -> &str {
    let name = filename(part);
    match name.rfind('.') {
        Some(pos) => &name[pos + 1..],
        None => "",
    }
}

/// Numeric suffix of a tuple part name.
///
/// Returns 21 for "xl/worksheets/sheet21.xml" and None for "xl/workbook.xml".
pub fn index(part: &str) -> Option<u32> {
    let name = filename(part);
    let stem = match name.rfind('.') {
        Some(pos) => &name[..pos],
        None => name,
    };
    let digits = stem.len() - stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 || digits == stem.len() {
        return None;
    }
    atoi_simd::parse::<u32, false, false>(&stem.as_bytes()[stem.len() - digits..]).ok()
}

/// Resolve `..` and `.` segments and drop empty ones.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                parts.pop();
            },
            _ => parts.push(segment),
        }
    }
    parts.join("/")
}

/// Resolve a relationship target against its source part.
///
/// # Arguments
/// * `source` - Member name of the source part ("" for the package)
/// * `target` - The `Target` attribute as written in the rels part
pub fn resolve_target(source: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize(absolute);
    }
    let base = directory(source);
    if base.is_empty() {
        normalize(target)
    } else {
        normalize(&format!("{base}/{target}"))
    }
}

/// Relative reference from the directory of `source` to `target`.
///
/// For example, "../media/image1.png" from "xl/drawings/drawing1.xml" to
/// "xl/media/image1.png".
pub fn relative_ref(source: &str, target: &str) -> String {
    let from: Vec<&str> = directory(source).split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();

    // Never consume the filename of `target` as a shared directory.
    let common = from
        .iter()
        .zip(to.iter().take(to.len().saturating_sub(1)))
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = String::with_capacity(target.len() + 8);
    for _ in common..from.len() {
        out.push_str("../");
    }
    out.push_str(&to[common..].join("/"));
    out
}

/// Member name of the rels part that belongs to `part`.
///
/// For example, "xl/_rels/workbook.xml.rels" for "xl/workbook.xml" and
/// "_rels/.rels" for the package.
pub fn rels_path_for(part: &str) -> String {
    if part.is_empty() {
        return PACKAGE_RELS.to_string();
    }
    let dir = directory(part);
    if dir.is_empty() {
        format!("_rels/{}.rels", filename(part))
    } else {
        format!("{dir}/_rels/{}.rels", filename(part))
    }
}

/// Inverse of [`rels_path_for`]: the source part of a rels part, or `None`
/// when `path` is not a rels part name.
pub fn source_of_rels(path: &str) -> Option<String> {
    if path == PACKAGE_RELS {
        return Some(String::new());
    }
    let name = filename(path).strip_suffix(".rels")?;
    let dir = directory(path);
    let parent = if dir == "_rels" {
        ""
    } else {
        dir.strip_suffix("/_rels")?
    };
    if name.is_empty() {
        return None;
    }
    Some(if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    })
}

/// Whether `path` is a relationships part.
#[inline]
pub fn is_rels(path: &str) -> bool {
    source_of_rels(path).is_some()
}

/// Content-types Override key for a member name.
#[inline]
pub fn absolute(part: &str) -> String {
    format!("/{part}")
}
