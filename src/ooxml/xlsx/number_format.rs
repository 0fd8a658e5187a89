//! Built-in number formats, date detection and Excel serial dates.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// First id available to custom number formats.
pub const FIRST_CUSTOM_ID: u32 = 164;

/// A number format as stored in the styles part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    pub id: u32,
    pub code: String,
}

impl NumberFormat {
    #[inline]
    pub fn new(id: u32, code: impl Into<String>) -> Self {
        Self { id, code: code.into() }
    }

    /// Check if this is a built-in format (ID < 164).
    #[inline]
    pub fn is_builtin(&self) -> bool {
        self.id < FIRST_CUSTOM_ID
    }

    pub fn is_date_format(&self) -> bool {
        is_builtin_date_id(self.id) || is_date_format(&self.code)
    }
}

/// Built-in format codes keyed by code, for reusing an id instead of
/// declaring a custom format.
static BUILTIN_IDS: phf::Map<&'static str, u32> = phf::phf_map! {
    "General" => 0,
    "0" => 1,
    "0.00" => 2,
    "#,##0" => 3,
    "#,##0.00" => 4,
    "0%" => 9,
    "0.00%" => 10,
    "0.00E+00" => 11,
    "# ?/?" => 12,
    "# ??/??" => 13,
    "mm-dd-yy" => 14,
    "d-mmm-yy" => 15,
    "d-mmm" => 16,
    "mmm-yy" => 17,
    "h:mm AM/PM" => 18,
    "h:mm:ss AM/PM" => 19,
    "h:mm" => 20,
    "h:mm:ss" => 21,
    "m/d/yy h:mm" => 22,
    "#,##0 ;(#,##0)" => 37,
    "#,##0 ;[Red](#,##0)" => 38,
    "#,##0.00;(#,##0.00)" => 39,
    "#,##0.00;[Red](#,##0.00)" => 40,
    "mm:ss" => 45,
    "[h]:mm:ss" => 46,
    "mmss.0" => 47,
    "##0.0E+0" => 48,
    "@" => 49,
};

/// Id of the built-in format with exactly this code.
pub fn builtin_id(code: &str) -> Option<u32> {
    BUILTIN_IDS.get(code).copied()
}

/// Get the format code for a built-in number format ID.
pub fn builtin_format_code(id: u32) -> Option<&'static str> {
    match id {
        0 => Some("General"),
        1 => Some("0"),
        2 => Some("0.00"),
        3 => Some("#,##0"),
        4 => Some("#,##0.00"),
        9 => Some("0%"),
        10 => Some("0.00%"),
        11 => Some("0.00E+00"),
        12 => Some("# ?/?"),
        13 => Some("# ??/??"),
        14 => Some("mm-dd-yy"),
        15 => Some("d-mmm-yy"),
        16 => Some("d-mmm"),
        17 => Some("mmm-yy"),
        18 => Some("h:mm AM/PM"),
        19 => Some("h:mm:ss AM/PM"),
        20 => Some("h:mm"),
        21 => Some("h:mm:ss"),
        22 => Some("m/d/yy h:mm"),
        37 => Some("#,##0 ;(#,##0)"),
        38 => Some("#,##0 ;[Red](#,##0)"),
        39 => Some("#,##0.00;(#,##0.00)"),
        40 => Some("#,##0.00;[Red](#,##0.00)"),
        45 => Some("mm:ss"),
        46 => Some("[h]:mm:ss"),
        47 => Some("mmss.0"),
        48 => Some("##0.0E+0"),
        49 => Some("@"),
        _ => None,
    }
}

/// Built-in ids that render as dates or times.
#[inline]
pub fn is_builtin_date_id(id: u32) -> bool {
    matches!(id, 14..=22 | 45..=47 | 176..=180)
}

/// Check if a format code represents a date/time format.
///
/// Only the first section counts; `[h]`-style elapsed-time codes are
/// durations, not dates.
pub fn is_date_format(format: &str) -> bool {
    let mut escaped = false;
    let mut is_quote = false;
    let mut brackets = 0u8;
    let mut prev = ' ';
    let mut hms = false;
    let mut ap = false;

    for s in format.chars() {
        match (s, escaped, is_quote, ap, brackets) {
            (_, true, ..) => escaped = false,
            ('_' | '\\', ..) => escaped = true,
            ('"', _, true, _, _) => is_quote = false,
            (_, _, true, _, _) => (),
            ('"', _, _, _, _) => is_quote = true,
            (';', ..) => return false,
            ('[', ..) => brackets += 1,
            (']', .., 1) if hms => return false,
            (']', ..) => brackets = brackets.saturating_sub(1),
            ('a' | 'A', _, _, false, 0) => ap = true,
            ('p' | 'm' | '/' | 'P' | 'M', _, _, true, 0) => return true,
            ('d' | 'm' | 'h' | 'y' | 's' | 'D' | 'M' | 'H' | 'Y' | 'S', _, _, false, 0) => {
                return true;
            },
            _ => {
                if !(hms && s.eq_ignore_ascii_case(&prev)) {
                    hms = prev == '[' && matches!(s, 'm' | 'h' | 's' | 'M' | 'H' | 'S');
                }
            },
        }
        prev = s;
    }
    false
}

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap_or_default()
        .and_time(NaiveTime::MIN)
}

/// Excel serial day number (1900 date system) of a timestamp.
///
/// Serial 60 is the phantom 1900-02-29; dates before 1900-03-01 are shifted
/// by one day so that 1900-01-01 is serial 1.
pub fn serial_from_naive(dt: NaiveDateTime) -> f64 {
    let delta = dt - epoch();
    let days = delta.num_days();
    let secs = (delta - Duration::days(days)).num_milliseconds() as f64 / 1000.0;
    let mut serial = days as f64 + secs / 86_400.0;
    if serial < 61.0 {
        serial -= 1.0;
    }
    serial
}

/// Inverse of [`serial_from_naive`]. Serial 60 maps to 1900-02-28.
pub fn serial_to_naive(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let adjusted = if serial < 60.0 {
        serial + 1.0
    } else if serial < 61.0 {
        59.0 + serial.fract() + 1.0
    } else {
        serial
    };
    let days = adjusted.trunc() as i64;
    let millis = (adjusted.fract() * 86_400_000.0).round() as i64;
    epoch()
        .checked_add_signed(Duration::days(days))?
        .checked_add_signed(Duration::milliseconds(millis))
}

/// Serial day number of an ISO-8601 date or date-time (`t="d"` cells).
pub fn iso_to_serial(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(serial_from_naive(dt.naive_local()));
    }
    const FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text.trim_end_matches('Z'), fmt) {
            return Some(serial_from_naive(dt));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(serial_from_naive(d.and_time(NaiveTime::MIN)));
    }
    if let Ok(t) = NaiveTime::parse_from_str(text, "%H:%M:%S%.f") {
        return Some(f64::from(t.num_seconds_from_midnight()) / 86_400.0);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_date_format() {
        assert!(is_date_format("DD/MM/YY"));
        assert!(is_date_format("H:MM:SS;@"));
        assert!(is_date_format("m\"M\"d\"D\";@"));
        assert!(is_date_format("[$-404]e\"\\xfc\"m\"\\xfc\"d\"\\xfc\""));
        assert!(is_date_format("yyyy-mm-dd"));

        assert!(!is_date_format("\"$\"#,##0_);[Red](\"$\"#,##0)"));
        assert!(!is_date_format("0_ ;[Red]\\-0\\ "));
        assert!(!is_date_format("#,##0.0####\" YMD\""));
        assert!(!is_date_format("[h]:mm:ss"));
        assert!(!is_date_format("[ss]"));
    }

    #[test]
    fn test_builtin_lookups() {
        assert_eq!(builtin_format_code(14), Some("mm-dd-yy"));
        assert_eq!(builtin_format_code(999), None);
        assert_eq!(builtin_id("0.00%"), Some(10));
        assert_eq!(builtin_id("yyyy-mm-dd"), None);
        assert!(is_builtin_date_id(14));
        assert!(is_builtin_date_id(47));
        assert!(is_builtin_date_id(178));
        assert!(!is_builtin_date_id(2));
        assert!(NumberFormat::new(14, "").is_date_format());
        assert!(!NumberFormat::new(2, "0.00").is_date_format());
    }

    #[test]
    fn test_serial_dates() {
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap().and_time(NaiveTime::MIN);
        assert_eq!(serial_from_naive(d(1900, 1, 1)), 1.0);
        assert_eq!(serial_from_naive(d(1900, 2, 28)), 59.0);
        assert_eq!(serial_from_naive(d(1900, 3, 1)), 61.0);
        assert_eq!(serial_from_naive(d(2024, 1, 15)), 45306.0);
        assert_eq!(serial_to_naive(61.0), Some(d(1900, 3, 1)));
        assert_eq!(serial_to_naive(1.0), Some(d(1900, 1, 1)));
        assert_eq!(serial_to_naive(45306.5), Some(d(2024, 1, 15) + Duration::hours(12)));
    }

    #[test]
    fn test_iso_to_serial() {
        assert_eq!(iso_to_serial("2024-01-15"), Some(45306.0));
        assert_eq!(iso_to_serial("2024-01-15T12:00:00"), Some(45306.5));
        assert_eq!(iso_to_serial("2024-01-15T12:00:00Z"), Some(45306.5));
        assert_eq!(iso_to_serial("12:00:00"), Some(0.5));
        assert_eq!(iso_to_serial("not a date"), None);
    }
}
