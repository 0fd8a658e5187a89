//! MS-DOS date/time stamps as stored in ZIP headers.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};

/// Packed DOS date and time (2-second resolution, years 1980..=2107).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    pub date: u16,
    pub time: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the smallest representable stamp.
    pub const EPOCH: DosDateTime = DosDateTime {
        date: (1 << 5) | 1,
        time: 0,
    };

    /// Wall-clock local time.
    pub fn now() -> Self {
        Self::from_naive(&Local::now().naive_local())
    }

    /// Pack a calendar time, clamping to the DOS range.
    pub fn from_naive(dt: &NaiveDateTime) -> Self {
        let year = dt.year();
        if year < 1980 {
            return Self::EPOCH;
        }
        if year > 2107 {
            return DosDateTime {
                date: (127 << 9) | (12 << 5) | 31,
                time: (23 << 11) | (59 << 5) | 29,
            };
        }
        let date = (((year - 1980) as u16) << 9) | ((dt.month() as u16) << 5) | dt.day() as u16;
        let time = ((dt.hour() as u16) << 11)
            | ((dt.minute() as u16) << 5)
            | (dt.second().min(59) as u16 / 2);
        DosDateTime { date, time }
    }

    /// Unpack into a calendar time, or `None` for an invalid stamp.
    pub fn to_naive(self) -> Option<NaiveDateTime> {
        let year = 1980 + (self.date >> 9) as i32;
        let month = ((self.date >> 5) & 0x0f) as u32;
        let day = (self.date & 0x1f) as u32;
        let hour = (self.time >> 11) as u32;
        let minute = ((self.time >> 5) & 0x3f) as u32;
        let second = ((self.time & 0x1f) * 2) as u32;
        NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
    }
}

impl Default for DosDateTime {
    fn default() -> Self {
        Self::EPOCH
    }
}
