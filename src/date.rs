//! Date strings for date overlays (`dd-MM-yyyy`).

use chrono::NaiveDate;

pub const DATE_FORMAT: &str = "%d-%m-%Y";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Build and format a calendar date; `None` if it does not exist.
pub fn format_ymd(year: i32, month: u32, day: u32) -> Option<String> {
    NaiveDate::from_ymd_opt(year, month, day).map(format_date)
}

/// Today's date in the local time zone.
#[cfg(not(target_arch = "wasm32"))]
pub fn today() -> String {
    format_date(chrono::Local::now().date_naive())
}
