use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};

/// Argentina does not observe DST; the authority works in UTC-03:00
const ARGENTINA_OFFSET_SECS: i32 = -3 * 3600;

/// Date format used inside authority requests and responses
pub const AUTHORITY_DATE_FORMAT: &str = "%Y%m%d";

/// Date format used for display and storage
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

pub fn argentina_offset() -> FixedOffset {
    FixedOffset::east_opt(ARGENTINA_OFFSET_SECS).expect("Valid offset")
}

/// Convert a UTC timestamp to Argentina local time
pub fn to_argentina(utc_time: DateTime<Utc>) -> DateTime<FixedOffset> {
    utc_time.with_timezone(&argentina_offset())
}

/// Calendar date in Argentina for the given instant
pub fn argentina_date(utc_time: DateTime<Utc>) -> NaiveDate {
    to_argentina(utc_time).date_naive()
}

pub fn today_in_argentina() -> NaiveDate {
    argentina_date(Utc::now())
}

/// Timestamp as the login ticket request wants it: `2025-12-12T16:30:00-03:00`
pub fn format_ticket_timestamp(utc_time: DateTime<Utc>) -> String {
    to_argentina(utc_time)
        .format("%Y-%m-%dT%H:%M:%S%:z")
        .to_string()
}

/// `YYYYMMDD`, no separators
pub fn format_authority_date(date: NaiveDate) -> String {
    date.format(AUTHORITY_DATE_FORMAT).to_string()
}

/// Accepts `YYYYMMDD` or `YYYY-MM-DD`
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, AUTHORITY_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(value, ISO_DATE_FORMAT))
        .ok()
}

/// `20250131` -> `2025-01-31`; `None` when the input is not a date
pub fn authority_to_iso(value: &str) -> Option<String> {
    NaiveDate::parse_from_str(value.trim(), AUTHORITY_DATE_FORMAT)
        .ok()
        .map(|d| d.format(ISO_DATE_FORMAT).to_string())
}

/// First and last day of the month preceding `date`
pub fn previous_month(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first_of_month = date - Duration::days(i64::from(date.day0()));
    let last_of_previous = first_of_month - Duration::days(1);
    let first_of_previous = last_of_previous - Duration::days(i64::from(last_of_previous.day0()));
    (first_of_previous, last_of_previous)
}

/// Serde adapters for optional dates sent as `YYYYMMDD` or `YYYY-MM-DD`
pub mod flexible_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.serialize_some(&date.format(super::ISO_DATE_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => super::parse_date(value)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", value))),
        }
    }
}
