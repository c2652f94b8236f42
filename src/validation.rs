// Validation utilities module
// Provides custom validation functions for domain-specific rules

use chrono::{NaiveDate, NaiveDateTime};
use validator::ValidationError;

use crate::bookings::models::BookingStatus;

/// Validates that check-out falls strictly after check-in
pub fn validate_stay_dates(check_in: NaiveDate, check_out: NaiveDate) -> Result<(), ValidationError> {
    if check_out <= check_in {
        let mut error = ValidationError::new("check_out_not_after_check_in");
        error.message = Some("Check-out date must be after check-in date".into());
        Err(error)
    } else {
        Ok(())
    }
}

/// Validates that a new booking starts out pending or confirmed
pub fn validate_initial_status(status: &BookingStatus) -> Result<(), ValidationError> {
    match status {
        BookingStatus::Pending | BookingStatus::Confirmed => Ok(()),
        BookingStatus::Cancelled => Err(ValidationError::new("invalid_initial_status")),
    }
}

/// Parse a calendar date from either `YYYY-MM-DD` or a full timestamp
///
/// Chat classifiers send `2024-07-01T12:00:00+02:00`; only the date part of
/// such values is used.
pub fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(timestamp) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.date_naive());
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(timestamp.date());
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(timestamp.date());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_validate_stay_dates() {
        assert!(validate_stay_dates(date("2024-07-01"), date("2024-07-02")).is_ok());
        assert!(validate_stay_dates(date("2024-07-01"), date("2024-07-01")).is_err());
        assert!(validate_stay_dates(date("2024-07-02"), date("2024-07-01")).is_err());
    }

    #[test]
    fn test_validate_initial_status() {
        assert!(validate_initial_status(&BookingStatus::Pending).is_ok());
        assert!(validate_initial_status(&BookingStatus::Confirmed).is_ok());
        assert!(validate_initial_status(&BookingStatus::Cancelled).is_err());
    }

    #[test]
    fn test_parse_calendar_date_formats() {
        let expected = Some(date("2024-07-01"));
        assert_eq!(parse_calendar_date("2024-07-01"), expected);
        assert_eq!(parse_calendar_date(" 2024-07-01 "), expected);
        assert_eq!(parse_calendar_date("2024-07-01T12:00:00+02:00"), expected);
        assert_eq!(parse_calendar_date("2024-07-01 08:30:00"), expected);
        assert_eq!(parse_calendar_date("2024-07-01T08:30:00"), expected);
        assert_eq!(parse_calendar_date("next tuesday"), None);
        assert_eq!(parse_calendar_date(""), None);
    }
}
