//! Driving restriction by last plate digit ("pico y placa").
//!
//! Each weekday two final digits are barred from circulating between 07:00
//! and 19:00. Weekends are unrestricted. Motorcycle plates end in a letter,
//! so their digit is the character before it.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// First restricted hour (inclusive)
pub const RESTRICTION_START_HOUR: u32 = 7;
/// Restriction ends at this hour (exclusive)
pub const RESTRICTION_END_HOUR: u32 = 19;

/// Digits barred on a given weekday
pub fn restricted_digits(day: Weekday) -> &'static [u32] {
    match day {
        Weekday::Mon => &[1, 2],
        Weekday::Tue => &[3, 4],
        Weekday::Wed => &[5, 6],
        Weekday::Thu => &[7, 8],
        Weekday::Fri => &[9, 0],
        Weekday::Sat | Weekday::Sun => &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum RestrictionReason {
    InvalidPlate,
    UnrecognizedFormat,
    Weekend,
    DigitNotRestrictedToday { digit: u32 },
    OutsideHours { digit: u32 },
    Active { digit: u32 },
}

impl fmt::Display for RestrictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestrictionReason::InvalidPlate => write!(f, "invalid plate"),
            RestrictionReason::UnrecognizedFormat => write!(f, "unrecognized plate format"),
            RestrictionReason::Weekend => write!(f, "no restriction on weekends"),
            RestrictionReason::DigitNotRestrictedToday { digit } => {
                write!(f, "digit {} is not restricted today", digit)
            }
            RestrictionReason::OutsideHours { digit } => {
                write!(f, "digit {} is restricted today but outside restricted hours", digit)
            }
            RestrictionReason::Active { digit } => {
                write!(f, "restriction active for digit {}", digit)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionStatus {
    pub restricted: bool,
    #[serde(flatten)]
    pub reason: RestrictionReason,
}

impl RestrictionStatus {
    fn free(reason: RestrictionReason) -> Self {
        Self {
            restricted: false,
            reason,
        }
    }

    pub fn message(&self) -> String {
        self.reason.to_string()
    }
}

/// Digit the restriction applies to, if the plate has one in the right place
fn restriction_digit(plate: &str) -> Option<u32> {
    let chars: Vec<char> = plate.chars().collect();
    let last = *chars.last()?;
    if let Some(d) = last.to_digit(10) {
        return Some(d);
    }
    // Motorcycles: ABC12D
    if last.is_ascii_alphabetic() && chars.len() >= 2 {
        return chars[chars.len() - 2].to_digit(10);
    }
    None
}

/// Evaluate the restriction for `plate` at local time `at`.
pub fn check_driving_restriction(plate: &str, at: NaiveDateTime) -> RestrictionStatus {
    let plate = plate.trim().to_uppercase();
    if plate.chars().count() < 6 {
        return RestrictionStatus::free(RestrictionReason::InvalidPlate);
    }

    let Some(digit) = restriction_digit(&plate) else {
        return RestrictionStatus::free(RestrictionReason::UnrecognizedFormat);
    };

    let day = at.weekday();
    if matches!(day, Weekday::Sat | Weekday::Sun) {
        return RestrictionStatus::free(RestrictionReason::Weekend);
    }

    if !restricted_digits(day).contains(&digit) {
        return RestrictionStatus::free(RestrictionReason::DigitNotRestrictedToday { digit });
    }

    let hour = at.hour();
    if !(RESTRICTION_START_HOUR..RESTRICTION_END_HOUR).contains(&hour) {
        return RestrictionStatus::free(RestrictionReason::OutsideHours { digit });
    }

    RestrictionStatus {
        restricted: true,
        reason: RestrictionReason::Active { digit },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2024-03-11 is a Monday
    fn monday_at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 11)
            .unwrap()
            .and_hms_opt(h, 30, 0)
            .unwrap()
    }

    fn day_at(day: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_car_restricted_on_its_day() {
        let status = check_driving_restriction("ABC121", monday_at(8));
        assert!(status.restricted);
        assert_eq!(status.reason, RestrictionReason::Active { digit: 1 });
    }

    #[test]
    fn test_outside_hours() {
        let early = check_driving_restriction("ABC122", monday_at(6));
        assert!(!early.restricted);
        assert_eq!(early.reason, RestrictionReason::OutsideHours { digit: 2 });

        // 19:00 is already free
        let evening = check_driving_restriction("ABC122", day_at(11, 19));
        assert!(!evening.restricted);

        let last_hour = check_driving_restriction("ABC122", day_at(11, 18));
        assert!(last_hour.restricted);
    }

    #[test]
    fn test_motorcycle_uses_digit_before_letter() {
        // Friday restricts 9 and 0
        let status = check_driving_restriction("ABC90D", day_at(15, 10));
        assert!(status.restricted);
        assert_eq!(status.reason, RestrictionReason::Active { digit: 0 });
    }

    #[test]
    fn test_other_days() {
        let status = check_driving_restriction("ABC125", monday_at(10));
        assert_eq!(status.reason, RestrictionReason::DigitNotRestrictedToday { digit: 5 });

        // Wednesday 2024-03-13 restricts 5 and 6
        assert!(check_driving_restriction("ABC125", day_at(13, 10)).restricted);
    }

    #[test]
    fn test_weekend_and_bad_plates() {
        // Saturday 2024-03-16
        let weekend = check_driving_restriction("ABC121", day_at(16, 10));
        assert_eq!(weekend.reason, RestrictionReason::Weekend);
        assert!(!weekend.restricted);

        assert_eq!(
            check_driving_restriction("AB12", monday_at(10)).reason,
            RestrictionReason::InvalidPlate
        );
        assert_eq!(
            check_driving_restriction("ABCDEF", monday_at(10)).reason,
            RestrictionReason::UnrecognizedFormat
        );
    }

    #[test]
    fn test_lowercase_input() {
        assert!(check_driving_restriction("abc121", monday_at(9)).restricted);
    }

    #[test]
    fn test_message() {
        let status = check_driving_restriction("ABC121", monday_at(8));
        assert_eq!(status.message(), "restriction active for digit 1");
    }
}
