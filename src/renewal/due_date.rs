use chrono::{Days, Months, NaiveDate};

/// Durations sold as whole calendar months.
const MONTHLY_DURATIONS: &[(i64, u32)] = &[(30, 1), (90, 3), (180, 6), (365, 12)];

/// Calendar months `duration_days` stands for, when it is one of the
/// monthly plan lengths.
pub fn calendar_months(duration_days: i64) -> Option<u32> {
    MONTHLY_DURATIONS
        .iter()
        .find(|(days, _)| *days == duration_days)
        .map(|(_, months)| *months)
}

/// New due date after renewing for `duration_days`.
///
/// Renewing early extends from the current due date, renewing late extends
/// from today. Monthly durations add calendar months, clamping to the last
/// day of the target month (Jan 31 + 1 month is Feb 28 or 29).
pub fn extend_due_date(current: Option<NaiveDate>, today: NaiveDate, duration_days: i64) -> NaiveDate {
    let base = current.map_or(today, |due| due.max(today));

    let extended = match calendar_months(duration_days) {
        Some(months) => base.checked_add_months(Months::new(months)),
        None if duration_days >= 0 => base.checked_add_days(Days::new(duration_days as u64)),
        None => base.checked_sub_days(Days::new(duration_days.unsigned_abs())),
    };

    extended.unwrap_or(NaiveDate::MAX)
}

/// Credits a renewal of `duration_days` costs: about one per month, never
/// less than one.
pub fn credits_for(duration_days: i64) -> i64 {
    match calendar_months(duration_days) {
        Some(months) => i64::from(months),
        None => (duration_days.saturating_add(15) / 30).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_end_of_month_clamps() {
        let today = date(2024, 1, 15);
        assert_eq!(extend_due_date(Some(date(2024, 1, 31)), today, 30), date(2024, 2, 29));
        assert_eq!(
            extend_due_date(Some(date(2023, 1, 31)), date(2023, 1, 15), 30),
            date(2023, 2, 28)
        );
    }

    #[test]
    fn test_early_and_late_renewals() {
        let today = date(2024, 3, 10);
        // early: from the due date
        assert_eq!(extend_due_date(Some(date(2024, 3, 20)), today, 90), date(2024, 6, 20));
        // late: from today
        assert_eq!(extend_due_date(Some(date(2024, 2, 1)), today, 30), date(2024, 4, 10));
        // never renewed
        assert_eq!(extend_due_date(None, today, 365), date(2025, 3, 10));
    }

    #[test]
    fn test_raw_days() {
        let today = date(2024, 1, 1);
        assert_eq!(extend_due_date(None, today, 7), date(2024, 1, 8));
        assert_eq!(extend_due_date(None, today, 60), date(2024, 3, 1));
    }

    #[test]
    fn test_credits() {
        assert_eq!(credits_for(30), 1);
        assert_eq!(credits_for(90), 3);
        assert_eq!(credits_for(365), 12);
        assert_eq!(credits_for(7), 1);
        assert_eq!(credits_for(60), 2);
        assert_eq!(credits_for(i64::MAX), i64::MAX / 30);
    }
}
