use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use wayfare_types::Money;

/// Demand- and time-based price used by `UpdateDynamicPrice`.
///
/// - occupancy raises the base price by up to 50% at a full vehicle
/// - departure within 7/3/1 days adds 10/20/30%
/// - June through August and December through January add 20%
///
/// The result is clamped to `[price, 2.5 * price]` and truncated to cents.
pub fn dynamic_price(
    price: Money,
    total_seats: u32,
    available_seats: u32,
    departure: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Money {
    let occupancy = if total_seats == 0 {
        Decimal::ZERO
    } else {
        Decimal::from(total_seats.saturating_sub(available_seats)) / Decimal::from(total_seats)
    };
    let occupancy_factor = Decimal::ONE + occupancy * Decimal::new(5, 1);

    let hours_left = (departure - now).num_hours();
    let time_factor = if hours_left < 24 {
        Decimal::new(13, 1)
    } else if hours_left < 72 {
        Decimal::new(12, 1)
    } else if hours_left < 168 {
        Decimal::new(11, 1)
    } else {
        Decimal::ONE
    };

    let month = now.month();
    let peak = (6..=8).contains(&month) || month == 12 || month == 1;
    let seasonal_factor = if peak { Decimal::new(12, 1) } else { Decimal::ONE };

    let raw = price * occupancy_factor * time_factor * seasonal_factor;
    let capped = raw.max(price).min(price * Decimal::new(25, 1));
    (capped * Decimal::ONE_HUNDRED).trunc() / Decimal::ONE_HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn off_peak() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn empty_far_off_season_is_base_price() {
        let now = off_peak();
        let p = dynamic_price(Decimal::from(50), 10, 10, now + Duration::days(30), now);
        assert_eq!(p, Decimal::from(50));
    }

    #[test]
    fn full_last_minute_peak_is_capped() {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap();
        // 1.5 * 1.3 * 1.2 = 2.34 stays under the 2.5 cap.
        let p = dynamic_price(Decimal::from(100), 4, 0, now + Duration::hours(2), now);
        assert_eq!(p, Decimal::from(234));
    }

    #[test]
    fn half_full_within_three_days() {
        let now = off_peak();
        // 1.25 * 1.2 = 1.5
        let p = dynamic_price(Decimal::from(40), 4, 2, now + Duration::hours(48), now);
        assert_eq!(p, Decimal::from(60));
    }

    #[test]
    fn truncates_to_cents() {
        let now = off_peak();
        // 1/3 occupancy: 1 + 0.1666.. = 1.1666.. * 10 = 11.666.. -> 11.66
        let p = dynamic_price(Decimal::from(10), 3, 2, now + Duration::days(30), now);
        assert_eq!(p, Decimal::new(1166, 2));
    }
}
