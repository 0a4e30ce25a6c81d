//! Carbs-on-board estimation with linear absorption.

use crate::numeric::round_to;
use crate::Treatment;
use chrono::{DateTime, Utc};

/// Grams of carbohydrate not yet absorbed at `now`.
///
/// Each entry absorbs linearly over `carbs / absorption_rate` hours.
/// Returns 0 when the absorption rate is not positive.
pub fn carbs_on_board(treatments: &[Treatment], now: DateTime<Utc>, absorption_rate: f64) -> f64 {
    if absorption_rate <= 0.0 {
        return 0.0;
    }

    let total: f64 = treatments
        .iter()
        .filter_map(|t| t.carbs_grams.filter(|g| *g > 0.0).map(|g| (t, g)))
        .map(|(treatment, grams)| {
            let window_minutes = grams / absorption_rate * 60.0;
            let elapsed = treatment.minutes_before(now);
            if (0.0..=window_minutes).contains(&elapsed) {
                grams * (1.0 - elapsed / window_minutes)
            } else {
                0.0
            }
        })
        .sum();

    let cob = round_to(total, 1);
    tracing::debug!("COB at {}: {} g", now, cob);
    cob
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventType;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_single_meal_absorbs_linearly() {
        let treatments = vec![Treatment::carbs(t0(), 60.0)];

        assert_eq!(carbs_on_board(&treatments, t0(), 30.0), 60.0);
        assert_eq!(carbs_on_board(&treatments, t0() + Duration::hours(1), 30.0), 30.0);
        assert_eq!(carbs_on_board(&treatments, t0() + Duration::hours(2), 30.0), 0.0);
        assert_eq!(carbs_on_board(&treatments, t0() + Duration::hours(3), 30.0), 0.0);
    }

    #[test]
    fn test_entries_sum_and_ignore_insulin_only_treatments() {
        let mut meal = Treatment::bolus(EventType::MealBolus, t0(), 5.0);
        meal.carbs_grams = Some(30.0);
        let treatments = vec![
            meal,
            Treatment::carbs(t0() + Duration::minutes(30), 15.0),
            Treatment::bolus(EventType::CorrectionBolus, t0(), 1.0),
        ];

        // 30 g over 1 h at 30 min: 15 g; 15 g over 30 min at 0 min: 15 g
        let cob = carbs_on_board(&treatments, t0() + Duration::minutes(30), 30.0);
        assert_eq!(cob, 30.0);
    }

    #[test]
    fn test_future_entries_and_bad_rate() {
        let treatments = vec![Treatment::carbs(t0() + Duration::minutes(5), 20.0)];
        assert_eq!(carbs_on_board(&treatments, t0(), 30.0), 0.0);

        let treatments = vec![Treatment::carbs(t0(), 20.0)];
        assert_eq!(carbs_on_board(&treatments, t0(), 0.0), 0.0);
        assert_eq!(carbs_on_board(&treatments, t0(), -5.0), 0.0);
    }

    #[test]
    fn test_zero_gram_entry_is_ignored() {
        let treatments = vec![Treatment::carbs(t0(), 0.0)];
        assert_eq!(carbs_on_board(&treatments, t0(), 30.0), 0.0);
    }
}
