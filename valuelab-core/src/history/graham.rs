//! Daily Graham fair price from quarterly EPS and book value per share.

use super::fill::forward_fill;
use crate::valuation::GRAHAM_MULTIPLIER;
use chrono::NaiveDate;

/// `sqrt(22.5 · eps · bvps)` when the product is positive, else 0.
///
/// NaN products compare false and give 0; an infinite product is left for the
/// output sanitizer.
pub fn graham_value(eps: f64, bvps: f64) -> f64 {
    let product = GRAHAM_MULTIPLIER * eps * bvps;
    if product > 0.0 {
        product.sqrt()
    } else {
        0.0
    }
}

/// Forward-fill EPS and BVPS independently onto `calendar` and combine.
///
/// Both inputs must be date-sorted. Dates before the first report of either
/// input are 0.
pub fn graham_indicator(
    calendar: &[NaiveDate],
    eps: &[(NaiveDate, f64)],
    bvps: &[(NaiveDate, f64)],
) -> Vec<f64> {
    forward_fill(eps, calendar)
        .into_iter()
        .zip(forward_fill(bvps, calendar))
        .map(|pair| match pair {
            (Some(e), Some(b)) => graham_value(e, b),
            _ => 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn negative_product_is_zero() {
        assert_eq!(graham_value(-1.0, 20.0), 0.0);
        assert_eq!(graham_value(0.0, 20.0), 0.0);
        assert_eq!(graham_value(f64::NAN, 20.0), 0.0);
        assert_eq!(graham_value(2.0, 20.0), 900.0_f64.sqrt());
    }

    #[test]
    fn reports_on_different_dates_combine_once_both_known() {
        let calendar = [d(2024, 1, 2), d(2024, 4, 1), d(2024, 5, 2), d(2024, 7, 1)];
        let eps = [(d(2023, 12, 31), 2.0), (d(2024, 6, 30), 3.0)];
        let bvps = [(d(2024, 3, 31), 20.0)];
        let out = graham_indicator(&calendar, &eps, &bvps);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], (22.5 * 2.0 * 20.0_f64).sqrt());
        assert_eq!(out[2], out[1]);
        assert_eq!(out[3], (22.5 * 3.0 * 20.0_f64).sqrt());
    }
}
