//! Historical alignment: length and causality invariants, the rolling-window
//! definition, time zone reconciliation and the adapter-driven service.

use chrono::{Days, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::Sao_Paulo;
use proptest::prelude::*;
use valuelab_core::domain::{DividendEvent, FundamentalSnapshot, PriceSeries, Series, Ticker};
use valuelab_core::history::{
    align_indicators, daily_calendar, rolling_dividend_sum, AlignmentError, HistoryService,
    IndicatorName,
};
use valuelab_core::sources::{DividendSource, FundamentalsSource, PriceHistorySource, SourceError};

// ── Fixtures ─────────────────────────────────────────────────────────

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

fn day(offset: i64) -> NaiveDate {
    if offset >= 0 {
        base_date() + Days::new(offset as u64)
    } else {
        base_date() - Days::new(offset.unsigned_abs())
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap()
}

/// Daily closes stamped at 10:00 in Sao Paulo, as the chart endpoint returns them.
fn sao_paulo_prices(dates: &[NaiveDate]) -> PriceSeries {
    let points = dates
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let local = d.and_hms_opt(10, 0, 0).unwrap();
            let instant = Sao_Paulo
                .from_local_datetime(&local)
                .earliest()
                .unwrap()
                .with_timezone(&Utc);
            (instant, 10.0 + i as f64)
        })
        .collect();
    Series::zoned(Sao_Paulo, points)
}

fn naive_prices(dates: &[NaiveDate]) -> PriceSeries {
    Series::naive(dates.iter().map(|d| (midnight(*d), 10.0)).collect())
}

fn quarterly(points: &[(NaiveDate, f64, f64, f64)]) -> Series<FundamentalSnapshot> {
    Series::naive(
        points
            .iter()
            .map(|(d, eps, equity, shares)| {
                (
                    midnight(*d),
                    FundamentalSnapshot {
                        eps: Some(*eps),
                        equity: Some(*equity),
                        shares_outstanding: Some(*shares),
                    },
                )
            })
            .collect(),
    )
}

fn dividends(points: &[(NaiveDate, f64)]) -> Series<DividendEvent> {
    Series::naive(
        points
            .iter()
            .map(|(d, amount)| (midnight(*d), DividendEvent { amount: *amount }))
            .collect(),
    )
}

// ── Worked examples ──────────────────────────────────────────────────

#[test]
fn single_dividend_stays_in_window_for_365_days() {
    let calendar = daily_calendar(day(0), day(499));
    assert_eq!(calendar.len(), 500);

    let sums = rolling_dividend_sum(&calendar, &[(calendar[100], 1.0)]);
    for (i, sum) in sums.iter().enumerate() {
        let expected = if (100..=464).contains(&i) { 1.0 } else { 0.0 };
        assert_eq!(*sum, expected, "day index {i}");
    }
}

#[test]
fn graham_and_ceiling_follow_the_price_calendar() {
    let dates: Vec<NaiveDate> = (0..10).map(|i| day(400 + i)).collect();
    let prices = naive_prices(&dates);
    let fundamentals = quarterly(&[(day(403), 2.0, 2000.0, 100.0)]);
    let divs = dividends(&[(day(100), 0.3), (day(405), 0.3)]);

    let out = align_indicators(&prices, &fundamentals, &divs);

    assert_eq!(out.len(), 10);
    assert_eq!(out.graham.len(), 10);
    assert_eq!(out.ceiling.len(), 10);
    assert!(out.failures.is_empty());

    assert_eq!(&out.graham[..3], &[0.0, 0.0, 0.0]);
    assert_eq!(out.graham[3], (22.5 * 2.0 * 20.0_f64).sqrt());
    assert_eq!(out.graham[9], out.graham[3]);

    assert_eq!(out.ceiling[0], 0.3 / 0.06);
    assert_eq!(out.ceiling[5], (0.3 + 0.3) / 0.06);
}

#[test]
fn missing_halves_are_empty_and_fall_back_to_a_constant() {
    let dates: Vec<NaiveDate> = (0..5).map(day).collect();
    let out = align_indicators(&naive_prices(&dates), &Series::empty(), &Series::empty());

    assert_eq!(out.len(), 5);
    assert!(out.graham.is_empty());
    assert!(out.ceiling.is_empty());
    assert_eq!(out.series_or_constant(IndicatorName::Graham, 31.5), vec![31.5; 5]);
}

#[test]
fn fundamentals_without_equity_leave_graham_empty() {
    let dates: Vec<NaiveDate> = (0..5).map(day).collect();
    let fundamentals = Series::naive(vec![(
        midnight(day(0)),
        FundamentalSnapshot {
            eps: Some(1.0),
            ..Default::default()
        },
    )]);
    let out = align_indicators(&naive_prices(&dates), &fundamentals, &Series::empty());
    assert!(out.graham.is_empty());
}

#[test]
fn zero_shares_are_sanitized_to_zero() {
    let dates: Vec<NaiveDate> = (0..3).map(day).collect();
    let fundamentals = quarterly(&[(day(0), 2.0, 1000.0, 0.0)]);
    let out = align_indicators(&naive_prices(&dates), &fundamentals, &Series::empty());
    assert_eq!(out.graham, vec![0.0; 3]);
}

// ── Time zones ───────────────────────────────────────────────────────

#[test]
fn naive_quarterly_dates_land_on_the_same_local_day() {
    let dates = [
        NaiveDate::from_ymd_opt(2023, 9, 29).unwrap(),
        NaiveDate::from_ymd_opt(2023, 10, 2).unwrap(),
    ];
    let fundamentals = quarterly(&[(NaiveDate::from_ymd_opt(2023, 9, 30).unwrap(), 1.0, 50.0, 10.0)]);
    let out = align_indicators(&sao_paulo_prices(&dates), &fundamentals, &Series::empty());
    assert_eq!(out.graham[0], 0.0);
    assert_eq!(out.graham[1], (22.5 * 1.0 * 5.0_f64).sqrt());
}

#[test]
fn utc_dividends_are_dated_in_the_exchange_zone() {
    let dates = [
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
    ];
    // 02:00 UTC on Jan 3 is 23:00 on Jan 2 in Sao Paulo.
    let instant = Utc.with_ymd_and_hms(2024, 1, 3, 2, 0, 0).unwrap();
    let divs = Series::zoned(chrono_tz::UTC, vec![(instant, DividendEvent { amount: 0.6 })]);

    let out = align_indicators(&sao_paulo_prices(&dates), &Series::empty(), &divs);
    assert_eq!(out.ceiling, vec![0.6 / 0.06, 0.6 / 0.06]);
}

#[test]
fn dst_skipped_midnight_does_not_shift_the_report_day() {
    // Sao Paulo clocks jumped from 00:00 to 01:00 on 2018-11-04.
    let report = NaiveDate::from_ymd_opt(2018, 11, 4).unwrap();
    let dates = [
        NaiveDate::from_ymd_opt(2018, 11, 1).unwrap(),
        NaiveDate::from_ymd_opt(2018, 11, 5).unwrap(),
    ];
    let fundamentals = quarterly(&[(report, 2.0, 200.0, 10.0)]);
    let out = align_indicators(&sao_paulo_prices(&dates), &fundamentals, &Series::empty());
    assert!(out.failures.is_empty());
    assert_eq!(out.graham[0], 0.0);
    assert_eq!(out.graham[1], (22.5 * 2.0 * 20.0_f64).sqrt());
}

#[test]
fn aware_dividends_against_naive_prices_use_utc_dates() {
    let dates = [
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
    ];
    let instant = Utc.with_ymd_and_hms(2024, 1, 3, 2, 0, 0).unwrap();
    let divs = Series::zoned(Sao_Paulo, vec![(instant, DividendEvent { amount: 0.6 })]);

    let out = align_indicators(&naive_prices(&dates), &Series::empty(), &divs);
    assert_eq!(out.ceiling, vec![0.0, 0.6 / 0.06]);
}

// ── Properties ───────────────────────────────────────────────────────

fn arb_calendar() -> impl Strategy<Value = Vec<NaiveDate>> {
    prop::collection::vec(1u64..5, 1..80).prop_map(|gaps| {
        let mut offset = 0u64;
        gaps.into_iter()
            .map(|g| {
                offset += g;
                base_date() + Days::new(offset)
            })
            .collect()
    })
}

fn arb_fundamentals() -> impl Strategy<Value = Vec<(i64, f64, f64, f64)>> {
    prop::collection::vec(
        (-200i64..400, -5.0..5.0_f64, -1000.0..5000.0_f64, 1.0..500.0_f64),
        0..12,
    )
}

fn arb_dividends() -> impl Strategy<Value = Vec<(i64, f64)>> {
    prop::collection::vec((-500i64..400, 0.0..3.0_f64), 0..20)
}

fn to_quarterly(raw: &[(i64, f64, f64, f64)]) -> Series<FundamentalSnapshot> {
    let points: Vec<_> = raw.iter().map(|(o, e, q, s)| (day(*o), *e, *q, *s)).collect();
    quarterly(&points)
}

fn to_dividends(raw: &[(i64, f64)]) -> Series<DividendEvent> {
    let points: Vec<_> = raw.iter().map(|(o, a)| (day(*o), *a)).collect();
    dividends(&points)
}

proptest! {
    #[test]
    fn indicator_length_matches_price_length(
        calendar in arb_calendar(),
        fundamentals in arb_fundamentals(),
        divs in arb_dividends(),
    ) {
        let out = align_indicators(
            &sao_paulo_prices(&calendar),
            &to_quarterly(&fundamentals),
            &to_dividends(&divs),
        );
        prop_assert_eq!(out.len(), calendar.len());
        prop_assert_eq!(out.prices.len(), calendar.len());
        prop_assert!(out.graham.is_empty() || out.graham.len() == calendar.len());
        prop_assert!(out.ceiling.is_empty() || out.ceiling.len() == calendar.len());
        prop_assert!(out.graham.iter().chain(&out.ceiling).all(|v| v.is_finite()));
        if !divs.is_empty() {
            prop_assert_eq!(out.ceiling.len(), calendar.len());
        }
    }

    #[test]
    fn graham_never_looks_ahead(
        calendar in arb_calendar(),
        fundamentals in arb_fundamentals(),
        cut in 0usize..80,
    ) {
        let cut = cut.min(calendar.len() - 1);
        let cutoff = calendar[cut];
        let prices = naive_prices(&calendar);

        let full = align_indicators(&prices, &to_quarterly(&fundamentals), &Series::empty());
        let known: Vec<_> = fundamentals
            .iter()
            .copied()
            .filter(|(o, ..)| day(*o) <= cutoff)
            .collect();
        let truncated = align_indicators(&prices, &to_quarterly(&known), &Series::empty());

        if !truncated.graham.is_empty() {
            prop_assert_eq!(&full.graham[..=cut], &truncated.graham[..=cut]);
        } else if !full.graham.is_empty() {
            // Nothing was known yet at the cutoff.
            prop_assert!(full.graham[..=cut].iter().all(|v| *v == 0.0));
        }
    }

    #[test]
    fn rolling_sum_matches_its_definition(divs in arb_dividends(), span in 1u64..900) {
        let start = day(-500);
        let calendar = daily_calendar(start, start + Days::new(span));
        let events: Vec<(NaiveDate, f64)> = divs.iter().map(|(o, a)| (day(*o), *a)).collect();
        let sums = rolling_dividend_sum(&calendar, &events);

        prop_assert_eq!(sums.len(), calendar.len());
        for (d, sum) in calendar.iter().zip(&sums) {
            let open = *d - Days::new(365);
            let expected: f64 = events
                .iter()
                .filter(|(date, _)| *date > open && date <= d)
                .map(|(_, a)| a)
                .sum();
            prop_assert!((sum - expected).abs() < 1e-9, "at {}: {} vs {}", d, sum, expected);
        }
    }
}

// ── Service ──────────────────────────────────────────────────────────

struct StubHistory {
    prices: Result<Vec<NaiveDate>, ()>,
    fundamentals: Result<Vec<(NaiveDate, f64, f64, f64)>, SourceError>,
    dividends: Result<Vec<(NaiveDate, f64)>, SourceError>,
}

fn clone_err(e: &SourceError) -> SourceError {
    match e {
        SourceError::MalformedTimestamp(d) => SourceError::MalformedTimestamp(d.clone()),
        other => SourceError::Other(other.to_string()),
    }
}

impl PriceHistorySource for StubHistory {
    fn fetch_prices(&self, ticker: &Ticker, range: &str) -> Result<PriceSeries, SourceError> {
        assert_eq!(range, "5y");
        match &self.prices {
            Ok(dates) => Ok(sao_paulo_prices(dates)),
            Err(()) => Err(SourceError::SymbolNotFound {
                symbol: ticker.to_string(),
            }),
        }
    }
}

impl FundamentalsSource for StubHistory {
    fn fetch_fundamentals(&self, _: &Ticker) -> Result<Series<FundamentalSnapshot>, SourceError> {
        self.fundamentals.as_ref().map(|p| quarterly(p)).map_err(clone_err)
    }
}

impl DividendSource for StubHistory {
    fn fetch_dividends(&self, _: &Ticker) -> Result<Series<DividendEvent>, SourceError> {
        self.dividends.as_ref().map(|p| dividends(p)).map_err(clone_err)
    }
}

fn load(stub: &StubHistory) -> valuelab_core::HistoricalIndicators {
    HistoryService::new(stub, stub, stub, "5y").load(&Ticker::parse("PETR4").unwrap())
}

#[test]
fn service_without_prices_is_empty() {
    let stub = StubHistory {
        prices: Err(()),
        fundamentals: Ok(vec![(day(0), 1.0, 10.0, 1.0)]),
        dividends: Ok(vec![(day(0), 1.0)]),
    };
    let out = load(&stub);
    assert!(out.is_empty());
    assert!(out.failures.is_empty());
}

#[test]
fn service_reports_malformed_timestamps_and_keeps_the_other_half() {
    let stub = StubHistory {
        prices: Ok((10..20).map(day).collect()),
        fundamentals: Err(SourceError::MalformedTimestamp("asOfDate 'Q3-2023'".into())),
        dividends: Ok(vec![(day(12), 0.6)]),
    };
    let out = load(&stub);
    assert_eq!(out.len(), 10);
    assert!(out.graham.is_empty());
    assert_eq!(out.ceiling.len(), 10);
    assert!(matches!(
        out.failures.as_slice(),
        [AlignmentError::UnparseableTimestamp { series, .. }] if series == "fundamentals"
    ));
}

#[test]
fn service_treats_unavailable_halves_as_empty() {
    let stub = StubHistory {
        prices: Ok((10..20).map(day).collect()),
        fundamentals: Ok(vec![(day(5), 1.0, 100.0, 10.0)]),
        dividends: Err(SourceError::NetworkUnreachable("down".into())),
    };
    let out = load(&stub);
    assert!(out.failures.is_empty());
    assert_eq!(out.graham, vec![(22.5 * 1.0 * 10.0_f64).sqrt(); 10]);
    assert_eq!(out.series_or_constant(IndicatorName::Barsi, 12.0), vec![12.0; 10]);
}
