//! Behavior-driven tests for the normalizer
//!
//! These tests feed the table shapes upstream sources actually produce and
//! check the canonical bars that come out.

use ferrobars_core::{
    normalize, ColumnKey, RawColumn, RawSeries, RawTime, SchemaError, Symbol,
};
use time::macros::{date, datetime};
use time::Date;

fn spy() -> Symbol {
    Symbol::parse("SPY").expect("symbol")
}

fn numbers(key: ColumnKey, values: &[f64]) -> RawColumn {
    RawColumn::numbers(key, values.iter().copied().map(Some).collect())
}

fn dates(values: &[Date]) -> RawColumn {
    RawColumn::times(
        ColumnKey::flat("Date"),
        values.iter().copied().map(RawTime::Date).collect(),
    )
}

fn flat_table(index: RawColumn, closes: &[f64]) -> RawSeries {
    RawSeries::empty()
        .with_index(index)
        .with_column(numbers(ColumnKey::flat("Open"), closes))
        .with_column(numbers(ColumnKey::flat("High"), closes))
        .with_column(numbers(ColumnKey::flat("Low"), closes))
        .with_column(numbers(ColumnKey::flat("Close"), closes))
        .with_column(numbers(ColumnKey::flat("Volume"), closes))
}

// =============================================================================
// Normalizer: Accepted Shapes
// =============================================================================

#[test]
fn when_upstream_returns_an_empty_table_the_result_is_empty_not_an_error() {
    let bars = normalize(&RawSeries::empty(), &spy(), date!(2022-01-01)).expect("normalize");

    assert!(bars.is_empty());
}

#[test]
fn when_columns_are_hierarchical_the_outer_level_names_the_field() {
    // Given: A multi-symbol style table keyed by (field, ticker)
    let raw = RawSeries::empty()
        .with_index(dates(&[date!(2024-01-02)]))
        .with_column(numbers(ColumnKey::multi(["Open", "SPY"]), &[1.0]))
        .with_column(numbers(ColumnKey::multi(["High", "SPY"]), &[2.0]))
        .with_column(numbers(ColumnKey::multi(["Low", "SPY"]), &[0.5]))
        .with_column(numbers(ColumnKey::multi(["Close", "SPY"]), &[1.5]))
        .with_column(numbers(ColumnKey::multi(["Volume", "SPY"]), &[700.0]));

    // When: It is normalized
    let bars = normalize(&raw, &spy(), date!(2022-01-01)).expect("normalize");

    // Then: Every field is picked up
    assert_eq!(bars.len(), 1);
    let bar = &bars[0];
    assert_eq!((bar.open, bar.high, bar.low, bar.close), (1.0, 2.0, 0.5, 1.5));
    assert_eq!(bar.volume, 700);
    assert!(bar.emas.is_empty());
}

#[test]
fn when_timestamps_carry_an_offset_the_wall_clock_is_kept() {
    // Given: Exchange-local times with a -05:00 offset
    let raw = flat_table(
        RawColumn::times(
            ColumnKey::flat("Datetime"),
            vec![RawTime::Zoned(datetime!(2024-01-02 09:30:00 -5))],
        ),
        &[10.0],
    );

    // When: It is normalized
    let bars = normalize(&raw, &spy(), date!(2022-01-01)).expect("normalize");

    // Then: The offset is dropped, not converted
    assert_eq!(bars[0].timestamp, datetime!(2024-01-02 09:30:00));
}

#[test]
fn when_only_adjusted_close_is_present_it_serves_as_close() {
    let raw = RawSeries::empty()
        .with_index(dates(&[date!(2024-01-02)]))
        .with_column(numbers(ColumnKey::flat("Open"), &[1.0]))
        .with_column(numbers(ColumnKey::flat("High"), &[1.0]))
        .with_column(numbers(ColumnKey::flat("Low"), &[1.0]))
        .with_column(numbers(ColumnKey::flat("Adj Close"), &[0.9]))
        .with_column(numbers(ColumnKey::flat("Volume"), &[1.0]));

    let bars = normalize(&raw, &spy(), date!(2022-01-01)).expect("normalize");

    assert_eq!(bars[0].close, 0.9);
}

// =============================================================================
// Normalizer: Row Hygiene
// =============================================================================

#[test]
fn when_rows_repeat_or_arrive_out_of_order_output_is_sorted_and_unique() {
    // Given: Unsorted dates with a repeated day
    let raw = flat_table(
        dates(&[
            date!(2024-01-04),
            date!(2024-01-02),
            date!(2024-01-03),
            date!(2024-01-02),
        ]),
        &[4.0, 2.0, 3.0, 2.5],
    );

    // When: It is normalized
    let bars = normalize(&raw, &spy(), date!(2022-01-01)).expect("normalize");

    // Then: Ascending, one row per day, later duplicate wins
    let closes = bars.iter().map(|bar| bar.close).collect::<Vec<_>>();
    assert_eq!(closes, vec![2.5, 3.0, 4.0]);
    assert!(bars.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
}

#[test]
fn when_rows_precede_the_start_date_they_are_dropped() {
    let raw = flat_table(
        dates(&[date!(2021-12-31), date!(2022-01-03)]),
        &[1.0, 2.0],
    );

    let bars = normalize(&raw, &spy(), date!(2022-01-01)).expect("normalize");

    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].timestamp, datetime!(2022-01-03 00:00:00));
}

#[test]
fn when_a_price_is_missing_the_row_is_dropped_but_a_missing_volume_is_zero() {
    // Given: One row without a close and one without a volume
    let raw = RawSeries::empty()
        .with_index(dates(&[date!(2024-01-02), date!(2024-01-03)]))
        .with_column(numbers(ColumnKey::flat("Open"), &[1.0, 1.0]))
        .with_column(numbers(ColumnKey::flat("High"), &[1.0, 1.0]))
        .with_column(numbers(ColumnKey::flat("Low"), &[1.0, 1.0]))
        .with_column(RawColumn::numbers(
            ColumnKey::flat("Close"),
            vec![None, Some(1.0)],
        ))
        .with_column(RawColumn::numbers(
            ColumnKey::flat("Volume"),
            vec![Some(5.0), None],
        ));

    // When: It is normalized
    let bars = normalize(&raw, &spy(), date!(2022-01-01)).expect("normalize");

    // Then: Only the priced row remains, with zero volume
    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].timestamp, datetime!(2024-01-03 00:00:00));
    assert_eq!(bars[0].volume, 0);
}

// =============================================================================
// Normalizer: Schema Drift
// =============================================================================

#[test]
fn when_a_required_field_is_missing_the_error_names_it_and_lists_what_was_present() {
    // Given: A table without any close variant
    let raw = RawSeries::empty()
        .with_index(dates(&[date!(2024-01-02)]))
        .with_column(numbers(ColumnKey::flat("Open"), &[1.0]))
        .with_column(numbers(ColumnKey::flat("High"), &[1.0]))
        .with_column(numbers(ColumnKey::flat("Low"), &[1.0]))
        .with_column(numbers(ColumnKey::flat("Volume"), &[1.0]));

    // When: It is normalized
    let error = normalize(&raw, &spy(), date!(2022-01-01)).expect_err("missing close");

    // Then: The error is explicit about both sides
    match &error {
        SchemaError::MissingFields { missing, present } => {
            assert_eq!(missing, &vec!["close".to_string()]);
            assert_eq!(present, &vec!["date", "open", "high", "low", "volume"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(error.to_string().contains("Missing expected columns"));
}
