//! Series cleaning as a polars lazy pipeline.
//!
//! Frames carry two columns: `ts` (Int64 epoch seconds) and `value` (Float64,
//! null for a missing reading).

use chrono::DateTime;
use polars::prelude::*;

use driftguard_domain::{Observation, ParameterSpec, SeriesSummary};

pub const TS: &str = "ts";
pub const VALUE: &str = "value";

fn null_f64() -> Expr {
    lit(NULL).cast(DataType::Float64)
}

/// Turn a raw frame into a gap-free, range-checked series.
///
/// Readings equal to `missing_sentinel` become gaps. Rows are sorted by time,
/// interior gaps are filled by time-weighted linear interpolation, gaps at
/// either end are dropped, and every value is clipped to the parameter's
/// physical bounds.
pub fn clean_frame(
    raw: DataFrame,
    spec: &ParameterSpec,
    missing_sentinel: f64,
) -> PolarsResult<DataFrame> {
    let known = col(VALUE).is_not_null();
    let ts = col(TS).cast(DataType::Float64);
    let known_ts = when(known.clone()).then(ts.clone()).otherwise(null_f64());
    let span = col("next_ts") - col("prev_ts");
    let interpolated = col("prev_value")
        + (col("next_value") - col("prev_value")) * (ts - col("prev_ts")) / span.clone();

    raw.lazy()
        .filter(col(TS).is_not_null())
        .with_column(col(VALUE).cast(DataType::Float64))
        .with_column(
            when(col(VALUE).eq(lit(missing_sentinel)))
                .then(null_f64())
                .otherwise(col(VALUE))
                .alias(VALUE),
        )
        .sort([TS], SortMultipleOptions::default())
        .with_columns([
            col(VALUE).forward_fill(None).alias("prev_value"),
            known_ts.clone().forward_fill(None).alias("prev_ts"),
            col(VALUE).backward_fill(None).alias("next_value"),
            known_ts.backward_fill(None).alias("next_ts"),
        ])
        .with_column(
            when(known)
                .then(col(VALUE))
                .when(span.clone().gt(lit(0.0)))
                .then(interpolated)
                .when(span.eq(lit(0.0)))
                .then(col("prev_value"))
                .otherwise(null_f64())
                .alias(VALUE),
        )
        .filter(col(VALUE).is_not_null())
        .with_column(clipped(spec))
        .select([col(TS), col(VALUE)])
        .collect()
}

fn clipped(spec: &ParameterSpec) -> Expr {
    let mut value = col(VALUE);
    if let Some(min) = spec.min {
        value = when(value.clone().lt(lit(min)))
            .then(lit(min))
            .otherwise(value);
    }
    if let Some(max) = spec.max {
        value = when(value.clone().gt(lit(max)))
            .then(lit(max))
            .otherwise(value);
    }
    value.alias(VALUE)
}

pub fn to_observations(frame: &DataFrame) -> PolarsResult<Vec<Observation>> {
    let ts = frame.column(TS)?.i64()?;
    let values = frame.column(VALUE)?.f64()?;
    Ok(ts
        .into_iter()
        .zip(values)
        .filter_map(|(ts, value)| Some(Observation::new(DateTime::from_timestamp(ts?, 0)?, value?)))
        .collect())
}

pub fn summarize(frame: &DataFrame) -> PolarsResult<Option<SeriesSummary>> {
    if frame.height() == 0 {
        return Ok(None);
    }
    let stats = frame
        .clone()
        .lazy()
        .select([
            col(VALUE).mean().alias("mean"),
            col(VALUE).std(0).alias("std"),
            col(VALUE).min().alias("min"),
            col(VALUE).max().alias("max"),
        ])
        .collect()?;
    let stat = |name: &str| -> PolarsResult<f64> {
        Ok(stats.column(name)?.f64()?.get(0).unwrap_or(f64::NAN))
    };
    Ok(Some(SeriesSummary {
        count: frame.height(),
        mean: stat("mean")?,
        std: stat("std")?,
        min: stat("min")?,
        max: stat("max")?,
    }))
}
