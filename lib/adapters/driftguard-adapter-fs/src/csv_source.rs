use std::collections::HashMap;
use std::io::{Cursor, ErrorKind};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;

use driftguard_domain::{DriftguardError, Observation, Parameter, ParameterSpec};
use driftguard_ports::{PortResult, TimeSeriesSource};

use crate::clean::{TS, VALUE, clean_frame, summarize, to_observations};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// `date,value` with ISO or compact dates.
    Dated,
    /// NASA POWER export: `YEAR,DOY,<PARAM>`.
    YearDay { value_column: usize },
}

impl Layout {
    fn value_column(&self) -> usize {
        match self {
            Self::Dated => 1,
            Self::YearDay { value_column } => *value_column,
        }
    }
}

/// Where the table starts inside a file that may carry a free-text preamble.
struct Table<'a> {
    layout: Layout,
    /// 1-based line number of the header row.
    header_line: usize,
    body: &'a str,
}

/// Reads `<data_dir>/<PARAM>.csv` and cleans it on every fetch.
///
/// Two layouts are understood: a plain `date,value` file and the NASA POWER
/// daily export (free-text preamble, then `YEAR,DOY,<PARAM>` rows). Readings
/// equal to the missing sentinel are treated as gaps.
pub struct CsvSeriesSource {
    data_dir: PathBuf,
    specs: HashMap<Parameter, ParameterSpec>,
    missing_sentinel: f64,
}

impl CsvSeriesSource {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        specs: impl IntoIterator<Item = ParameterSpec>,
        missing_sentinel: f64,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            specs: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
            missing_sentinel,
        }
    }

    fn path_for(&self, parameter: &Parameter) -> PathBuf {
        self.data_dir.join(format!("{parameter}.csv"))
    }

    /// Read the table into a raw `ts`/`value` frame. Values are not cleaned yet.
    fn read_frame(&self, parameter: &Parameter, text: &str) -> PortResult<DataFrame> {
        let table = locate_table(parameter, text).ok_or_else(|| {
            DriftguardError::SourceUnavailable {
                parameter: parameter.clone(),
                message: "no header row found".into(),
            }
        })?;
        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .into_reader_with_file_handle(Cursor::new(table.body.as_bytes().to_vec()))
            .finish()
            .map_err(|e| unreadable(parameter, e))?;

        let columns = frame.get_columns();
        let malformed = |row: usize| DriftguardError::SourceUnavailable {
            parameter: parameter.clone(),
            message: format!("line {}: malformed row", table.header_line + 1 + row),
        };
        let value_column = table.layout.value_column();
        let Some(values) = columns.get(value_column) else {
            return Err(DriftguardError::SourceUnavailable {
                parameter: parameter.clone(),
                message: format!("no value column at position {value_column}"),
            });
        };

        let timestamps: Vec<Option<i64>> = match table.layout {
            Layout::Dated => {
                let dates = columns[0]
                    .cast(&DataType::String)
                    .map_err(|e| unreadable(parameter, e))?;
                let dates = dates.str().map_err(|e| unreadable(parameter, e))?;
                dates
                    .into_iter()
                    .enumerate()
                    .map(|(row, date)| match date.map(str::trim) {
                        None | Some("") => Ok(None),
                        Some(date) => parse_date(date)
                            .map(|at| Some(at.timestamp()))
                            .ok_or_else(|| malformed(row)),
                    })
                    .collect::<PortResult<_>>()?
            }
            Layout::YearDay { .. } => {
                let as_int = |series: &Series| {
                    series
                        .cast(&DataType::Int64)
                        .map_err(|e| unreadable(parameter, e))
                };
                let years = as_int(&columns[0])?;
                let days = as_int(&columns[1])?;
                let years = years.i64().map_err(|e| unreadable(parameter, e))?;
                let days = days.i64().map_err(|e| unreadable(parameter, e))?;
                years
                    .into_iter()
                    .zip(days)
                    .enumerate()
                    .map(|(row, (year, doy))| {
                        let year = year.and_then(|y| i32::try_from(y).ok());
                        let doy = doy.and_then(|d| u32::try_from(d).ok());
                        match (year, doy) {
                            (Some(year), Some(doy)) => NaiveDate::from_yo_opt(year, doy)
                                .map(|date| Some(midnight(date).timestamp()))
                                .ok_or_else(|| malformed(row)),
                            _ => Err(malformed(row)),
                        }
                    })
                    .collect::<PortResult<_>>()?
            }
        };

        let mut values = values
            .cast(&DataType::Float64)
            .map_err(|e| unreadable(parameter, e))?;
        values.rename(VALUE);
        DataFrame::new(vec![Series::new(TS, timestamps), values])
            .map_err(|e| unreadable(parameter, e))
    }
}

fn locate_table<'a>(parameter: &Parameter, text: &'a str) -> Option<Table<'a>> {
    let mut offset = 0;
    for (index, line) in text.split_inclusive('\n').enumerate() {
        let fields: Vec<&str> = line.trim_end().split(',').map(str::trim).collect();
        if let Some(layout) = detect_header(parameter, &fields) {
            return Some(Table {
                layout,
                header_line: index + 1,
                body: &text[offset..],
            });
        }
        offset += line.len();
    }
    None
}

fn detect_header(parameter: &Parameter, fields: &[&str]) -> Option<Layout> {
    let first = fields.first()?.to_ascii_lowercase();
    if first == "date" && fields.len() >= 2 {
        return Some(Layout::Dated);
    }
    if first == "year" && fields.get(1).is_some_and(|f| f.eq_ignore_ascii_case("doy")) {
        let value_column = fields
            .iter()
            .position(|f| *f == parameter.as_str())
            .unwrap_or(fields.len().saturating_sub(1).max(2));
        return Some(Layout::YearDay { value_column });
    }
    None
}

fn parse_date(field: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(field, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(field, "%Y%m%d"))
        .ok()
        .map(midnight)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn unreadable(parameter: &Parameter, e: PolarsError) -> DriftguardError {
    DriftguardError::SourceUnavailable {
        parameter: parameter.clone(),
        message: format!("unreadable csv: {e}"),
    }
}

#[async_trait]
impl TimeSeriesSource for CsvSeriesSource {
    async fn fetch(
        &self,
        parameter: &Parameter,
        window_length: usize,
    ) -> PortResult<Vec<Observation>> {
        let path = self.path_for(parameter);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DriftguardError::SourceUnavailable {
                    parameter: parameter.clone(),
                    message: format!("{} does not exist", path.display()),
                });
            }
            Err(e) => {
                return Err(DriftguardError::SourceUnavailable {
                    parameter: parameter.clone(),
                    message: format!("{}: {e}", path.display()),
                });
            }
        };

        let raw = self.read_frame(parameter, &text)?;
        let total = raw.height();
        let missing = raw.column(VALUE).map(|s| s.null_count()).unwrap_or_default();
        let spec = self
            .specs
            .get(parameter)
            .cloned()
            .unwrap_or_else(|| ParameterSpec::unbounded(parameter.as_str()));
        let cleaned = clean_frame(raw, &spec, self.missing_sentinel)
            .map_err(|e| unreadable(parameter, e))?;
        if cleaned.height() < total || missing > 0 {
            tracing::info!(
                parameter = %parameter,
                rows = total,
                dropped = total - cleaned.height(),
                "filled gaps in series"
            );
        }

        let window = cleaned.tail(Some(window_length));
        if let Some(summary) = summarize(&window).map_err(|e| unreadable(parameter, e))? {
            tracing::debug!(
                parameter = %parameter,
                count = summary.count,
                mean = summary.mean,
                std = summary.std,
                min = summary.min,
                max = summary.max,
                "series summary"
            );
        }
        to_observations(&window).map_err(|e| unreadable(parameter, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write(dir: &tempfile::TempDir, name: &str, body: &str) {
        tokio::fs::write(dir.path().join(name), body).await.unwrap();
    }

    fn values(series: &[Observation]) -> Vec<f64> {
        series.iter().map(|obs| obs.value).collect()
    }

    #[tokio::test]
    async fn dated_file_returns_most_recent_window() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir,
            "T2M.csv",
            "date,value\n2024-01-03,3.0\n2024-01-01,1.0\n2024-01-02,-999\n2024-01-04,4.0\n",
        )
        .await;
        let source = CsvSeriesSource::new(dir.path(), [ParameterSpec::unbounded("T2M")], -999.0);

        let window = source.fetch(&Parameter::new("T2M"), 3).await.unwrap();
        assert_eq!(values(&window), vec![2.0, 3.0, 4.0]);
        assert!(window.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn nasa_power_export_is_understood() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir,
            "RH2M.csv",
            "-BEGIN HEADER-\nNASA/POWER CERES/MERRA2 Native Resolution Daily Data\n-END HEADER-\n\
             YEAR,DOY,RH2M\n2024,1,101.5\n2024,2,-999.0\n2024,3,80.0\n2024,4,-999.0\n",
        )
        .await;
        let spec = ParameterSpec {
            name: "RH2M".into(),
            min: Some(0.0),
            max: Some(100.0),
        };
        let source = CsvSeriesSource::new(dir.path(), [spec], -999.0);

        let window = source.fetch(&Parameter::new("RH2M"), 10).await.unwrap();
        assert_eq!(values(&window), vec![100.0, 90.75, 80.0]);
    }

    #[tokio::test]
    async fn missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvSeriesSource::new(dir.path(), [], -999.0);
        let err = source.fetch(&Parameter::new("WS2M"), 70).await.unwrap_err();
        assert!(matches!(err, DriftguardError::SourceUnavailable { .. }));
        assert!(err.is_expected());
    }

    #[tokio::test]
    async fn malformed_date_is_reported_with_its_line() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "T2M.csv", "date,value\n2024-01-01,1.0\nyesterday,2.0\n").await;
        let source = CsvSeriesSource::new(dir.path(), [], -999.0);
        let err = source.fetch(&Parameter::new("T2M"), 70).await.unwrap_err();
        assert!(err.to_string().contains("line 3"), "{err}");
    }

    #[tokio::test]
    async fn compact_dates_and_blank_readings_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir,
            "WS2M.csv",
            "date,value\n20240101,1.5\n20240102,\n20240103,2.5\n",
        )
        .await;
        let source = CsvSeriesSource::new(dir.path(), [], -999.0);

        let window = source.fetch(&Parameter::new("WS2M"), 70).await.unwrap();
        assert_eq!(values(&window), vec![1.5, 2.0, 2.5]);
    }
}
