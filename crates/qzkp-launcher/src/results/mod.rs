//! Result tables written by the iterative simulations, and the scatter
//! series drawn from them.
//!
//! A result file has at least the columns `Iteration` and `Percentages`
//! (the success rate of that iteration). When a `Decision` column is
//! present, rows with decision `0` are honest-prover runs and rows with
//! decision `1` are dishonest ones.

use crate::runner::{RunnerError, RunnerResult};
use csv::ReaderBuilder;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const ITERATION_COLUMN: &str = "Iteration";
pub const PERCENTAGES_COLUMN: &str = "Percentages";
pub const DECISION_COLUMN: &str = "Decision";
pub const PLOT_TITLE: &str = "Success Rate per Iteration";

/// Headroom added above and below the data on the y axis, in percent.
const Y_MARGIN: f64 = 10.0;

/// A result CSV held as text cells, in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResultTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ResultTable {
    pub fn load(path: &Path) -> RunnerResult<Self> {
        let file = File::open(path).map_err(|err| {
            RunnerError::result_discovery(
                format!("failed to open result file {}", path.display()),
                serde_json::json!({ "source": err.to_string() }),
            )
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> RunnerResult<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = rdr
            .headers()
            .map_err(parse_error)?
            .iter()
            .map(str::to_string)
            .collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(parse_error)?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Scatter series for the success-rate chart.
    ///
    /// Rows whose iteration or percentage is not numeric are skipped; rows
    /// with a decision other than `0` or `1` belong to neither series.
    pub fn plot(&self) -> RunnerResult<ResultPlot> {
        let missing = |column: &str| {
            RunnerError::result_discovery(
                format!("result file has no `{column}` column"),
                serde_json::json!({ "headers": self.headers }),
            )
        };
        let x_col = self
            .column_index(ITERATION_COLUMN)
            .ok_or_else(|| missing(ITERATION_COLUMN))?;
        let y_col = self
            .column_index(PERCENTAGES_COLUMN)
            .ok_or_else(|| missing(PERCENTAGES_COLUMN))?;
        let decision_col = self.column_index(DECISION_COLUMN);

        let mut series = match decision_col {
            Some(_) => vec![
                PlotSeries::new(SeriesKind::Honest),
                PlotSeries::new(SeriesKind::Dishonest),
            ],
            None => vec![PlotSeries::new(SeriesKind::All)],
        };
        let mut y_values = Vec::new();
        for row in &self.rows {
            let (Some(x), Some(y)) = (numeric(row, x_col), numeric(row, y_col)) else {
                continue;
            };
            y_values.push(y);
            let target = match decision_col {
                None => series.first_mut(),
                Some(col) => match numeric(row, col) {
                    Some(d) if d.abs() < f64::EPSILON => series.first_mut(),
                    Some(d) if (d - 1.0).abs() < f64::EPSILON => series.get_mut(1),
                    _ => None,
                },
            };
            if let Some(target) = target {
                target.points.push((x, y));
            }
        }
        if y_values.is_empty() {
            return Err(RunnerError::result_discovery(
                "result file has no plottable rows",
                None,
            ));
        }
        let x_bounds = bounds(series.iter().flat_map(|s| s.points.iter().map(|p| p.0)));
        let y_bounds = y_bounds(&y_values);
        Ok(ResultPlot {
            title: PLOT_TITLE,
            series,
            x_bounds,
            y_bounds,
        })
    }
}

fn numeric(row: &[String], column: usize) -> Option<f64> {
    row.get(column)?.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_error(err: csv::Error) -> RunnerError {
    RunnerError::result_discovery(
        "failed to parse result file",
        serde_json::json!({ "source": err.to_string() }),
    )
}

fn bounds(values: impl Iterator<Item = f64>) -> [f64; 2] {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if min.is_finite() && max.is_finite() {
        [min, max]
    } else {
        [0.0, 1.0]
    }
}

/// Data range widened by ten points each way, kept inside `[0, 100]`.
fn y_bounds(values: &[f64]) -> [f64; 2] {
    let [min, max] = bounds(values.iter().copied());
    let low = (min - Y_MARGIN).max(0.0);
    let high = (max + Y_MARGIN).min(100.0);
    if low < high {
        [low, high]
    } else {
        [0.0, 100.0]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    /// Rows with `Decision == 0`.
    Honest,
    /// Rows with `Decision == 1`.
    Dishonest,
    /// Every row, when the file has no decision column.
    All,
}

impl SeriesKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Honest => "Honest (Dec=0)",
            Self::Dishonest => "Dishonest (Dec=1)",
            Self::All => "Results",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlotSeries {
    pub kind: SeriesKind,
    /// `(iteration, success rate)` pairs in file order.
    pub points: Vec<(f64, f64)>,
}

impl PlotSeries {
    fn new(kind: SeriesKind) -> Self {
        Self {
            kind,
            points: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultPlot {
    pub title: &'static str,
    pub series: Vec<PlotSeries>,
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> ResultTable {
        ResultTable::from_reader(csv.as_bytes()).unwrap_or_default()
    }

    #[test]
    fn splits_rows_by_decision() {
        let plot = table(
            "Iteration,Percentages,Decision\n1,50.0,0\n2,75.0,1\n3,62.5,0\n4,10,7\n",
        )
        .plot();
        let plot = plot.ok();
        let series = plot.as_ref().map(|p| p.series.clone()).unwrap_or_default();
        assert_eq!(series.len(), 2);
        assert_eq!(
            series.first().map(|s| s.points.clone()),
            Some(vec![(1.0, 50.0), (3.0, 62.5)])
        );
        assert_eq!(
            series.get(1).map(|s| s.points.clone()),
            Some(vec![(2.0, 75.0)])
        );
    }

    #[test]
    fn single_series_without_decision_column() {
        let plot = table("Iteration,Percentages\n1,20\n2,30\n").plot().ok();
        let kinds: Vec<SeriesKind> = plot
            .map(|p| p.series.iter().map(|s| s.kind).collect())
            .unwrap_or_default();
        assert_eq!(kinds, vec![SeriesKind::All]);
    }

    #[test]
    fn y_bounds_pad_by_ten_and_clamp() {
        let plot = table("Iteration,Percentages\n1,5\n2,95\n").plot().ok();
        assert_eq!(plot.map(|p| p.y_bounds), Some([0.0, 100.0]));

        let plot = table("Iteration,Percentages\n1,40\n2,60\n").plot().ok();
        assert_eq!(plot.map(|p| p.y_bounds), Some([30.0, 70.0]));
    }

    #[test]
    fn missing_columns_and_empty_tables_are_errors() {
        assert!(table("Step,Rate\n1,2\n").plot().is_err());
        assert!(table("Iteration,Percentages\n").plot().is_err());
    }

    #[test]
    fn malformed_csv_is_reported() {
        let err = ResultTable::from_reader("a,b\n1,2,3\n".as_bytes()).err();
        assert_eq!(
            err.map(|err| err.code),
            Some(crate::runner::ErrorCode::ResultDiscovery)
        );
    }
}
