//! Saving result data and console logs.

use crate::results::ResultTable;
use crate::runner::{RunnerError, RunnerResult};
use rust_xlsxwriter::{Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// File formats result data can be exported to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Csv,
    Json,
    Xlsx,
}

impl DataFormat {
    pub const ALL: [Self; 3] = [Self::Csv, Self::Json, Self::Xlsx];

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xlsx => "xlsx",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Csv => "CSV",
            Self::Json => "JSON",
            Self::Xlsx => "Excel",
        }
    }

    /// Format implied by a file extension, if it is one we write.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(ext))
    }

    #[must_use]
    pub fn toggle(self) -> Self {
        match self {
            Self::Csv => Self::Json,
            Self::Json => Self::Xlsx,
            Self::Xlsx => Self::Csv,
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Write the result file at `source` to `dest` in `format`.
pub fn export_data(source: &Path, dest: &Path, format: DataFormat) -> RunnerResult<()> {
    let table = ResultTable::load(source)?;
    export_table(&table, dest, format)?;
    tracing::info!(
        source = %source.display(),
        dest = %dest.display(),
        format = format.extension(),
        rows = table.len(),
        "exported result data"
    );
    Ok(())
}

pub fn export_table(table: &ResultTable, dest: &Path, format: DataFormat) -> RunnerResult<()> {
    let file = File::create(dest).map_err(|err| {
        RunnerError::io(format!("failed to create {}", dest.display()), err)
    })?;
    match format {
        DataFormat::Csv => write_csv(table, file),
        DataFormat::Json => write_json(table, BufWriter::new(file)),
        DataFormat::Xlsx => {
            let bytes = xlsx_bytes(table)?;
            let mut writer = BufWriter::new(file);
            writer
                .write_all(&bytes)
                .and_then(|()| writer.flush())
                .map_err(|err| RunnerError::io("failed to write xlsx", err))
        }
    }
}

fn write_csv<W: Write>(table: &ResultTable, writer: W) -> RunnerResult<()> {
    let write_err = |err: csv::Error| RunnerError::io("failed to write csv", err);
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(table.headers()).map_err(write_err)?;
    for row in table.rows() {
        wtr.write_record(row).map_err(write_err)?;
    }
    wtr.flush()
        .map_err(|err| RunnerError::io("failed to write csv", err))
}

fn write_json<W: Write>(table: &ResultTable, mut writer: W) -> RunnerResult<()> {
    let records = table_records(table);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
    records
        .serialize(&mut ser)
        .map_err(|err| RunnerError::io("failed to write json", err))?;
    writer
        .flush()
        .map_err(|err| RunnerError::io("failed to write json", err))
}

/// How every cell of one column is written.
///
/// Decided over the whole column so a value such as `75` in a column that
/// also holds `50.5` is exported as the float `75.0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Float,
    Text,
}

fn column_kinds(table: &ResultTable) -> Vec<ColumnKind> {
    (0..table.headers().len())
        .map(|col| {
            let cells = table
                .rows()
                .iter()
                .filter_map(|row| row.get(col))
                .filter(|cell| !cell.is_empty());
            let mut kind = ColumnKind::Integer;
            for cell in cells {
                if kind == ColumnKind::Integer && cell.parse::<i64>().is_err() {
                    kind = ColumnKind::Float;
                }
                if kind == ColumnKind::Float
                    && !cell.parse::<f64>().is_ok_and(f64::is_finite)
                {
                    return ColumnKind::Text;
                }
            }
            kind
        })
        .collect()
}

/// One JSON object per row, keyed by header, typed per column.
#[must_use]
pub fn table_records(table: &ResultTable) -> Vec<Value> {
    let kinds = column_kinds(table);
    table
        .rows()
        .iter()
        .map(|row| {
            let record: Map<String, Value> = table
                .headers()
                .iter()
                .zip(row)
                .zip(&kinds)
                .map(|((header, cell), kind)| (header.clone(), cell_value(cell, *kind)))
                .collect();
            Value::Object(record)
        })
        .collect()
}

fn cell_value(cell: &str, kind: ColumnKind) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    let number = match kind {
        ColumnKind::Integer => cell.parse::<i64>().ok().map(Number::from),
        ColumnKind::Float => cell.parse::<f64>().ok().and_then(Number::from_f64),
        ColumnKind::Text => None,
    };
    number.map_or_else(|| Value::String(cell.to_string()), Value::Number)
}

/// Single-sheet workbook: header row, then numeric columns as numbers and
/// everything else as text. Empty cells are left blank.
fn xlsx_bytes(table: &ResultTable) -> RunnerResult<Vec<u8>> {
    let xlsx_err = |err: XlsxError| RunnerError::io("failed to write xlsx", err);
    let kinds = column_kinds(table);
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in table.headers().iter().enumerate() {
        sheet
            .write_string(0, sheet_col(col)?, header)
            .map_err(xlsx_err)?;
    }
    for (index, row) in table.rows().iter().enumerate() {
        let row_num = u32::try_from(index + 1)
            .map_err(|err| RunnerError::io("too many rows for a worksheet", err))?;
        for ((col, cell), kind) in row.iter().enumerate().zip(&kinds) {
            if cell.is_empty() {
                continue;
            }
            let col = sheet_col(col)?;
            let number = match kind {
                ColumnKind::Text => None,
                ColumnKind::Integer | ColumnKind::Float => cell.parse::<f64>().ok(),
            };
            let written = match number {
                Some(number) => sheet.write_number(row_num, col, number),
                None => sheet.write_string(row_num, col, cell),
            };
            written.map_err(xlsx_err)?;
        }
    }
    workbook.save_to_buffer().map_err(xlsx_err)
}

fn sheet_col(col: usize) -> RunnerResult<u16> {
    u16::try_from(col).map_err(|err| RunnerError::io("too many columns for a worksheet", err))
}

/// Save the console transcript as plain text.
pub fn save_log(dest: &Path, content: &str) -> RunnerResult<()> {
    fs::write(dest, content)
        .map_err(|err| RunnerError::io(format!("failed to write {}", dest.display()), err))?;
    tracing::info!(dest = %dest.display(), bytes = content.len(), "saved console log");
    Ok(())
}
