//! File boundary: FED3 logs in and out
//!
//! CSV is the device's native format. JSON (an array of row objects) and
//! NDJSON (one row object per line) are accepted for data exported by other
//! tools. Every reader produces a `RawTable`; typing and schema repair happen
//! when it becomes a `SessionTable`.

use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use crate::config::LoadOptions;
use crate::error::SessionError;
use crate::schema::{parse_timestamp, CellValue, RawTable, DEFAULT_TIMESTAMP_COLUMN};
use crate::series::Series;
use crate::table::SessionTable;

/// Layout used when writing timestamps
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S%.f";

/// Load a session from `path`, choosing the parser by extension.
///
/// The session is named after the file stem.
pub fn load<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<SessionTable, SessionError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let mut raw = match extension.as_str() {
        "csv" => read_csv(File::open(path)?, &options.timestamp_column)?,
        "json" => parse_json_records(File::open(path)?, &options.timestamp_column)?,
        "ndjson" | "jsonl" => parse_ndjson(File::open(path)?, &options.timestamp_column)?,
        "xlsx" | "xls" => {
            return Err(SessionError::UnsupportedFormat(format!(
                "{}: Excel workbooks are not supported, export the sheet to CSV",
                path.display()
            )))
        }
        other => {
            return Err(SessionError::UnsupportedFormat(format!(
                "{}: unknown extension \"{}\"",
                path.display(),
                other
            )))
        }
    };

    if options.drop_empty_rows {
        raw.drop_empty_rows();
    }

    let mut table = SessionTable::from_raw(raw).with_source_path(path);
    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        table.set_name(Some(stem.to_string()));
    }
    if let Some(policy) = options.deduplicate {
        table.deduplicate_index_with_step(policy, options.dedup_offset())?;
    }
    log::debug!(
        "Loaded {} ({} rows) from {}",
        table.display_name(),
        table.len(),
        path.display()
    );
    Ok(table)
}

/// Read CSV rows. Headers are kept verbatim (schema repair handles stray
/// whitespace); rows with a blank timestamp are skipped.
pub fn read_csv<R: Read>(reader: R, timestamp_column: &str) -> Result<RawTable, SessionError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
    let ts_pos = headers
        .iter()
        .position(|h| h == timestamp_column)
        .or_else(|| headers.iter().position(|h| h.trim() == timestamp_column.trim()))
        .ok_or_else(|| {
            SessionError::ParseError(format!("No timestamp column \"{}\"", timestamp_column))
        })?;

    let names: Vec<&String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != ts_pos)
        .map(|(_, h)| h)
        .collect();
    let mut timestamps = Vec::new();
    let mut cells: Vec<Vec<CellValue>> = vec![Vec::new(); names.len()];

    for (line, record) in csv_reader.records().enumerate() {
        let record = record?;
        let stamp = record.get(ts_pos).unwrap_or("").trim();
        if stamp.is_empty() {
            continue;
        }
        let ts = parse_timestamp(stamp)
            .map_err(|e| SessionError::ParseError(format!("row {}: {}", line + 2, e)))?;
        timestamps.push(ts);

        let fields = (0..headers.len()).filter(|i| *i != ts_pos);
        for (column, i) in cells.iter_mut().zip(fields) {
            column.push(CellValue::parse(record.get(i).unwrap_or("")));
        }
    }

    let mut raw = RawTable::new(timestamps);
    for (name, values) in names.into_iter().zip(cells) {
        raw.push_column(name, values);
    }
    Ok(raw)
}

fn json_cell(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Missing,
        Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or_default(),
        Value::String(s) => CellValue::parse(s),
        Value::Bool(b) => CellValue::Text(b.to_string()),
        other => CellValue::Text(other.to_string()),
    }
}

fn raw_from_records(records: Vec<Value>, timestamp_column: &str) -> Result<RawTable, SessionError> {
    let mut names: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(records.len());
    for (i, record) in records.into_iter().enumerate() {
        let Value::Object(fields) = record else {
            return Err(SessionError::ParseError(format!("record {} is not an object", i)));
        };
        let ts = match fields.get(timestamp_column) {
            Some(Value::String(s)) if !s.trim().is_empty() => parse_timestamp(s)?,
            _ => continue,
        };
        for key in fields.keys() {
            if key != timestamp_column && !names.contains(key) {
                names.push(key.clone());
            }
        }
        rows.push((ts, fields));
    }

    let mut raw = RawTable::new(rows.iter().map(|(ts, _)| *ts).collect());
    for name in &names {
        let values = rows
            .iter()
            .map(|(_, fields)| fields.get(name).map(json_cell).unwrap_or_default())
            .collect();
        raw.push_column(name, values);
    }
    Ok(raw)
}

/// Parse a JSON array of row objects
pub fn parse_json_records<R: Read>(reader: R, timestamp_column: &str) -> Result<RawTable, SessionError> {
    let records: Vec<Value> = serde_json::from_reader(reader)?;
    raw_from_records(records, timestamp_column)
}

/// Parse newline-delimited row objects; blank lines are ignored
pub fn parse_ndjson<R: Read>(reader: R, timestamp_column: &str) -> Result<RawTable, SessionError> {
    let mut records = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        records.push(serde_json::from_str(trimmed)?);
    }
    raw_from_records(records, timestamp_column)
}

fn format_cell(cell: &CellValue) -> String {
    cell.as_text().unwrap_or_default()
}

/// Write a session as device-style CSV: timestamp column first, canonical
/// headers, then foreign columns and `Concat_#`
pub fn write_csv<W: Write>(table: &SessionTable, writer: W) -> Result<(), SessionError> {
    let raw = table.to_raw();
    let mut out = csv::Writer::from_writer(writer);

    let mut header = vec![DEFAULT_TIMESTAMP_COLUMN.to_string()];
    header.extend(raw.columns.iter().map(|c| c.name.clone()));
    out.write_record(&header)?;

    for (row, ts) in raw.timestamps.iter().enumerate() {
        let mut record = vec![ts.format(TIMESTAMP_FORMAT).to_string()];
        record.extend(raw.columns.iter().map(|c| format_cell(&c.values[row])));
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}

/// Write a metric series as two-column CSV
pub fn write_series_csv<W: Write>(
    series: &Series<Option<f64>>,
    value_header: &str,
    writer: W,
) -> Result<(), SessionError> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record([DEFAULT_TIMESTAMP_COLUMN, value_header])?;
    for (ts, value) in series.iter() {
        let value = value.map(|v| v.to_string()).unwrap_or_default();
        out.write_record([ts.format(TIMESTAMP_FORMAT).to_string(), value])?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::test_support::at;
    use crate::types::{DedupPolicy, Field};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    const DEVICE_CSV: &str = "\
MM:DD:YYYY hh:mm:ss,Library_Version,Session_type,Device_Number,Battery_Voltage,Motor_Turns,FR,Event,Active_Poke,Left_Poke_Count,Right_Poke_Count,Pellet_Count,Block_Pellet_Count,Retrieval_Time
03/01/2021 10:00:00,1.1,FR1,3,4.1,,1,Left,Left,1,0,0,0,
03/01/2021 10:00:05,1.1,FR1,3,4.1,2,1,Pellet,Left,1,0,1,1,3.25
03/01/2021 10:01:00,1.1,FR1,3,4.0,,1,Right,Left,1,1,1,1,
,,,,,,,,,,,,,
";

    #[test]
    fn test_reads_device_csv() {
        let raw = read_csv(Cursor::new(DEVICE_CSV), DEFAULT_TIMESTAMP_COLUMN).unwrap();
        assert_eq!(raw.len(), 3);
        let table = SessionTable::from_raw(raw);
        assert_eq!(table.counter(Field::PelletCount).unwrap(), &[0, 1, 1]);
        assert_eq!(table.numeric(Field::RetrievalTime).unwrap()[1], Some(3.25));
        assert_eq!(table.text(Field::SessionType).unwrap()[0].as_deref(), Some("FR1"));
        assert_eq!(
            table.foreign_columns(),
            &["Library_Version", "FR", "Block_Pellet_Count"]
        );
        assert_eq!(table.mode().to_string(), "FR1");
    }

    #[test]
    fn test_missing_timestamp_column() {
        assert!(matches!(
            read_csv(Cursor::new("a,b\n1,2\n"), DEFAULT_TIMESTAMP_COLUMN),
            Err(SessionError::ParseError(_))
        ));
    }

    #[test]
    fn test_load_names_session_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mouse7.csv");
        std::fs::write(&path, DEVICE_CSV).unwrap();

        let table = load(&path, &LoadOptions::default()).unwrap();
        assert_eq!(table.name(), Some("mouse7"));
        assert_eq!(table.source_path(), Some(path.as_path()));
        assert_eq!(table.start_time(), Some(at(1, 10, 0, 0)));
    }

    #[test]
    fn test_load_applies_deduplication() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dups.csv");
        std::fs::write(
            &path,
            "MM:DD:YYYY hh:mm:ss,Pellet_Count,Left_Poke_Count,Right_Poke_Count\n\
             03/01/2021 10:00:00,0,1,0\n\
             03/01/2021 10:00:00,0,2,0\n\
             03/01/2021 10:00:01,1,2,0\n",
        )
        .unwrap();

        let options = LoadOptions {
            deduplicate: Some(DedupPolicy::Offset),
            dedup_offset_ms: 250,
            ..LoadOptions::default()
        };
        let table = load(&path, &options).unwrap();
        assert!(!table.has_duplicates());
        assert_eq!(table.index()[1], at(1, 10, 0, 0) + chrono::Duration::milliseconds(250));
    }

    #[test]
    fn test_rejects_excel() {
        assert!(matches!(
            load("session.xlsx", &LoadOptions::default()),
            Err(SessionError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_json_and_ndjson_agree() {
        let json = r#"[
            {"MM:DD:YYYY hh:mm:ss": "2021-03-01 10:00:00", "Pellet_Count": 0, "Left_Poke_Count": 1, "Right_Poke_Count": 0},
            {"MM:DD:YYYY hh:mm:ss": "2021-03-01 10:00:30", "Pellet_Count": 1, "Left_Poke_Count": 1, "Right_Poke_Count": 0, "Event": "Pellet"}
        ]"#;
        let ndjson = "\
{\"MM:DD:YYYY hh:mm:ss\": \"2021-03-01 10:00:00\", \"Pellet_Count\": 0, \"Left_Poke_Count\": 1, \"Right_Poke_Count\": 0}

{\"MM:DD:YYYY hh:mm:ss\": \"2021-03-01 10:00:30\", \"Pellet_Count\": 1, \"Left_Poke_Count\": 1, \"Right_Poke_Count\": 0, \"Event\": \"Pellet\"}
";
        let a = SessionTable::from_raw(
            parse_json_records(Cursor::new(json), DEFAULT_TIMESTAMP_COLUMN).unwrap(),
        );
        let b = SessionTable::from_raw(
            parse_ndjson(Cursor::new(ndjson), DEFAULT_TIMESTAMP_COLUMN).unwrap(),
        );
        assert_eq!(a, b);
        assert_eq!(a.counter(Field::PelletCount).unwrap(), &[0, 1]);
        assert_eq!(a.text(Field::Event).unwrap()[0], None);
    }

    #[test]
    fn test_write_csv_round_trips() {
        let raw = read_csv(Cursor::new(DEVICE_CSV), DEFAULT_TIMESTAMP_COLUMN).unwrap();
        let table = SessionTable::from_raw(raw);

        let mut buffer = Vec::new();
        write_csv(&table, &mut buffer).unwrap();
        let reread = SessionTable::from_raw(
            read_csv(Cursor::new(buffer), DEFAULT_TIMESTAMP_COLUMN).unwrap(),
        );
        assert_eq!(reread.index(), table.index());
        assert_eq!(
            reread.counter(Field::LeftPokeCount).unwrap(),
            table.counter(Field::LeftPokeCount).unwrap()
        );
        assert_eq!(reread.foreign_columns(), table.foreign_columns());
        assert_eq!(reread.mode(), table.mode());
    }

    #[test]
    fn test_write_series_csv() {
        let series = Series::new(vec![at(1, 10, 0, 0), at(1, 10, 0, 1)], vec![Some(1.5), None]);
        let mut buffer = Vec::new();
        write_series_csv(&series, "ipi", &mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "MM:DD:YYYY hh:mm:ss,ipi\n03/01/2021 10:00:00,1.5\n03/01/2021 10:00:01,\n"
        );
    }
}
