//! CSV export for per-CP and per-Storage power traces.

use std::io::{self, Write};
use std::path::Path;

use crate::result::ResultStore;

/// Writes one row per simulation step, with one column per recorded Charging
/// Point / Storage id plus the aggregated load and storage profiles, to the
/// file at `path`.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(result: &ResultStore, resolution_seconds: f64, path: &Path) -> io::Result<()> {
    let file = std::fs::File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(result, resolution_seconds, buf)
}

/// Writes the same rows as [`export_csv`] to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(result: &ResultStore, resolution_seconds: f64, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let cp_traces = result.cp_traces_dense();
    let storage_traces = result.storage_traces_dense();
    let load = result.aggregated_load_profile();
    let storage_total = result.storage_profile();

    let mut header = vec!["step".to_string(), "time_hr".to_string()];
    header.extend(cp_traces.iter().map(|(id, _)| format!("cp_{id}_kw")));
    header.extend(storage_traces.iter().map(|(id, _)| format!("storage_{id}_kw")));
    header.push("load_total_kw".to_string());
    header.push("storage_total_kw".to_string());
    wtr.write_record(&header)?;

    let dt_hours = resolution_seconds / 3600.0;
    for step in 0..result.step_count {
        let mut row = vec![step.to_string(), format!("{:.4}", step as f64 * dt_hours)];
        row.extend(cp_traces.iter().map(|(_, trace)| format!("{:.4}", trace[step])));
        row.extend(storage_traces.iter().map(|(_, trace)| format!("{:.4}", trace[step])));
        row.push(format!("{:.4}", load[step]));
        row.push(format!("{:.4}", storage_total[step]));
        wtr.write_record(&row)?;
    }

    wtr.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_includes_one_column_per_cp_and_storage() {
        let mut result = ResultStore::new(2, 3600.0);
        result.record_cp(0, 0, 5.0);
        result.record_cp(0, 1, 5.0);
        result.record_cp(1, 0, 0.0);
        result.record_cp(1, 1, 3.0);
        result.record_storage(2, 0, -1.0);
        result.record_storage(2, 1, -1.0);

        let mut buf = Vec::new();
        write_csv(&result, 3600.0, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, "step,time_hr,cp_0_kw,cp_1_kw,storage_2_kw,load_total_kw,storage_total_kw");
    }

    #[test]
    fn row_count_matches_step_count() {
        let mut result = ResultStore::new(5, 900.0);
        result.record_cp(0, 4, 1.0);
        let mut buf = Vec::new();
        write_csv(&result, 900.0, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn round_trip_parseable() {
        let mut result = ResultStore::new(3, 3600.0);
        result.record_cp(0, 2, 7.5);
        let mut buf = Vec::new();
        write_csv(&result, 3600.0, &mut buf).unwrap();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.len(), 5);
        let mut rows = 0;
        for record in rdr.records() {
            let rec = record.unwrap();
            let _: f64 = rec[2].parse().unwrap();
            rows += 1;
        }
        assert_eq!(rows, 3);
    }
}
