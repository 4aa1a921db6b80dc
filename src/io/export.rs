//! CSV export for schedule results.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::schedule::{ScheduleResult, Window};

/// Column header for CSV window export.
const HEADER: &str = "rank,role,start,end,average_intensity,dominant_index,duration_minutes";

/// Exports the primary window and its alternatives to a CSV file at `path`.
///
/// Rows are written best-first: rank 1 is the primary window, followed by
/// the alternatives in the order the engine returned them.
///
/// # Arguments
///
/// * `result` - Schedule result to export
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(result: &ScheduleResult, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(result, buf)
}

/// Writes the primary window and alternatives as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(result: &ScheduleResult, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(','))?;

    let rows = std::iter::once(("primary", &result.primary))
        .chain(result.alternatives.iter().map(|w| ("alternative", w)));
    for (rank, (role, window)) in rows.enumerate() {
        wtr.write_record(record(rank + 1, role, window))?;
    }

    wtr.flush()?;
    Ok(())
}

fn record(rank: usize, role: &str, w: &Window) -> [String; 7] {
    [
        rank.to_string(),
        role.to_string(),
        w.start.to_rfc3339(),
        w.end.to_rfc3339(),
        format!("{:.2}", w.average_intensity),
        w.dominant_index.to_string(),
        w.duration_minutes().to_string(),
    ]
}
