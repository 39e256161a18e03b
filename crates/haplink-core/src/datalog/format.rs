//! Trajectory export
//!
//! Writes a recording as CSV for offline analysis.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::TrajectoryEntry;

/// Write trajectory entries to a CSV file.
///
/// Columns: time in seconds since the session opened, then x/y/z in
/// millimetres (signs applied).
pub fn write_csv<P: AsRef<Path>>(path: P, entries: &[TrajectoryEntry]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "Time,X,Y,Z")?;
    for entry in entries {
        writeln!(
            writer,
            "{:.3},{:.1},{:.1},{:.1}",
            entry.timestamp.as_secs_f64(),
            entry.x as f64 / 10.0,
            entry.y as f64 / 10.0,
            entry.z as f64 / 10.0,
        )?;
    }

    writer.flush()
}
