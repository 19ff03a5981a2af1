//! Offset column serialization.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use radoff_core::dataset::Dataset;

/// Write the offset column, one value per line, in row order.
///
/// Rows the solver could not complete produce a blank line, so a partial
/// output file stays positionally consistent with the input history. The
/// caller signals partial failure separately through its exit status.
pub fn write_offsets(path: &Path, dataset: &Dataset) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for row in dataset.iter() {
        match row.offset {
            Some(offset) => writeln!(writer, "{offset}")?,
            None => writeln!(writer)?,
        }
    }
    writer
        .flush()
        .with_context(|| format!("writing {}", path.display()))
}
