use std::fs::File;
use std::path::Path;

use cortrack::{metrics, Detection, Result};

/// Loads a MOT-format annotation file into a per-frame detection sequence
/// (frame 1 through the maximum observed index, gaps left empty).
pub fn read_sequence(path: &Path) -> Result<Vec<Vec<Detection>>> {
    let file = File::open(path)?;
    let records = metrics::read_mot_records(file)?;
    Ok(metrics::sequence_from_records(&records))
}
