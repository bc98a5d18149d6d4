//! EPW → TMY3-like weather conversion for cityprep.
//!
//! Values pass through as the exact strings read from the input; the
//! conversion only rearranges them into the column layout the simulation
//! tool expects. No interpolation, no gap-filling.

pub mod epw;
pub mod tmy;

pub use epw::{EpwFile, EpwField, EpwLocation, EpwRecord};
pub use tmy::{write_tmy, write_tmy_to_path};

use std::path::Path;

use cityprep_shared::Result;

/// Summary of one file conversion.
#[derive(Debug, Clone)]
pub struct ConversionSummary {
    /// Hourly records converted.
    pub records: usize,
    /// Station name from the EPW location header.
    pub station_name: String,
}

/// Convert one EPW file into a TMY3-like file.
pub fn convert_epw_to_tmy(input: &Path, output: &Path) -> Result<ConversionSummary> {
    let epw = EpwFile::from_path(input)?;
    write_tmy_to_path(&epw, output)?;

    let summary = ConversionSummary {
        records: epw.records.len(),
        station_name: epw.location.station_name.clone(),
    };
    tracing::info!(
        records = summary.records,
        station = %summary.station_name,
        output = %output.display(),
        "weather file converted"
    );
    Ok(summary)
}
