//! TMY3-like serialization of parsed EPW data.
//!
//! The output opens with a one-line site header
//! (`WMO,name,state,tz,lat,lon,elev`), then the fixed 68-column TMY3
//! header row, then one row per input record. Every EPW field with a TMY3
//! counterpart is copied through verbatim; source columns carry `?`,
//! uncertainty columns `0`.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use cityprep_shared::{CityPrepError, Result};

use crate::epw::{EpwField, EpwFile, EpwRecord};

/// Filler for source-flag columns (no provenance in EPW input).
const SOURCE_FLAG: &str = "?";

/// Filler for uncertainty-code columns.
const UNCERT_FLAG: &str = "0";

/// How one output column is filled.
#[derive(Debug, Clone, Copy)]
enum Column {
    /// `MM/DD/YYYY` built from the record's date fields.
    Date,
    /// `HH:MM` built from the record's time fields.
    Time,
    /// Verbatim copy of one EPW field.
    Value(EpwField),
    /// Source flag filler.
    Source,
    /// Uncertainty code filler.
    Uncert,
}

/// The fixed TMY3 column layout.
const COLUMNS: &[(&str, Column)] = &[
    ("Date (MM/DD/YYYY)", Column::Date),
    ("Time (HH:MM)", Column::Time),
    ("ETR (W/m^2)", Column::Value(EpwField::ExtHorRad)),
    ("ETRN (W/m^2)", Column::Value(EpwField::ExtDirNormRad)),
    ("GHI (W/m^2)", Column::Value(EpwField::GlobHorRad)),
    ("GHI source", Column::Source),
    ("GHI uncert (%)", Column::Uncert),
    ("DNI (W/m^2)", Column::Value(EpwField::DirNormRad)),
    ("DNI source", Column::Source),
    ("DNI uncert (%)", Column::Uncert),
    ("DHI (W/m^2)", Column::Value(EpwField::DiffHorRad)),
    ("DHI source", Column::Source),
    ("DHI uncert (%)", Column::Uncert),
    ("GH illum (lx)", Column::Value(EpwField::GlobHorIll)),
    ("GH illum source", Column::Source),
    ("Global illum uncert (%)", Column::Uncert),
    ("DN illum (lx)", Column::Value(EpwField::DirNormIll)),
    ("DN illum source", Column::Source),
    ("DN illum uncert (%)", Column::Uncert),
    ("DH illum (lx)", Column::Value(EpwField::DiffHorIll)),
    ("DH illum source", Column::Source),
    ("DH illum uncert (%)", Column::Uncert),
    ("Zenith lum (cd/m^2)", Column::Value(EpwField::ZenithLum)),
    ("Zenith lum source", Column::Source),
    ("Zenith lum uncert (%)", Column::Uncert),
    ("TotCld (tenths)", Column::Value(EpwField::TotalSkyCover)),
    ("TotCld source", Column::Source),
    ("TotCld uncert (code)", Column::Uncert),
    ("OpqCld (tenths)", Column::Value(EpwField::OpaqueSkyCover)),
    ("OpqCld source", Column::Source),
    ("OpqCld uncert (code)", Column::Uncert),
    ("Dry-bulb (C)", Column::Value(EpwField::DryBulbTemp)),
    ("Dry-bulb source", Column::Source),
    ("Dry-bulb uncert (code)", Column::Uncert),
    ("Dew-point (C)", Column::Value(EpwField::DewPointTemp)),
    ("Dew-point source", Column::Source),
    ("Dew-point uncert (code)", Column::Uncert),
    ("RHum (%)", Column::Value(EpwField::RelHum)),
    ("RHum source", Column::Source),
    ("RHum uncert (code)", Column::Uncert),
    ("Pressure (mbar)", Column::Value(EpwField::AtmPressure)),
    ("Pressure source", Column::Source),
    ("Pressure uncert (code)", Column::Uncert),
    ("Wdir (degrees)", Column::Value(EpwField::WindDir)),
    ("Wdir source", Column::Source),
    ("Wdir uncert (code)", Column::Uncert),
    ("Wspd (m/s)", Column::Value(EpwField::WindSpeed)),
    ("Wspd source", Column::Source),
    ("Wspd uncert (code)", Column::Uncert),
    ("Hvis (m)", Column::Value(EpwField::Visibility)),
    ("Hvis source", Column::Source),
    ("Hvis uncert (code)", Column::Uncert),
    ("CeilHgt (m)", Column::Value(EpwField::CeilingHeight)),
    ("CeilHgt source", Column::Source),
    ("CeilHgt uncert (code)", Column::Uncert),
    ("Pwat (cm)", Column::Value(EpwField::PrecipWater)),
    ("Pwat source", Column::Source),
    ("Pwat uncert (code)", Column::Uncert),
    ("AOD (unitless)", Column::Value(EpwField::AerosolOpticalDepth)),
    ("AOD source", Column::Source),
    ("AOD uncert (code)", Column::Uncert),
    ("Alb (unitless)", Column::Value(EpwField::Albedo)),
    ("Alb source", Column::Source),
    ("Alb uncert (code)", Column::Uncert),
    ("Lprecip depth (mm)", Column::Value(EpwField::LiquidPrecipDepth)),
    ("Lprecip quantity (hr)", Column::Value(EpwField::LiquidPrecipQuantity)),
    ("Lprecip source", Column::Source),
    ("Lprecip uncert (code)", Column::Uncert),
];

/// Write a TMY3-like file to the given path.
pub fn write_tmy_to_path(epw: &EpwFile, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| CityPrepError::io(path, e))?;
    write_tmy(epw, BufWriter::new(file))
}

/// Write a TMY3-like file to any writer.
pub fn write_tmy(epw: &EpwFile, writer: impl io::Write) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(writer);

    let loc = &epw.location;
    wtr.write_record([
        loc.wmo.as_str(),
        loc.station_name.as_str(),
        loc.state.as_str(),
        loc.timezone.as_str(),
        loc.latitude.as_str(),
        loc.longitude.as_str(),
        loc.elevation.as_str(),
    ])
    .map_err(csv_err)?;

    wtr.write_record(COLUMNS.iter().map(|(name, _)| *name))
        .map_err(csv_err)?;

    for record in &epw.records {
        let row: Vec<String> = COLUMNS
            .iter()
            .map(|(_, column)| cell(record, *column))
            .collect();
        wtr.write_record(&row).map_err(csv_err)?;
    }

    wtr.flush()
        .map_err(|e| CityPrepError::Weather(format!("flush failed: {e}")))?;
    Ok(())
}

fn cell(record: &EpwRecord, column: Column) -> String {
    match column {
        Column::Date => format!(
            "{:02}/{:02}/{}",
            record.month, record.day, record.year
        ),
        // EPW marks end-of-hour readings as minute 60; TMY3 time is the
        // hour ending, minutes always 00.
        Column::Time => format!("{:02}:{:02}", record.hour, record.minute % 60),
        Column::Value(field) => record.field(field).to_string(),
        Column::Source => SOURCE_FLAG.to_string(),
        Column::Uncert => UNCERT_FLAG.to_string(),
    }
}

fn csv_err(e: csv::Error) -> CityPrepError {
    CityPrepError::Weather(format!("write failed: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epw::tests::sample_epw;

    fn convert(content: &str) -> String {
        let epw = EpwFile::from_str(content).expect("parse");
        let mut out = Vec::new();
        write_tmy(&epw, &mut out).expect("write");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn layout_has_sixty_eight_columns() {
        assert_eq!(COLUMNS.len(), 68);
    }

    #[test]
    fn site_header_carries_location_fields() {
        let out = convert(&sample_epw());
        let first = out.lines().next().expect("site line");
        assert_eq!(first, "107370,Stuttgart,BW,1.0,48.833,9.200,318.0");
    }

    #[test]
    fn record_count_and_order_are_preserved() {
        let out = convert(&sample_epw());
        let lines: Vec<&str> = out.lines().collect();
        // site header + column header + 3 records
        assert_eq!(lines.len(), 5);

        let dates: Vec<&str> = lines[2..]
            .iter()
            .map(|l| l.split(',').next().expect("date cell"))
            .collect();
        assert_eq!(dates, vec!["01/01/2015", "01/01/2015", "01/01/2015"]);
        let times: Vec<&str> = lines[2..]
            .iter()
            .map(|l| l.split(',').nth(1).expect("time cell"))
            .collect();
        assert_eq!(times, vec!["01:00", "02:00", "03:00"]);
    }

    #[test]
    fn values_are_copied_verbatim() {
        let out = convert(&sample_epw());
        let first_record = out.lines().nth(2).expect("record");
        let cells: Vec<&str> = first_record.split(',').collect();

        let dry_bulb_idx = COLUMNS
            .iter()
            .position(|(name, _)| *name == "Dry-bulb (C)")
            .expect("column");
        assert_eq!(cells[dry_bulb_idx], "-3.5");

        let ghi_idx = COLUMNS
            .iter()
            .position(|(name, _)| *name == "GHI (W/m^2)")
            .expect("column");
        assert_eq!(
            cells[ghi_idx],
            format!("{}.0", EpwField::GlobHorRad.index())
        );
    }

    #[test]
    fn source_and_uncert_columns_are_filled() {
        let out = convert(&sample_epw());
        let first_record = out.lines().nth(2).expect("record");
        let cells: Vec<&str> = first_record.split(',').collect();

        let src_idx = COLUMNS
            .iter()
            .position(|(name, _)| *name == "GHI source")
            .expect("column");
        assert_eq!(cells[src_idx], "?");
        assert_eq!(cells[src_idx + 1], "0");
    }

    #[test]
    fn every_record_row_has_all_columns() {
        let out = convert(&sample_epw());
        for line in out.lines().skip(1) {
            assert_eq!(line.split(',').count(), 68);
        }
    }

    #[test]
    fn column_header_matches_layout() {
        let out = convert(&sample_epw());
        let header = out.lines().nth(1).expect("header");
        assert!(header.starts_with("Date (MM/DD/YYYY),Time (HH:MM),ETR (W/m^2)"));
        assert!(header.ends_with("Lprecip depth (mm),Lprecip quantity (hr),Lprecip source,Lprecip uncert (code)"));
    }
}
