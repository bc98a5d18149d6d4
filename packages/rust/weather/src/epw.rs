//! EPW hourly weather file parsing.
//!
//! An EPW file opens with eight header lines (the first being
//! `LOCATION,…`) followed by one data row per hour, 35 comma-separated
//! fields each. Field values are kept as the exact strings read from the
//! file; parsing only validates that they are well-formed.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use cityprep_shared::{CityPrepError, Result};

/// Number of header lines preceding the data rows.
pub const EPW_HEADER_LINES: usize = 8;

/// Fields per data row.
pub const EPW_FIELDS: usize = 35;

/// Named indices into an EPW data row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum EpwField {
    Year = 0,
    Month = 1,
    Day = 2,
    Hour = 3,
    Minute = 4,
    DataSourceFlags = 5,
    DryBulbTemp = 6,
    DewPointTemp = 7,
    RelHum = 8,
    AtmPressure = 9,
    ExtHorRad = 10,
    ExtDirNormRad = 11,
    HorInfraRad = 12,
    GlobHorRad = 13,
    DirNormRad = 14,
    DiffHorRad = 15,
    GlobHorIll = 16,
    DirNormIll = 17,
    DiffHorIll = 18,
    ZenithLum = 19,
    WindDir = 20,
    WindSpeed = 21,
    TotalSkyCover = 22,
    OpaqueSkyCover = 23,
    Visibility = 24,
    CeilingHeight = 25,
    WeatherObservation = 26,
    WeatherCode = 27,
    PrecipWater = 28,
    AerosolOpticalDepth = 29,
    SnowDepth = 30,
    DaysSinceSnow = 31,
    Albedo = 32,
    LiquidPrecipDepth = 33,
    LiquidPrecipQuantity = 34,
}

impl EpwField {
    /// Zero-based column index in a data row.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Site metadata from the `LOCATION` header line.
///
/// Values are stored as read; the numeric ones are validated at parse time.
#[derive(Debug, Clone)]
pub struct EpwLocation {
    pub station_name: String,
    pub state: String,
    pub wmo: String,
    pub latitude: String,
    pub longitude: String,
    pub timezone: String,
    pub elevation: String,
}

/// One hourly observation row.
#[derive(Debug, Clone)]
pub struct EpwRecord {
    /// 1-based line number in the source file.
    pub line: usize,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    /// All 35 fields as read, including the date fields.
    pub fields: Vec<String>,
}

impl EpwRecord {
    /// Field value by named index.
    pub fn field(&self, field: EpwField) -> &str {
        &self.fields[field.index()]
    }
}

/// A parsed EPW file: location header plus ordered hourly records.
#[derive(Debug, Clone)]
pub struct EpwFile {
    pub location: EpwLocation,
    pub records: Vec<EpwRecord>,
}

impl EpwFile {
    /// Read and validate an EPW file.
    ///
    /// EPW files are occasionally Latin-1 encoded; undecodable bytes in
    /// free-text fields are replaced rather than rejected.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| CityPrepError::io(path, e))?;
        let content = String::from_utf8_lossy(&bytes);
        Self::from_str(&content)
    }

    /// Parse EPW content.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let mut lines = content.lines().enumerate();

        let (_, location_line) = lines
            .next()
            .ok_or_else(|| CityPrepError::Weather("file is empty".into()))?;
        let location = parse_location(location_line)?;

        // Seven more header lines before the data starts.
        for _ in 1..EPW_HEADER_LINES {
            if lines.next().is_none() {
                return Err(CityPrepError::Weather(format!(
                    "expected {EPW_HEADER_LINES} header lines, file ends early"
                )));
            }
        }

        let mut records = Vec::new();
        for (idx, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            records.push(parse_record(line, idx + 1)?);
        }

        if records.is_empty() {
            return Err(CityPrepError::Weather("file contains no data rows".into()));
        }

        tracing::debug!(
            records = records.len(),
            station = %location.station_name,
            "EPW file parsed"
        );

        Ok(Self { location, records })
    }
}

fn parse_location(line: &str) -> Result<EpwLocation> {
    let fields: Vec<&str> = line.split(',').collect();

    if !fields
        .first()
        .is_some_and(|f| f.trim().eq_ignore_ascii_case("LOCATION"))
    {
        return Err(CityPrepError::Weather(
            "first line must be the LOCATION header".into(),
        ));
    }
    if fields.len() < 10 {
        return Err(CityPrepError::Weather(format!(
            "LOCATION header has {} fields, expected at least 10",
            fields.len()
        )));
    }

    let location = EpwLocation {
        station_name: fields[1].trim().to_string(),
        state: fields[2].trim().to_string(),
        wmo: fields[5].trim().to_string(),
        latitude: fields[6].trim().to_string(),
        longitude: fields[7].trim().to_string(),
        timezone: fields[8].trim().to_string(),
        elevation: fields[9].trim().to_string(),
    };

    for (label, value) in [
        ("latitude", &location.latitude),
        ("longitude", &location.longitude),
        ("time zone", &location.timezone),
        ("elevation", &location.elevation),
    ] {
        if value.parse::<f64>().is_err() {
            return Err(CityPrepError::Weather(format!(
                "LOCATION {label} `{value}` is not a number"
            )));
        }
    }

    Ok(location)
}

fn parse_record(line: &str, line_number: usize) -> Result<EpwRecord> {
    let fields: Vec<String> = line.split(',').map(|f| f.trim().to_string()).collect();

    if fields.len() != EPW_FIELDS {
        return Err(CityPrepError::Weather(format!(
            "line {line_number}: expected {EPW_FIELDS} fields, found {}",
            fields.len()
        )));
    }

    let year = parse_int(&fields, EpwField::Year, line_number)?;
    let month = parse_int(&fields, EpwField::Month, line_number)? as u32;
    let day = parse_int(&fields, EpwField::Day, line_number)? as u32;
    let hour = parse_int(&fields, EpwField::Hour, line_number)? as u32;
    let minute = parse_int(&fields, EpwField::Minute, line_number)? as u32;

    if NaiveDate::from_ymd_opt(year, month, day).is_none() {
        return Err(CityPrepError::Weather(format!(
            "line {line_number}: invalid calendar date {year}-{month}-{day}"
        )));
    }
    if !(1..=24).contains(&hour) {
        return Err(CityPrepError::Weather(format!(
            "line {line_number}: hour {hour} out of range 1-24"
        )));
    }
    if minute > 60 {
        return Err(CityPrepError::Weather(format!(
            "line {line_number}: minute {minute} out of range 0-60"
        )));
    }

    // Every observation field must at least be numeric; the data-source
    // flag field (index 5) is free text.
    for idx in EpwField::DryBulbTemp.index()..EPW_FIELDS {
        let value = &fields[idx];
        if value.parse::<f64>().is_err() {
            return Err(CityPrepError::Weather(format!(
                "line {line_number}: field {} value `{value}` is not a number",
                idx + 1
            )));
        }
    }

    Ok(EpwRecord {
        line: line_number,
        year,
        month,
        day,
        hour,
        minute,
        fields,
    })
}

fn parse_int(fields: &[String], field: EpwField, line_number: usize) -> Result<i32> {
    let value = &fields[field.index()];
    value.parse::<i32>().map_err(|_| {
        CityPrepError::Weather(format!(
            "line {line_number}: field {} value `{value}` is not an integer",
            field.index() + 1
        ))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
