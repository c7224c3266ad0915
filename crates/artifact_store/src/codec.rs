//! CSV and JSON encodings of the stored artifacts.
//!
//! Enriched CSV columns: `date, demand, forecast, residual, rolling_mean,
//! rolling_std, z_score, risk_level, anomaly_flag`, plus a trailing
//! `risk_score` when any row carries one. Floats are rounded to a fixed
//! number of decimals so repeated runs produce byte-identical files.

use common::{Cursor, DemandPoint, DemandSeries, EnrichedRow, Error, Result, DATE_FORMAT};

const ENRICHED_HEADER: [&str; 9] = [
    "date",
    "demand",
    "forecast",
    "residual",
    "rolling_mean",
    "rolling_std",
    "z_score",
    "risk_level",
    "anomaly_flag",
];

/// Parse the source demand series. Zero data rows is `Error::EmptyInput`.
pub fn decode_series(bytes: &[u8]) -> Result<DemandSeries> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut points = Vec::new();
    for record in reader.deserialize::<DemandPoint>() {
        points.push(record?);
    }
    if points.is_empty() {
        return Err(Error::EmptyInput);
    }
    DemandSeries::from_points(points)
}

/// Serialize a demand series back to `date,demand` CSV.
pub fn encode_series(points: &[DemandPoint]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(["date", "demand"])?;
    for p in points {
        writer.write_record([p.date.format(DATE_FORMAT).to_string(), p.demand.to_string()])?;
    }
    finish(writer)
}

/// Write enriched rows with floats fixed to `decimals` places.
pub fn encode_enriched(rows: &[EnrichedRow], decimals: u32) -> Result<Vec<u8>> {
    let with_score = rows.iter().any(|r| r.risk_score.is_some());
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    let mut header: Vec<&str> = ENRICHED_HEADER.to_vec();
    if with_score {
        header.push("risk_score");
    }
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.date.format(DATE_FORMAT).to_string(),
            row.demand.to_string(),
            format_float(row.forecast, decimals),
            format_float(row.residual, decimals),
            format_float(row.rolling_mean, decimals),
            format_float(row.rolling_std, decimals),
            row.z_score
                .map(|z| format_float(z, decimals))
                .unwrap_or_default(),
            row.risk_level.as_str().to_string(),
            row.anomaly_flag.to_string(),
        ];
        if with_score {
            record.push(
                row.risk_score
                    .map(|s| format_float(s, decimals))
                    .unwrap_or_default(),
            );
        }
        writer.write_record(&record)?;
    }
    finish(writer)
}

/// Parse an enriched CSV artifact (with or without `risk_score`).
pub fn decode_enriched(bytes: &[u8]) -> Result<Vec<EnrichedRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for record in reader.deserialize::<EnrichedRow>() {
        rows.push(record?);
    }
    Ok(rows)
}

pub fn encode_cursor(cursor: &Cursor) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(cursor)?)
}

pub fn decode_cursor(bytes: &[u8]) -> Result<Cursor> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Round then print with exactly `decimals` places; never prints `-0`.
pub fn format_float(value: f64, decimals: u32) -> String {
    let scale = 10f64.powi(decimals as i32);
    let mut rounded = (value * scale).round() / scale;
    if rounded == 0.0 {
        rounded = 0.0;
    }
    format!("{:.*}", decimals as usize, rounded)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))
}
