use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use std::borrow::Cow;
use std::fs;
use std::path::Path;

/// A single longitude/latitude pair read from the input table
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    /// Zero-based data row position (header excluded)
    pub row_index: usize,
    pub longitude: f64,
    pub latitude: f64,
    /// Cell text as it appeared in the input, echoed back in the output
    pub longitude_text: String,
    pub latitude_text: String,
}

impl Coordinate {
    pub fn new(row_index: usize, longitude: f64, latitude: f64) -> Self {
        Self {
            row_index,
            longitude,
            latitude,
            longitude_text: longitude.to_string(),
            latitude_text: latitude.to_string(),
        }
    }

    /// Parse a pair of cells, keeping their original text. None if either is not a number.
    pub fn from_cells(row_index: usize, longitude: &str, latitude: &str) -> Option<Self> {
        let (longitude, latitude) = (longitude.trim(), latitude.trim());
        Some(Self {
            row_index,
            longitude: parse_decimal(longitude)?,
            latitude: parse_decimal(latitude)?,
            longitude_text: longitude.to_string(),
            latitude_text: latitude.to_string(),
        })
    }
}

const LONGITUDE_MARKERS: [&str; 2] = ["longitude", "经度"];
const LATITUDE_MARKERS: [&str; 2] = ["latitude", "纬度"];

/// Supported input table formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableFormat {
    Delimited(u8),
    Spreadsheet,
}

impl TableFormat {
    fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" | "txt" => Ok(TableFormat::Delimited(b',')),
            "tsv" => Ok(TableFormat::Delimited(b'\t')),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Ok(TableFormat::Spreadsheet),
            _ => anyhow::bail!(
                "Unsupported input format: {} (expected csv, tsv, txt, xlsx, xls, xlsm, xlsb or ods)",
                path.display()
            ),
        }
    }
}

/// Locate the longitude and latitude columns by case-insensitive substring match.
/// When several headers match, the last one wins.
pub fn find_location_columns<S: AsRef<str>>(headers: &[S]) -> Result<(usize, usize)> {
    let mut longitude_col = None;
    let mut latitude_col = None;

    for (idx, header) in headers.iter().enumerate() {
        let lower = header.as_ref().to_lowercase();
        if LONGITUDE_MARKERS.iter().any(|m| lower.contains(m)) {
            longitude_col = Some(idx);
        } else if LATITUDE_MARKERS.iter().any(|m| lower.contains(m)) {
            latitude_col = Some(idx);
        }
    }

    match (longitude_col, latitude_col) {
        (Some(lon), Some(lat)) => Ok((lon, lat)),
        _ => {
            let found: Vec<&str> = headers.iter().map(|h| h.as_ref()).collect();
            anyhow::bail!(
                "Could not find both a longitude and a latitude column (headers: {})",
                found.join(", ")
            )
        }
    }
}

/// Read every coordinate from a csv/tsv/spreadsheet file, in row order
pub fn read_coordinates(path: &Path) -> Result<Vec<Coordinate>> {
    let format = TableFormat::from_path(path)?;
    let (headers, rows) = match format {
        TableFormat::Delimited(delimiter) => read_delimited(path, delimiter)?,
        TableFormat::Spreadsheet => read_spreadsheet(path)?,
    };

    let (lon_col, lat_col) = find_location_columns(&headers)?;
    log::info!(
        "Using column '{}' for longitude and '{}' for latitude",
        headers[lon_col],
        headers[lat_col]
    );

    Ok(coordinates_from_rows(&rows, lon_col, lat_col))
}

fn coordinates_from_rows(rows: &[Vec<String>], lon_col: usize, lat_col: usize) -> Vec<Coordinate> {
    let mut coordinates = Vec::with_capacity(rows.len());

    for (row_index, row) in rows.iter().enumerate() {
        let cells = row.get(lon_col).zip(row.get(lat_col));
        match cells.and_then(|(lon, lat)| Coordinate::from_cells(row_index, lon, lat)) {
            Some(coordinate) => coordinates.push(coordinate),
            None => {
                log::warn!("Skipping row {}: longitude/latitude are not numbers", row_index);
            }
        }
    }

    coordinates
}

fn parse_decimal(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Decode raw file bytes: UTF-8 (BOM stripped) when valid, otherwise GBK,
/// the ANSI code page of Chinese-locale Windows where most of these exports come from
fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text.trim_start_matches('\u{feff}')),
        Err(_) => {
            let (text, _, had_errors) = encoding_rs::GBK.decode(bytes);
            if had_errors {
                log::warn!("Input is neither UTF-8 nor GBK; undecodable bytes were replaced");
            } else {
                log::info!("Input is not UTF-8, decoded as GBK");
            }
            text
        }
    }
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to open input file {}", path.display()))?;
    let text = decode_text(&bytes);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read header row of {}", path.display()))?
        .iter()
        .map(|field| field.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.with_context(|| format!("Failed to read a data row of {}", path.display()))?;
        rows.push(record.iter().map(|field| field.trim().to_string()).collect());
    }

    Ok((headers, rows))
}

fn read_spreadsheet(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open spreadsheet {}", path.display()))?;

    let range = workbook
        .worksheet_range_at(0)
        .context("Spreadsheet has no worksheets")?
        .with_context(|| format!("Failed to read first worksheet of {}", path.display()))?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|row| row.iter().map(cell_text).collect())
        .unwrap_or_default();
    let rows = rows
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    Ok((headers, rows))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}
