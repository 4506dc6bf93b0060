//! Reads student whitelists and video catalogs from CSV or Excel files.
//!
//! The first row is the header; columns are located by keyword so the files
//! coming out of the school's spreadsheets work unmodified, whether the
//! headers are in English or Spanish.

use calamine::{open_workbook, DataType, Reader, Xlsx};
use log::debug;
use snafu::prelude::*;

use video_ranking::{VideoRecord, VoterRecord};

use super::{
    EmptyExcelSnafu, ImportHeaderSnafu, OpeningCsvSnafu, OpeningExcelSnafu, ParsingCsvSnafu,
    VidrankResult,
};

const GROUP_KEYWORDS: &[&str] = &["group", "grupo"];
const NAME_KEYWORDS: &[&str] = &["name", "nombre", "student", "alumno"];
const TITLE_KEYWORDS: &[&str] = &["title", "titulo", "título"];
const URL_KEYWORDS: &[&str] = &["url", "link", "enlace"];

/// First column whose header contains one of the keywords, skipping an
/// already-claimed column so that a header like "Nombre grupo" cannot claim
/// both roles.
fn find_column(header: &[String], keywords: &[&str], exclude: Option<usize>) -> Option<usize> {
    header
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != exclude)
        .find(|(_, cell)| {
            let lower = cell.trim().to_lowercase();
            keywords.iter().any(|kw| lower.contains(kw))
        })
        .map(|(i, _)| i)
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

pub fn read_students(path: &str) -> VidrankResult<Vec<VoterRecord>> {
    let rows = read_rows(path)?;
    let header = match rows.first() {
        Some(h) => h,
        None => return Ok(Vec::new()),
    };
    let group_col = find_column(header, GROUP_KEYWORDS, None);
    let name_col = find_column(header, NAME_KEYWORDS, group_col);
    let (group_col, name_col) = match (group_col, name_col) {
        (Some(g), Some(n)) => (g, n),
        _ => {
            return ImportHeaderSnafu {
                path,
                expected: "group and student name",
            }
            .fail()
        }
    };
    let mut records = Vec::new();
    for row in rows.iter().skip(1) {
        let group = cell(row, group_col);
        let name = cell(row, name_col);
        if group.is_empty() && name.is_empty() {
            continue;
        }
        records.push(VoterRecord::new(group, name));
    }
    debug!("{}: {} student rows", path, records.len());
    Ok(records)
}

pub fn read_videos(path: &str) -> VidrankResult<Vec<VideoRecord>> {
    let rows = read_rows(path)?;
    let header = match rows.first() {
        Some(h) => h,
        None => return Ok(Vec::new()),
    };
    let group_col = find_column(header, GROUP_KEYWORDS, None);
    let title_col = find_column(header, TITLE_KEYWORDS, group_col);
    let url_col = find_column(header, URL_KEYWORDS, None);
    let (group_col, title_col, url_col) = match (group_col, title_col, url_col) {
        (Some(g), Some(t), Some(u)) => (g, t, u),
        _ => {
            return ImportHeaderSnafu {
                path,
                expected: "group, title and url",
            }
            .fail()
        }
    };
    let mut records = Vec::new();
    for row in rows.iter().skip(1) {
        let group = cell(row, group_col);
        let title = cell(row, title_col);
        let url = cell(row, url_col);
        if group.is_empty() && title.is_empty() && url.is_empty() {
            continue;
        }
        records.push(VideoRecord::new(group, title, url));
    }
    debug!("{}: {} video rows", path, records.len());
    Ok(records)
}

fn read_rows(path: &str) -> VidrankResult<Vec<Vec<String>>> {
    if path.to_lowercase().ends_with(".xlsx") {
        read_rows_excel(path)
    } else {
        read_rows_csv(path)
    }
}

fn read_rows_csv(path: &str) -> VidrankResult<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(OpeningCsvSnafu { path })?;
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.context(ParsingCsvSnafu { path })?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(rows)
}

fn read_rows_excel(path: &str) -> VidrankResult<Vec<Vec<String>>> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let range = workbook
        .worksheet_range_at(0)
        .context(EmptyExcelSnafu { path })?
        .context(OpeningExcelSnafu { path })?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.clone(),
        DataType::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        DataType::Float(f) => f.to_string(),
        DataType::Int(i) => i.to_string(),
        DataType::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}
