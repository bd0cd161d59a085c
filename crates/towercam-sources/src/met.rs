//! Met Office observation page extraction.
//!
//! The page carries an `obsTable` block whose table lists hourly readings.
//! The second-to-last row holds the newest reading (temperature in column 3,
//! wind speed in column 6) and the last row holds a single
//! `Last updated: HHMM on Ddd dd Mmm YYYY` cell.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::types::{ParseError, ParseErrorKind};

const TABLE_ID: &str = "obsTable";
const TEMPERATURE_COLUMN: usize = 2;
const WIND_COLUMN: usize = 5;
const STAMP_COLUMN: usize = 0;
const STAMP_FORMAT: &str = "Last updated: %H%M on %a %d %b %Y";

/// Fields pulled from one observation page
#[derive(Debug, Clone, PartialEq)]
pub struct MetObservation {
    pub temperature: f64,
    pub wind_speed: i64,
    pub observed_at: DateTime<Utc>,
}

/// Extract the newest reading from the observation page.
///
/// `tz` is the zone the page writes its "last updated" time in.
pub fn parse_observation(html: &str, tz: Tz) -> Result<MetObservation, ParseError> {
    let rows = observation_rows(html)
        .ok_or_else(|| ParseError::new("table", ParseErrorKind::TableNotFound))?;

    if rows.len() < 2 {
        return Err(ParseError::new("table", ParseErrorKind::TooFewRows(2)));
    }
    let reading = &rows[rows.len() - 2];
    let stamp = &rows[rows.len() - 1];

    let temperature = parse_temperature(cell(reading, TEMPERATURE_COLUMN, "temperature")?)?;
    let wind_speed = parse_wind_speed(cell(reading, WIND_COLUMN, "wind_speed")?)?;
    let observed_at = parse_stamp(cell(stamp, STAMP_COLUMN, "observed_at")?, tz)?;

    Ok(MetObservation {
        temperature,
        wind_speed,
        observed_at,
    })
}

fn cell<'a>(row: &'a [String], column: usize, field: &'static str) -> Result<&'a str, ParseError> {
    row.get(column)
        .map(String::as_str)
        .ok_or_else(|| ParseError::new(field, ParseErrorKind::MissingCell(column)))
}

fn parse_temperature(text: &str) -> Result<f64, ParseError> {
    let normalized = text.replace('\u{2212}', "-");
    let numeric: String = normalized
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'))
        .collect();

    numeric
        .parse::<f64>()
        .map_err(|_| ParseError::new("temperature", ParseErrorKind::NotANumber(text.to_string())))
}

fn parse_wind_speed(text: &str) -> Result<i64, ParseError> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("calm") {
        return Ok(0);
    }

    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    digits
        .parse::<i64>()
        .map_err(|_| ParseError::new("wind_speed", ParseErrorKind::NotANumber(text.to_string())))
}

fn parse_stamp(text: &str, tz: Tz) -> Result<DateTime<Utc>, ParseError> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), STAMP_FORMAT).map_err(|_| {
        ParseError::new("observed_at", ParseErrorKind::BadTimestamp(text.to_string()))
    })?;

    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            ParseError::new(
                "observed_at",
                ParseErrorKind::NonexistentLocalTime(text.to_string()),
            )
        })
}

/// Rows of the table directly under the `obsTable` element, as cleaned cell text.
fn observation_rows(html: &str) -> Option<Vec<Vec<String>>> {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let id_lower = TABLE_ID.to_ascii_lowercase();

    let anchor = [format!("id=\"{id_lower}\""), format!("id='{id_lower}'")]
        .iter()
        .filter_map(|needle| lower.find(needle.as_str()))
        .min()?;

    let table_start = find_tag(&lower, anchor, "table")?;
    let table_end = lower[table_start..]
        .find("</table>")
        .map(|i| table_start + i)
        .unwrap_or(lower.len());

    let mut rows = Vec::new();
    let mut pos = table_start + 1;
    while let Some(row_start) = find_tag(&lower[..table_end], pos, "tr") {
        let row_end = lower[row_start..table_end]
            .find("</tr>")
            .map(|i| row_start + i)
            .or_else(|| find_tag(&lower[..table_end], row_start + 1, "tr"))
            .unwrap_or(table_end);

        rows.push(row_cells(html, &lower, row_start, row_end));
        pos = row_end;
    }

    Some(rows)
}

fn row_cells(html: &str, lower: &str, start: usize, end: usize) -> Vec<String> {
    let mut cells = Vec::new();
    let mut pos = start;
    while let Some(cell_start) = find_tag(&lower[..end], pos, "td") {
        let Some(open_end) = lower[cell_start..end].find('>').map(|i| cell_start + i + 1) else {
            break;
        };
        let close = lower[open_end..end]
            .find("</td>")
            .map(|i| open_end + i)
            .or_else(|| find_tag(&lower[..end], open_end, "td"))
            .unwrap_or(end);

        cells.push(clean_text(&html[open_end..close]));
        pos = close;
    }
    cells
}

/// Find `<name` as a whole tag name at or after `from`.
fn find_tag(haystack: &str, from: usize, name: &str) -> Option<usize> {
    let needle = format!("<{name}");
    let mut pos = from;
    while pos < haystack.len() {
        let found = pos + haystack[pos..].find(needle.as_str())?;
        let after = haystack.as_bytes().get(found + needle.len()).copied();
        match after {
            Some(b'>') | Some(b'/') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') => {
                return Some(found)
            }
            _ => pos = found + needle.len(),
        }
    }
    None
}

fn clean_text(fragment: &str) -> String {
    let mut text = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&deg;", "\u{b0}")
        .replace("&#176;", "\u{b0}")
        .replace("&minus;", "-")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
