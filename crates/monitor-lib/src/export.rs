//! CSV export of latency history

use std::borrow::Cow;

use chrono::{DateTime, SecondsFormat};

use crate::error::EngineError;
use crate::models::Probed;
use crate::status::TargetStatus;

pub const CSV_HEADER: &str = "Endpoint ID,Endpoint Name,Timestamp,Latency (ms)";

/// Byte order mark so spreadsheet tools detect UTF-8
const BOM: char = '\u{feff}';

/// Quote a field containing a comma, quote or newline
pub fn escape_csv_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// Render every history sample as one CSV row, in status order.
///
/// Fails with [`EngineError::NoHistory`] when no status holds a sample.
pub fn history_csv<'a, I>(statuses: I) -> Result<String, EngineError>
where
    I: IntoIterator<Item = &'a TargetStatus>,
{
    let mut rows = vec![CSV_HEADER.to_string()];
    for status in statuses {
        let id = escape_csv_field(status.target.id());
        let name = escape_csv_field(status.target.display_name());
        for sample in &status.history {
            rows.push(format!(
                "{},{},{},{}",
                id,
                name,
                format_timestamp(sample.timestamp_ms),
                sample.latency_ms
            ));
        }
    }

    if rows.len() == 1 {
        return Err(EngineError::NoHistory);
    }

    let mut csv = String::with_capacity(rows.iter().map(|r| r.len() + 1).sum::<usize>() + 3);
    csv.push(BOM);
    csv.push_str(&rows.join("\n"));
    Ok(csv)
}

/// Default file name for a history export made on `date`
pub fn history_file_name(date: chrono::NaiveDate) -> String {
    format!("pulsewatch-history-{}.csv", date.format("%Y-%m-%d"))
}
