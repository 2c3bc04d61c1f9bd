//! CSV export of retest records
//!
//! One row per zone. Optional values (signal price, retest date) are written as
//! empty cells; timestamps are RFC 3339 in the candle's own offset.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::analysis::Analysis;
use crate::retest::RetestResult;
use crate::{Result, ZoneError};

pub const CSV_HEADER: [&str; 13] = [
    "security_id",
    "pattern_type",
    "side",
    "date_base",
    "zone_low",
    "zone_high",
    "zone_height",
    "num_base_candles",
    "continuation_idx",
    "signal",
    "signal_price",
    "retest_date",
    "invalidated",
];

fn export_err(e: impl std::fmt::Display) -> ZoneError {
    ZoneError::Export(e.to_string())
}

fn record(security_id: &str, r: &RetestResult) -> [String; 13] {
    let z = &r.zone;
    [
        security_id.to_string(),
        z.pattern_type.code().to_string(),
        r.side().as_str().to_string(),
        z.anchor_date.to_rfc3339(),
        z.zone_low.to_string(),
        z.zone_high.to_string(),
        z.zone_height().to_string(),
        z.base_count.to_string(),
        z.continuation_index.to_string(),
        r.signal.to_string(),
        r.signal_price.map_or(String::new(), |p| p.to_string()),
        r.signal_date.map_or(String::new(), |d| d.to_rfc3339()),
        r.invalidated.to_string(),
    ]
}

fn write_rows<'a, W, I>(writer: W, rows: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = (&'a str, &'a RetestResult)>,
{
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER).map_err(export_err)?;

    let mut count = 0;
    for (security_id, result) in rows {
        csv.write_record(record(security_id, result))
            .map_err(export_err)?;
        count += 1;
    }

    csv.flush().map_err(export_err)?;
    Ok(count)
}

/// Write one security's results. Returns the number of data rows.
pub fn write_results<W: Write>(
    writer: W,
    security_id: &str,
    results: &[RetestResult],
) -> Result<usize> {
    write_rows(writer, results.iter().map(|r| (security_id, r)))
}

/// Write the results of many analyses into one table.
pub fn write_analyses<W: Write>(writer: W, analyses: &[Analysis]) -> Result<usize> {
    write_rows(
        writer,
        analyses
            .iter()
            .flat_map(|a| a.results.iter().map(move |r| (a.security_id.as_str(), r))),
    )
}

/// Write the aggregated results of `analyses` to a CSV file at `path`.
pub fn export_csv_file(path: impl AsRef<Path>, analyses: &[Analysis]) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(export_err)?;
    }
    let file = File::create(path).map_err(export_err)?;
    let rows = write_analyses(file, analyses)?;
    info!(path = %path.display(), rows, "exported zone records");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalyzerBuilder;
    use crate::Candle;
    use chrono::FixedOffset;

    fn analysis(security_id: &str) -> Analysis {
        let ist = FixedOffset::east_opt(19_800).unwrap();
        let candles: Vec<Candle> = [
            (100.0, 100.0, 100.0, 100.0),
            (100.0, 111.0, 99.0, 110.0),
            (109.0, 110.0, 107.0, 108.0),
            (108.0, 119.0, 107.0, 118.0),
            (112.0, 114.0, 108.0, 113.0),
        ]
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| {
            Candle::from_unix_seconds(1_704_067_200 + i as i64 * 86_400, ist, o, h, l, c).unwrap()
        })
        .collect();

        let results = AnalyzerBuilder::new().build().unwrap().run(&candles).unwrap();
        Analysis {
            security_id: security_id.to_string(),
            candles,
            results,
        }
    }

    #[test]
    fn test_write_results() {
        let a = analysis("21238");
        let mut buf = Vec::new();
        let rows = write_results(&mut buf, &a.security_id, &a.results).unwrap();
        assert_eq!(rows, 1);

        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "21238,RBR,BUY,2024-01-03T05:30:00+05:30,107,109,2,1,3,true,108,2024-01-05T05:30:00+05:30,false"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_write_analyses_tags_each_row() {
        let analyses = vec![analysis("A"), analysis("B")];
        let mut buf = Vec::new();
        assert_eq!(write_analyses(&mut buf, &analyses).unwrap(), 2);

        let text = String::from_utf8(buf).unwrap();
        let ids: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn test_empty_results_write_header_only() {
        let mut buf = Vec::new();
        assert_eq!(write_results(&mut buf, "X", &[]).unwrap(), 0);
        assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_export_csv_file() {
        let dir = std::env::temp_dir().join(format!("sdzones-export-{}", std::process::id()));
        let path = dir.join("zones.csv");

        let rows = export_csv_file(&path, &[analysis("21238")]).unwrap();
        assert_eq!(rows, 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("security_id,pattern_type"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
