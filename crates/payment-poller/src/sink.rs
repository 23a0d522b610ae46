//! CSV output for extracted payments.
//!
//! Rows are only ever appended. A new (or empty) file gets the header for the
//! configured format first; an existing file must already carry that header.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use payment_types::Payment;
use rust_decimal::Decimal;

use crate::error::{PollerError, PollerResult};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column layout of the CSV file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFormat {
    /// `Name, Amount IN, Amount OUT, Date, Note`
    Split,
    /// `Name, Amount, Date, Note` with a signed amount
    Signed,
}

impl SinkFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "split" => Some(SinkFormat::Split),
            "signed" => Some(SinkFormat::Signed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SinkFormat::Split => "split",
            SinkFormat::Signed => "signed",
        }
    }

    pub fn header(&self) -> &'static [&'static str] {
        match self {
            SinkFormat::Split => &["Name", "Amount IN", "Amount OUT", "Date", "Note"],
            SinkFormat::Signed => &["Name", "Amount", "Date", "Note"],
        }
    }

    pub fn row(&self, payment: &Payment) -> Vec<String> {
        let date = payment
            .date
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_default();

        match self {
            SinkFormat::Split => vec![
                payment.name.clone(),
                payment.amount_in().map(money).unwrap_or_default(),
                payment.amount_out().map(money).unwrap_or_default(),
                date,
                payment.memo.clone(),
            ],
            SinkFormat::Signed => vec![
                payment.name.clone(),
                money(payment.amount),
                date,
                payment.memo.clone(),
            ],
        }
    }
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

/// Destination for payment rows
pub trait PaymentSink {
    /// Durably append one row. On error nothing may be assumed written.
    fn append(&mut self, payment: &Payment) -> PollerResult<()>;
}

#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    format: SinkFormat,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>, format: SinkFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SinkFormat {
        self.format
    }

    fn io_err(&self, err: std::io::Error) -> PollerError {
        PollerError::sink_io(&self.path, err)
    }

    fn csv_err(&self, err: csv::Error) -> PollerError {
        PollerError::Sink {
            path: self.path.clone(),
            source: err,
        }
    }

    /// Open for appending and report whether the header still has to be written
    fn open(&self) -> PollerResult<(File, bool)> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;

        let len = file.metadata().map_err(|e| self.io_err(e))?.len();
        if len == 0 {
            return Ok((file, true));
        }

        self.check_header(&mut file)?;

        // Keep a hand-edited file without a trailing newline from swallowing our row
        file.seek(SeekFrom::End(-1)).map_err(|e| self.io_err(e))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).map_err(|e| self.io_err(e))?;
        if last[0] != b'\n' {
            use std::io::Write;
            file.write_all(b"\n").map_err(|e| self.io_err(e))?;
        }

        Ok((file, false))
    }

    fn check_header(&self, file: &mut File) -> PollerResult<()> {
        file.seek(SeekFrom::Start(0)).map_err(|e| self.io_err(e))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(&mut *file);
        let mut record = csv::StringRecord::new();
        reader.read_record(&mut record).map_err(|e| self.csv_err(e))?;

        let found: Vec<String> = record
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let field = if i == 0 {
                    field.trim_start_matches('\u{feff}')
                } else {
                    field
                };
                field.trim().to_string()
            })
            .collect();
        let expected = self.format.header();

        if found.iter().map(String::as_str).ne(expected.iter().copied()) {
            return Err(PollerError::SinkSchema {
                path: self.path.clone(),
                expected: expected.iter().map(|s| s.to_string()).collect(),
                found,
            });
        }

        Ok(())
    }
}

impl PaymentSink for CsvSink {
    fn append(&mut self, payment: &Payment) -> PollerResult<()> {
        let (file, needs_header) = self.open()?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer
                .write_record(self.format.header())
                .map_err(|e| self.csv_err(e))?;
            tracing::info!("Created {} with {} header", self.path.display(), self.format.as_str());
        }

        writer
            .write_record(self.format.row(payment))
            .map_err(|e| self.csv_err(e))?;
        writer.flush().map_err(|e| self.io_err(e))?;

        let file = writer
            .into_inner()
            .map_err(|e| self.io_err(e.into_error()))?;
        file.sync_data().map_err(|e| self.io_err(e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::str::FromStr;

    fn payment(name: &str, amount: &str, memo: &str) -> Payment {
        Payment {
            name: name.to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            date: Some(DateTime::parse_from_rfc3339("2025-07-01T10:52:37-07:00").unwrap()),
            memo: memo.to_string(),
        }
    }

    #[test]
    fn test_new_file_gets_header_and_split_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("payments.csv");
        let mut sink = CsvSink::new(&path, SinkFormat::Split);

        sink.append(&payment("Alice", "20.00", "for lunch")).unwrap();
        sink.append(&payment("Bob", "-15.5", "")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Name,Amount IN,Amount OUT,Date,Note\n\
             Alice,20.00,,2025-07-01 10:52:37,for lunch\n\
             Bob,,15.50,2025-07-01 10:52:37,\n"
        );
    }

    #[test]
    fn test_signed_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payments.csv");
        let mut sink = CsvSink::new(&path, SinkFormat::Signed);
        assert_eq!(sink.path(), path.as_path());
        assert_eq!(sink.format(), SinkFormat::Signed);

        let mut p = payment("Bob", "-15.50", "tickets, row 3");
        p.date = None;
        sink.append(&p).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Name,Amount,Date,Note\nBob,-15.50,,\"tickets, row 3\"\n"
        );
    }

    #[test]
    fn test_existing_rows_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payments.csv");
        fs::write(
            &path,
            "Name,Amount IN,Amount OUT,Date,Note\nZed,1.00,,2024-01-01 00:00:00,old",
        )
        .unwrap();

        let mut sink = CsvSink::new(&path, SinkFormat::Split);
        sink.append(&payment("Alice", "2.00", "")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Name,Amount IN,Amount OUT,Date,Note\n\
             Zed,1.00,,2024-01-01 00:00:00,old\n\
             Alice,2.00,,2025-07-01 10:52:37,\n"
        );
    }

    #[test]
    fn test_empty_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payments.csv");
        fs::write(&path, "").unwrap();

        let mut sink = CsvSink::new(&path, SinkFormat::Signed);
        sink.append(&payment("Alice", "2.00", "")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Name,Amount,Date,Note\n"));
    }

    #[test]
    fn test_header_mismatch_is_rejected_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payments.csv");
        let original = "Name,Amount,Date,Note\nZed,1.00,,\n";
        fs::write(&path, original).unwrap();

        let mut sink = CsvSink::new(&path, SinkFormat::Split);
        let err = sink.append(&payment("Alice", "2.00", "")).unwrap_err();

        assert!(matches!(err, PollerError::SinkSchema { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_unwritable_path_is_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as the CSV file
        let mut sink = CsvSink::new(dir.path(), SinkFormat::Split);
        let err = sink.append(&payment("Alice", "2.00", "")).unwrap_err();
        assert!(matches!(err, PollerError::Sink { .. }));
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(SinkFormat::parse(" SPLIT "), Some(SinkFormat::Split));
        assert_eq!(SinkFormat::parse("signed"), Some(SinkFormat::Signed));
        assert_eq!(SinkFormat::parse("xlsx"), None);
    }
}
