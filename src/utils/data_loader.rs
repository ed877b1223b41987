//! Data loading utilities

use crate::error::{Result, XaiError};
use polars::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Data loader for CSV, Parquet and JSON tables
#[derive(Debug, Clone, Default)]
pub struct DataLoader {
    /// Rows used to infer CSV column types
    infer_schema_length: Option<usize>,
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: Some(100),
        }
    }

    pub fn with_infer_schema_length(mut self, rows: Option<usize>) -> Self {
        self.infer_schema_length = rows;
        self
    }

    fn open(path: &Path) -> Result<File> {
        File::open(path).map_err(|e| XaiError::DataError(format!("{}: {}", path.display(), e)))
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        self.load_csv_with_separator(path, b',')
    }

    pub fn load_csv_with_separator(&self, path: impl AsRef<Path>, separator: u8) -> Result<DataFrame> {
        let file = Self::open(path.as_ref())?;
        let parse_opts = CsvParseOptions::default().with_separator(separator);

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| XaiError::DataError(e.to_string()))
    }

    /// Load a Parquet file
    pub fn load_parquet(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let file = Self::open(path.as_ref())?;
        ParquetReader::new(file)
            .finish()
            .map_err(|e| XaiError::DataError(e.to_string()))
    }

    /// Load a JSON file (line-delimited)
    pub fn load_json(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let file = Self::open(path.as_ref())?;
        JsonReader::new(file)
            .with_json_format(JsonFormat::JsonLines)
            .finish()
            .map_err(|e| XaiError::DataError(e.to_string()))
    }

    /// Detect file format from extension and load
    pub fn load_auto(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "tsv" => self.load_csv_with_separator(path, b'\t'),
            "parquet" | "pq" => self.load_parquet(path),
            "json" | "jsonl" | "ndjson" => self.load_json(path),
            // CSV is the fallback
            _ => self.load_csv(path),
        }
    }

    /// Size and, for CSV files, header and row count without parsing the table
    pub fn get_file_info(&self, path: impl AsRef<Path>) -> Result<FileInfo> {
        let path = path.as_ref();
        let file_size = std::fs::metadata(path)?.len();

        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

        let (n_rows, columns) = if is_csv {
            let mut lines = BufReader::new(Self::open(path)?).lines();
            let header = lines.next().transpose()?.unwrap_or_default();
            let columns: Vec<String> = header.split(',').map(|s| s.trim().to_string()).collect();
            (Some(lines.count()), Some(columns))
        } else {
            (None, None)
        };

        Ok(FileInfo {
            path: path.display().to_string(),
            file_size,
            n_rows,
            columns,
        })
    }
}

/// File information
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: String,
    pub file_size: u64,
    pub n_rows: Option<usize>,
    pub columns: Option<Vec<String>>,
}

/// Save DataFrame to various formats
pub struct DataSaver;

impl DataSaver {
    fn create(path: &Path) -> Result<File> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        File::create(path).map_err(|e| XaiError::DataError(format!("{}: {}", path.display(), e)))
    }

    /// Save to CSV
    pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let mut file = Self::create(path.as_ref())?;
        CsvWriter::new(&mut file)
            .finish(df)
            .map_err(|e| XaiError::DataError(e.to_string()))
    }

    /// Save to Parquet
    pub fn save_parquet(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let file = Self::create(path.as_ref())?;
        ParquetWriter::new(file)
            .finish(df)
            .map_err(|e| XaiError::DataError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "a,b,c").unwrap();
        writeln!(file, "1,2,3").unwrap();
        writeln!(file, "4,5,6").unwrap();
        writeln!(file, "7,8,9").unwrap();
        file
    }

    #[test]
    fn test_load_csv() {
        let file = create_test_csv();
        let df = DataLoader::new().load_auto(file.path()).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 3);
    }

    #[test]
    fn test_get_file_info() {
        let file = create_test_csv();
        let info = DataLoader::new().get_file_info(file.path()).unwrap();
        assert_eq!(info.n_rows, Some(3));
        assert_eq!(info.columns.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            DataLoader::new().load_csv("/nonexistent/table.csv"),
            Err(XaiError::DataError(_))
        ));
    }

    #[test]
    fn test_parquet_round_trip() {
        let mut df = DataFrame::new(vec![
            Column::new("a".into(), &[1.0, 2.0, 3.0]),
            Column::new("b".into(), &[4i64, 5, 6]),
        ])
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.parquet");
        DataSaver::save_parquet(&mut df, &path).unwrap();

        let loaded = DataLoader::new().load_auto(&path).unwrap();
        assert!(loaded.equals(&df));
    }

    #[test]
    fn test_save_csv() {
        let mut df = DataFrame::new(vec![
            Column::new("a".into(), &[1, 2, 3]),
            Column::new("b".into(), &[4, 5, 6]),
        ])
        .unwrap();

        let file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        DataSaver::save_csv(&mut df, file.path()).unwrap();

        let loaded = DataLoader::new().load_csv(file.path()).unwrap();
        assert_eq!(loaded.height(), 3);
        assert_eq!(loaded.width(), 2);
    }
}
