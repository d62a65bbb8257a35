// Record readers
//
// *Les Enregistrements* (The Records) - Streaming JSONL/TSV/Parquet readers for corpora and topics

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// A corpus document or a query
///
/// Queries share the document shape: `id` identifies the query, `contents`
/// carries its text and `vector` its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier, unique within a table
    pub id: String,

    /// Raw or tokenized text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,

    /// Dense embedding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f64>>,
}

impl Document {
    /// Create a document with text only
    pub fn text(id: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            contents: Some(contents.into()),
            vector: None,
        }
    }

    /// Create a document with an embedding only
    pub fn embedding(id: impl Into<String>, vector: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            contents: None,
            vector: Some(vector),
        }
    }
}

/// Queries are documents read from a topics file
pub type Query = Document;

/// Errors raised while reading input records
#[derive(Debug, Error)]
pub enum RecordError {
    /// Underlying read failure
    #[error("I/O error reading {path:?}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Source error
        #[source]
        source: io::Error,
    },

    /// A JSONL line that does not parse
    #[error("{path:?}:{line}: malformed JSON record: {source}")]
    Json {
        /// File being read
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// Source error
        #[source]
        source: serde_json::Error,
    },

    /// A record without a usable identifier
    #[error("{path:?}:{line}: record has no id")]
    MissingId {
        /// File being read
        path: PathBuf,
        /// 1-based line number
        line: usize,
    },

    /// A TSV line without a tab separator
    #[error("{path:?}:{line}: expected `id<TAB>contents`")]
    MalformedTsv {
        /// File being read
        path: PathBuf,
        /// 1-based line number
        line: usize,
    },

    /// A line that is not valid UTF-8
    #[error("{path:?}:{line}: line is not valid UTF-8")]
    InvalidUtf8 {
        /// File being read
        path: PathBuf,
        /// 1-based line number
        line: usize,
    },

    /// A vector cell that does not hold numbers
    #[error("{path:?}:{line}: vector is not a list of numbers")]
    MalformedVector {
        /// File being read
        path: PathBuf,
        /// 1-based row number
        line: usize,
    },

    /// A Parquet file DuckDB could not open or scan
    #[cfg(feature = "duckdb")]
    #[error("{path:?}: cannot read Parquet: {source}")]
    Parquet {
        /// File being read
        path: PathBuf,
        /// Source error
        #[source]
        source: duckdb::Error,
    },

    /// A file whose name names no known format
    #[error("{path:?}: unsupported input format (expected .jsonl or .tsv, optionally gzipped, or .parquet)")]
    UnsupportedFormat {
        /// Offending file
        path: PathBuf,
    },
}

impl RecordError {
    /// Errors that make the rest of the stream unreadable
    ///
    /// Everything else concerns a single record, which can be skipped.
    pub fn is_fatal(&self) -> bool {
        match self {
            RecordError::Io { .. } => true,
            #[cfg(feature = "duckdb")]
            RecordError::Parquet { .. } => true,
            _ => false,
        }
    }
}

/// Line format of an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// One JSON object per line
    JsonLines,
    /// `id<TAB>contents`
    Tsv,
    /// Columnar file, read through DuckDB
    Parquet,
}

impl RecordFormat {
    /// Detect the format from the file name (`.gz` suffix allowed)
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.contains(".jsonl") || name.ends_with(".json") || name.ends_with(".json.gz") {
            Some(RecordFormat::JsonLines)
        } else if name.contains(".tsv") {
            Some(RecordFormat::Tsv)
        } else if name.ends_with(".parquet") {
            Some(RecordFormat::Parquet)
        } else {
            None
        }
    }

    /// Whether this build can read the format
    pub fn is_readable(self) -> bool {
        match self {
            RecordFormat::Parquet => cfg!(feature = "duckdb"),
            _ => true,
        }
    }
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    qid: Option<Value>,
    #[serde(default, rename = "_id")]
    underscore_id: Option<Value>,
    #[serde(default)]
    contents: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default, alias = "embedding")]
    vector: Option<Vec<f64>>,
}

fn id_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse one JSONL line into a document
pub fn parse_json_record(line: &str) -> Result<Option<Document>, serde_json::Error> {
    let raw: RawRecord = serde_json::from_str(line)?;

    let id = match raw.id.or(raw.qid).or(raw.underscore_id).and_then(id_to_string) {
        Some(id) => id,
        None => return Ok(None),
    };

    let contents = match (raw.contents, raw.title, raw.text) {
        (Some(contents), _, _) => Some(contents),
        (None, Some(title), Some(text)) => Some(format!("{} {}", title, text)),
        (None, None, Some(text)) => Some(text),
        (None, Some(title), None) => Some(title),
        (None, None, None) => None,
    };

    Ok(Some(Document {
        id,
        contents,
        vector: raw.vector,
    }))
}

/// Parse one TSV line into a document
///
/// Columns after the id are joined with a single space.
pub fn parse_tsv_record(line: &str) -> Option<Document> {
    let mut parts = line.split('\t');
    let id = parts.next()?.trim();
    let rest: Vec<&str> = parts.collect();
    if id.is_empty() || rest.is_empty() {
        return None;
    }
    Some(Document::text(id, rest.join(" ")))
}

/// Streaming reader over one input file
pub struct RecordReader {
    path: PathBuf,
    format: RecordFormat,
    lines: Lines<Box<dyn BufRead>>,
    line_no: usize,
}

impl RecordReader {
    /// Open a line-oriented file, decompressing `.gz` transparently
    ///
    /// Parquet files are not line-oriented; open them with [`open_records`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref().to_path_buf();
        let format = RecordFormat::detect(&path)
            .filter(|format| *format != RecordFormat::Parquet)
            .ok_or_else(|| RecordError::UnsupportedFormat { path: path.clone() })?;

        let file = File::open(&path).map_err(|source| RecordError::Io {
            path: path.clone(),
            source,
        })?;

        let gzipped = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);
        let inner: Box<dyn Read> = if gzipped {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let reader: Box<dyn BufRead> = Box::new(BufReader::new(inner));

        Ok(Self {
            path,
            format,
            lines: reader.lines(),
            line_no: 0,
        })
    }

    /// File being read
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detected format
    pub fn format(&self) -> RecordFormat {
        self.format
    }
}

impl Iterator for RecordReader {
    type Item = Result<Document, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(source) => {
                    self.line_no += 1;
                    // Invalid UTF-8 surfaces as InvalidData and only spoils one line
                    if source.kind() == io::ErrorKind::InvalidData {
                        return Some(Err(RecordError::InvalidUtf8 {
                            path: self.path.clone(),
                            line: self.line_no,
                        }));
                    }
                    return Some(Err(RecordError::Io {
                        path: self.path.clone(),
                        source,
                    }));
                }
            };
            self.line_no += 1;

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.trim().is_empty() {
                continue;
            }

            let record = match self.format {
                RecordFormat::Parquet => Err(RecordError::UnsupportedFormat {
                    path: self.path.clone(),
                }),
                RecordFormat::JsonLines => match parse_json_record(trimmed) {
                    Ok(Some(doc)) => Ok(doc),
                    Ok(None) => Err(RecordError::MissingId {
                        path: self.path.clone(),
                        line: self.line_no,
                    }),
                    Err(source) => Err(RecordError::Json {
                        path: self.path.clone(),
                        line: self.line_no,
                        source,
                    }),
                },
                RecordFormat::Tsv => parse_tsv_record(trimmed).ok_or(RecordError::MalformedTsv {
                    path: self.path.clone(),
                    line: self.line_no,
                }),
            };
            return Some(record);
        }
    }
}

/// Expand an input path into the files it names
///
/// A directory yields its regular files (not recursing) in name order.
pub fn input_files(path: impl AsRef<Path>) -> Result<Vec<PathBuf>, RecordError> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| RecordError::Io {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Boxed stream of records from one file
pub type Records = Box<dyn Iterator<Item = Result<Document, RecordError>>>;

/// Open one file with the reader its format calls for
///
/// Failure to open becomes the stream's only item.
pub fn open_records(file: &Path) -> Records {
    let opened: Result<Records, RecordError> = match RecordFormat::detect(file) {
        #[cfg(feature = "duckdb")]
        Some(RecordFormat::Parquet) => {
            crate::parquet::ParquetReader::open(file).map(|reader| Box::new(reader) as Records)
        }
        _ => RecordReader::open(file).map(|reader| Box::new(reader) as Records),
    };
    opened.unwrap_or_else(|e| Box::new(std::iter::once(Err(e))))
}

/// Stream every record of a file or directory
///
/// A file of unknown format yields a single [`RecordError::UnsupportedFormat`]
/// and the stream moves on to the next file.
pub fn read_records(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Document, RecordError>>, RecordError> {
    let path = path.as_ref();
    let files = input_files(path)?;

    // A single explicitly named file must be readable up front
    if !path.is_dir() {
        RecordFormat::detect(path)
            .filter(|format| format.is_readable())
            .ok_or_else(|| RecordError::UnsupportedFormat {
                path: path.to_path_buf(),
            })?;
    }

    Ok(files.into_iter().flat_map(|file| open_records(&file)))
}
