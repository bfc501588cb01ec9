//! Tabular sources
//!
//! Dataset sources read delimited files from a local folder; import sources
//! download one delimited file from a URL. Both surface records through
//! [`RecordSource`] in the same shapes API sources use: objects when the
//! file has a header row, positional arrays when it does not.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};

use tributary_core::SourceDescriptor;

use crate::auth::AuthResolver;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpRequest};
use crate::limiter::RateLimiter;
use crate::source::RecordSource;

const STRUCTURE_FILE: &str = "structure.json";

/// Parse delimited bytes into raw records.
///
/// With a header row, each record becomes an object keyed by header; empty
/// fields become null so they never overwrite known values downstream.
/// Without one, each record is an array addressed by position.
pub fn parse_delimited(bytes: &[u8], delimiter: u8, has_header: bool) -> Result<Vec<Value>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_header)
        .flexible(true)
        .from_reader(bytes);

    let mut records = Vec::new();
    if has_header {
        let headers = reader.headers()?.clone();
        for record in reader.records() {
            let record = record?;
            let mut object = Map::new();
            for (header, field) in headers.iter().zip(record.iter()) {
                let value = if field.is_empty() {
                    Value::Null
                } else {
                    Value::String(field.to_string())
                };
                object.insert(header.to_string(), value);
            }
            records.push(Value::Object(object));
        }
    } else {
        for record in reader.records() {
            let record = record?;
            records.push(Value::Array(
                record
                    .iter()
                    .map(|field| {
                        if field.is_empty() {
                            Value::Null
                        } else {
                            Value::String(field.to_string())
                        }
                    })
                    .collect(),
            ));
        }
    }
    Ok(records)
}

fn delimiter_for(descriptor: &SourceDescriptor, file_name: &str) -> u8 {
    match descriptor.delimiter {
        Some(c) => c as u8,
        None if file_name.ends_with(".tsv") => b'\t',
        None => b',',
    }
}

/// Reads delimited files out of a dataset folder
pub struct DatasetSource {
    descriptor: SourceDescriptor,
    files: VecDeque<PathBuf>,
    buffer: VecDeque<Value>,
}

impl DatasetSource {
    /// Source over the descriptor's data folder.
    ///
    /// File selection: explicit `file_names` win; otherwise `file_patterns`
    /// filter the folder; otherwise every file except the descriptor itself
    /// is data. Files are read in name order.
    pub fn new(descriptor: SourceDescriptor) -> Result<Self> {
        let folder = descriptor.folder.clone().ok_or_else(|| {
            Error::Core(tributary_core::Error::InvalidDescriptor {
                name: descriptor.name.clone(),
                message: "dataset source has no data folder".to_string(),
            })
        })?;

        let files = if !descriptor.file_names.is_empty() {
            let mut files = Vec::new();
            for name in &descriptor.file_names {
                let path = folder.join(name);
                if !path.is_file() {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("data file '{}' not found in {}", name, folder.display()),
                    )));
                }
                files.push(path);
            }
            files
        } else {
            // Patterns were validated at descriptor load time.
            let patterns = descriptor
                .file_patterns
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect::<Vec<_>>();
            let mut files = Vec::new();
            for entry in std::fs::read_dir(&folder)? {
                let entry = entry?;
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == STRUCTURE_FILE {
                    continue;
                }
                if patterns.is_empty() || patterns.iter().any(|p| p.is_match(&name)) {
                    files.push(path);
                }
            }
            files
        };

        let mut files: VecDeque<PathBuf> = files.into();
        files.make_contiguous().sort();

        Ok(Self {
            descriptor,
            files,
            buffer: VecDeque::new(),
        })
    }

    fn load_next_file(&mut self) -> Result<bool> {
        let Some(path) = self.files.pop_front() else {
            return Ok(false);
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::debug!(source = %self.descriptor.name, file = %name, "reading data file");

        let bytes = std::fs::read(&path)?;
        let delimiter = delimiter_for(&self.descriptor, &name);
        let records = parse_delimited(&bytes, delimiter, self.descriptor.has_header)?;
        self.buffer.extend(records);
        Ok(true)
    }
}

#[async_trait]
impl RecordSource for DatasetSource {
    async fn next_record(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if !self.load_next_file()? {
                return Ok(None);
            }
        }
    }
}

/// Downloads and parses one delimited file from a URL
pub struct ImportSource {
    descriptor: SourceDescriptor,
    client: Arc<dyn HttpClient>,
    limiter: Arc<RateLimiter>,
    buffer: VecDeque<Value>,
    fetched: bool,
}

impl ImportSource {
    /// Source over the descriptor's download endpoint
    pub fn new(
        descriptor: SourceDescriptor,
        client: Arc<dyn HttpClient>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            descriptor,
            client,
            limiter,
            buffer: VecDeque::new(),
            fetched: false,
        }
    }

    async fn download(&mut self) -> Result<()> {
        let auth = AuthResolver::new(self.client.clone(), self.limiter.clone());
        let endpoint = self.descriptor.endpoint.as_ref().ok_or_else(|| {
            Error::Core(tributary_core::Error::InvalidDescriptor {
                name: self.descriptor.name.clone(),
                message: "import source has no endpoint".to_string(),
            })
        })?;
        let url = auth.resolve(endpoint).await?;

        let mut headers = Vec::with_capacity(self.descriptor.headers.len());
        for (name, value) in &self.descriptor.headers {
            headers.push((name.clone(), auth.resolve(value).await?));
        }

        self.limiter.acquire().await;
        let response = self
            .client
            .execute(&HttpRequest {
                method: self.descriptor.method.clone(),
                url: url.clone(),
                headers,
                query: Vec::new(),
                body: None,
            })
            .await?;
        if !response.ok() {
            return Err(Error::Status {
                status: response.status,
                url,
            });
        }

        let delimiter = delimiter_for(&self.descriptor, &url);
        let records = parse_delimited(&response.body, delimiter, self.descriptor.has_header)?;
        tracing::debug!(
            source = %self.descriptor.name,
            records = records.len(),
            "downloaded import file"
        );
        self.buffer.extend(records);
        Ok(())
    }
}

#[async_trait]
impl RecordSource for ImportSource {
    async fn next_record(&mut self) -> Result<Option<Value>> {
        if !self.fetched {
            self.fetched = true;
            self.download().await?;
        }
        Ok(self.buffer.pop_front())
    }
}
