//! Job sources.
//!
//! [`CsvJobSource`] reads one job per row. Columns:
//! - `Title` (required)
//! - `Body (HTML)`: description, passed through as-is
//! - `Tags`: comma-separated
//! - any column whose name starts with `image` (case-insensitive): one
//!   slideshow frame each, ordered by column name

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use url::Url;
use vpub_models::{Job, JobId, Privacy};

use crate::config::BatchConfig;
use crate::error::{WorkerError, WorkerResult};

const TITLE_COLUMN: &str = "Title";
const BODY_COLUMN: &str = "Body (HTML)";
const TAGS_COLUMN: &str = "Tags";
const IMAGE_PREFIX: &str = "image";

/// Produces the ordered jobs of a batch.
pub trait JobSource {
    fn load_jobs(&self) -> WorkerResult<Vec<Job>>;
}

/// Values applied to every job read from a table.
#[derive(Debug, Clone)]
pub struct JobDefaults {
    pub category: String,
    pub privacy: Privacy,
}

impl From<&BatchConfig> for JobDefaults {
    fn from(config: &BatchConfig) -> Self {
        Self {
            category: config.category.clone(),
            privacy: config.privacy,
        }
    }
}

/// [`JobSource`] over a CSV file with a header row.
#[derive(Debug, Clone)]
pub struct CsvJobSource {
    path: PathBuf,
    defaults: JobDefaults,
}

impl CsvJobSource {
    pub fn from_path(path: impl Into<PathBuf>, defaults: JobDefaults) -> Self {
        Self {
            path: path.into(),
            defaults,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JobSource for CsvJobSource {
    fn load_jobs(&self) -> WorkerResult<Vec<Job>> {
        let file = std::fs::File::open(&self.path).map_err(|e| {
            WorkerError::input(format!("cannot open {}: {}", self.path.display(), e))
        })?;

        let jobs = parse_jobs(file, &self.defaults)?;
        info!(path = %self.path.display(), jobs = jobs.len(), "Loaded jobs");
        Ok(jobs)
    }
}

/// Column positions resolved from the header row.
#[derive(Debug)]
struct Columns {
    title: usize,
    body: Option<usize>,
    tags: Option<usize>,
    images: Vec<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> WorkerResult<Self> {
        let names: Vec<&str> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| if i == 0 { name.trim_start_matches('\u{feff}') } else { name })
            .collect();

        let find = |wanted: &str| names.iter().position(|name| name.trim() == wanted);

        let title = find(TITLE_COLUMN).ok_or_else(|| {
            WorkerError::input(format!("input has no {} column", TITLE_COLUMN))
        })?;

        let mut images: Vec<(String, &str, usize)> = names
            .iter()
            .enumerate()
            .filter(|(_, name)| name.to_lowercase().starts_with(IMAGE_PREFIX))
            .map(|(i, name)| (name.to_lowercase(), *name, i))
            .collect();
        images.sort();

        Ok(Self {
            title,
            body: find(BODY_COLUMN),
            tags: find(TAGS_COLUMN),
            images: images.into_iter().map(|(_, _, i)| i).collect(),
        })
    }
}

/// Parse jobs from CSV data.
pub fn parse_jobs(data: impl Read, defaults: &JobDefaults) -> WorkerResult<Vec<Job>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);
    let columns = Columns::resolve(reader.headers()?)?;

    let mut jobs = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = index + 1;
        let field = |i: Option<usize>| i.and_then(|i| record.get(i)).unwrap_or("");

        let image_urls: Vec<Url> = columns
            .images
            .iter()
            .filter_map(|&i| record.get(i))
            .filter_map(parse_image_url)
            .collect();

        let job = Job {
            id: JobId::new(),
            row,
            title: field(Some(columns.title)).trim().to_string(),
            description_html: field(columns.body).to_string(),
            tags: split_tags(field(columns.tags)),
            category: defaults.category.clone(),
            image_urls,
            privacy: defaults.privacy,
        };

        debug!(row, title = %job.title, images = job.image_urls.len(), "Parsed job");
        jobs.push(job);
    }

    Ok(jobs)
}

/// Split a comma-separated tag list, dropping empty entries.
pub fn split_tags(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

/// Accept only absolute http(s) URLs with a host.
fn parse_image_url(value: &str) -> Option<Url> {
    let url = Url::parse(value.trim()).ok()?;
    let web = matches!(url.scheme(), "http" | "https");
    let has_host = url.host_str().is_some_and(|host| !host.is_empty());
    (web && has_host).then_some(url)
}
