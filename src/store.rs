//! Append-only, deduplicated link store backed by a one-column CSV file.
//!
//! The file starts with a `link` header row. Links already on disk are
//! loaded when the store is opened, and every merge appends only the links
//! not seen before, flushing before it returns.

use crate::error::{HarvestError, Result};
use std::collections::{BTreeSet, HashSet};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Header of the single column in the store file
pub const LINK_COLUMN: &str = "link";

#[derive(Debug)]
pub struct LinkStore {
    path: PathBuf,
    links: Vec<String>,
    index: HashSet<String>,
}

impl LinkStore {
    /// Open the store at `path`, creating it (and its directory) if missing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| HarvestError::persistence(&path, e))?;
        }

        let is_empty = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        if is_empty {
            write_header(&path)?;
            ::log::debug!("Created link store at {}", path.display());
            return Ok(Self {
                path,
                links: Vec::new(),
                index: HashSet::new(),
            });
        }

        let (links, index) = load_links(&path)?;
        ::log::info!(
            "Loaded {} existing links from {}",
            links.len(),
            path.display()
        );
        Ok(Self { path, links, index })
    }

    /// Delete any existing file at `path` and start an empty store
    pub fn reset(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            fs::remove_file(path).map_err(|e| HarvestError::persistence(path, e))?;
        }
        Self::open(path)
    }

    /// Add the candidates not yet present and return exactly those
    ///
    /// New links are appended in sorted order. The in-memory set only
    /// changes once the rows are flushed to disk.
    pub fn merge<I, S>(&mut self, candidates: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let new_links: BTreeSet<String> = candidates
            .into_iter()
            .map(|link| link.as_ref().to_string())
            .filter(|link| !link.is_empty() && !self.index.contains(link))
            .collect();

        if new_links.is_empty() {
            return Ok(new_links);
        }

        self.append(&new_links)?;
        for link in &new_links {
            self.index.insert(link.clone());
            self.links.push(link.clone());
        }
        ::log::debug!(
            "Appended {} links to {}",
            new_links.len(),
            self.path.display()
        );
        Ok(new_links)
    }

    fn append(&self, new_links: &BTreeSet<String>) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| HarvestError::persistence(&self.path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for link in new_links {
            writer
                .write_record([link])
                .map_err(|e| HarvestError::persistence(&self.path, e))?;
        }
        writer
            .flush()
            .map_err(|e| HarvestError::persistence(&self.path, e))
    }

    pub fn contains(&self, link: &str) -> bool {
        self.index.contains(link)
    }

    /// Links in first-seen order
    pub fn links(&self) -> &[String] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_header(path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| HarvestError::persistence(path, e))?;
    writer
        .write_record([LINK_COLUMN])
        .map_err(|e| HarvestError::persistence(path, e))?;
    writer.flush().map_err(|e| HarvestError::persistence(path, e))
}

fn load_links(path: &Path) -> Result<(Vec<String>, HashSet<String>)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| HarvestError::persistence(path, e))?;

    let column = reader
        .headers()
        .map_err(|e| HarvestError::persistence(path, e))?
        .iter()
        .position(|h| h == LINK_COLUMN)
        .ok_or_else(|| HarvestError::persistence(path, "missing 'link' column"))?;

    let mut links = Vec::new();
    let mut index = HashSet::new();
    for record in reader.records() {
        let record = record.map_err(|e| HarvestError::persistence(path, e))?;
        let link = record.get(column).unwrap_or("").trim();
        if !link.is_empty() && index.insert(link.to_string()) {
            links.push(link.to_string());
        }
    }
    Ok((links, index))
}
