use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

/// Where page text comes from. `Ok(None)` means the page is not available.
pub trait PageSource {
    fn page_text(&mut self, page: u32) -> Result<Option<String>>;
    fn describe(&self) -> String;
}

#[derive(Debug, Default)]
pub struct MemorySource {
    pages: HashMap<u32, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        MemorySource::default()
    }

    pub fn with_page(mut self, page: u32, text: impl Into<String>) -> Self {
        self.insert(page, text);
        self
    }

    pub fn insert(&mut self, page: u32, text: impl Into<String>) {
        self.pages.insert(page, text.into());
    }
}

impl PageSource for MemorySource {
    fn page_text(&mut self, page: u32) -> Result<Option<String>> {
        Ok(self.pages.get(&page).cloned())
    }

    fn describe(&self) -> String {
        format!("memory ({} pages)", self.pages.len())
    }
}

/// One text file per page: `page-0036.txt`, or plain `36.txt`.
#[derive(Debug)]
pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirSource { dir: dir.into() }
    }

    fn candidates(&self, page: u32) -> [PathBuf; 2] {
        [
            self.dir.join(format!("page-{page:04}.txt")),
            self.dir.join(format!("{page}.txt")),
        ]
    }
}

impl PageSource for DirSource {
    fn page_text(&mut self, page: u32) -> Result<Option<String>> {
        let Some(path) = self.candidates(page).into_iter().find(|p| p.is_file()) else {
            return Ok(None);
        };
        let text = fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        Ok(Some(text))
    }

    fn describe(&self) -> String {
        format!("directory {:?}", self.dir)
    }
}

/// A whole-document text dump with pages separated by form feeds, as `pdftotext` writes it.
#[derive(Debug)]
pub struct FormFeedSource {
    origin: String,
    pages: Vec<String>,
}

impl FormFeedSource {
    pub fn open(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        Ok(FormFeedSource::from_text(format!("{:?}", path), &text))
    }

    pub fn from_text(origin: impl Into<String>, text: &str) -> Self {
        FormFeedSource {
            origin: origin.into(),
            pages: text.split('\x0C').map(str::to_string).collect(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl PageSource for FormFeedSource {
    fn page_text(&mut self, page: u32) -> Result<Option<String>> {
        if page == 0 {
            return Ok(None);
        }
        Ok(self.pages.get(page as usize - 1).cloned())
    }

    fn describe(&self) -> String {
        format!("text dump {} ({} pages)", self.origin, self.pages.len())
    }
}

/// Page cache written by an upstream text extractor: `pages(page INTEGER PRIMARY KEY, text TEXT)`.
pub struct SqliteSource {
    origin: String,
    conn: Connection,
}

impl SqliteSource {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        Ok(SqliteSource::from_connection(format!("{:?}", path), conn))
    }

    pub fn from_connection(origin: impl Into<String>, conn: Connection) -> Self {
        SqliteSource {
            origin: origin.into(),
            conn,
        }
    }
}

impl PageSource for SqliteSource {
    fn page_text(&mut self, page: u32) -> Result<Option<String>> {
        let text: Option<Option<String>> = self
            .conn
            .query_row("SELECT text FROM pages WHERE page = ?1", [page], |r| r.get(0))
            .optional()
            .with_context(|| format!("Failed to read page {page} from {}", self.origin))?;
        Ok(text.flatten())
    }

    fn describe(&self) -> String {
        format!("sqlite {}", self.origin)
    }
}

/// Explicit path, else `IBGE_PAGES_DB`.
pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var_os("IBGE_PAGES_DB").map(PathBuf::from))
}

/// Pick a source by the shape of `path`: a directory of page files, a SQLite
/// cache (`.sqlite`, `.sqlite3`, `.db`), or a form-feed text dump.
pub fn open_source(path: &Path) -> Result<Box<dyn PageSource + Send>> {
    if path.is_dir() {
        return Ok(Box::new(DirSource::new(path)));
    }
    if !path.exists() {
        anyhow::bail!("page source {:?} does not exist", path);
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("sqlite" | "sqlite3" | "db") => Ok(Box::new(SqliteSource::open(path)?)),
        _ => Ok(Box::new(FormFeedSource::open(path)?)),
    }
}

impl<S: PageSource + ?Sized> PageSource for Box<S> {
    fn page_text(&mut self, page: u32) -> Result<Option<String>> {
        (**self).page_text(page)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

// ── Tests ──
