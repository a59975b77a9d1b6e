use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

use crate::classify::GroupClassifier;
use crate::fields::Field;
use crate::parser::lines::DEFAULT_MIN_LINE_LEN;
use crate::validate::{Plausibility, Range};

pub const DEFAULT_CONFIG: &str = include_str!("../ibge.toml");

/// Column placeholder for a printed column that maps to no field.
const UNMAPPED: &str = "_";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("table `{table}` references unknown field `{field}`")]
    UnknownField { table: String, field: String },
    #[error("plausibility range given for unknown field `{0}`")]
    UnknownRangeField(String),
    #[error("field `{field}` is owned by both `{first}` and `{second}`")]
    FieldOwnedTwice {
        field: Field,
        first: String,
        second: String,
    },
    #[error("table `{0}` maps no fields")]
    EmptyTable(String),
    #[error("pass `{pass}` references unknown table `{table}`")]
    UnknownTable { pass: String, table: String },
    #[error("no passes configured")]
    NoPasses,
    #[error("pass `{pass}` has invalid page range {first}..={last}")]
    InvalidPageRange { pass: String, first: u32, last: u32 },
    #[error("field `{field}` has invalid plausibility range [{min}, {max}]")]
    InvalidRange { field: Field, min: f64, max: f64 },
    #[error("group prefix `{0}` is not two digits")]
    InvalidGroupPrefix(String),
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(default = "default_group")]
    default_group: String,
    #[serde(default = "default_min_line_len")]
    min_line_len: usize,
    #[serde(default = "default_chunk_pages")]
    chunk_pages: usize,
    tables: BTreeMap<String, RawTable>,
    #[serde(default)]
    passes: Vec<RawPass>,
    #[serde(default)]
    groups: HashMap<String, String>,
    #[serde(default)]
    ranges: HashMap<String, RawRange>,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawPass {
    name: String,
    table: String,
    first_page: u32,
    last_page: u32,
}

#[derive(Debug, Deserialize)]
struct RawRange {
    min: f64,
    max: f64,
}

fn default_group() -> String {
    "Diversos".to_string()
}

fn default_min_line_len() -> usize {
    DEFAULT_MIN_LINE_LEN
}

fn default_chunk_pages() -> usize {
    16
}

/// Ordered column mapping of one table. `None` is an unmapped column.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub id: String,
    pub columns: Vec<Option<Field>>,
}

impl TableDef {
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.columns.iter().flatten().copied()
    }
}

#[derive(Debug, Clone)]
pub struct PassDef {
    pub name: String,
    pub table: String,
    pub first_page: u32,
    pub last_page: u32,
}

impl PassDef {
    pub fn pages(&self) -> RangeInclusive<u32> {
        self.first_page..=self.last_page
    }

    pub fn page_count(&self) -> usize {
        (self.last_page - self.first_page + 1) as usize
    }
}

/// Validated run configuration. Nothing reads a page until one of these exists.
#[derive(Debug, Clone)]
pub struct Settings {
    pub tables: BTreeMap<String, TableDef>,
    pub passes: Vec<PassDef>,
    pub classifier: GroupClassifier,
    pub plausibility: Plausibility,
    pub min_line_len: usize,
    pub chunk_pages: usize,
}

impl Settings {
    /// Embedded defaults, or `path` in their place, then `IBGE_*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let builder = match path {
            Some(p) => Config::builder().add_source(File::new(&p.to_string_lossy(), FileFormat::Toml)),
            None => Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml)),
        };
        let raw: RawSettings = builder
            .add_source(Environment::with_prefix("IBGE").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Settings::validate(raw)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, SettingsError> {
        let raw: RawSettings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Settings::validate(raw)
    }

    pub fn table(&self, id: &str) -> Option<&TableDef> {
        self.tables.get(id)
    }

    /// Every field some table writes, in catalog order.
    pub fn owned_fields(&self) -> Vec<Field> {
        let mut fields: Vec<Field> = self.tables.values().flat_map(|t| t.fields()).collect();
        fields.sort();
        fields
    }

    fn validate(raw: RawSettings) -> Result<Self, SettingsError> {
        let mut owners: HashMap<Field, String> = HashMap::new();
        let mut tables = BTreeMap::new();

        for (id, table) in raw.tables {
            let mut columns = Vec::with_capacity(table.fields.len());
            for name in &table.fields {
                if name.trim() == UNMAPPED {
                    columns.push(None);
                    continue;
                }
                let field: Field = name.parse().map_err(|field| SettingsError::UnknownField {
                    table: id.clone(),
                    field,
                })?;
                if let Some(first) = owners.insert(field, id.clone()) {
                    return Err(SettingsError::FieldOwnedTwice {
                        field,
                        first,
                        second: id.clone(),
                    });
                }
                columns.push(Some(field));
            }
            if columns.iter().all(Option::is_none) {
                return Err(SettingsError::EmptyTable(id));
            }
            tables.insert(id.clone(), TableDef { id, columns });
        }

        if raw.passes.is_empty() {
            return Err(SettingsError::NoPasses);
        }
        let mut passes = Vec::with_capacity(raw.passes.len());
        for p in raw.passes {
            if !tables.contains_key(&p.table) {
                return Err(SettingsError::UnknownTable {
                    pass: p.name,
                    table: p.table,
                });
            }
            if p.first_page == 0 || p.first_page > p.last_page {
                return Err(SettingsError::InvalidPageRange {
                    pass: p.name,
                    first: p.first_page,
                    last: p.last_page,
                });
            }
            passes.push(PassDef {
                name: p.name,
                table: p.table,
                first_page: p.first_page,
                last_page: p.last_page,
            });
        }

        let mut overrides = HashMap::new();
        for (name, r) in raw.ranges {
            let field: Field = name.parse().map_err(SettingsError::UnknownRangeField)?;
            if !r.min.is_finite() || !r.max.is_finite() || r.min > r.max {
                return Err(SettingsError::InvalidRange {
                    field,
                    min: r.min,
                    max: r.max,
                });
            }
            overrides.insert(field, Range { min: r.min, max: r.max });
        }

        for prefix in raw.groups.keys() {
            if prefix.len() != 2 || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                return Err(SettingsError::InvalidGroupPrefix(prefix.clone()));
            }
        }

        Ok(Settings {
            tables,
            passes,
            classifier: GroupClassifier::new(raw.groups, raw.default_group),
            plausibility: Plausibility::from_ranges(overrides),
            min_line_len: raw.min_line_len,
            chunk_pages: raw.chunk_pages.max(1),
        })
    }
}

// ── Tests ──
