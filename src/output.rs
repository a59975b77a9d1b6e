use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::fields::Field;
use crate::merge::{FoodRecord, NutrientValue};
use crate::metrics::Report;
use crate::passes::Extraction;

#[derive(Debug, Serialize)]
pub struct RecordRow<'a> {
    pub code: u32,
    pub preparation_code: u8,
    pub name: &'a str,
    pub preparation: &'a str,
    pub group: &'a str,
    pub nutrients: &'a BTreeMap<Field, NutrientValue>,
    pub energy_kj: Option<f64>,
    pub available_carbohydrate_g: Option<f64>,
    pub rejected: Vec<Field>,
}

impl<'a> From<&'a FoodRecord> for RecordRow<'a> {
    fn from(r: &'a FoodRecord) -> Self {
        RecordRow {
            code: r.code,
            preparation_code: r.preparation_code,
            name: &r.name,
            preparation: &r.preparation,
            group: r.group(),
            nutrients: r.nutrients(),
            energy_kj: r.energy_kj(),
            available_carbohydrate_g: r.available_carbohydrate_g(),
            rejected: r.rejected_fields(),
        }
    }
}

/// The hand-off document for whatever exports the dataset.
#[derive(Debug, Serialize)]
pub struct Document<'a> {
    pub run_id: &'a str,
    pub generated_at: DateTime<Utc>,
    pub source: &'a str,
    pub total_records: usize,
    pub records: Vec<RecordRow<'a>>,
    pub report: Report,
}

pub fn document<'a>(extraction: &'a Extraction, source: &'a str) -> Document<'a> {
    Document {
        run_id: &extraction.run_id,
        generated_at: Utc::now(),
        source,
        total_records: extraction.records.len(),
        records: extraction.records.iter().map(RecordRow::from).collect(),
        report: extraction.report(),
    }
}

/// Pretty JSON to `path`, or stdout when no path is given.
pub fn write_json(doc: &Document<'_>, path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            let file = File::create(p).with_context(|| format!("Failed to create {:?}", p))?;
            let mut w = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut w, doc)?;
            w.flush().with_context(|| format!("Failed to write {:?}", p))?;
        }
        None => {
            let stdout = io::stdout();
            let mut w = stdout.lock();
            serde_json::to_writer_pretty(&mut w, doc)?;
            writeln!(w)?;
        }
    }
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::PassDriver;
    use crate::settings::Settings;
    use crate::source::MemorySource;

    const CONFIG: &str = r#"
        [tables.macronutrients]
        fields = ["energy_kcal", "protein_g", "lipids_g", "carbohydrate_g", "fiber_g"]

        [[passes]]
        name = "Macro"
        table = "macronutrients"
        first_page = 1
        last_page = 1
    "#;

    fn extraction(page: &str) -> Extraction {
        let settings = Settings::from_toml_str(CONFIG).unwrap();
        PassDriver::new(settings, MemorySource::new().with_page(1, page))
            .with_progress(false)
            .run()
    }

    #[test]
    fn record_json_shape() {
        let ex = extraction("1234567 Sample Food 10 cooked 100,0 - 1500 20,0 0,0");
        let json = serde_json::to_value(document(&ex, "memory")).unwrap();

        assert_eq!(json["total_records"], 1);
        assert_eq!(json["source"], "memory");
        let rec = &json["records"][0];
        assert_eq!(rec["code"], 1234567);
        assert_eq!(rec["preparation_code"], 10);
        assert_eq!(rec["name"], "Sample Food");
        assert_eq!(rec["group"], "Diversos");
        assert_eq!(rec["nutrients"]["energy_kcal"], 100.0);
        assert!(rec["nutrients"]["protein_g"].is_null());
        assert!(rec["nutrients"]["lipids_g"].is_null());
        assert_eq!(rec["nutrients"]["fiber_g"], 0.0);
        assert_eq!(rec["rejected"], serde_json::json!(["lipids_g"]));
        assert_eq!(rec["available_carbohydrate_g"], 20.0);
        assert!((rec["energy_kj"].as_f64().unwrap() - 418.4).abs() < 1e-9);
        assert_eq!(json["report"]["passes"][0]["rows"], 1);
    }

    #[test]
    fn writes_to_file() {
        let ex = extraction("1234567 Sample Food 10 cooked 100,0 5,0 2,0 20,0 1,0");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&document(&ex, "memory"), Some(path.as_path())).unwrap();

        let back: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["run_id"], ex.run_id.as_str());
        assert_eq!(back["records"].as_array().unwrap().len(), 1);
    }
}
