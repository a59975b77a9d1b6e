use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::fields::Field;
use crate::merge::{Applied, FoodRecord, Reconciler};
use crate::metrics::{new_run_id, FieldStats, PassMetric, PassTracker, Report};
use crate::parser::lines::{LineParser, PageRows};
use crate::settings::{PassDef, Settings, TableDef};
use crate::source::PageSource;

/// Everything a run produced, complete or not.
#[derive(Debug)]
pub struct Extraction {
    pub run_id: String,
    pub records: Vec<FoodRecord>,
    pub field_stats: FieldStats,
    pub passes: Vec<PassMetric>,
    pub fields: Vec<Field>,
    pub aborted: bool,
}

impl Extraction {
    pub fn report(&self) -> Report {
        Report::build(
            &self.records,
            &self.field_stats,
            &self.passes,
            &self.fields,
            self.aborted,
        )
    }
}

pub struct PassDriver<S> {
    settings: Settings,
    source: S,
    parser: LineParser,
    abort: Arc<AtomicBool>,
    progress: bool,
}

impl<S: PageSource> PassDriver<S> {
    pub fn new(settings: Settings, source: S) -> Self {
        let parser = LineParser::new(settings.min_line_len);
        PassDriver {
            settings,
            source,
            parser,
            abort: Arc::new(AtomicBool::new(false)),
            progress: true,
        }
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Setting the flag stops the run at the next page boundary.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn run(mut self) -> Extraction {
        let mut engine = Reconciler::new(&self.settings);
        let mut tracker = PassTracker::new(new_run_id());
        info!(run_id = tracker.run_id(), source = %self.source.describe(), "starting extraction");

        let passes = self.settings.passes.clone();
        let mut aborted = false;
        for pass in &passes {
            if aborted {
                tracker.record(PassMetric {
                    name: pass.name.clone(),
                    table: pass.table.clone(),
                    pages_requested: pass.page_count(),
                    abandoned: true,
                    ..Default::default()
                });
                continue;
            }
            let Some(table) = self.settings.table(&pass.table).cloned() else {
                warn!(pass = %pass.name, table = %pass.table, "pass references unknown table, skipping");
                continue;
            };
            let metric = self.run_pass(pass, &table, &mut engine);
            aborted = metric.abandoned;
            tracker.record(metric);
        }

        if aborted {
            warn!("extraction interrupted, returning partial records");
        }

        let run_id = tracker.run_id().to_string();
        let fields = self.settings.owned_fields();
        let (store, field_stats) = engine.into_parts();
        info!(records = store.len(), "extraction finished");
        Extraction {
            run_id,
            records: store.into_records(),
            field_stats,
            passes: tracker.into_metrics(),
            fields,
            aborted,
        }
    }

    fn run_pass(&mut self, pass: &PassDef, table: &TableDef, engine: &mut Reconciler) -> PassMetric {
        info!(pass = %pass.name, table = %table.id, first = pass.first_page, last = pass.last_page, "starting pass");
        let mut metric = PassMetric {
            name: pass.name.clone(),
            table: table.id.clone(),
            pages_requested: pass.page_count(),
            ..Default::default()
        };
        let pb = self.progress_bar(pass);

        let pages: Vec<u32> = pass.pages().collect();
        for chunk in pages.chunks(self.settings.chunk_pages) {
            let mut texts = Vec::with_capacity(chunk.len());
            for &page in chunk {
                if self.abort.load(Ordering::Relaxed) {
                    metric.abandoned = true;
                    break;
                }
                match self.source.page_text(page) {
                    Ok(Some(text)) => texts.push((page, text)),
                    Ok(None) => {
                        warn!(pass = %pass.name, page, "page unavailable");
                        metric.pages_unavailable += 1;
                        pb.inc(1);
                    }
                    Err(e) => {
                        warn!(pass = %pass.name, page, error = %e, "page unavailable");
                        metric.pages_unavailable += 1;
                        pb.inc(1);
                    }
                }
            }

            let parsed: Vec<(u32, PageRows)> = texts
                .par_iter()
                .map(|(page, text)| (*page, self.parser.parse_page(text)))
                .collect();

            for (page, rows) in parsed {
                metric.pages_read += 1;
                metric.lines += rows.candidates;
                metric.unmatched += rows.unmatched;
                metric.short += rows.short;
                metric.rows += rows.rows.len();
                for row in &rows.rows {
                    match engine.apply(table, row) {
                        Applied::Created => metric.created += 1,
                        Applied::Updated => metric.updated += 1,
                    }
                }
                debug!(pass = %pass.name, page, rows = rows.rows.len(), unmatched = rows.unmatched, "page applied");
                pb.inc(1);
            }

            if metric.abandoned {
                warn!(pass = %pass.name, "pass abandoned");
                break;
            }
        }

        pb.finish_and_clear();
        metric
    }

    fn progress_bar(&self, pass: &PassDef) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(pass.page_count() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} pages")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(pass.name.clone());
        pb
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{CompositeKey, NutrientValue};
    use crate::settings::DEFAULT_CONFIG;
    use crate::source::MemorySource;

    const MACROS: &str = include_str!("../tests/fixtures/macronutrients_p36.txt");
    const FATS: &str = include_str!("../tests/fixtures/fats_p97.txt");
    const MINERALS: &str = include_str!("../tests/fixtures/minerals_p158.txt");
    const VITAMINS: &str = include_str!("../tests/fixtures/vitamins_p219.txt");

    const SMALL: &str = r#"
        chunk_pages = 2

        [tables.macronutrients]
        fields = ["energy_kcal", "protein_g", "lipids_g", "carbohydrate_g", "fiber_g"]

        [tables.minerals]
        fields = ["calcium_mg", "magnesium_mg"]

        [[passes]]
        name = "Macro"
        table = "macronutrients"
        first_page = 1
        last_page = 3

        [[passes]]
        name = "Minerais"
        table = "minerals"
        first_page = 4
        last_page = 4
    "#;

    fn small() -> Settings {
        Settings::from_toml_str(SMALL).unwrap()
    }

    fn key(code: u32, preparation_code: u8) -> CompositeKey {
        CompositeKey { code, preparation_code }
    }

    fn find(out: &Extraction, k: CompositeKey) -> &FoodRecord {
        out.records.iter().find(|r| r.key() == k).unwrap()
    }

    #[test]
    fn fixture_pages_merge_across_tables() {
        let settings = Settings::from_toml_str(DEFAULT_CONFIG).unwrap();
        let source = MemorySource::new()
            .with_page(36, MACROS)
            .with_page(97, FATS)
            .with_page(158, MINERALS)
            .with_page(219, VITAMINS);
        let out = PassDriver::new(settings, source).with_progress(false).run();

        assert!(!out.aborted);
        assert_eq!(out.passes.len(), 6);
        // six rows from the macronutrient page plus one item only the vitamin table lists
        assert_eq!(out.records.len(), 7);
        assert_eq!(out.records[0].key(), key(6300101, 1));

        let rice = find(&out, key(6300101, 1));
        assert_eq!(rice.value(Field::EnergyKcal), Some(358.0));
        assert_eq!(rice.value(Field::SaturatedG), Some(0.09));
        assert_eq!(rice.value(Field::LinoleicG), Some(0.10));
        assert_eq!(rice.value(Field::TotalSugarG), Some(0.12));
        assert_eq!(rice.value(Field::CalciumMg), Some(4.0));
        assert_eq!(rice.value(Field::SeleniumMcg), Some(15.1));
        assert_eq!(rice.value(Field::ThiamineMg), Some(0.07));
        assert_eq!(rice.group(), "Cereais e Produtos de Cereais");

        let pumpkin = find(&out, key(6400101, 1));
        assert_eq!(pumpkin.nutrient(Field::PhosphorusMg), NutrientValue::Absent);
        assert_eq!(pumpkin.value(Field::PotassiumMg), Some(340.0));
        assert_eq!(out.field_stats.get(Field::PhosphorusMg).code_token, 1);

        let beef = find(&out, key(6900301, 1));
        assert_eq!(beef.nutrient(Field::LipidsG), NutrientValue::Absent);
        assert_eq!(beef.value(Field::CholesterolMg), Some(66.0));

        let milk = find(&out, key(7500101, 1));
        assert_eq!(milk.group(), "Leite e Produtos Lácteos");
        assert_eq!(milk.nutrient(Field::EnergyKcal), NutrientValue::Absent);
        assert_eq!(milk.value(Field::VitaminB12Mcg), Some(0.44));

        let macro_pass = &out.passes[0];
        assert_eq!(macro_pass.pages_read, 1);
        assert_eq!(macro_pass.pages_unavailable, 60);
        assert_eq!(macro_pass.rows, 6);
        assert_eq!(macro_pass.created, 6);
        assert_eq!(out.passes[2].updated, 3);
        assert_eq!(out.passes[3].created, 1);
    }

    #[test]
    fn missing_and_empty_pages_do_not_stop_the_pass() {
        let source = MemorySource::new()
            .with_page(1, "")
            .with_page(3, "1234567 Sample Food 10 cooked 100,0 5,0 2,0 20,0 1,0");
        let out = PassDriver::new(small(), source).with_progress(false).run();

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].value(Field::EnergyKcal), Some(100.0));
        let p = &out.passes[0];
        assert_eq!(p.pages_read, 2);
        assert_eq!(p.pages_unavailable, 1);
        assert_eq!(out.passes[1].pages_unavailable, 1);
    }

    #[test]
    fn later_pass_fills_its_own_fields() {
        let source = MemorySource::new()
            .with_page(2, "1234567 Sample Food 10 cooked 100,0 5,0 2,0 20,0 1,0")
            .with_page(4, "1234567 Sample Food 10 cooked 50,0 12,0 999,0 888,0");
        let out = PassDriver::new(small(), source).with_progress(false).run();

        let rec = &out.records[0];
        assert_eq!(rec.value(Field::CalciumMg), Some(50.0));
        assert_eq!(rec.value(Field::MagnesiumMg), Some(12.0));
        assert_eq!(rec.value(Field::EnergyKcal), Some(100.0));
        assert_eq!(rec.value(Field::ProteinG), Some(5.0));
        assert_eq!(out.passes[1].updated, 1);
    }

    #[test]
    fn same_page_twice_is_idempotent() {
        let page = "1234567 Sample Food 10 cooked 100,0 - 1500 20,0 1,0\n6300101 Arroz 1 cru 350,0 7,0 1,0 77,0 2,0";
        let once = PassDriver::new(small(), MemorySource::new().with_page(1, page))
            .with_progress(false)
            .run();
        let twice = PassDriver::new(small(), MemorySource::new().with_page(1, page).with_page(2, page))
            .with_progress(false)
            .run();
        assert_eq!(once.records, twice.records);
        assert_eq!(twice.passes[0].updated, 2);
    }

    #[test]
    fn abort_before_run_abandons_every_pass() {
        let source = MemorySource::new().with_page(1, "1234567 Sample Food 10 cooked 100,0 5,0 2,0 20,0 1,0");
        let driver = PassDriver::new(small(), source).with_progress(false);
        driver.abort_handle().store(true, Ordering::Relaxed);
        let out = driver.run();

        assert!(out.aborted);
        assert!(out.records.is_empty());
        assert_eq!(out.passes.len(), 2);
        assert!(out.passes.iter().all(|p| p.abandoned));
        assert!(out.report().render_markdown().contains("partial"));
    }

    #[test]
    fn report_counts_the_run() {
        let source = MemorySource::new().with_page(1, MACROS);
        let out = PassDriver::new(small(), source).with_progress(false).run();
        let report = out.report();
        assert_eq!(report.total_records, 6);
        assert_eq!(report.passes[0].unmatched, 3);
        assert_eq!(report.passes[0].short, 2);
    }
}
