use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::Utc;
use itertools::Itertools;
use serde::Serialize;
use tracing::info;

use crate::fields::Field;
use crate::merge::FoodRecord;

/// What happened to one mapped column of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Populated,
    Marker,
    Missing,
    Unparseable,
    CodeToken,
    CodeLike,
    Implausible,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldCounts {
    pub populated: usize,
    pub marker: usize,
    pub missing: usize,
    pub unparseable: usize,
    pub code_token: usize,
    pub code_like: usize,
    pub implausible: usize,
}

impl FieldCounts {
    pub fn absent(&self) -> usize {
        self.marker + self.missing + self.unparseable + self.code_token
    }

    pub fn rejected(&self) -> usize {
        self.code_like + self.implausible
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldStats {
    counts: BTreeMap<Field, FieldCounts>,
}

impl FieldStats {
    pub fn record(&mut self, field: Field, outcome: Outcome) {
        let c = self.counts.entry(field).or_default();
        match outcome {
            Outcome::Populated => c.populated += 1,
            Outcome::Marker => c.marker += 1,
            Outcome::Missing => c.missing += 1,
            Outcome::Unparseable => c.unparseable += 1,
            Outcome::CodeToken => c.code_token += 1,
            Outcome::CodeLike => c.code_like += 1,
            Outcome::Implausible => c.implausible += 1,
        }
    }

    pub fn get(&self, field: Field) -> FieldCounts {
        self.counts.get(&field).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PassMetric {
    pub name: String,
    pub table: String,
    pub pages_requested: usize,
    pub pages_read: usize,
    pub pages_unavailable: usize,
    pub lines: usize,
    pub rows: usize,
    pub unmatched: usize,
    pub short: usize,
    pub created: usize,
    pub updated: usize,
    pub abandoned: bool,
}

pub struct PassTracker {
    run_id: String,
    metrics: Vec<PassMetric>,
}

impl PassTracker {
    pub fn new(run_id: String) -> Self {
        PassTracker {
            run_id,
            metrics: Vec::new(),
        }
    }

    pub fn record(&mut self, metric: PassMetric) {
        info!(
            pass = %metric.name,
            pages = metric.pages_read,
            unavailable = metric.pages_unavailable,
            rows = metric.rows,
            created = metric.created,
            updated = metric.updated,
            abandoned = metric.abandoned,
            "pass finished"
        );
        self.metrics.push(metric);
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn into_metrics(self) -> Vec<PassMetric> {
        self.metrics
    }
}

pub fn new_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%dT%H%M%SZ"))
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldRow {
    pub field: Field,
    #[serde(flatten)]
    pub counts: FieldCounts,
    pub records_present: usize,
    pub coverage_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupCount {
    pub group: String,
    pub records: usize,
}

/// End-of-run quality report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub total_records: usize,
    pub aborted: bool,
    pub passes: Vec<PassMetric>,
    pub fields: Vec<FieldRow>,
    pub groups: Vec<GroupCount>,
}

impl Report {
    pub fn build(
        records: &[FoodRecord],
        stats: &FieldStats,
        passes: &[PassMetric],
        fields: &[Field],
        aborted: bool,
    ) -> Self {
        let total = records.len();
        let field_rows = fields
            .iter()
            .map(|&field| {
                let present = records.iter().filter(|r| r.nutrient(field).is_present()).count();
                FieldRow {
                    field,
                    counts: stats.get(field),
                    records_present: present,
                    coverage_pct: percent(present, total),
                }
            })
            .collect();

        let groups = records
            .iter()
            .map(FoodRecord::group)
            .counts()
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            .map(|(group, records)| GroupCount {
                group: group.to_string(),
                records,
            })
            .collect();

        Report {
            total_records: total,
            aborted,
            passes: passes.to_vec(),
            fields: field_rows,
            groups,
        }
    }

    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("## Extraction Report\n");
        let _ = writeln!(out, "- Total records: {}", self.total_records);
        if self.aborted {
            out.push_str("- Run was interrupted; results are partial\n");
        }

        out.push_str("\n### Passes\n");
        out.push_str("| pass | table | read | unavailable | lines | rows | unmatched | created | updated | abandoned |\n");
        out.push_str("|---|---|---|---|---|---|---|---|---|---|\n");
        for p in &self.passes {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |",
                p.name,
                p.table,
                p.pages_read,
                p.pages_unavailable,
                p.lines,
                p.rows,
                p.unmatched,
                p.created,
                p.updated,
                if p.abandoned { "yes" } else { "no" }
            );
        }

        out.push_str("\n### Fields\n");
        out.push_str("| field | populated | marker | missing | unparseable | code token | code-like | implausible | coverage |\n");
        out.push_str("|---|---|---|---|---|---|---|---|---|\n");
        for f in &self.fields {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} | {} | {} | {:.1}% |",
                f.field,
                f.counts.populated,
                f.counts.marker,
                f.counts.missing,
                f.counts.unparseable,
                f.counts.code_token,
                f.counts.code_like,
                f.counts.implausible,
                f.coverage_pct
            );
        }

        out.push_str("\n### Groups\n");
        for g in &self.groups {
            let _ = writeln!(out, "- {}: {}", g.group, g.records);
        }

        out
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::Reconciler;
    use crate::parser::lines::LineParser;
    use crate::settings::{Settings, DEFAULT_CONFIG};

    fn records() -> (Vec<FoodRecord>, FieldStats, Vec<Field>) {
        let s = Settings::from_toml_str(DEFAULT_CONFIG).unwrap();
        let table = s.table("macronutrients").unwrap();
        let parser = LineParser::default();
        let mut engine = Reconciler::new(&s);
        for line in [
            "6300101 Arroz polido 1 cozido 128,0 2,5 0,2 28,1 1,6",
            "6300102 Arroz integral 1 cozido 124,0 2,6 1,0 25,8 2,7",
            "6900101 Carne bovina 2 grelhada 1500 26,0 11,0 0,0 0,0",
        ] {
            engine.apply(table, &parser.parse_line(line).unwrap());
        }
        let fields = s.owned_fields();
        let (store, stats) = engine.into_parts();
        (store.into_records(), stats, fields)
    }

    #[test]
    fn field_counts_split_absent_and_rejected() {
        let mut stats = FieldStats::default();
        stats.record(Field::IronMg, Outcome::Marker);
        stats.record(Field::IronMg, Outcome::Missing);
        stats.record(Field::IronMg, Outcome::Implausible);
        stats.record(Field::IronMg, Outcome::CodeLike);
        stats.record(Field::IronMg, Outcome::Populated);
        let c = stats.get(Field::IronMg);
        assert_eq!(c.absent(), 2);
        assert_eq!(c.rejected(), 2);
        assert_eq!(c.populated, 1);
        assert_eq!(stats.get(Field::ZincMg), FieldCounts::default());
    }

    #[test]
    fn report_coverage_and_groups() {
        let (records, stats, fields) = records();
        let report = Report::build(&records, &stats, &[], &fields, false);
        assert_eq!(report.total_records, 3);

        let energy = report.fields.iter().find(|f| f.field == Field::EnergyKcal).unwrap();
        assert_eq!(energy.records_present, 2);
        assert_eq!(energy.counts.implausible, 1);
        assert!((energy.coverage_pct - 66.666).abs() < 0.01);

        let calcium = report.fields.iter().find(|f| f.field == Field::CalciumMg).unwrap();
        assert_eq!(calcium.records_present, 0);

        assert_eq!(report.groups[0].group, "Cereais e Produtos de Cereais");
        assert_eq!(report.groups[0].records, 2);
        assert_eq!(report.groups[1].group, "Carnes e Produtos Cárneus");
    }

    #[test]
    fn markdown_mentions_every_pass() {
        let (records, stats, fields) = records();
        let passes = vec![PassMetric {
            name: "Macronutrientes".into(),
            table: "macronutrients".into(),
            pages_read: 1,
            rows: 3,
            created: 3,
            ..Default::default()
        }];
        let md = Report::build(&records, &stats, &passes, &fields, true).render_markdown();
        assert!(md.contains("| Macronutrientes | macronutrients | 1 |"));
        assert!(md.contains("partial"));
        assert!(md.contains("| energy_kcal | 2 |"));
    }

    #[test]
    fn markdown_breaks_out_unparseable_tokens() {
        let mut stats = FieldStats::default();
        stats.record(Field::IronMg, Outcome::Unparseable);
        stats.record(Field::IronMg, Outcome::Unparseable);
        stats.record(Field::IronMg, Outcome::Marker);
        let md = Report::build(&[], &stats, &[], &[Field::IronMg], false).render_markdown();
        assert!(md.contains("| unparseable |"));
        assert!(md.contains("| iron_mg | 0 | 1 | 0 | 2 | 0 | 0 | 0 | 0.0% |"), "{md}");
    }

    #[test]
    fn run_id_is_timestamped() {
        let id = new_run_id();
        assert!(id.starts_with("run-"));
        assert!(id.ends_with('Z'));
    }
}
