use std::collections::{BTreeMap, HashMap};

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::classify::GroupClassifier;
use crate::fields::Field;
use crate::metrics::{FieldStats, Outcome};
use crate::parser::lines::RawRow;
use crate::parser::numbers::{normalize, AbsentCause, Numeric};
use crate::settings::{Settings, TableDef};
use crate::validate::{Plausibility, Verdict};

/// kcal -> kJ, as printed in the IBGE tables.
pub const KJ_PER_KCAL: f64 = 4.184;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    pub code: u32,
    pub preparation_code: u8,
}

impl From<&RawRow> for CompositeKey {
    fn from(row: &RawRow) -> Self {
        CompositeKey {
            code: row.code,
            preparation_code: row.preparation_code,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum NutrientValue {
    Present(f64),
    #[default]
    Absent,
    Rejected,
}

impl NutrientValue {
    pub fn value(self) -> Option<f64> {
        match self {
            NutrientValue::Present(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_present(self) -> bool {
        matches!(self, NutrientValue::Present(_))
    }
}

impl Serialize for NutrientValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value() {
            Some(v) => serializer.serialize_f64(v),
            None => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoodRecord {
    pub code: u32,
    pub preparation_code: u8,
    pub name: String,
    pub preparation: String,
    group: String,
    nutrients: BTreeMap<Field, NutrientValue>,
}

impl FoodRecord {
    fn new(row: &RawRow, group: &str, fields: &[Field]) -> Self {
        FoodRecord {
            code: row.code,
            preparation_code: row.preparation_code,
            name: row.name.clone(),
            preparation: row.preparation.clone(),
            group: group.to_string(),
            nutrients: fields.iter().map(|f| (*f, NutrientValue::Absent)).collect(),
        }
    }

    pub fn key(&self) -> CompositeKey {
        CompositeKey {
            code: self.code,
            preparation_code: self.preparation_code,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn nutrient(&self, field: Field) -> NutrientValue {
        self.nutrients.get(&field).copied().unwrap_or_default()
    }

    pub fn value(&self, field: Field) -> Option<f64> {
        self.nutrient(field).value()
    }

    pub fn nutrients(&self) -> &BTreeMap<Field, NutrientValue> {
        &self.nutrients
    }

    pub fn rejected_fields(&self) -> Vec<Field> {
        self.nutrients
            .iter()
            .filter(|(_, v)| **v == NutrientValue::Rejected)
            .map(|(f, _)| *f)
            .collect()
    }

    pub fn energy_kj(&self) -> Option<f64> {
        self.value(Field::EnergyKcal).map(|kcal| kcal * KJ_PER_KCAL)
    }

    pub fn available_carbohydrate_g(&self) -> Option<f64> {
        self.value(Field::CarbohydrateG)
    }

    /// A present value always lands; absent or rejected never erase a present one.
    fn write(&mut self, field: Field, value: NutrientValue) {
        let slot = self.nutrients.entry(field).or_default();
        if value.is_present() || !slot.is_present() {
            *slot = value;
        }
    }
}

/// Records in first-seen order, indexed by composite key.
#[derive(Debug, Default)]
pub struct RecordStore {
    index: HashMap<CompositeKey, usize>,
    records: Vec<FoodRecord>,
}

impl RecordStore {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: CompositeKey) -> Option<&FoodRecord> {
        self.index.get(&key).map(|&i| &self.records[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FoodRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<FoodRecord> {
        self.records
    }

    fn get_or_insert_with<F>(&mut self, key: CompositeKey, make: F) -> (&mut FoodRecord, bool)
    where
        F: FnOnce() -> FoodRecord,
    {
        match self.index.get(&key) {
            Some(&i) => (&mut self.records[i], false),
            None => {
                self.records.push(make());
                let i = self.records.len() - 1;
                self.index.insert(key, i);
                (&mut self.records[i], true)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
}

/// Owns the record store for a run and merges every table's rows into it.
#[derive(Debug)]
pub struct Reconciler {
    store: RecordStore,
    stats: FieldStats,
    classifier: GroupClassifier,
    plausibility: Plausibility,
    fields: Vec<Field>,
}

impl Reconciler {
    pub fn new(settings: &Settings) -> Self {
        Reconciler {
            store: RecordStore::default(),
            stats: FieldStats::default(),
            classifier: settings.classifier.clone(),
            plausibility: settings.plausibility.clone(),
            fields: settings.owned_fields(),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn stats(&self) -> &FieldStats {
        &self.stats
    }

    pub fn into_parts(self) -> (RecordStore, FieldStats) {
        (self.store, self.stats)
    }

    pub fn apply(&mut self, table: &TableDef, row: &RawRow) -> Applied {
        let key = CompositeKey::from(row);
        let (classifier, fields) = (&self.classifier, &self.fields);
        let (record, created) = self
            .store
            .get_or_insert_with(key, || FoodRecord::new(row, classifier.classify(row.code), fields));

        for (idx, column) in table.columns.iter().enumerate() {
            let Some(field) = *column else {
                continue;
            };
            let (value, outcome) = match row.tokens.get(idx) {
                None => (NutrientValue::Absent, Outcome::Missing),
                Some(token) => evaluate(&self.plausibility, field, token),
            };
            if matches!(outcome, Outcome::Implausible | Outcome::CodeLike) {
                debug!(
                    code = row.code,
                    prep = row.preparation_code,
                    field = %field,
                    token = row.tokens.get(idx).map(String::as_str).unwrap_or_default(),
                    "rejected value"
                );
            }
            self.stats.record(field, outcome);
            record.write(field, value);
        }

        if created {
            Applied::Created
        } else {
            Applied::Updated
        }
    }
}

fn evaluate(plausibility: &Plausibility, field: Field, token: &str) -> (NutrientValue, Outcome) {
    match normalize(token) {
        Numeric::Absent(AbsentCause::Marker) => (NutrientValue::Absent, Outcome::Marker),
        Numeric::Absent(AbsentCause::CodeToken) => (NutrientValue::Absent, Outcome::CodeToken),
        Numeric::Absent(AbsentCause::Unparseable) => (NutrientValue::Absent, Outcome::Unparseable),
        Numeric::Value(v) => match plausibility.check(field, v) {
            Verdict::Accept(v) => (NutrientValue::Present(v), Outcome::Populated),
            Verdict::CodeLike => (NutrientValue::Rejected, Outcome::CodeLike),
            Verdict::Implausible => (NutrientValue::Rejected, Outcome::Implausible),
        },
    }
}

// ── Tests ──
