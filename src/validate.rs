use std::collections::HashMap;

use crate::fields::Field;

/// Values at or above this are food codes that slipped into a value column.
pub const CODE_LIKE_MIN: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn contains(&self, v: f64) -> bool {
        self.min <= v && v <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Accept(f64),
    CodeLike,
    Implausible,
}

/// Per-field physiological bounds (per 100 g of food).
#[derive(Debug, Clone)]
pub struct Plausibility {
    ranges: HashMap<Field, Range>,
}

impl Default for Plausibility {
    fn default() -> Self {
        Plausibility::from_ranges(HashMap::new())
    }
}

impl Plausibility {
    /// Overrides win; every other field keeps its catalog default.
    pub fn from_ranges(overrides: HashMap<Field, Range>) -> Self {
        let mut ranges: HashMap<Field, Range> = Field::ALL
            .iter()
            .map(|f| {
                let (min, max) = f.default_range();
                (*f, Range { min, max })
            })
            .collect();
        ranges.extend(overrides);
        Plausibility { ranges }
    }

    pub fn range(&self, field: Field) -> Range {
        self.ranges[&field]
    }

    pub fn check(&self, field: Field, value: f64) -> Verdict {
        if !value.is_finite() {
            return Verdict::Implausible;
        }
        if value >= CODE_LIKE_MIN {
            return Verdict::CodeLike;
        }
        if self.range(field).contains(value) {
            Verdict::Accept(value)
        } else {
            Verdict::Implausible
        }
    }
}

// ── Tests ──
