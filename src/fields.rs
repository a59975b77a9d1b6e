use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// Every nutrient column the four IBGE tables can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    // Table 1: macronutrients
    EnergyKcal,
    ProteinG,
    LipidsG,
    CarbohydrateG,
    FiberG,
    // Table 2: fats and sugars
    CholesterolMg,
    SaturatedG,
    MonounsaturatedG,
    PolyunsaturatedG,
    LinoleicG,
    LinolenicG,
    TransG,
    TotalSugarG,
    AddedSugarG,
    // Table 3: minerals
    CalciumMg,
    MagnesiumMg,
    ManganeseMg,
    PhosphorusMg,
    IronMg,
    SodiumMg,
    PotassiumMg,
    CopperMg,
    ZincMg,
    SeleniumMcg,
    // Table 4: vitamins
    RetinolMcg,
    VitaminARaeMcg,
    ThiamineMg,
    RiboflavinMg,
    NiacinMg,
    NiacinNeMg,
    PyridoxineMg,
    VitaminB12Mcg,
    FolateMcg,
    VitaminDMcg,
    VitaminEMg,
    VitaminCMg,
}

impl Field {
    pub const ALL: &'static [Field] = &[
        Field::EnergyKcal,
        Field::ProteinG,
        Field::LipidsG,
        Field::CarbohydrateG,
        Field::FiberG,
        Field::CholesterolMg,
        Field::SaturatedG,
        Field::MonounsaturatedG,
        Field::PolyunsaturatedG,
        Field::LinoleicG,
        Field::LinolenicG,
        Field::TransG,
        Field::TotalSugarG,
        Field::AddedSugarG,
        Field::CalciumMg,
        Field::MagnesiumMg,
        Field::ManganeseMg,
        Field::PhosphorusMg,
        Field::IronMg,
        Field::SodiumMg,
        Field::PotassiumMg,
        Field::CopperMg,
        Field::ZincMg,
        Field::SeleniumMcg,
        Field::RetinolMcg,
        Field::VitaminARaeMcg,
        Field::ThiamineMg,
        Field::RiboflavinMg,
        Field::NiacinMg,
        Field::NiacinNeMg,
        Field::PyridoxineMg,
        Field::VitaminB12Mcg,
        Field::FolateMcg,
        Field::VitaminDMcg,
        Field::VitaminEMg,
        Field::VitaminCMg,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::EnergyKcal => "energy_kcal",
            Field::ProteinG => "protein_g",
            Field::LipidsG => "lipids_g",
            Field::CarbohydrateG => "carbohydrate_g",
            Field::FiberG => "fiber_g",
            Field::CholesterolMg => "cholesterol_mg",
            Field::SaturatedG => "saturated_g",
            Field::MonounsaturatedG => "monounsaturated_g",
            Field::PolyunsaturatedG => "polyunsaturated_g",
            Field::LinoleicG => "linoleic_g",
            Field::LinolenicG => "linolenic_g",
            Field::TransG => "trans_g",
            Field::TotalSugarG => "total_sugar_g",
            Field::AddedSugarG => "added_sugar_g",
            Field::CalciumMg => "calcium_mg",
            Field::MagnesiumMg => "magnesium_mg",
            Field::ManganeseMg => "manganese_mg",
            Field::PhosphorusMg => "phosphorus_mg",
            Field::IronMg => "iron_mg",
            Field::SodiumMg => "sodium_mg",
            Field::PotassiumMg => "potassium_mg",
            Field::CopperMg => "copper_mg",
            Field::ZincMg => "zinc_mg",
            Field::SeleniumMcg => "selenium_mcg",
            Field::RetinolMcg => "retinol_mcg",
            Field::VitaminARaeMcg => "vitamin_a_rae_mcg",
            Field::ThiamineMg => "thiamine_mg",
            Field::RiboflavinMg => "riboflavin_mg",
            Field::NiacinMg => "niacin_mg",
            Field::NiacinNeMg => "niacin_ne_mg",
            Field::PyridoxineMg => "pyridoxine_mg",
            Field::VitaminB12Mcg => "vitamin_b12_mcg",
            Field::FolateMcg => "folate_mcg",
            Field::VitaminDMcg => "vitamin_d_mcg",
            Field::VitaminEMg => "vitamin_e_mg",
            Field::VitaminCMg => "vitamin_c_mg",
        }
    }

    /// Inclusive per-100g bounds used when the configuration does not override them.
    pub fn default_range(self) -> (f64, f64) {
        match self {
            Field::EnergyKcal => (0.0, 900.0),
            Field::ProteinG
            | Field::LipidsG
            | Field::CarbohydrateG
            | Field::SaturatedG
            | Field::MonounsaturatedG
            | Field::PolyunsaturatedG
            | Field::LinoleicG
            | Field::LinolenicG
            | Field::TransG
            | Field::TotalSugarG
            | Field::AddedSugarG => (0.0, 100.0),
            Field::FiberG => (0.0, 50.0),
            Field::CholesterolMg => (0.0, 3000.0),
            Field::CalciumMg | Field::PhosphorusMg => (0.0, 2000.0),
            Field::MagnesiumMg => (0.0, 1000.0),
            Field::ManganeseMg | Field::IronMg | Field::CopperMg => (0.0, 50.0),
            Field::SodiumMg => (0.0, 10000.0),
            Field::PotassiumMg => (0.0, 5000.0),
            Field::ZincMg => (0.0, 100.0),
            Field::SeleniumMcg => (0.0, 1000.0),
            Field::RetinolMcg | Field::VitaminARaeMcg => (0.0, 10000.0),
            Field::ThiamineMg | Field::RiboflavinMg | Field::PyridoxineMg => (0.0, 100.0),
            Field::NiacinMg | Field::NiacinNeMg => (0.0, 500.0),
            Field::VitaminB12Mcg | Field::VitaminDMcg => (0.0, 1000.0),
            Field::FolateMcg => (0.0, 5000.0),
            Field::VitaminEMg => (0.0, 200.0),
            Field::VitaminCMg => (0.0, 2000.0),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| wanted.to_string())
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for field in Field::ALL {
            assert_eq!(field.name().parse::<Field>(), Ok(*field));
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!("vitamin_k_mcg".parse::<Field>(), Err("vitamin_k_mcg".to_string()));
    }

    #[test]
    fn default_ranges_are_ordered() {
        for field in Field::ALL {
            let (min, max) = field.default_range();
            assert!(min <= max, "{} has inverted range", field);
        }
    }
}
