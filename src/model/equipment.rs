use serde::{Deserialize, Serialize};

use crate::error::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentType {
    Barbell,
    Dumbbell,
    Kettlebell,
    Cable,
    Machine,
    Bodyweight,
    Bands,
    EzBar,
    TrapBar,
    SmithMachine,
}

impl EquipmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentType::Barbell => "barbell",
            EquipmentType::Dumbbell => "dumbbell",
            EquipmentType::Kettlebell => "kettlebell",
            EquipmentType::Cable => "cable",
            EquipmentType::Machine => "machine",
            EquipmentType::Bodyweight => "bodyweight",
            EquipmentType::Bands => "bands",
            EquipmentType::EzBar => "ez_bar",
            EquipmentType::TrapBar => "trap_bar",
            EquipmentType::SmithMachine => "smith_machine",
        }
    }

    /// Equipment that takes plates
    pub fn is_plate_loaded(&self) -> bool {
        matches!(
            self,
            EquipmentType::Barbell | EquipmentType::EzBar | EquipmentType::TrapBar
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Lb,
    Kg,
}

impl WeightUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightUnit::Lb => "lb",
            WeightUnit::Kg => "kg",
        }
    }

    fn fallback_increment(&self) -> f64 {
        match self {
            WeightUnit::Lb => 2.5,
            WeightUnit::Kg => 1.25,
        }
    }
}

/// A plate size and how many pairs of it exist
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlatePair {
    pub weight: f64,
    pub pairs: u32,
}

/// What the user can train with; declared constraints must agree with each other
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EquipmentInventory {
    pub available: Vec<EquipmentType>,
    #[serde(default)]
    pub unit: WeightUnit,
    #[serde(default)]
    pub plates: Vec<PlatePair>,
    #[serde(default)]
    pub barbell_weight: Option<f64>,
    #[serde(default)]
    pub dumbbell_max: Option<f64>,
}

impl EquipmentInventory {
    pub fn new(available: Vec<EquipmentType>) -> Self {
        Self {
            available,
            ..Default::default()
        }
    }

    pub fn has(&self, equipment: EquipmentType) -> bool {
        // Bodyweight work needs nothing
        equipment == EquipmentType::Bodyweight || self.available.contains(&equipment)
    }

    pub fn has_plate_loaded(&self) -> bool {
        self.available.iter().any(|e| e.is_plate_loaded())
    }

    /// Reject inventories that are malformed or contradict themselves
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.available.is_empty() {
            return Err(PlanError::InvalidEquipment(
                "no equipment declared (use `bodyweight` for none)".to_string(),
            ));
        }

        for plate in &self.plates {
            if !plate.weight.is_finite() || plate.weight <= 0.0 {
                return Err(PlanError::InvalidEquipment(format!(
                    "plate weight must be positive, got {}",
                    plate.weight
                )));
            }
        }

        if !self.plates.is_empty() && !self.has_plate_loaded() {
            return Err(PlanError::InvalidEquipment(
                "plates declared without any plate-loaded bar".to_string(),
            ));
        }

        if let Some(bar) = self.barbell_weight {
            if !bar.is_finite() || bar <= 0.0 {
                return Err(PlanError::InvalidEquipment(format!(
                    "barbell weight must be positive, got {}",
                    bar
                )));
            }
            if !self.has(EquipmentType::Barbell) {
                return Err(PlanError::InvalidEquipment(
                    "barbell weight declared but no barbell available".to_string(),
                ));
            }
        }

        if let Some(max) = self.dumbbell_max {
            if !max.is_finite() || max <= 0.0 {
                return Err(PlanError::InvalidEquipment(format!(
                    "dumbbell max must be positive, got {}",
                    max
                )));
            }
            if !self.has(EquipmentType::Dumbbell) {
                return Err(PlanError::InvalidEquipment(
                    "dumbbell max declared but no dumbbells available".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Smallest load jump: the lightest plate with at least one pair, on both sides
    pub fn min_increment(&self) -> f64 {
        self.plates
            .iter()
            .filter(|p| p.pairs >= 1)
            .map(|p| p.weight)
            .fold(None, |min: Option<f64>, w| Some(min.map_or(w, |m| m.min(w))))
            .map(|w| w * 2.0)
            .unwrap_or_else(|| self.unit.fallback_increment())
    }

    pub fn summary(&self) -> String {
        let names: Vec<&str> = self.available.iter().map(|e| e.as_str()).collect();
        let mut lines = vec![format!("Equipment: {}", names.join(", "))];
        lines.push(format!("Weight unit: {}", self.unit.as_str()));
        if let Some(bar) = self.barbell_weight {
            lines.push(format!("Barbell weight: {}{}", bar, self.unit.as_str()));
        }
        if let Some(max) = self.dumbbell_max {
            lines.push(format!("Max dumbbell: {}{}", max, self.unit.as_str()));
        }
        lines.push(format!(
            "Min increment: {}{}",
            self.min_increment(),
            self.unit.as_str()
        ));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_increment_from_plates() {
        let inv = EquipmentInventory {
            available: vec![EquipmentType::Barbell],
            plates: vec![
                PlatePair { weight: 45.0, pairs: 2 },
                PlatePair { weight: 2.5, pairs: 1 },
                PlatePair { weight: 1.25, pairs: 0 },
            ],
            ..Default::default()
        };
        assert_eq!(inv.min_increment(), 5.0);
    }

    #[test]
    fn test_min_increment_fallback() {
        let mut inv = EquipmentInventory::new(vec![EquipmentType::Dumbbell]);
        assert_eq!(inv.min_increment(), 2.5);
        inv.unit = WeightUnit::Kg;
        assert_eq!(inv.min_increment(), 1.25);
    }

    #[test]
    fn test_contradictions_rejected() {
        let plates_no_bar = EquipmentInventory {
            available: vec![EquipmentType::Dumbbell],
            plates: vec![PlatePair { weight: 10.0, pairs: 2 }],
            ..Default::default()
        };
        assert!(matches!(
            plates_no_bar.validate(),
            Err(PlanError::InvalidEquipment(_))
        ));

        let dumbbell_max_no_dumbbells = EquipmentInventory {
            available: vec![EquipmentType::Barbell],
            dumbbell_max: Some(50.0),
            ..Default::default()
        };
        assert!(dumbbell_max_no_dumbbells.validate().is_err());

        assert!(EquipmentInventory::default().validate().is_err());
    }

    #[test]
    fn test_bodyweight_always_available() {
        let inv = EquipmentInventory::new(vec![EquipmentType::Bands]);
        assert!(inv.validate().is_ok());
        assert!(inv.has(EquipmentType::Bodyweight));
        assert!(!inv.has(EquipmentType::Barbell));
    }
}
