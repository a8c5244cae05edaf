//! Small built-in exercise catalog used by the rule-based evaluator.

use super::equipment::{EquipmentInventory, EquipmentType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyRegion {
    Push,
    Pull,
    Legs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementPattern {
    PushHorizontal,
    PushVertical,
    PullHorizontal,
    PullVertical,
    Squat,
    Hinge,
    Lunge,
    Isolation,
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogExercise {
    pub name: &'static str,
    pub region: BodyRegion,
    pub pattern: MovementPattern,
    /// Any one of these is enough
    pub equipment: &'static [EquipmentType],
    pub compound: bool,
}

impl CatalogExercise {
    pub fn available_with(&self, inventory: &EquipmentInventory) -> bool {
        self.equipment.iter().any(|e| inventory.has(*e))
    }

    pub fn is_barbell(&self) -> bool {
        self.equipment.iter().any(|e| e.is_plate_loaded())
    }
}

use BodyRegion::*;
use EquipmentType as E;
use MovementPattern::*;

const fn ex(
    name: &'static str,
    region: BodyRegion,
    pattern: MovementPattern,
    equipment: &'static [EquipmentType],
    compound: bool,
) -> CatalogExercise {
    CatalogExercise {
        name,
        region,
        pattern,
        equipment,
        compound,
    }
}

// Preference order within a region: first match wins.
static CATALOG: &[CatalogExercise] = &[
    ex("Bench Press", Push, PushHorizontal, &[E::Barbell, E::SmithMachine], true),
    ex("Overhead Press", Push, PushVertical, &[E::Barbell], true),
    ex("Dumbbell Bench Press", Push, PushHorizontal, &[E::Dumbbell], true),
    ex("Dumbbell Shoulder Press", Push, PushVertical, &[E::Dumbbell, E::Kettlebell], true),
    ex("Push Up", Push, PushHorizontal, &[E::Bodyweight], true),
    ex("Lateral Raise", Push, Isolation, &[E::Dumbbell, E::Cable, E::Bands], false),
    ex("Triceps Pushdown", Push, Isolation, &[E::Cable, E::Bands], false),
    ex("Chest Fly", Push, Isolation, &[E::Machine, E::Cable, E::Dumbbell], false),
    ex("Barbell Row", Pull, PullHorizontal, &[E::Barbell], true),
    ex("Lat Pulldown", Pull, PullVertical, &[E::Cable, E::Machine], true),
    ex("Dumbbell Row", Pull, PullHorizontal, &[E::Dumbbell, E::Kettlebell], true),
    ex("Pull Up", Pull, PullVertical, &[E::Bodyweight], true),
    ex("Inverted Row", Pull, PullHorizontal, &[E::Bodyweight], true),
    ex("Bicep Curl", Pull, Isolation, &[E::Dumbbell, E::EzBar, E::Cable, E::Bands], false),
    ex("Face Pull", Pull, Isolation, &[E::Cable, E::Bands], false),
    ex("Squat", Legs, Squat, &[E::Barbell, E::SmithMachine], true),
    ex("Deadlift", Legs, Hinge, &[E::Barbell, E::TrapBar], true),
    ex("Romanian Deadlift", Legs, Hinge, &[E::Barbell, E::Dumbbell], true),
    ex("Goblet Squat", Legs, Squat, &[E::Dumbbell, E::Kettlebell], true),
    ex("Leg Press", Legs, Squat, &[E::Machine], true),
    ex("Kettlebell Swing", Legs, Hinge, &[E::Kettlebell], true),
    ex("Bulgarian Split Squat", Legs, Lunge, &[E::Dumbbell, E::Bodyweight], true),
    ex("Leg Curl", Legs, Isolation, &[E::Machine, E::Cable], false),
    ex("Leg Extension", Legs, Isolation, &[E::Machine], false),
    ex("Calf Raise", Legs, Isolation, &[E::Bodyweight, E::Machine], false),
];

pub fn catalog() -> &'static [CatalogExercise] {
    CATALOG
}

pub fn find(name: &str) -> Option<&'static CatalogExercise> {
    let wanted = name.trim().to_lowercase();
    CATALOG.iter().find(|e| e.name.to_lowercase() == wanted)
}

/// Regions a day focus label trains
pub fn regions_for_focus(focus: &str) -> Vec<BodyRegion> {
    let focus = focus.to_lowercase();
    if focus.contains("push") {
        vec![Push]
    } else if focus.contains("pull") {
        vec![Pull]
    } else if focus.contains("leg") || focus.contains("lower") {
        vec![Legs]
    } else if focus.contains("upper") {
        vec![Push, Pull]
    } else {
        vec![Legs, Push, Pull]
    }
}

/// Catalog entries for a day focus that the inventory supports and the user may do
pub fn candidates(
    focus: &str,
    inventory: &EquipmentInventory,
    restricted: &[String],
    compound: bool,
) -> Vec<&'static CatalogExercise> {
    let mut picked = Vec::new();
    for region in regions_for_focus(focus) {
        picked.extend(CATALOG.iter().filter(|e| {
            e.region == region
                && e.compound == compound
                && e.available_with(inventory)
                && !restricted.contains(&e.name.to_lowercase())
        }));
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_is_case_insensitive() {
        assert_eq!(find(" squat ").map(|e| e.name), Some("Squat"));
        assert!(find("Underwater Basket Weaving").is_none());
    }

    #[test]
    fn test_candidates_respect_equipment_and_restrictions() {
        let inv = EquipmentInventory::new(vec![EquipmentType::Dumbbell]);
        let names: Vec<&str> = candidates("Push", &inv, &[], true)
            .iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Dumbbell Bench Press", "Dumbbell Shoulder Press", "Push Up"]);

        let restricted = vec!["dumbbell bench press".to_string()];
        let first = candidates("Push", &inv, &restricted, true)[0];
        assert_eq!(first.name, "Dumbbell Shoulder Press");
    }

    #[test]
    fn test_full_body_starts_with_legs() {
        let inv = EquipmentInventory::new(vec![EquipmentType::Barbell]);
        let first = candidates("Full Body", &inv, &[], true)[0];
        assert_eq!(first.name, "Squat");
    }
}
