use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use windward_protocol::{BuildingKind, UnitKind};

/// Static game rules, loaded once per session. The embedded default set
/// ships with the binary; a file can override it for rule variants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rules {
    pub units: BTreeMap<UnitKind, UnitStats>,
    pub buildings: BTreeMap<BuildingKind, BuildingStats>,
    pub settlement: SettlementRules,
    pub succession: SuccessionRules,
    pub victory: VictorySettings,
    pub starting_gold: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitStats {
    pub moves: u8,
    pub sight: u32,
    pub attack: i32,
    pub defence: i32,
    pub cost: i32,
    #[serde(default)]
    pub naval: bool,
    /// Units the carrier can hold; zero for everything else.
    #[serde(default)]
    pub capacity: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildingStats {
    pub cost: i32,
    #[serde(default)]
    pub production_bonus: i32,
    /// Must sit on a coastal tile.
    #[serde(default)]
    pub coastal: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementRules {
    pub sight: u32,
    /// Food a settlement gathers per round before bonuses.
    pub food_yield: u32,
    /// Stockpiled food consumed for one population growth step.
    pub growth_food: u32,
}

/// Thresholds for the once-per-game transfer-of-power event. The scoring
/// formula itself is a pluggable policy; these weights feed the default.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuccessionRules {
    pub enabled: bool,
    /// The event cannot fire before this turn.
    pub earliest_turn: u32,
    /// Some live player must reach this score for the event to arm.
    pub strong_threshold: i64,
    /// Only AI players at or below this score may be absorbed.
    pub weak_threshold: i64,
    pub unit_weight: i64,
    pub settlement_weight: i64,
    pub building_weight: i64,
    /// Gold contributes score / this divisor.
    pub gold_divisor: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VictorySettings {
    pub elimination: bool,
    /// Score victory at this turn; zero disables the limit.
    pub turn_limit: u32,
}

#[derive(Clone, Debug)]
pub enum RulesSource {
    Embedded,
    Path(PathBuf),
}

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("failed to read rules file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse rules: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("rules are missing stats for {0}")]
    MissingKind(String),
}

const EMBEDDED_RULES: &str = include_str!("../rules/default.yaml");

pub fn load_rules(source: RulesSource) -> Result<Rules, RulesError> {
    let text = match source {
        RulesSource::Embedded => EMBEDDED_RULES.to_string(),
        RulesSource::Path(path) => std::fs::read_to_string(path)?,
    };
    let rules: Rules = serde_yaml::from_str(&text)?;
    validate(&rules)?;
    Ok(rules)
}

fn validate(rules: &Rules) -> Result<(), RulesError> {
    for kind in [
        UnitKind::Settler,
        UnitKind::Soldier,
        UnitKind::Scout,
        UnitKind::Dragoon,
        UnitKind::Caravel,
    ] {
        if !rules.units.contains_key(&kind) {
            return Err(RulesError::MissingKind(format!("{kind:?}")));
        }
    }
    for kind in [
        BuildingKind::TownHall,
        BuildingKind::Stockade,
        BuildingKind::Warehouse,
        BuildingKind::Dock,
        BuildingKind::Chapel,
    ] {
        if !rules.buildings.contains_key(&kind) {
            return Err(RulesError::MissingKind(format!("{kind:?}")));
        }
    }
    Ok(())
}

impl Rules {
    pub fn unit(&self, kind: UnitKind) -> &UnitStats {
        &self.units[&kind]
    }

    pub fn building(&self, kind: BuildingKind) -> &BuildingStats {
        &self.buildings[&kind]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_rules_load() {
        let rules = load_rules(RulesSource::Embedded).unwrap();
        assert!(rules.unit(UnitKind::Caravel).naval);
        assert!(rules.unit(UnitKind::Caravel).capacity > 0);
        assert_eq!(rules.unit(UnitKind::Settler).attack, 0);
        assert!(rules.succession.strong_threshold > rules.succession.weak_threshold);
    }
}
