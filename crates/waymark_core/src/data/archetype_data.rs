//! Unit archetype definitions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::components::Weapon;
use crate::cost::{ClimbingPolicy, CostPolicy, GroundPolicy};
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, Fixed};

/// How an archetype crosses terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Traversal {
    /// Walks, but cannot climb steps higher than `max_step`.
    Ground {
        /// Largest height difference between adjacent tile centers.
        #[serde(with = "fixed_serde")]
        max_step: Fixed,
    },
    /// Climbs any slope at a cost.
    Climbing {
        /// Multiplier on vertical distance.
        #[serde(with = "fixed_serde")]
        climb_penalty: Fixed,
    },
}

/// Data-driven archetype definition.
///
/// # Example RON
///
/// ```ron
/// ArchetypeData(
///     name: "rifleman",
///     speed: 8589934592,  // Fixed-point for 2.0
///     traversal: Ground(max_step: 4294967296),
///     weapon: Some(Weapon(
///         range: 21474836480,  // Fixed-point for 5.0
///         projectile_speed: 42949672960,
///     )),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeData {
    /// Unique archetype name.
    pub name: String,

    /// Planar speed in world units per second (fixed-point).
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,

    /// Terrain rules.
    pub traversal: Traversal,

    /// Weapon (None for unarmed units).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon: Option<Weapon>,
}

impl ArchetypeData {
    /// Build the cost policy injected into units of this archetype.
    #[must_use]
    pub fn build_policy(&self) -> Arc<dyn CostPolicy> {
        match self.traversal {
            Traversal::Ground { max_step } => Arc::new(GroundPolicy::new(self.speed, max_step)),
            Traversal::Climbing { climb_penalty } => {
                Arc::new(ClimbingPolicy::new(self.speed, climb_penalty))
            }
        }
    }

    /// Check if units of this archetype can fight.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.weapon.is_some()
    }
}

/// A named collection of archetypes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeSet {
    /// Archetypes in declaration order.
    pub archetypes: Vec<ArchetypeData>,
}

impl ArchetypeSet {
    /// Parse a RON document.
    ///
    /// `label` names the source in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] on malformed RON, a
    /// non-positive speed or a duplicate name.
    pub fn from_ron(label: &str, source: &str) -> Result<Self> {
        let set: Self = ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: label.to_string(),
            message: e.to_string(),
        })?;
        set.validate(label)?;
        tracing::debug!(source = label, count = set.archetypes.len(), "Archetypes loaded");
        Ok(set)
    }

    fn validate(&self, label: &str) -> Result<()> {
        let invalid = |message: String| GameError::DataParseError {
            path: label.to_string(),
            message,
        };
        for (i, archetype) in self.archetypes.iter().enumerate() {
            if archetype.speed <= Fixed::ZERO {
                return Err(invalid(format!("archetype '{}' has non-positive speed", archetype.name)));
            }
            if self.archetypes[..i].iter().any(|a| a.name == archetype.name) {
                return Err(invalid(format!("duplicate archetype '{}'", archetype.name)));
            }
        }
        Ok(())
    }

    /// Look up an archetype by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArchetypeData> {
        self.archetypes.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        ArchetypeSet(
            archetypes: [
                ArchetypeData(
                    name: "rifleman",
                    speed: 8589934592,
                    traversal: Ground(max_step: 4294967296),
                    weapon: Some(Weapon(range: 21474836480, projectile_speed: 42949672960)),
                ),
                ArchetypeData(
                    name: "goat",
                    speed: 4294967296,
                    traversal: Climbing(climb_penalty: 12884901888),
                ),
            ],
        )
    "#;

    #[test]
    fn test_parse_archetypes() {
        let set = ArchetypeSet::from_ron("sample", SAMPLE).unwrap();
        assert_eq!(set.archetypes.len(), 2);

        let rifleman = set.get("rifleman").unwrap();
        assert_eq!(rifleman.speed, Fixed::from_num(2));
        assert_eq!(rifleman.weapon.map(|w| w.range), Some(Fixed::from_num(5)));
        assert!(rifleman.is_armed());

        let goat = set.get("goat").unwrap();
        assert_eq!(
            goat.traversal,
            Traversal::Climbing { climb_penalty: Fixed::from_num(3) }
        );
        assert!(!goat.is_armed());
        assert!(set.get("tank").is_none());
    }

    #[test]
    fn test_build_policy_uses_speed() {
        let set = ArchetypeSet::from_ron("sample", SAMPLE).unwrap();
        let policy = set.get("goat").unwrap().build_policy();
        assert_eq!(policy.speed(), Fixed::ONE);
        assert_eq!(policy.vertical_scale(), Fixed::from_num(3));
    }

    #[test]
    fn test_malformed_ron_reports_label() {
        let err = ArchetypeSet::from_ron("units.ron", "ArchetypeSet(archetypes: [").unwrap_err();
        assert!(matches!(err, GameError::DataParseError { ref path, .. } if path == "units.ron"));
    }

    #[test]
    fn test_rejects_bad_values() {
        let zero_speed = r#"ArchetypeSet(archetypes: [
            ArchetypeData(name: "rock", speed: 0, traversal: Ground(max_step: 0)),
        ])"#;
        assert!(ArchetypeSet::from_ron("x", zero_speed).is_err());

        let duplicate = r#"ArchetypeSet(archetypes: [
            ArchetypeData(name: "a", speed: 4294967296, traversal: Ground(max_step: 0)),
            ArchetypeData(name: "a", speed: 4294967296, traversal: Ground(max_step: 0)),
        ])"#;
        assert!(ArchetypeSet::from_ron("x", duplicate).is_err());
    }
}
