//! Entity component definitions.
//!
//! Components are plain data. Behavior lives in the movement, order and
//! simulation modules that read them.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::map::TileCoord;

/// Unique identifier for entities.
pub type EntityId = u64;

/// Ownership of an entity.
///
/// Hostility is decided by team: players on the same team never fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Owner {
    /// Owning player index.
    pub player: u8,
    /// Team the player belongs to.
    pub team: u8,
}

impl Owner {
    /// Create a new owner.
    #[must_use]
    pub const fn new(player: u8, team: u8) -> Self {
        Self { player, team }
    }

    /// Check whether `other` is hostile to this owner.
    #[must_use]
    pub const fn is_enemy(&self, other: &Self) -> bool {
        self.team != other.team
    }
}

/// Ranged or melee weapon used for engagements.
///
/// Damage resolution is not modelled; a weapon only defines reach and how
/// fast its shots travel, which is what targeting needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    /// Engagement range in world units.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Projectile speed in world units per second (0 = hitscan).
    #[serde(with = "fixed_serde")]
    pub projectile_speed: Fixed,
}

impl Weapon {
    /// Create a hitscan weapon with the given range.
    #[must_use]
    pub const fn new(range: Fixed) -> Self {
        Self {
            range,
            projectile_speed: Fixed::ZERO,
        }
    }

    /// Builder method to set projectile speed.
    #[must_use]
    pub const fn with_projectile_speed(mut self, speed: Fixed) -> Self {
        self.projectile_speed = speed;
        self
    }

    /// Check if this weapon fires travelling projectiles.
    #[must_use]
    pub fn uses_projectiles(&self) -> bool {
        self.projectile_speed > Fixed::ZERO
    }

    /// Check whether `target` is within reach from `origin`.
    #[must_use]
    pub fn in_range(&self, origin: Vec2Fixed, target: Vec2Fixed) -> bool {
        origin.distance_squared(target) <= self.range.saturating_mul(self.range)
    }
}

/// Building footprint on the tile map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    /// Lowest-coordinate tile covered.
    pub origin: TileCoord,
    /// Width in tiles.
    pub width: u8,
    /// Height in tiles.
    pub height: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_hostility_by_team() {
        let a = Owner::new(0, 0);
        let ally = Owner::new(1, 0);
        let enemy = Owner::new(2, 1);
        assert!(!a.is_enemy(&ally));
        assert!(a.is_enemy(&enemy));
        assert!(enemy.is_enemy(&a));
    }

    #[test]
    fn test_weapon_range_is_inclusive() {
        let weapon = Weapon::new(Fixed::from_num(5));
        let origin = Vec2Fixed::ZERO;
        assert!(weapon.in_range(origin, Vec2Fixed::from_int(3, 4)));
        assert!(!weapon.in_range(origin, Vec2Fixed::from_int(4, 4)));
    }
}
