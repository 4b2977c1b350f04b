use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Well-known entity kind tags.
pub mod kinds {
    pub const ROBOT: &str = "robot";
    pub const PERSON: &str = "person";
    pub const HEAD: &str = "head";
}

/// Position in the robot's world frame (meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Debug)]
struct EntityState {
    position: Option<Position>,
    visible: bool,
}

/// Something the robot can address: itself, a person, a body part.
///
/// Identity (id, kind, parent) is fixed at construction; position and
/// visibility are updated by perception while the entity is shared.
#[derive(Debug)]
pub struct Entity {
    id: String,
    kind: String,
    parent: Option<String>,
    state: RwLock<EntityState>,
}

impl Entity {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            parent: None,
            state: RwLock::new(EntityState {
                position: None,
                visible: true,
            }),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_position(self, position: Position) -> Self {
        self.state.write().position = Some(position);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn position(&self) -> Option<Position> {
        self.state.read().position
    }

    pub fn set_position(&self, position: Position) {
        self.state.write().position = Some(position);
    }

    pub fn is_visible(&self) -> bool {
        self.state.read().visible
    }

    pub fn set_visible(&self, visible: bool) {
        self.state.write().visible = visible;
    }

    /// Euclidean distance, if both entities have a known position.
    pub fn distance_to(&self, other: &Entity) -> Option<f64> {
        Some(self.position()?.distance_to(&other.position()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_requires_both_positions() {
        let a = Entity::new(kinds::PERSON, "a").with_position(Position::new(0.0, 0.0, 0.0));
        let b = Entity::new(kinds::PERSON, "b");
        assert_eq!(a.distance_to(&b), None);
        b.set_position(Position::new(3.0, 4.0, 0.0));
        assert_eq!(a.distance_to(&b), Some(5.0));
    }

    #[test]
    fn visibility_toggles() {
        let p = Entity::new(kinds::PERSON, "p");
        assert!(p.is_visible());
        p.set_visible(false);
        assert!(!p.is_visible());
    }
}
