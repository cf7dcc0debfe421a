use uuid::Uuid;

use crate::types::EntityKind;

/// A row write the cascade protocol reacts to. Inserts always fire; updates
/// fire only when `is_active` actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firing {
    Inserted { kind: EntityKind, id: Uuid, is_active: bool },
    Updated { kind: EntityKind, id: Uuid, was: bool, now: bool },
}

impl Firing {
    /// Firing for a write whose previous `is_active` was `prior` (`None` for
    /// a fresh insert). Re-writing the same value fires nothing.
    pub fn after_write(kind: EntityKind, id: Uuid, prior: Option<bool>, now: bool) -> Option<Self> {
        match prior {
            None => Some(Firing::Inserted { kind, id, is_active: now }),
            Some(was) if was != now => Some(Firing::Updated { kind, id, was, now }),
            Some(_) => None,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match *self {
            Firing::Inserted { kind, .. } | Firing::Updated { kind, .. } => kind,
        }
    }

    pub fn id(&self) -> Uuid {
        match *self {
            Firing::Inserted { id, .. } | Firing::Updated { id, .. } => id,
        }
    }

    /// The row is active now and was not (or did not exist) before.
    pub fn became_active(&self) -> bool {
        match *self {
            Firing::Inserted { is_active, .. } => is_active,
            Firing::Updated { was, now, .. } => !was && now,
        }
    }

    /// Only an update that switched the row off pushes down to its children.
    pub fn cascades_down(&self) -> bool {
        matches!(self, Firing::Updated { was: true, now: false, .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentAction {
    /// Write `is_active = false` on the parent (a no-op if it already is).
    ForceInactive,
    Leave,
}

/// Upward rule, evaluated after a child write. `active_children` counts the
/// parent's active children including the child's new value.
///
/// A parent is never switched on from below: an inactive parent whose child
/// just became active is held inactive. Only a direct update of the parent
/// activates it.
pub fn reevaluate_parent(active_children: i64, parent_active: bool, child_became_active: bool) -> ParentAction {
    match (active_children, parent_active, child_became_active) {
        (0, _, _) => ParentAction::ForceInactive,
        (_, false, true) => ParentAction::ForceInactive,
        _ => ParentAction::Leave,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn unchanged_value_fires_nothing() {
        assert_eq!(Firing::after_write(EntityKind::Market, id(), Some(true), true), None);
        assert_eq!(Firing::after_write(EntityKind::Market, id(), Some(false), false), None);
    }

    #[test]
    fn inserts_always_fire() {
        let firing = Firing::after_write(EntityKind::Event, id(), None, false).unwrap();
        assert!(matches!(firing, Firing::Inserted { is_active: false, .. }));
        assert!(!firing.cascades_down());
        assert!(!firing.became_active());
    }

    #[test]
    fn only_deactivation_cascades_down() {
        let off = Firing::after_write(EntityKind::Sport, id(), Some(true), false).unwrap();
        let on = Firing::after_write(EntityKind::Sport, id(), Some(false), true).unwrap();
        assert!(off.cascades_down());
        assert!(!on.cascades_down());
        assert!(on.became_active());
    }

    #[test]
    fn no_active_children_forces_parent_off() {
        assert_eq!(reevaluate_parent(0, true, false), ParentAction::ForceInactive);
        assert_eq!(reevaluate_parent(0, false, false), ParentAction::ForceInactive);
    }

    #[test]
    fn child_activation_never_wakes_a_dormant_parent() {
        assert_eq!(reevaluate_parent(1, false, true), ParentAction::ForceInactive);
        assert_eq!(reevaluate_parent(3, false, true), ParentAction::ForceInactive);
    }

    #[test]
    fn active_parent_with_active_children_is_left_alone() {
        assert_eq!(reevaluate_parent(2, true, false), ParentAction::Leave);
        assert_eq!(reevaluate_parent(1, true, true), ParentAction::Leave);
        // Inactive parent, sibling deactivated but others still active.
        assert_eq!(reevaluate_parent(1, false, false), ParentAction::Leave);
    }
}
