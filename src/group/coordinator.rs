//! Group coordinator - pairing and the group/member level contract
//!
//! The coordinator owns the patch surface: every channel appears exactly once,
//! either as a free block or inside a two-member group. It never touches
//! channel records directly; member levels are read from and pushed through
//! the [`MuteSoloMachine`], which is passed in by the single state owner.

use super::layout::{GridLayout, Rect, SnapRules};
use super::pan_law::{derive_levels, initial_group_values};
use crate::backend::MAX_LEVEL;
use crate::state::{GroupId, MixerEvent, MuteSoloMachine};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Reasons a pairing request is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    #[error("Cannot pair {0} with itself")]
    SelfPair(String),

    #[error("{0} is already in a group")]
    AlreadyGrouped(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}

/// Two channels driven by one level and one balance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub id: GroupId,
    pub member_a: String,
    pub member_b: String,
    pub macro_level: u8,
    pub balance: u8,
    pub rect: Rect,
}

impl Group {
    pub fn has_member(&self, name: &str) -> bool {
        self.member_a == name || self.member_b == name
    }

    pub fn members(&self) -> [&str; 2] {
        [self.member_a.as_str(), self.member_b.as_str()]
    }

    fn changed_event(&self) -> MixerEvent {
        MixerEvent::GroupChanged {
            id: self.id,
            member_a: self.member_a.clone(),
            member_b: self.member_b.clone(),
            macro_level: self.macro_level,
            balance: self.balance,
        }
    }
}

/// Anything on the patch surface
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SceneItem {
    Block { name: String, rect: Rect },
    Group(Group),
}

impl SceneItem {
    pub fn rect(&self) -> Rect {
        match self {
            SceneItem::Block { rect, .. } => *rect,
            SceneItem::Group(group) => group.rect,
        }
    }
}

/// Pairing detection and group lifecycle
pub struct GroupCoordinator {
    /// Scene in stable scan order
    items: Vec<SceneItem>,
    grid: GridLayout,
    rules: SnapRules,
    next_id: u32,
}

impl GroupCoordinator {
    pub fn new(grid: GridLayout, rules: SnapRules) -> Self {
        Self {
            items: Vec::new(),
            grid,
            rules,
            next_id: 1,
        }
    }

    /// Lay out one block per channel on the default grid
    pub fn with_channels(machine: &MuteSoloMachine, grid: GridLayout, rules: SnapRules) -> Self {
        let mut coordinator = Self::new(grid, rules);
        for (index, name) in machine.names().iter().enumerate() {
            coordinator.add_block(name, grid.cell(index));
        }
        debug!(blocks = coordinator.items.len(), "Patch surface laid out");
        coordinator
    }

    /// Place a free block. Refused when the name is already on the surface.
    pub fn add_block(&mut self, name: &str, rect: Rect) -> bool {
        if self.contains(name) {
            warn!(channel = %name, "Block already on the surface");
            return false;
        }
        self.items.push(SceneItem::Block {
            name: name.to_string(),
            rect,
        });
        true
    }

    pub fn items(&self) -> &[SceneItem] {
        &self.items
    }

    pub fn rules(&self) -> SnapRules {
        self.rules
    }

    pub fn set_rules(&mut self, rules: SnapRules) {
        if rules != self.rules {
            info!(
                tolerance = rules.tolerance,
                min_overlap = rules.min_overlap,
                "Snap rules updated"
            );
            self.rules = rules;
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.items.iter().filter_map(|item| match item {
            SceneItem::Group(group) => Some(group),
            SceneItem::Block { .. } => None,
        })
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups().find(|g| g.id == id)
    }

    /// Group the channel currently belongs to
    pub fn group_of(&self, name: &str) -> Option<GroupId> {
        self.groups().find(|g| g.has_member(name)).map(|g| g.id)
    }

    /// Box of a free block
    pub fn block_rect(&self, name: &str) -> Option<Rect> {
        self.block_index(name).map(|index| self.items[index].rect())
    }

    fn contains(&self, name: &str) -> bool {
        self.block_index(name).is_some() || self.group_of(name).is_some()
    }

    fn block_index(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| matches!(item, SceneItem::Block { name: n, .. } if n == name))
    }

    fn group_index(&self, id: GroupId) -> Option<usize> {
        self.items
            .iter()
            .position(|item| matches!(item, SceneItem::Group(g) if g.id == id))
    }

    fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.items.iter_mut().find_map(|item| match item {
            SceneItem::Group(group) if group.id == id => Some(group),
            _ => None,
        })
    }

    // =========================================================================
    // Dragging and pairing detection
    // =========================================================================

    /// Move a free block. Grouped members only move with their group.
    pub fn move_block(&mut self, name: &str, x: f64, y: f64) -> bool {
        let Some(index) = self.block_index(name) else {
            if let Some(id) = self.group_of(name) {
                debug!(channel = %name, group = %id, "Grouped member moves with its group");
            } else {
                warn!(channel = %name, "Cannot move unknown block");
            }
            return false;
        };
        if let SceneItem::Block { rect, .. } = &mut self.items[index] {
            *rect = rect.moved_to(x, y);
        }
        true
    }

    /// First free block touching `name`, in scan order
    pub fn find_snap_candidate(&self, name: &str) -> Option<String> {
        let rect = self.block_rect(name)?;
        self.items.iter().find_map(|item| match item {
            SceneItem::Block { name: other, rect: other_rect }
                if other != name && self.rules.touches(&rect, other_rect) =>
            {
                Some(other.clone())
            }
            _ => None,
        })
    }

    /// Run pairing detection once a drag of `name` has ended
    pub fn drag_finished(&mut self, machine: &MuteSoloMachine, name: &str) -> Option<GroupId> {
        let candidate = self.find_snap_candidate(name)?;
        debug!(channel = %name, with = %candidate, "Snap detected");
        match self.pair(machine, name, &candidate) {
            Ok(id) => Some(id),
            Err(e) => {
                debug!("Snap pairing rejected: {}", e);
                None
            }
        }
    }

    // =========================================================================
    // Group lifecycle
    // =========================================================================

    /// Form a group from two free blocks
    ///
    /// The group's level and balance are seeded from the members' current
    /// fader levels. Nothing is pushed to hardware.
    pub fn pair(
        &mut self,
        machine: &MuteSoloMachine,
        name_a: &str,
        name_b: &str,
    ) -> Result<GroupId, PairingError> {
        if name_a == name_b {
            return Err(PairingError::SelfPair(name_a.to_string()));
        }
        for name in [name_a, name_b] {
            if !machine.contains(name) {
                return Err(PairingError::UnknownChannel(name.to_string()));
            }
            if self.group_of(name).is_some() {
                return Err(PairingError::AlreadyGrouped(name.to_string()));
            }
        }
        let (Some(index_a), Some(index_b)) = (self.block_index(name_a), self.block_index(name_b))
        else {
            let missing = if self.block_index(name_a).is_none() {
                name_a
            } else {
                name_b
            };
            return Err(PairingError::UnknownChannel(missing.to_string()));
        };

        let level_a = member_level(machine, name_a);
        let level_b = member_level(machine, name_b);
        let (macro_level, balance) = initial_group_values(level_a, level_b);

        let rect = self.items[index_a].rect().union(&self.items[index_b].rect());
        let id = GroupId(self.next_id);
        self.next_id += 1;

        let group = Group {
            id,
            member_a: name_a.to_string(),
            member_b: name_b.to_string(),
            macro_level,
            balance,
            rect,
        };
        info!(
            "🔗 Grouped {} + {} as {} (level={}, balance={})",
            name_a, name_b, id, macro_level, balance
        );
        machine.publish(group.changed_event());

        // The group takes the earlier member's slot in scan order
        let (first, second) = (index_a.min(index_b), index_a.max(index_b));
        self.items.remove(second);
        self.items[first] = SceneItem::Group(group);

        Ok(id)
    }

    /// Dissolve a group back into two free blocks side by side
    ///
    /// Member levels and mute/solo state are left as they are.
    pub fn ungroup(&mut self, machine: &MuteSoloMachine, id: GroupId) -> bool {
        let Some(index) = self.group_index(id) else {
            warn!(group = %id, "Cannot ungroup unknown group");
            return false;
        };
        let SceneItem::Group(group) = self.items.remove(index) else {
            return false;
        };

        let rect_a = self.grid.block_at(group.rect.x, group.rect.y);
        let rect_b = self.grid.block_at(rect_a.right(), group.rect.y);
        self.items.insert(
            index,
            SceneItem::Block {
                name: group.member_b.clone(),
                rect: rect_b,
            },
        );
        self.items.insert(
            index,
            SceneItem::Block {
                name: group.member_a.clone(),
                rect: rect_a,
            },
        );

        info!("✂️  Ungrouped {} ({} + {})", id, group.member_a, group.member_b);
        machine.publish(MixerEvent::GroupRemoved { id });
        true
    }

    /// Move a group as a unit
    pub fn move_group(&mut self, id: GroupId, x: f64, y: f64) -> bool {
        match self.group_mut(id) {
            Some(group) => {
                group.rect = group.rect.moved_to(x, y);
                true
            }
            None => {
                warn!(group = %id, "Cannot move unknown group");
                false
            }
        }
    }

    // =========================================================================
    // Group to members
    // =========================================================================

    /// Set a group's combined level and push both member levels
    pub fn set_macro_level(&mut self, machine: &mut MuteSoloMachine, id: GroupId, level: u8) -> bool {
        let Some(group) = self.group_mut(id) else {
            warn!(group = %id, "Cannot set level of unknown group");
            return false;
        };
        group.macro_level = level.min(MAX_LEVEL);
        let group = group.clone();
        push_members(machine, &group);
        true
    }

    /// Set a group's balance and push both member levels
    pub fn set_balance(&mut self, machine: &mut MuteSoloMachine, id: GroupId, balance: u8) -> bool {
        let Some(group) = self.group_mut(id) else {
            warn!(group = %id, "Cannot set balance of unknown group");
            return false;
        };
        group.balance = balance.min(MAX_LEVEL);
        let group = group.clone();
        push_members(machine, &group);
        true
    }

    // =========================================================================
    // Members to group
    // =========================================================================

    /// Recompute a group's display state after one member moved on its own
    ///
    /// Called once per real change (a direct level set or an observed
    /// hardware delta). Nothing is pushed back to hardware.
    pub fn reconcile_member(&mut self, machine: &MuteSoloMachine, name: &str) -> Option<GroupId> {
        let id = self.group_of(name)?;
        let group = self.group_mut(id)?;

        let level_a = member_level(machine, &group.member_a);
        let level_b = member_level(machine, &group.member_b);
        let (macro_level, balance) = initial_group_values(level_a, level_b);
        if (macro_level, balance) == (group.macro_level, group.balance) {
            return Some(id);
        }

        debug!(
            group = %id,
            channel = %name,
            macro_level,
            balance,
            "Group reconciled from member levels"
        );
        group.macro_level = macro_level;
        group.balance = balance;
        machine.publish(group.changed_event());
        Some(id)
    }

    // =========================================================================
    // Group mute/solo
    // =========================================================================

    /// Toggle mute on both members: mute both unless both are already muted
    pub fn toggle_group_mute(&self, machine: &mut MuteSoloMachine, id: GroupId) -> bool {
        let Some(group) = self.group(id) else {
            warn!(group = %id, "Cannot mute unknown group");
            return false;
        };
        let [a, b] = group.members();
        let muted = !(member_muted(machine, a) && member_muted(machine, b));
        machine.batch(|m| {
            m.set_mute(a, muted, true, false);
            m.set_mute(b, muted, true, false);
        });
        true
    }

    /// Toggle solo on both members: solo both unless both are already soloed
    pub fn toggle_group_solo(&self, machine: &mut MuteSoloMachine, id: GroupId) -> bool {
        let Some(group) = self.group(id) else {
            warn!(group = %id, "Cannot solo unknown group");
            return false;
        };
        let [a, b] = group.members();
        assert!(machine.contains(a) && machine.contains(b), "group {} lost a member", id);
        let soloed = !(machine.get_solo(a) && machine.get_solo(b));
        machine.batch(|m| {
            m.set_solo(a, soloed, true, false);
            m.set_solo(b, soloed, true, false);
        });
        true
    }
}

/// Fader level of a group member; a missing member is a broken invariant
fn member_level(machine: &MuteSoloMachine, name: &str) -> u8 {
    machine
        .level(name)
        .unwrap_or_else(|| panic!("group member {} missing from the channel map", name))
}

fn member_muted(machine: &MuteSoloMachine, name: &str) -> bool {
    assert!(machine.contains(name), "group member {} missing from the channel map", name);
    machine.get_mute(name)
}

/// Push both pan-law levels through the state machine
fn push_members(machine: &mut MuteSoloMachine, group: &Group) {
    let (level_a, level_b) = derive_levels(group.macro_level, group.balance);
    for name in group.members() {
        assert!(machine.contains(name), "group member {} missing from the channel map", name);
    }
    debug!(
        group = %group.id,
        macro_level = group.macro_level,
        balance = group.balance,
        level_a,
        level_b,
        "Pushing group levels"
    );
    machine.set_level(&group.member_a, level_a);
    machine.set_level(&group.member_b, level_b);
    machine.publish(group.changed_event());
}
