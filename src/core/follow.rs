/*
 * Live coupling between the two rigs. Enabling a direction installs one copy
 * constraint per mapped row on the destination bone, pointing at the matching
 * bone of the other armature. Every constraint this module creates carries the
 * `FOLLOW_LINK` name prefix; teardown removes exactly those and nothing else.
 *
 * Only one direction may be live at a time, since two opposing sets would form
 * a dependency cycle. Enabling always clears both armatures first.
 */
use crate::core::models::{BoneMapRow, FollowDirection, FollowMode};
use crate::core::scene::{Constraint, ConstraintKind, MixMode, Result, Scene, TransformSpace};

pub const FOLLOW_PREFIX: &str = "FOLLOW_LINK";
pub const FOLLOW_ROTATION_NAME: &str = "FOLLOW_LINK_ROT";
pub const FOLLOW_TRANSFORM_NAME: &str = "FOLLOW_LINK_XFORM";

fn follow_constraint(mode: FollowMode, source_armature: &str, source_bone: &str) -> Constraint {
    match mode {
        FollowMode::RotationOnly => Constraint {
            name: FOLLOW_ROTATION_NAME.to_string(),
            kind: ConstraintKind::CopyRotation {
                target: Some(source_armature.to_string()),
                subtarget: source_bone.to_string(),
                mix_mode: MixMode::After,
                target_space: TransformSpace::Pose,
                owner_space: TransformSpace::Pose,
                use_x: true,
                use_y: true,
                use_z: true,
            },
        },
        FollowMode::FullTransform => Constraint {
            name: FOLLOW_TRANSFORM_NAME.to_string(),
            kind: ConstraintKind::CopyTransforms {
                target: Some(source_armature.to_string()),
                subtarget: source_bone.to_string(),
                mix_mode: MixMode::After,
                target_space: TransformSpace::Pose,
                owner_space: TransformSpace::Pose,
            },
        },
    }
}

/// Removes every follow constraint from both armatures. Missing armatures are skipped.
pub fn remove_follow_constraints(scene: &mut Scene, armatures: [&str; 2]) -> usize {
    let mut removed = 0;
    for name in armatures {
        let Ok(arm) = scene.armature_mut(name) else {
            continue;
        };
        for bone in arm.bones.iter_mut() {
            let before = bone.constraints.len();
            bone.constraints
                .retain(|c| !c.name.starts_with(FOLLOW_PREFIX));
            removed += before - bone.constraints.len();
        }
    }
    log::debug!("Follow: Removed {removed} follow constraints.");
    removed
}

/*
 * Installs follow constraints for `direction`. Rows need both an original and a
 * rename; the source armature is addressed by the original name and the target
 * armature by the rename. Rows whose bone is missing on either rig are skipped.
 * Returns the number of constraints added.
 */
pub fn add_follow_constraints(
    scene: &mut Scene,
    source_armature: &str,
    target_armature: &str,
    rows: &[BoneMapRow],
    direction: FollowDirection,
    mode: FollowMode,
) -> Result<usize> {
    let (driver_arm, driven_arm) = match direction {
        FollowDirection::SourceToTarget => (source_armature, target_armature),
        FollowDirection::TargetToSource => (target_armature, source_armature),
    };
    remove_follow_constraints(scene, [source_armature, target_armature]);

    let driver = scene.armature(driver_arm)?;
    let links: Vec<(String, String)> = rows
        .iter()
        .filter(|r| !r.original_name.is_empty() && !r.target_name.is_empty())
        .map(|r| match direction {
            FollowDirection::SourceToTarget => (r.original_name.clone(), r.target_name.clone()),
            FollowDirection::TargetToSource => (r.target_name.clone(), r.original_name.clone()),
        })
        .filter(|(from, _)| driver.has_bone(from))
        .collect();

    let driven = scene.armature_mut(driven_arm)?;
    let mut added = 0;
    for (from, to) in links {
        let Some(bone) = driven.bone_mut(&to) else {
            continue;
        };
        bone.constraints
            .push(follow_constraint(mode, driver_arm, &from));
        added += 1;
    }
    log::debug!("Follow: Added {added} constraints ({direction:?}, {mode:?}).");
    Ok(added)
}

/*
 * Tracks which direction is live. Toggling the live direction turns it off;
 * toggling the other one switches over.
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowState {
    active: Option<FollowDirection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowChange {
    Enabled { direction: FollowDirection, added: usize },
    Disabled { removed: usize },
}

impl FollowState {
    pub fn active(&self) -> Option<FollowDirection> {
        self.active
    }

    pub fn toggle(
        &mut self,
        scene: &mut Scene,
        armatures: (&str, &str),
        rows: &[BoneMapRow],
        direction: FollowDirection,
        mode: FollowMode,
    ) -> Result<FollowChange> {
        let (source, target) = armatures;
        if self.active == Some(direction) {
            return Ok(FollowChange::Disabled {
                removed: self.clear(scene, armatures),
            });
        }
        let added = add_follow_constraints(scene, source, target, rows, direction, mode)?;
        self.active = Some(direction);
        Ok(FollowChange::Enabled { direction, added })
    }

    pub fn clear(&mut self, scene: &mut Scene, armatures: (&str, &str)) -> usize {
        self.active = None;
        remove_follow_constraints(scene, [armatures.0, armatures.1])
    }
}
