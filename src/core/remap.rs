/*
 * The apply pipeline shared by Apply, Revert and the temporary rename used on
 * export: rename the bones, patch every dependent reference with the very same
 * mapping, then force a dependency refresh. The order is fixed; the patchers
 * address bones by their new names.
 */
use crate::core::models::RenameMapping;
use crate::core::reference_patcher;
use crate::core::rename_engine::{self, RenameError, RepairOutcome, RepairStrategy};
use crate::core::scene::Scene;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyReport {
    pub renamed: usize,
    pub deform_restored: usize,
    pub vertex_groups: usize,
    pub constraints: usize,
    pub curves: usize,
    pub drivers: usize,
}

impl std::fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Renamed {} | VG {} | Con {} | FCurves {} | Drivers {}",
            self.renamed, self.vertex_groups, self.constraints, self.curves, self.drivers
        )
    }
}

// Runs the four patchers and the refresh for a rename that already happened.
fn patch_references(
    scene: &mut Scene,
    armature: &str,
    mapping: &RenameMapping,
    report: &mut ApplyReport,
) -> Result<(), RenameError> {
    report.vertex_groups += reference_patcher::patch_skin_groups(scene, armature, mapping);
    report.constraints += reference_patcher::patch_constraint_subtargets(scene, armature, mapping)?;
    report.curves += reference_patcher::patch_animation_paths(scene, mapping);
    report.drivers += reference_patcher::patch_driver_paths(scene, mapping);
    Ok(())
}

pub fn apply_mapping(
    scene: &mut Scene,
    armature: &str,
    mapping: &RenameMapping,
) -> Result<ApplyReport, RenameError> {
    log::debug!(
        "Remap: Applying {} pairs to armature '{armature}'.",
        mapping.len()
    );
    let outcome = rename_engine::rename_bones(scene.armature_mut(armature)?, mapping)?;
    let mut report = ApplyReport {
        renamed: outcome.renamed,
        deform_restored: outcome.deform_restored,
        ..ApplyReport::default()
    };
    patch_references(scene, armature, mapping, &mut report)?;
    reference_patcher::refresh_dependencies(scene, armature);
    log::info!("Remap: [{armature}] {report}");
    Ok(report)
}

/*
 * Repairs an interrupted batch and then catches the references up with it. The
 * batch stopped before its patch pass, so references still use the old names:
 * they follow the completed pairs first and, for `Undo`, the rollback pairs
 * after that.
 */
pub fn repair_batch(
    scene: &mut Scene,
    armature: &str,
    strategy: RepairStrategy,
) -> Result<(ApplyReport, RepairOutcome), RenameError> {
    let outcome = rename_engine::repair_interrupted(scene.armature_mut(armature)?, strategy)?;
    let mut report = ApplyReport {
        renamed: outcome.renamed,
        deform_restored: outcome.deform_restored,
        ..ApplyReport::default()
    };
    patch_references(scene, armature, &outcome.completed, &mut report)?;
    if !outcome.rolled_back.is_empty() {
        patch_references(scene, armature, &outcome.rolled_back, &mut report)?;
    }
    reference_patcher::refresh_dependencies(scene, armature);
    log::info!("Remap: [{armature}] Repaired ({strategy:?}): {report}");
    Ok((report, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rename_engine::{JournalEntry, RenameJournal};
    use crate::core::scene::test_support::*;
    use crate::core::scene::{
        AnimationData, Constraint, ConstraintKind, DataBlock, DataBlockKind, DataPath, Driver,
        MixMode, TransformSpace,
    };

    fn mapping(pairs: &[(&str, &str)]) -> RenameMapping {
        pairs
            .iter()
            .map(|(o, n)| (o.to_string(), n.to_string()))
            .collect()
    }

    fn hips_scene() -> Scene {
        let mut scene = Scene::new();
        scene.objects.push(armature_object("Rig", &["Hips", "Spine"]));
        scene.objects.push(skinned_mesh("Body", "Rig", &["Hips", "Spine"]));
        scene
            .actions
            .push(action("Walk", &["Hips", "Spine"], Some([1.0, 24.0])));
        scene
    }

    #[test]
    fn test_hips_to_pelvis_scenario() {
        let mut scene = hips_scene();
        scene
            .armature_mut("Rig")
            .unwrap()
            .bone_mut("Hips")
            .unwrap()
            .use_deform = false;

        let report = apply_mapping(&mut scene, "Rig", &mapping(&[("Hips", "Pelvis")])).unwrap();

        assert_eq!(report.renamed, 1);
        assert_eq!(report.vertex_groups, 1);
        assert_eq!(report.curves, 1);
        let arm = scene.armature("Rig").unwrap();
        assert_eq!(arm.bone_names(), vec!["Pelvis", "Spine"]);
        assert!(!arm.bone("Pelvis").unwrap().use_deform);
        let body = scene.object("Body").unwrap().as_mesh().unwrap();
        assert_eq!(body.vertex_groups, vec!["Pelvis", "Spine"]);
        let walk = scene.action("Walk").unwrap();
        assert_eq!(
            walk.curves[0].data_path.to_string(),
            "pose.bones[\"Pelvis\"].rotation_quaternion"
        );
        assert_eq!(walk.curves[1].data_path.bone(), Some("Spine"));
    }

    fn driver(path: &str) -> AnimationData {
        AnimationData {
            action: None,
            drivers: vec![Driver {
                data_path: DataPath::parse(path),
                expression: "var".into(),
            }],
        }
    }

    // Mixed deform flags, a sub-target on the rig and drivers on an object and a data-block.
    fn rigged_scene() -> Scene {
        let mut scene = hips_scene();
        {
            let arm = scene.armature_mut("Rig").unwrap();
            arm.bone_mut("Hips").unwrap().use_deform = false;
            arm.bone_mut("Spine").unwrap().constraints.push(Constraint {
                name: "Lean".into(),
                kind: ConstraintKind::CopyRotation {
                    target: Some("Rig".into()),
                    subtarget: "Hips".into(),
                    mix_mode: MixMode::Add,
                    target_space: TransformSpace::Local,
                    owner_space: TransformSpace::Local,
                    use_x: true,
                    use_y: false,
                    use_z: true,
                },
            });
        }
        scene.object_mut("Rig").unwrap().animation_data =
            Some(driver("pose.bones[\"Spine\"].rotation_euler"));
        scene.data_blocks.push(DataBlock {
            name: "FaceKeys".into(),
            kind: DataBlockKind::ShapeKeys,
            animation_data: Some(driver("pose.bones[\"Hips\"].location")),
        });
        scene
    }

    fn first_driver_bone(anim: &Option<AnimationData>) -> Option<&str> {
        anim.as_ref()?.drivers.first()?.data_path.bone()
    }

    #[test]
    fn test_apply_then_inverse_restores_scene() {
        // Arrange
        let mut scene = rigged_scene();
        let before = scene.clone();
        let forward = mapping(&[("Hips", "Pelvis"), ("Spine", "Chest")]);

        // Act
        let report = apply_mapping(&mut scene, "Rig", &forward).unwrap();

        // Assert
        assert_eq!(report.constraints, 1);
        assert_eq!(report.drivers, 2);
        let arm = scene.armature("Rig").unwrap();
        assert!(!arm.bone("Pelvis").unwrap().use_deform);
        assert!(arm.bone("Chest").unwrap().use_deform);
        assert_eq!(
            arm.bone("Chest").unwrap().constraints[0].kind.subtarget(),
            Some("Pelvis")
        );
        assert_eq!(
            first_driver_bone(&scene.object("Rig").unwrap().animation_data),
            Some("Chest")
        );
        assert_eq!(
            first_driver_bone(&scene.data_blocks[0].animation_data),
            Some("Pelvis")
        );

        // Act
        apply_mapping(&mut scene, "Rig", &forward.inverse()).unwrap();

        // Assert
        let arm = scene.armature("Rig").unwrap();
        assert!(!arm.bone("Hips").unwrap().use_deform);
        assert!(arm.bone("Spine").unwrap().use_deform);
        assert_eq!(scene.objects, before.objects);
        assert_eq!(scene.data_blocks, before.data_blocks);
        assert_eq!(scene.actions, before.actions);
        assert_eq!(scene.frame_current, before.frame_current);
    }

    #[test]
    fn test_repair_complete_catches_references_up() {
        let mut scene = hips_scene();
        {
            let arm = scene.armature_mut("Rig").unwrap();
            arm.bones[0].name = format!("Pelvis{}", rename_engine::RESERVED_SUFFIX);
            arm.pending_rename = Some(RenameJournal {
                entries: vec![JournalEntry {
                    old: "Hips".into(),
                    new: "Pelvis".into(),
                    finalized: false,
                }],
                started_at: 0,
            });
        }

        let (report, outcome) = repair_batch(&mut scene, "Rig", RepairStrategy::Complete).unwrap();

        assert_eq!(report.renamed, 1);
        assert_eq!(report.vertex_groups, 1);
        assert_eq!(report.curves, 1);
        assert_eq!(outcome.completed, mapping(&[("Hips", "Pelvis")]));
        let body = scene.object("Body").unwrap().as_mesh().unwrap();
        assert_eq!(body.vertex_groups, vec!["Pelvis", "Spine"]);
        assert_eq!(
            scene.action("Walk").unwrap().curves[0].data_path.bone(),
            Some("Pelvis")
        );
    }

    #[test]
    fn test_apply_to_missing_armature_fails() {
        let mut scene = hips_scene();
        let result = apply_mapping(&mut scene, "Nope", &mapping(&[("Hips", "Pelvis")]));
        assert!(matches!(result, Err(RenameError::Scene(_))));
    }
}
