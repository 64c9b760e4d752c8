/*
 * Rewrites everything that refers to a bone by name so it keeps resolving after
 * a rename: vertex groups on skinned meshes, constraint sub-targets, animation
 * curve paths and driver paths. All four passes take the same old -> new
 * mapping the rename engine used and must run after it. A reference that is
 * not in the mapping is left alone; no match is success with a zero count.
 */
use crate::core::models::RenameMapping;
use crate::core::scene::{AnimationData, DataPath, Modifier, Scene, SceneError};

pub type Result<T> = std::result::Result<T, SceneError>;

fn rewrite_path(path: &mut DataPath, mapping: &RenameMapping) -> bool {
    let Some(new) = path.bone().and_then(|bone| mapping.get(bone)) else {
        return false;
    };
    if path.bone() == Some(new) {
        return false;
    }
    path.set_bone(new)
}

pub fn patch_skin_groups(scene: &mut Scene, armature: &str, mapping: &RenameMapping) -> usize {
    let mut count = 0;
    for mesh_name in scene.meshes_bound_to(armature) {
        let Some(mesh) = scene.object_mut(&mesh_name).and_then(|o| o.as_mesh_mut()) else {
            continue;
        };
        for group in mesh.vertex_groups.iter_mut() {
            if let Some(new) = mapping.get(group)
                && !new.is_empty()
                && new != group.as_str()
            {
                log::trace!("ReferencePatcher: Vertex group '{group}' -> '{new}' on '{mesh_name}'.");
                *group = new.to_string();
                count += 1;
            }
        }
    }
    count
}

pub fn patch_constraint_subtargets(
    scene: &mut Scene,
    armature: &str,
    mapping: &RenameMapping,
) -> Result<usize> {
    let arm = scene.armature_mut(armature)?;
    let mut count = 0;
    for bone in arm.bones.iter_mut() {
        for constraint in bone.constraints.iter_mut() {
            if let Some(subtarget) = constraint.kind.subtarget_mut()
                && let Some(new) = mapping.get(subtarget)
            {
                *subtarget = new.to_string();
                count += 1;
            }
        }
    }
    Ok(count)
}

pub fn patch_animation_paths(scene: &mut Scene, mapping: &RenameMapping) -> usize {
    let mut count = 0;
    for action in scene.actions.iter_mut() {
        for curve in action.curves.iter_mut() {
            if rewrite_path(&mut curve.data_path, mapping) {
                count += 1;
            }
        }
    }
    count
}

/*
 * Patches drivers on every data-block that can own them: objects, armature
 * data, shape keys, materials and worlds. Curves of the clip bound to such an
 * animation data are patched here as well, which may overlap with
 * `patch_animation_paths` when both run; an already rewritten path no longer
 * matches and is not counted twice.
 */
pub fn patch_driver_paths(scene: &mut Scene, mapping: &RenameMapping) -> usize {
    let mut bound_actions = Vec::new();
    let mut count = 0;
    let mut handle = |anim: &mut AnimationData| {
        for driver in anim.drivers.iter_mut() {
            if rewrite_path(&mut driver.data_path, mapping) {
                count += 1;
            }
        }
        if let Some(action) = &anim.action {
            bound_actions.push(action.clone());
        }
    };
    for obj in scene.objects.iter_mut() {
        if let Some(anim) = obj.animation_data.as_mut() {
            handle(anim);
        }
    }
    for block in scene.data_blocks.iter_mut() {
        if let Some(anim) = block.animation_data.as_mut() {
            handle(anim);
        }
    }
    for action in scene
        .actions
        .iter_mut()
        .filter(|a| bound_actions.contains(&a.name))
    {
        for curve in action.curves.iter_mut() {
            if rewrite_path(&mut curve.data_path, mapping) {
                count += 1;
            }
        }
    }
    count
}

/*
 * Invalidates anything evaluated with the old names: each skinning modifier on
 * a bound mesh loses and regains its target with a re-evaluation in between,
 * then the current frame is nudged forward and back. Returns the number of
 * modifiers cycled.
 */
pub fn refresh_dependencies(scene: &mut Scene, armature: &str) -> usize {
    let mut cycled = 0;
    for mesh_name in scene.meshes_bound_to(armature) {
        let Some(mesh) = scene.object_mut(&mesh_name).and_then(|o| o.as_mesh_mut()) else {
            continue;
        };
        let mut dropped = Vec::new();
        for (i, modifier) in mesh.modifiers.iter_mut().enumerate() {
            if let Modifier::Armature { object } = modifier
                && object.as_deref() == Some(armature)
            {
                *object = None;
                dropped.push(i);
            }
        }
        scene.view_layer_update();
        if let Some(mesh) = scene.object_mut(&mesh_name).and_then(|o| o.as_mesh_mut()) {
            for i in &dropped {
                if let Some(Modifier::Armature { object }) = mesh.modifiers.get_mut(*i) {
                    *object = Some(armature.to_string());
                }
            }
        }
        scene.view_layer_update();
        cycled += dropped.len();
    }
    let frame = scene.frame_current;
    scene.frame_set(frame + 1);
    scene.frame_set(frame);
    log::trace!("ReferencePatcher: Refreshed {cycled} skinning modifiers for '{armature}'.");
    cycled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scene::test_support::*;
    use crate::core::scene::{
        Constraint, ConstraintKind, DataBlock, DataBlockKind, Driver, MixMode, TransformSpace,
    };

    fn mapping(pairs: &[(&str, &str)]) -> RenameMapping {
        pairs
            .iter()
            .map(|(o, n)| (o.to_string(), n.to_string()))
            .collect()
    }

    fn scene_with_rig() -> Scene {
        let mut scene = Scene::new();
        scene.objects.push(armature_object("Rig", &["Hips", "Spine"]));
        scene
            .objects
            .push(skinned_mesh("Body", "Rig", &["Hips", "Spine", "Extra"]));
        scene
            .objects
            .push(skinned_mesh("Prop", "OtherRig", &["Hips"]));
        scene
    }

    #[test]
    fn test_patch_skin_groups_only_touches_bound_meshes() {
        let mut scene = scene_with_rig();

        let count = patch_skin_groups(&mut scene, "Rig", &mapping(&[("Hips", "Pelvis")]));

        assert_eq!(count, 1);
        let body = scene.object("Body").unwrap().as_mesh().unwrap();
        assert_eq!(body.vertex_groups, vec!["Pelvis", "Spine", "Extra"]);
        let prop = scene.object("Prop").unwrap().as_mesh().unwrap();
        assert_eq!(prop.vertex_groups, vec!["Hips"]);
    }

    #[test]
    fn test_patch_constraint_subtargets_skips_variants_without_subtarget() {
        let mut scene = scene_with_rig();
        {
            let arm = scene.armature_mut("Rig").unwrap();
            let spine = arm.bone_mut("Spine").unwrap();
            spine.constraints.push(Constraint {
                name: "Track".into(),
                kind: ConstraintKind::CopyRotation {
                    target: Some("Rig".into()),
                    subtarget: "Hips".into(),
                    mix_mode: MixMode::Replace,
                    target_space: TransformSpace::Local,
                    owner_space: TransformSpace::Local,
                    use_x: true,
                    use_y: true,
                    use_z: true,
                },
            });
            spine.constraints.push(Constraint {
                name: "Limit".into(),
                kind: ConstraintKind::LimitRotation {
                    min_degrees: [0.0; 3],
                    max_degrees: [45.0; 3],
                },
            });
        }

        let count =
            patch_constraint_subtargets(&mut scene, "Rig", &mapping(&[("Hips", "Pelvis")]))
                .unwrap();

        assert_eq!(count, 1);
        let spine = scene.armature("Rig").unwrap().bone("Spine").unwrap();
        assert_eq!(spine.constraints[0].kind.subtarget(), Some("Pelvis"));
        assert_eq!(spine.constraints[1].kind.subtarget(), None);
    }

    #[test]
    fn test_patch_animation_paths_rewrites_matching_token_only() {
        let mut scene = scene_with_rig();
        scene
            .actions
            .push(action("Walk", &["Hips", "Spine"], Some([1.0, 30.0])));

        let count = patch_animation_paths(&mut scene, &mapping(&[("Hips", "Pelvis")]));

        assert_eq!(count, 1);
        let walk = scene.action("Walk").unwrap();
        assert_eq!(
            walk.curves[0].data_path.to_string(),
            "pose.bones[\"Pelvis\"].rotation_quaternion"
        );
        assert_eq!(
            walk.curves[1].data_path.to_string(),
            "pose.bones[\"Spine\"].rotation_quaternion"
        );
    }

    #[test]
    fn test_patch_animation_paths_swap_is_not_chained() {
        let mut scene = scene_with_rig();
        scene.actions.push(action("Walk", &["A", "B"], None));

        let count = patch_animation_paths(&mut scene, &mapping(&[("A", "B"), ("B", "A")]));

        assert_eq!(count, 2);
        let walk = scene.action("Walk").unwrap();
        assert_eq!(walk.curves[0].data_path.bone(), Some("B"));
        assert_eq!(walk.curves[1].data_path.bone(), Some("A"));
    }

    #[test]
    fn test_patch_driver_paths_covers_objects_and_data_blocks() {
        let mut scene = scene_with_rig();
        scene.actions.push(action("ShapeAnim", &["Hips"], None));
        scene.objects[1].animation_data = Some(AnimationData {
            action: None,
            drivers: vec![Driver {
                data_path: DataPath::parse("pose.bones[\"Hips\"].location"),
                expression: "var * 2".into(),
            }],
        });
        scene.data_blocks.push(DataBlock {
            name: "BodyKeys".into(),
            kind: DataBlockKind::ShapeKeys,
            animation_data: Some(AnimationData {
                action: Some("ShapeAnim".into()),
                drivers: vec![Driver {
                    data_path: DataPath::parse("key_blocks[\"Smile\"].value"),
                    expression: String::new(),
                }],
            }),
        });

        let count = patch_driver_paths(&mut scene, &mapping(&[("Hips", "Pelvis")]));

        assert_eq!(count, 2);
        let drivers = &scene.objects[1].animation_data.as_ref().unwrap().drivers;
        assert_eq!(drivers[0].data_path.bone(), Some("Pelvis"));
        let keys = scene.data_blocks[0].animation_data.as_ref().unwrap();
        assert_eq!(keys.drivers[0].data_path.to_string(), "key_blocks[\"Smile\"].value");
        assert_eq!(
            scene.action("ShapeAnim").unwrap().curves[0].data_path.bone(),
            Some("Pelvis")
        );
    }

    #[test]
    fn test_patchers_are_noops_for_unrelated_mapping() {
        let mut scene = scene_with_rig();
        scene.actions.push(action("Walk", &["Hips"], None));
        let before = scene.clone();
        let unrelated = mapping(&[("Ghost", "Spirit")]);

        assert_eq!(patch_skin_groups(&mut scene, "Rig", &unrelated), 0);
        assert_eq!(
            patch_constraint_subtargets(&mut scene, "Rig", &unrelated).unwrap(),
            0
        );
        assert_eq!(patch_animation_paths(&mut scene, &unrelated), 0);
        assert_eq!(patch_driver_paths(&mut scene, &unrelated), 0);
        assert_eq!(scene, before);
    }

    #[test]
    fn test_refresh_dependencies_restores_modifier_and_frame() {
        let mut scene = scene_with_rig();
        scene.frame_current = 12;
        let evaluations_before = scene.evaluation_count();

        let cycled = refresh_dependencies(&mut scene, "Rig");

        assert_eq!(cycled, 1);
        assert_eq!(scene.frame_current, 12);
        assert!(scene.evaluation_count() >= evaluations_before + 4);
        let body = scene.object("Body").unwrap().as_mesh().unwrap();
        assert!(body.is_bound_to("Rig"));
    }
}
