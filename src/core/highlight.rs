// Bone group assignment used to colour rigs in the viewport.
use crate::core::models::BoneMapRow;
use crate::core::scene::{Result, Scene};

pub const MAPPED_GROUP: &str = "Mapped";
pub const SOURCE_GROUP: &str = "Source";
pub const TARGET_GROUP: &str = "Target";

/*
 * Puts the bones of every mapped row into the `Mapped` group: the original name
 * on the source rig and the rename on the target rig. Either rig may be absent.
 * Returns the number of bones marked on each side.
 */
pub fn mark_mapped(
    scene: &mut Scene,
    source_armature: Option<&str>,
    target_armature: Option<&str>,
    rows: &[BoneMapRow],
) -> (usize, usize) {
    let mut mark = |armature: Option<&str>, pick: fn(&BoneMapRow) -> &str| -> usize {
        let Some(arm) = armature.and_then(|a| scene.armature_mut(a).ok()) else {
            return 0;
        };
        let mut count = 0;
        for row in rows
            .iter()
            .filter(|r| !r.original_name.is_empty() && !r.target_name.is_empty())
        {
            if let Some(bone) = arm.bone_mut(pick(row)) {
                bone.group = Some(MAPPED_GROUP.to_string());
                count += 1;
            }
        }
        count
    };
    let source = mark(source_armature, |r| r.original_name.as_str());
    let target = mark(target_armature, |r| r.target_name.as_str());
    log::debug!("Highlight: Marked {source} source and {target} target bones as mapped.");
    (source, target)
}

/// Assigns every bone of the source rig to `Source` and every bone of the target rig to `Target`.
pub fn highlight_rigs(scene: &mut Scene, source_armature: &str, target_armature: &str) -> Result<()> {
    scene.armature(source_armature)?;
    scene.armature(target_armature)?;
    for (name, group) in [(source_armature, SOURCE_GROUP), (target_armature, TARGET_GROUP)] {
        for bone in scene.armature_mut(name)?.bones.iter_mut() {
            bone.group = Some(group.to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scene::test_support::armature_object;

    fn scene() -> Scene {
        let mut scene = Scene::new();
        scene
            .objects
            .push(armature_object("Mocap", &["mixamorig:Hips", "mixamorig:Spine"]));
        scene.objects.push(armature_object("Hero", &["Hips", "Spine"]));
        scene
    }

    #[test]
    fn test_mark_mapped_by_side() {
        let mut scene = scene();
        let rows = vec![
            BoneMapRow {
                target_name: "Hips".into(),
                ..BoneMapRow::identity("mixamorig:Hips")
            },
            BoneMapRow {
                target_name: String::new(),
                ..BoneMapRow::identity("mixamorig:Spine")
            },
        ];

        let counts = mark_mapped(&mut scene, Some("Mocap"), Some("Hero"), &rows);

        assert_eq!(counts, (1, 1));
        let mocap = scene.armature("Mocap").unwrap();
        assert_eq!(mocap.bone("mixamorig:Hips").unwrap().group.as_deref(), Some("Mapped"));
        assert_eq!(mocap.bone("mixamorig:Spine").unwrap().group, None);
        let hero = scene.armature("Hero").unwrap();
        assert_eq!(hero.bone("Hips").unwrap().group.as_deref(), Some("Mapped"));
    }

    #[test]
    fn test_highlight_rigs_requires_both() {
        let mut scene = scene();
        assert!(highlight_rigs(&mut scene, "Mocap", "Missing").is_err());
        assert_eq!(scene.armature("Mocap").unwrap().bones[0].group, None);

        highlight_rigs(&mut scene, "Mocap", "Hero").unwrap();

        assert!(scene
            .armature("Hero")
            .unwrap()
            .bones
            .iter()
            .all(|b| b.group.as_deref() == Some("Target")));
        assert_eq!(scene.armature("Mocap").unwrap().bones[1].group.as_deref(), Some("Source"));
    }
}
