/*
 * Keeps the mapping table and the viewport selection in step, in both
 * directions. `SelectionSync` polls the active bone of each rig at a fixed
 * interval and moves the active row to the row naming it. `select_row_bones`
 * goes the other way and selects the pose bones of a row on both rigs.
 *
 * The poller only ever changes the active row index.
 */
use crate::core::mapping_store::MappingStore;
use crate::core::models::ArmatureSide;
use crate::core::scene::Scene;
use std::time::{Duration, Instant};

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

// Where the poller reads the bone the user is pointing at on each rig.
pub trait ActiveBoneSource {
    fn active_bone(&self, side: ArmatureSide) -> Option<String>;
}

pub struct SceneSelection<'a> {
    pub scene: &'a Scene,
    pub source_armature: Option<&'a str>,
    pub target_armature: Option<&'a str>,
}

impl ActiveBoneSource for SceneSelection<'_> {
    fn active_bone(&self, side: ArmatureSide) -> Option<String> {
        let name = match side {
            ArmatureSide::Source => self.source_armature?,
            ArmatureSide::Target => self.target_armature?,
        };
        self.scene
            .armature(name)
            .ok()?
            .active_bone_name()
            .map(str::to_string)
    }
}

#[derive(Debug, Default)]
pub struct SelectionSync {
    enabled: bool,
    last_source: Option<String>,
    last_target: Option<String>,
    last_poll: Option<Instant>,
}

impl SelectionSync {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.last_source = None;
        self.last_target = None;
        self.last_poll = None;
        log::debug!("SelectionSync: Auto-sync {}.", if self.enabled { "on" } else { "off" });
        self.enabled
    }

    /*
     * Runs one poll if enabled and at least `POLL_INTERVAL` has passed since the
     * previous one. Returns the new active row when it changed.
     */
    pub fn tick(
        &mut self,
        now: Instant,
        bones: &dyn ActiveBoneSource,
        store: &mut MappingStore,
    ) -> Option<usize> {
        if !self.enabled {
            return None;
        }
        if let Some(last) = self.last_poll
            && now.duration_since(last) < POLL_INTERVAL
        {
            return None;
        }
        self.last_poll = Some(now);
        self.poll(bones, store)
    }

    /*
     * Looks up the row for the source rig's active bone, falling back to the
     * target rig's. Nothing happens unless one of the two active bones changed
     * since the previous poll.
     */
    pub fn poll(&mut self, bones: &dyn ActiveBoneSource, store: &mut MappingStore) -> Option<usize> {
        let source = bones.active_bone(ArmatureSide::Source);
        let target = bones.active_bone(ArmatureSide::Target);
        if source == self.last_source && target == self.last_target {
            return None;
        }
        let index = source
            .as_deref()
            .and_then(|name| store.find_row_for(name))
            .or_else(|| target.as_deref().and_then(|name| store.find_row_for(name)));
        self.last_source = source;
        self.last_target = target;
        match index {
            Some(i) if store.active_index() != Some(i) => {
                store.set_active_index(Some(i));
                log::trace!("SelectionSync: Active row -> {i}.");
                Some(i)
            }
            _ => None,
        }
    }
}

/*
 * Selects the bones of row `index` on both rigs. The source rig tries the
 * original, current and rename names in that order; the target rig tries them
 * in reverse. Returns which rigs got a selection.
 */
pub fn select_row_bones(
    scene: &mut Scene,
    source_armature: Option<&str>,
    target_armature: Option<&str>,
    store: &MappingStore,
    index: usize,
) -> (bool, bool) {
    let Some(row) = store.row(index) else {
        return (false, false);
    };
    let mut select_first = |armature: Option<&str>, names: [&str; 3]| -> bool {
        let Some(arm) = armature.and_then(|a| scene.armature_mut(a).ok()) else {
            return false;
        };
        names.iter().any(|name| arm.select_only(name))
    };
    let source = select_first(
        source_armature,
        [row.original_name.as_str(), row.current_name.as_str(), row.target_name.as_str()],
    );
    let target = select_first(
        target_armature,
        [row.target_name.as_str(), row.current_name.as_str(), row.original_name.as_str()],
    );
    (source, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::BoneMapRow;
    use crate::core::scene::test_support::armature_object;
    use std::cell::RefCell;

    struct FakeSelection {
        source: RefCell<Option<String>>,
        target: RefCell<Option<String>>,
    }

    impl FakeSelection {
        fn new(source: Option<&str>, target: Option<&str>) -> Self {
            FakeSelection {
                source: RefCell::new(source.map(String::from)),
                target: RefCell::new(target.map(String::from)),
            }
        }
    }

    impl ActiveBoneSource for FakeSelection {
        fn active_bone(&self, side: ArmatureSide) -> Option<String> {
            match side {
                ArmatureSide::Source => self.source.borrow().clone(),
                ArmatureSide::Target => self.target.borrow().clone(),
            }
        }
    }

    fn store() -> MappingStore {
        let mut store = MappingStore::new();
        store.capture("mixamorig:Hips", "Hips", ArmatureSide::Target);
        store.capture("mixamorig:Spine", "Spine", ArmatureSide::Target);
        store.set_active_index(Some(0));
        store
    }

    #[test]
    fn test_poll_moves_active_row_on_change_only() {
        let mut store = store();
        let mut sync = SelectionSync::default();
        let selection = FakeSelection::new(None, Some("Spine"));

        assert_eq!(sync.poll(&selection, &mut store), Some(1));
        assert_eq!(store.active_index(), Some(1));

        store.set_active_index(Some(0));
        // Same bones as the previous poll: the manual row choice is left alone.
        assert_eq!(sync.poll(&selection, &mut store), None);
        assert_eq!(store.active_index(), Some(0));
    }

    #[test]
    fn test_poll_prefers_source_bone() {
        let mut store = store();
        store.set_active_index(None);
        let mut sync = SelectionSync::default();
        let selection = FakeSelection::new(Some("mixamorig:Hips"), Some("Spine"));

        assert_eq!(sync.poll(&selection, &mut store), Some(0));
    }

    #[test]
    fn test_tick_respects_enable_flag_and_interval() {
        let mut store = store();
        let mut sync = SelectionSync::default();
        let selection = FakeSelection::new(None, Some("Spine"));
        let start = Instant::now();

        assert_eq!(sync.tick(start, &selection, &mut store), None);
        assert!(sync.toggle());
        assert!(sync.is_enabled());
        assert_eq!(sync.tick(start, &selection, &mut store), Some(1));

        *selection.target.borrow_mut() = Some("Hips".into());
        assert_eq!(
            sync.tick(start + Duration::from_millis(50), &selection, &mut store),
            None
        );
        assert_eq!(
            sync.tick(start + POLL_INTERVAL, &selection, &mut store),
            Some(0)
        );
    }

    #[test]
    fn test_scene_selection_reads_active_bone() {
        let mut scene = Scene::new();
        scene.objects.push(armature_object("Hero", &["Hips", "Spine"]));
        scene.armature_mut("Hero").unwrap().active_bone = Some("Spine".into());
        let selection = SceneSelection {
            scene: &scene,
            source_armature: None,
            target_armature: Some("Hero"),
        };

        assert_eq!(selection.active_bone(ArmatureSide::Target), Some("Spine".into()));
        assert_eq!(selection.active_bone(ArmatureSide::Source), None);
    }

    #[test]
    fn test_select_row_bones_uses_side_specific_order() {
        let mut scene = Scene::new();
        scene
            .objects
            .push(armature_object("Mocap", &["mixamorig:Hips", "Hips"]));
        scene.objects.push(armature_object("Hero", &["Hips", "Pelvis"]));
        let mut store = MappingStore::new();
        store.push_row(BoneMapRow {
            target_name: "Pelvis".into(),
            ..BoneMapRow::identity("mixamorig:Hips")
        });

        let selected = select_row_bones(&mut scene, Some("Mocap"), Some("Hero"), &store, 0);

        assert_eq!(selected, (true, true));
        let mocap = scene.armature("Mocap").unwrap();
        assert_eq!(mocap.active_bone.as_deref(), Some("mixamorig:Hips"));
        let hero = scene.armature("Hero").unwrap();
        assert_eq!(hero.active_bone.as_deref(), Some("Pelvis"));
        assert!(hero.bone("Pelvis").unwrap().select);
        assert!(!hero.bone("Hips").unwrap().select);
    }
}
