/*
 * The in-memory scene model the retargeting core operates on. It mirrors the
 * narrow slice of a 3D host's scene graph that bone remapping needs: armature
 * objects with their bones and pose constraints, meshes bound to armatures via
 * skinning modifiers, actions with animation curves, and the data-blocks that
 * may carry drivers. Every type derives serde so a whole scene can be persisted
 * as JSON by the command-line front end.
 *
 * Curve and driver paths are kept as structured `DataPath` values (a template
 * with one bone-name slot) instead of opaque strings, so a rename becomes a
 * single slot lookup rather than a substring scan.
 */
use crate::core::rename_engine::RenameJournal;
use glam::Mat4;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

fn default_true() -> bool {
    true
}

fn default_frame_start() -> i32 {
    1
}

fn default_frame_end() -> i32 {
    250
}

#[derive(Debug)]
pub enum SceneError {
    Io(io::Error),
    Serde(serde_json::Error),
    ObjectNotFound(String),
    NotAnArmature(String),
    BoneNotFound(String),
    BoneNameTaken(String),
    NotInEditMode(String),
}

impl From<io::Error> for SceneError {
    fn from(err: io::Error) -> Self {
        SceneError::Io(err)
    }
}

impl From<serde_json::Error> for SceneError {
    fn from(err: serde_json::Error) -> Self {
        SceneError::Serde(err)
    }
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneError::Io(e) => write!(f, "Scene I/O error: {e}"),
            SceneError::Serde(e) => write!(f, "Scene serialization error: {e}"),
            SceneError::ObjectNotFound(name) => write!(f, "Object not found: {name}"),
            SceneError::NotAnArmature(name) => write!(f, "Object '{name}' is not an armature"),
            SceneError::BoneNotFound(name) => write!(f, "Bone not found: {name}"),
            SceneError::BoneNameTaken(name) => write!(f, "Bone name already in use: {name}"),
            SceneError::NotInEditMode(name) => {
                write!(f, "Armature must be in edit mode to rename bone '{name}'")
            }
        }
    }
}

impl std::error::Error for SceneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SceneError::Io(e) => Some(e),
            SceneError::Serde(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SceneError>;

const POSE_BONE_OPEN: &str = "pose.bones[\"";
const POSE_BONE_CLOSE: &str = "\"]";

/*
 * A property path such as `pose.bones["Hips"].rotation_quaternion`, split into
 * the text before the bone token, the bone name slot, and the text after it.
 * Paths without a pose-bone token keep everything in `head`.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DataPath {
    head: String,
    bone: Option<String>,
    tail: String,
}

impl DataPath {
    pub fn parse(raw: &str) -> Self {
        if let Some(start) = raw.find(POSE_BONE_OPEN) {
            let name_start = start + POSE_BONE_OPEN.len();
            if let Some(len) = raw[name_start..].find(POSE_BONE_CLOSE) {
                let name_end = name_start + len;
                return DataPath {
                    head: raw[..start].to_string(),
                    bone: Some(raw[name_start..name_end].to_string()),
                    tail: raw[name_end + POSE_BONE_CLOSE.len()..].to_string(),
                };
            }
        }
        DataPath {
            head: raw.to_string(),
            bone: None,
            tail: String::new(),
        }
    }

    pub fn bone(&self) -> Option<&str> {
        self.bone.as_deref()
    }

    pub fn references_pose_bone(&self) -> bool {
        self.bone.is_some()
    }

    /// Replaces the bone slot. Returns false for paths without a bone token.
    pub fn set_bone(&mut self, name: &str) -> bool {
        match self.bone.as_mut() {
            Some(slot) => {
                *slot = name.to_string();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Display for DataPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.bone {
            Some(bone) => write!(
                f,
                "{}{POSE_BONE_OPEN}{bone}{POSE_BONE_CLOSE}{}",
                self.head, self.tail
            ),
            None => write!(f, "{}", self.head),
        }
    }
}

impl From<String> for DataPath {
    fn from(raw: String) -> Self {
        DataPath::parse(&raw)
    }
}

impl From<&str> for DataPath {
    fn from(raw: &str) -> Self {
        DataPath::parse(raw)
    }
}

impl From<DataPath> for String {
    fn from(path: DataPath) -> Self {
        path.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ObjectMode {
    #[default]
    Object,
    Pose,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MixMode {
    #[default]
    Replace,
    Add,
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TransformSpace {
    World,
    Pose,
    #[default]
    Local,
}

/*
 * Constraint kinds the core knows about. Each variant states explicitly whether
 * it carries a sub-target bone name, so patching never has to inspect fields.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintKind {
    CopyRotation {
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        subtarget: String,
        #[serde(default)]
        mix_mode: MixMode,
        #[serde(default)]
        target_space: TransformSpace,
        #[serde(default)]
        owner_space: TransformSpace,
        #[serde(default = "default_true")]
        use_x: bool,
        #[serde(default = "default_true")]
        use_y: bool,
        #[serde(default = "default_true")]
        use_z: bool,
    },
    CopyTransforms {
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        subtarget: String,
        #[serde(default)]
        mix_mode: MixMode,
        #[serde(default)]
        target_space: TransformSpace,
        #[serde(default)]
        owner_space: TransformSpace,
    },
    CopyLocation {
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        subtarget: String,
    },
    LimitRotation {
        #[serde(default)]
        min_degrees: [f32; 3],
        #[serde(default)]
        max_degrees: [f32; 3],
    },
}

impl ConstraintKind {
    pub fn subtarget(&self) -> Option<&str> {
        match self {
            ConstraintKind::CopyRotation { subtarget, .. }
            | ConstraintKind::CopyTransforms { subtarget, .. }
            | ConstraintKind::CopyLocation { subtarget, .. } => Some(subtarget),
            ConstraintKind::LimitRotation { .. } => None,
        }
    }

    pub fn subtarget_mut(&mut self) -> Option<&mut String> {
        match self {
            ConstraintKind::CopyRotation { subtarget, .. }
            | ConstraintKind::CopyTransforms { subtarget, .. }
            | ConstraintKind::CopyLocation { subtarget, .. } => Some(subtarget),
            ConstraintKind::LimitRotation { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
}

// Bone and pose bone share one record; the host keeps them as parallel collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default = "default_true")]
    pub use_deform: bool,
    #[serde(default)]
    pub select: bool,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub group: Option<String>,
}

impl Bone {
    pub fn new(name: &str) -> Self {
        Bone {
            name: name.to_string(),
            parent: None,
            use_deform: true,
            select: false,
            constraints: Vec::new(),
            group: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Armature {
    #[serde(default)]
    pub bones: Vec<Bone>,
    #[serde(default)]
    pub active_bone: Option<String>,
    #[serde(default)]
    pub mode: ObjectMode,
    #[serde(default)]
    pub pending_rename: Option<RenameJournal>,
}

impl Armature {
    pub fn has_bone(&self, name: &str) -> bool {
        !name.is_empty() && self.bones.iter().any(|b| b.name == name)
    }

    pub fn bone(&self, name: &str) -> Option<&Bone> {
        self.bones.iter().find(|b| b.name == name)
    }

    pub fn bone_mut(&mut self, name: &str) -> Option<&mut Bone> {
        self.bones.iter_mut().find(|b| b.name == name)
    }

    pub fn bone_names(&self) -> Vec<String> {
        self.bones.iter().map(|b| b.name.clone()).collect()
    }

    /*
     * Renames one bone in edit mode. Parent links and the active-bone pointer
     * follow the rename; every other reference is the patcher's job. Renaming a
     * bone onto its own name is a no-op.
     */
    pub fn rename_bone(&mut self, old: &str, new: &str) -> Result<()> {
        if self.mode != ObjectMode::Edit {
            return Err(SceneError::NotInEditMode(old.to_string()));
        }
        if old == new {
            return Ok(());
        }
        if self.has_bone(new) {
            return Err(SceneError::BoneNameTaken(new.to_string()));
        }
        let bone = self
            .bone_mut(old)
            .ok_or_else(|| SceneError::BoneNotFound(old.to_string()))?;
        bone.name = new.to_string();
        for child in self.bones.iter_mut() {
            if child.parent.as_deref() == Some(old) {
                child.parent = Some(new.to_string());
            }
        }
        if self.active_bone.as_deref() == Some(old) {
            self.active_bone = Some(new.to_string());
        }
        Ok(())
    }

    /*
     * The bone the user is pointing at: the active bone if it exists, otherwise
     * the single selected pose bone. Several selected bones without an active
     * one is ambiguous and yields None.
     */
    pub fn active_bone_name(&self) -> Option<&str> {
        if let Some(active) = self.active_bone.as_deref()
            && self.has_bone(active)
        {
            return Some(active);
        }
        let mut selected = self.bones.iter().filter(|b| b.select);
        match (selected.next(), selected.next()) {
            (Some(only), None) => Some(only.name.as_str()),
            _ => None,
        }
    }

    pub fn select_only(&mut self, name: &str) -> bool {
        if !self.has_bone(name) {
            return false;
        }
        for bone in self.bones.iter_mut() {
            bone.select = bone.name == name;
        }
        self.active_bone = Some(name.to_string());
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Modifier {
    Armature {
        #[serde(default)]
        object: Option<String>,
    },
    Subdivision {
        #[serde(default)]
        levels: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Mesh {
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub vertex_groups: Vec<String>,
}

impl Mesh {
    pub fn is_bound_to(&self, armature: &str) -> bool {
        self.modifiers.iter().any(|m| match m {
            Modifier::Armature { object } => object.as_deref() == Some(armature),
            _ => false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub data_path: DataPath,
    #[serde(default)]
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnimationData {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub drivers: Vec<Driver>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectData {
    Armature(Armature),
    Mesh(Mesh),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub name: String,
    pub data: ObjectData,
    #[serde(default)]
    pub matrix_world: Mat4,
    #[serde(default)]
    pub animation_data: Option<AnimationData>,
}

impl Object {
    pub fn new(name: &str, data: ObjectData) -> Self {
        Object {
            name: name.to_string(),
            data,
            matrix_world: Mat4::IDENTITY,
            animation_data: None,
        }
    }

    pub fn as_armature(&self) -> Option<&Armature> {
        match &self.data {
            ObjectData::Armature(arm) => Some(arm),
            _ => None,
        }
    }

    pub fn as_armature_mut(&mut self) -> Option<&mut Armature> {
        match &mut self.data {
            ObjectData::Armature(arm) => Some(arm),
            _ => None,
        }
    }

    pub fn as_mesh(&self) -> Option<&Mesh> {
        match &self.data {
            ObjectData::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn as_mesh_mut(&mut self) -> Option<&mut Mesh> {
        match &mut self.data {
            ObjectData::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn animation_data_create(&mut self) -> &mut AnimationData {
        self.animation_data.get_or_insert_with(AnimationData::default)
    }

    pub fn active_action(&self) -> Option<&str> {
        self.animation_data.as_ref()?.action.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBlockKind {
    ArmatureData,
    ShapeKeys,
    Material,
    World,
}

// Non-object data-blocks that can host drivers and an animation clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBlock {
    pub name: String,
    pub kind: DataBlockKind,
    #[serde(default)]
    pub animation_data: Option<AnimationData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FCurve {
    pub data_path: DataPath,
    #[serde(default)]
    pub array_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub curves: Vec<FCurve>,
    #[serde(default)]
    pub frame_range: Option<[f32; 2]>,
}

impl Action {
    pub fn has_pose_curves(&self) -> bool {
        self.curves.iter().any(|c| c.data_path.references_pose_bone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub objects: Vec<Object>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub data_blocks: Vec<DataBlock>,
    #[serde(default = "default_frame_start")]
    pub frame_start: i32,
    #[serde(default = "default_frame_end")]
    pub frame_end: i32,
    #[serde(default = "default_frame_start")]
    pub frame_current: i32,
    #[serde(skip)]
    evaluations: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Scene {
            objects: Vec::new(),
            actions: Vec::new(),
            data_blocks: Vec::new(),
            frame_start: default_frame_start(),
            frame_end: default_frame_end(),
            frame_current: default_frame_start(),
            evaluations: 0,
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Scene> {
        log::trace!("Scene: Loading scene from {path:?}");
        let file = File::open(path)?;
        let scene: Scene = serde_json::from_reader(BufReader::new(file))?;
        log::debug!(
            "Scene: Loaded {} objects and {} actions from {path:?}.",
            scene.objects.len(),
            scene.actions.len()
        );
        Ok(scene)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        log::debug!("Scene: Saved scene to {path:?}.");
        Ok(())
    }

    pub fn object(&self, name: &str) -> Option<&Object> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut Object> {
        self.objects.iter_mut().find(|o| o.name == name)
    }

    pub fn armature(&self, name: &str) -> Result<&Armature> {
        let obj = self
            .object(name)
            .ok_or_else(|| SceneError::ObjectNotFound(name.to_string()))?;
        obj.as_armature()
            .ok_or_else(|| SceneError::NotAnArmature(name.to_string()))
    }

    pub fn armature_mut(&mut self, name: &str) -> Result<&mut Armature> {
        let obj = self
            .object_mut(name)
            .ok_or_else(|| SceneError::ObjectNotFound(name.to_string()))?;
        obj.as_armature_mut()
            .ok_or_else(|| SceneError::NotAnArmature(name.to_string()))
    }

    pub fn is_armature(&self, name: &str) -> bool {
        self.armature(name).is_ok()
    }

    /// Names of all mesh objects whose skinning modifier targets `armature`.
    pub fn meshes_bound_to(&self, armature: &str) -> Vec<String> {
        self.objects
            .iter()
            .filter(|o| o.as_mesh().is_some_and(|m| m.is_bound_to(armature)))
            .map(|o| o.name.clone())
            .collect()
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    // Re-evaluates the dependency graph. Only the evaluation counter is observable here.
    pub fn view_layer_update(&mut self) {
        self.evaluations += 1;
    }

    pub fn frame_set(&mut self, frame: i32) {
        self.frame_current = frame;
        self.evaluations += 1;
    }

    pub fn evaluation_count(&self) -> u64 {
        self.evaluations
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn armature_object(name: &str, bones: &[&str]) -> Object {
        let armature = Armature {
            bones: bones.iter().map(|b| Bone::new(b)).collect(),
            ..Armature::default()
        };
        Object::new(name, ObjectData::Armature(armature))
    }

    pub(crate) fn skinned_mesh(name: &str, armature: &str, groups: &[&str]) -> Object {
        let mesh = Mesh {
            modifiers: vec![Modifier::Armature {
                object: Some(armature.to_string()),
            }],
            vertex_groups: groups.iter().map(|g| g.to_string()).collect(),
        };
        Object::new(name, ObjectData::Mesh(mesh))
    }

    pub(crate) fn pose_curve(bone: &str, property: &str) -> FCurve {
        FCurve {
            data_path: DataPath::parse(&format!("pose.bones[\"{bone}\"].{property}")),
            array_index: 0,
        }
    }

    pub(crate) fn action(name: &str, bones: &[&str], range: Option<[f32; 2]>) -> Action {
        Action {
            name: name.to_string(),
            curves: bones
                .iter()
                .map(|b| pose_curve(b, "rotation_quaternion"))
                .collect(),
            frame_range: range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_data_path_parse_and_display_round_trip() {
        let raw = "pose.bones[\"mixamorig:Hips\"].rotation_quaternion";
        let path = DataPath::parse(raw);
        assert_eq!(path.bone(), Some("mixamorig:Hips"));
        assert_eq!(path.to_string(), raw);

        let plain = DataPath::parse("location");
        assert!(!plain.references_pose_bone());
        assert_eq!(plain.to_string(), "location");
    }

    #[test]
    fn test_data_path_set_bone_keeps_template() {
        let mut path = DataPath::parse("pose.bones[\"Hips\"].constraints[\"IK\"].influence");
        assert!(path.set_bone("Pelvis"));
        assert_eq!(
            path.to_string(),
            "pose.bones[\"Pelvis\"].constraints[\"IK\"].influence"
        );

        let mut plain = DataPath::parse("scale");
        assert!(!plain.set_bone("Pelvis"));
    }

    #[test]
    fn test_data_path_unterminated_token_is_plain() {
        let path = DataPath::parse("pose.bones[\"Hips");
        assert!(!path.references_pose_bone());
        assert_eq!(path.to_string(), "pose.bones[\"Hips");
    }

    #[test]
    fn test_rename_bone_requires_edit_mode() {
        let mut obj = armature_object("Rig", &["Hips"]);
        let arm = obj.as_armature_mut().unwrap();
        assert!(matches!(
            arm.rename_bone("Hips", "Pelvis"),
            Err(SceneError::NotInEditMode(_))
        ));
    }

    #[test]
    fn test_rename_bone_updates_parent_and_active() {
        let mut obj = armature_object("Rig", &["Hips", "Spine"]);
        let arm = obj.as_armature_mut().unwrap();
        arm.bone_mut("Spine").unwrap().parent = Some("Hips".into());
        arm.active_bone = Some("Hips".into());
        arm.mode = ObjectMode::Edit;

        arm.rename_bone("Hips", "Pelvis").unwrap();

        assert!(arm.has_bone("Pelvis"));
        assert!(!arm.has_bone("Hips"));
        assert_eq!(arm.bone("Spine").unwrap().parent.as_deref(), Some("Pelvis"));
        assert_eq!(arm.active_bone.as_deref(), Some("Pelvis"));
    }

    #[test]
    fn test_rename_bone_rejects_taken_name() {
        let mut obj = armature_object("Rig", &["A", "B"]);
        let arm = obj.as_armature_mut().unwrap();
        arm.mode = ObjectMode::Edit;
        assert!(matches!(
            arm.rename_bone("A", "B"),
            Err(SceneError::BoneNameTaken(_))
        ));
    }

    #[test]
    fn test_active_bone_name_falls_back_to_single_selection() {
        let mut obj = armature_object("Rig", &["A", "B", "C"]);
        let arm = obj.as_armature_mut().unwrap();
        assert_eq!(arm.active_bone_name(), None);

        arm.bone_mut("B").unwrap().select = true;
        assert_eq!(arm.active_bone_name(), Some("B"));

        arm.bone_mut("C").unwrap().select = true;
        assert_eq!(arm.active_bone_name(), None);

        arm.active_bone = Some("A".into());
        assert_eq!(arm.active_bone_name(), Some("A"));
    }

    #[test]
    fn test_meshes_bound_to_filters_by_modifier_target() {
        let mut scene = Scene::new();
        scene.objects.push(armature_object("Rig", &["Hips"]));
        scene.objects.push(skinned_mesh("Body", "Rig", &["Hips"]));
        scene.objects.push(skinned_mesh("Other", "OtherRig", &["Hips"]));
        assert_eq!(scene.meshes_bound_to("Rig"), vec!["Body".to_string()]);
    }

    #[test]
    fn test_armature_lookup_errors() {
        let mut scene = Scene::new();
        scene.objects.push(skinned_mesh("Body", "Rig", &[]));
        assert!(matches!(
            scene.armature("Missing"),
            Err(SceneError::ObjectNotFound(_))
        ));
        assert!(matches!(
            scene.armature("Body"),
            Err(SceneError::NotAnArmature(_))
        ));
    }

    #[test]
    fn test_scene_json_round_trip_via_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        let mut scene = Scene::new();
        scene.objects.push(armature_object("Rig", &["Hips"]));
        scene
            .actions
            .push(action("Walk", &["Hips"], Some([1.0, 24.0])));

        scene.save_to_path(&path).unwrap();
        let loaded = Scene::load_from_path(&path).unwrap();

        assert_eq!(loaded, scene);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("pose.bones[\\\"Hips\\\"].rotation_quaternion"));
    }
}
