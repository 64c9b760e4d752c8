/*
 * Drives exports of one armature through an `ExporterOperations` backend. All
 * three export commands share one skeleton:
 *
 *   resolve armature -> optional temporary rename -> per clip: bind clip, set
 *   frame range, rotate world matrices, invoke exporter, restore matrices and
 *   clip -> restore frame range -> revert the temporary rename
 *
 * The last two steps run however the exporter calls went, so a failed export
 * never leaves the rig renamed or rotated. In the per-file batch a failing file
 * is recorded and the loop continues; the single-file commands return the
 * error after cleaning up.
 */
use crate::core::mapping_store::MappingStore;
use crate::core::models::{ExportFormat, RenameMapping};
use crate::core::path_utils;
use crate::core::remap::{self, ApplyReport};
use crate::core::rename_engine::RenameError;
use crate::core::scene::{Scene, SceneError};
use glam::{EulerRot, Mat4};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::PathBuf;

pub const AXIS_FORWARD: &str = "-Z";
pub const AXIS_UP: &str = "Y";
const POSE_SUFFIX: &str = "POSE";
const ALL_ACTIONS_SUFFIX: &str = "ALL_ACTIONS";

#[derive(Debug)]
pub enum ExportError {
    Io(io::Error),
    Serde(serde_json::Error),
    Scene(SceneError),
    Rename(RenameError),
    UnsupportedFormat(ExportFormat),
    Exporter(String),
}

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Serde(err)
    }
}

impl From<SceneError> for ExportError {
    fn from(err: SceneError) -> Self {
        ExportError::Scene(err)
    }
}

impl From<RenameError> for ExportError {
    fn from(err: RenameError) -> Self {
        ExportError::Rename(err)
    }
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "Export I/O error: {e}"),
            ExportError::Serde(e) => write!(f, "Export serialization error: {e}"),
            ExportError::Scene(e) => write!(f, "{e}"),
            ExportError::Rename(e) => write!(f, "{e}"),
            ExportError::UnsupportedFormat(format) => write!(
                f,
                "This export is only available for FBX, not {}",
                format.extension().to_uppercase()
            ),
            ExportError::Exporter(msg) => write!(f, "Exporter failed: {msg}"),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(e) => Some(e),
            ExportError::Serde(e) => Some(e),
            ExportError::Scene(e) => Some(e),
            ExportError::Rename(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;

// Everything an exporter backend needs for one output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub armature: String,
    pub selected_objects: Vec<String>,
    pub frame_start: i32,
    pub frame_end: i32,
    pub axis_forward: String,
    pub axis_up: String,
    pub scale: f32,
    pub add_leaf_bones: bool,
    pub simplify: f32,
    pub all_actions: bool,
    pub takes: Vec<String>,
}

pub trait ExporterOperations: Send + Sync {
    fn export(&self, scene: &Scene, request: &ExportRequest) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct ExportSnapshot<'a> {
    request: &'a ExportRequest,
    bones: Vec<String>,
    world_matrices: Vec<(String, Mat4)>,
}

/*
 * Writes the request, the armature's bone names and the world matrices of the
 * selected objects as pretty JSON to the requested path. It stands in for a
 * real interchange encoder and records exactly what such an encoder would see.
 */
pub struct SnapshotExporter {}

impl SnapshotExporter {
    pub fn new() -> Self {
        SnapshotExporter {}
    }
}

impl Default for SnapshotExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterOperations for SnapshotExporter {
    fn export(&self, scene: &Scene, request: &ExportRequest) -> Result<()> {
        let snapshot = ExportSnapshot {
            request,
            bones: scene.armature(&request.armature)?.bone_names(),
            world_matrices: request
                .selected_objects
                .iter()
                .filter_map(|name| scene.object(name).map(|o| (name.clone(), o.matrix_world)))
                .collect(),
        };
        let file = File::create(&request.path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &snapshot)?;
        log::debug!("SnapshotExporter: Wrote {:?}.", request.path);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub armature: String,
    pub format: ExportFormat,
    pub include_mesh: bool,
    pub add_leaf_bones: bool,
    pub simplify: f32,
    pub rename_on_export: bool,
    pub scale: f32,
    pub rotation_degrees: [f32; 3],
    pub output_dir: PathBuf,
}

#[derive(Debug, Default)]
pub struct ExportSummary {
    pub written: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
    pub temporary_rename: Option<ApplyReport>,
    pub pose_only: bool,
}

/// Clips with at least one pose-bone curve, plus the armature's bound clip.
pub fn gather_actions(scene: &Scene, armature: &str) -> Vec<String> {
    let mut names: Vec<String> = scene
        .actions
        .iter()
        .filter(|a| a.has_pose_curves())
        .map(|a| a.name.clone())
        .collect();
    if let Some(active) = scene.object(armature).and_then(|o| o.active_action())
        && !names.iter().any(|n| n == active)
    {
        names.push(active.to_string());
    }
    names
}

pub fn export_file_name(armature: &str, action: Option<&str>, format: ExportFormat) -> String {
    let suffix = match action {
        Some(name) => path_utils::sanitize_file_stem(name),
        None => POSE_SUFFIX.to_string(),
    };
    format!("{armature}_{suffix}.{}", format.extension())
}

fn selected_objects(scene: &Scene, options: &ExportOptions) -> Vec<String> {
    let mut objects = vec![options.armature.clone()];
    if options.include_mesh && options.format.includes_meshes() {
        objects.extend(scene.meshes_bound_to(&options.armature));
    }
    objects
}

fn rotate_world(scene: &mut Scene, objects: &[String], degrees: [f32; 3]) -> Vec<(String, Mat4)> {
    let [rx, ry, rz] = degrees.map(f32::to_radians);
    // XYZ Euler in the host's sense: X is applied first, then Y, then Z.
    let rotation = Mat4::from_euler(EulerRot::ZYX, rz, ry, rx);
    let mut originals = Vec::with_capacity(objects.len());
    for name in objects {
        if let Some(obj) = scene.object_mut(name) {
            originals.push((name.clone(), obj.matrix_world));
            obj.matrix_world = rotation * obj.matrix_world;
        }
    }
    originals
}

fn restore_world(scene: &mut Scene, originals: Vec<(String, Mat4)>) {
    for (name, matrix) in originals {
        if let Some(obj) = scene.object_mut(&name) {
            obj.matrix_world = matrix;
        }
    }
}

fn clip_frame_range(scene: &Scene, action: Option<&str>) -> Option<(i32, i32)> {
    let range = scene.action(action?)?.frame_range?;
    Some((range[0] as i32, range[1] as i32))
}

fn base_request(options: &ExportOptions, path: PathBuf, objects: Vec<String>) -> ExportRequest {
    ExportRequest {
        path,
        format: options.format,
        armature: options.armature.clone(),
        selected_objects: objects,
        frame_start: 0,
        frame_end: 0,
        axis_forward: AXIS_FORWARD.to_string(),
        axis_up: AXIS_UP.to_string(),
        scale: options.scale,
        add_leaf_bones: options.add_leaf_bones,
        simplify: options.simplify,
        all_actions: false,
        takes: Vec::new(),
    }
}

/*
 * Rotates, exports and restores for one file. The frame range must already be
 * set on the scene.
 */
fn export_rotated(
    scene: &mut Scene,
    options: &ExportOptions,
    exporter: &dyn ExporterOperations,
    mut request: ExportRequest,
) -> Result<PathBuf> {
    request.frame_start = scene.frame_start;
    request.frame_end = scene.frame_end;
    let originals = rotate_world(scene, &request.selected_objects, options.rotation_degrees);
    let result = exporter.export(scene, &request);
    restore_world(scene, originals);
    result.map(|()| request.path)
}

/*
 * The shared frame of every export: validates the armature, prepares the output
 * directory, applies the optional temporary rename and undoes everything that
 * `body` may have left behind once it returns.
 */
fn run_export<T>(
    scene: &mut Scene,
    options: &ExportOptions,
    store: &MappingStore,
    body: impl FnOnce(&mut Scene, &mut ExportSummary) -> Result<T>,
) -> Result<(T, ExportSummary)> {
    let armature = options.armature.as_str();
    let mapping = if options.rename_on_export {
        store.build_apply_mapping(scene.armature(armature)?)
    } else {
        scene.armature(armature)?;
        RenameMapping::new()
    };
    fs::create_dir_all(&options.output_dir)?;

    let mut summary = ExportSummary::default();
    if !mapping.is_empty() {
        log::debug!("Export: Applying temporary rename of {} bones.", mapping.len());
        summary.temporary_rename = Some(remap::apply_mapping(scene, armature, &mapping)?);
    }

    let frame_range = (scene.frame_start, scene.frame_end);
    let result = body(scene, &mut summary);
    scene.frame_start = frame_range.0;
    scene.frame_end = frame_range.1;

    if !mapping.is_empty()
        && let Err(e) = remap::apply_mapping(scene, armature, &mapping.inverse())
    {
        log::error!("Export: Reverting the temporary rename failed: {e}");
        if result.is_ok() {
            return Err(e.into());
        }
    }
    result.map(|value| (value, summary))
}

/// Exports the armature's bound clip, or the current pose without one, to one file.
pub fn export_current_action(
    scene: &mut Scene,
    options: &ExportOptions,
    store: &MappingStore,
    exporter: &dyn ExporterOperations,
) -> Result<ExportSummary> {
    let (path, mut summary) = run_export(scene, options, store, |scene, summary| {
        let action = scene
            .object(&options.armature)
            .and_then(|o| o.active_action())
            .map(str::to_string);
        if let Some((start, end)) = clip_frame_range(scene, action.as_deref()) {
            scene.frame_start = start;
            scene.frame_end = end;
        }
        summary.pose_only = action.is_none();
        let file_name = export_file_name(&options.armature, action.as_deref(), options.format);
        let mut request = base_request(
            options,
            options.output_dir.join(file_name),
            selected_objects(scene, options),
        );
        request.takes = action.into_iter().collect();
        export_rotated(scene, options, exporter, request)
    })?;
    log::info!("Export: Wrote {path:?}.");
    summary.written.push(path);
    Ok(summary)
}

/*
 * Exports every gathered clip to its own file. Without any clip the current
 * pose is exported once. A file that fails is reported in the summary and the
 * remaining clips still export.
 */
pub fn export_all_actions(
    scene: &mut Scene,
    options: &ExportOptions,
    store: &MappingStore,
    exporter: &dyn ExporterOperations,
) -> Result<ExportSummary> {
    let actions = gather_actions(scene, &options.armature);
    let (_, summary) = run_export(scene, options, store, |scene, summary| {
        let clips: Vec<Option<String>> = if actions.is_empty() {
            summary.pose_only = true;
            vec![None]
        } else {
            actions.iter().cloned().map(Some).collect()
        };
        let default_range = (scene.frame_start, scene.frame_end);
        for clip in clips {
            let previous = scene.object_mut(&options.armature).map(|o| {
                let saved = o.animation_data.clone();
                o.animation_data_create().action = clip.clone();
                saved
            });
            let (start, end) = clip_frame_range(scene, clip.as_deref()).unwrap_or(default_range);
            scene.frame_start = start;
            scene.frame_end = end;

            let file_name = export_file_name(&options.armature, clip.as_deref(), options.format);
            let path = options.output_dir.join(file_name);
            let mut request = base_request(options, path.clone(), selected_objects(scene, options));
            request.takes = clip.into_iter().collect();
            match export_rotated(scene, options, exporter, request) {
                Ok(written) => summary.written.push(written),
                Err(e) => {
                    log::warn!("Export: {} export failed for {path:?}: {e}", options.format.extension());
                    summary.failures.push((path, e.to_string()));
                }
            }
            if let (Some(obj), Some(saved)) = (scene.object_mut(&options.armature), previous) {
                obj.animation_data = saved;
            }
        }
        Ok(())
    })?;
    log::info!(
        "Export: Exported {} file(s) to {:?}.",
        summary.written.len(),
        options.output_dir
    );
    Ok(summary)
}

/*
 * Exports every gathered clip as a take of one FBX file. The frame range spans
 * all clips: from the floor of the earliest start to the ceiling of the latest
 * end.
 */
pub fn export_all_actions_one_file(
    scene: &mut Scene,
    options: &ExportOptions,
    store: &MappingStore,
    exporter: &dyn ExporterOperations,
) -> Result<ExportSummary> {
    if options.format != ExportFormat::Fbx {
        return Err(ExportError::UnsupportedFormat(options.format));
    }
    let actions = gather_actions(scene, &options.armature);
    let (path, mut summary) = run_export(scene, options, store, |scene, _| {
        let ranges: Vec<[f32; 2]> = actions
            .iter()
            .filter_map(|name| scene.action(name).and_then(|a| a.frame_range))
            .collect();
        if !ranges.is_empty() {
            let start = ranges.iter().map(|r| r[0]).fold(f32::INFINITY, f32::min);
            let end = ranges.iter().map(|r| r[1]).fold(f32::NEG_INFINITY, f32::max);
            scene.frame_start = start.floor() as i32;
            scene.frame_end = end.ceil() as i32;
        }
        let file_name = format!(
            "{}_{ALL_ACTIONS_SUFFIX}.{}",
            options.armature,
            options.format.extension()
        );
        let mut request = base_request(
            options,
            options.output_dir.join(file_name),
            selected_objects(scene, options),
        );
        request.all_actions = true;
        request.takes = actions.clone();
        export_rotated(scene, options, exporter, request)
    })?;
    log::info!("Export: Wrote {path:?} with {} takes.", actions.len());
    summary.written.push(path);
    Ok(summary)
}
