/*
 * The per-scene working state of a retargeting session: the mapping table, the
 * user's settings, the live-follow state and the selection poller. Commands
 * receive the session and the scene explicitly; nothing here reaches for a
 * global context.
 */
use crate::core::export::ExportOptions;
use crate::core::follow::FollowState;
use crate::core::mapping_store::MappingStore;
use crate::core::models::{ArmatureSide, ExportFormat, FollowMode};
use crate::core::preferences::ExportDefaults;
use crate::core::selection_sync::SelectionSync;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetargetSettings {
    pub source_armature: Option<String>,
    pub target_armature: Option<String>,
    // Which rig the Current column reflects.
    pub current_side: ArmatureSide,
    pub export_side: ArmatureSide,
    pub export_format: ExportFormat,
    pub include_mesh: bool,
    pub add_leaf_bones: bool,
    pub simplify: f32,
    pub rename_on_export: bool,
    pub export_scale: f32,
    pub rotation_degrees: [f32; 3],
    pub output_dir: Option<PathBuf>,
    pub mapping_path: Option<PathBuf>,
    pub follow_mode: FollowMode,
    pub follow_row_selection: bool,
    pub mark_all: bool,
}

impl Default for RetargetSettings {
    fn default() -> Self {
        let defaults = ExportDefaults::default();
        RetargetSettings {
            source_armature: None,
            target_armature: None,
            current_side: ArmatureSide::Target,
            export_side: ArmatureSide::Target,
            export_format: ExportFormat::Fbx,
            include_mesh: true,
            add_leaf_bones: false,
            simplify: 0.0,
            rename_on_export: true,
            export_scale: defaults.scale,
            rotation_degrees: [defaults.rot_x, defaults.rot_y, defaults.rot_z],
            output_dir: None,
            mapping_path: None,
            follow_mode: FollowMode::RotationOnly,
            follow_row_selection: true,
            mark_all: false,
        }
    }
}

impl RetargetSettings {
    pub fn armature_for(&self, side: ArmatureSide) -> Option<&str> {
        match side {
            ArmatureSide::Source => self.source_armature.as_deref(),
            ArmatureSide::Target => self.target_armature.as_deref(),
        }
    }

    pub fn apply_export_defaults(&mut self, defaults: &ExportDefaults) {
        self.export_scale = defaults.scale;
        self.rotation_degrees = [defaults.rot_x, defaults.rot_y, defaults.rot_z];
    }

    pub fn export_defaults(&self) -> ExportDefaults {
        ExportDefaults {
            scale: self.export_scale,
            rot_x: self.rotation_degrees[0],
            rot_y: self.rotation_degrees[1],
            rot_z: self.rotation_degrees[2],
        }
    }

    /// Export options for the configured export side, or `None` when that side has no armature.
    pub fn export_options(&self) -> Option<ExportOptions> {
        let armature = self.armature_for(self.export_side)?;
        Some(ExportOptions {
            armature: armature.to_string(),
            format: self.export_format,
            include_mesh: self.include_mesh,
            add_leaf_bones: self.add_leaf_bones,
            simplify: self.simplify,
            rename_on_export: self.rename_on_export,
            scale: self.export_scale,
            rotation_degrees: self.rotation_degrees,
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

#[derive(Debug, Default)]
pub struct RetargetSession {
    pub store: MappingStore,
    pub settings: RetargetSettings,
    pub follow: FollowState,
    pub selection_sync: SelectionSync,
}

impl RetargetSession {
    pub fn new(settings: RetargetSettings) -> Self {
        RetargetSession {
            settings,
            ..Self::default()
        }
    }
}
