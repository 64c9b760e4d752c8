/*
 * This module consolidates the host-agnostic logic of the retargeting tool. It
 * holds the scene model, the mapping table, the collision-safe rename engine
 * with its reference patching, mapping file persistence, live follow
 * constraints, export orchestration, selection sync and the user preferences.
 * Abstractions such as `MappingFileOperations`, `PreferencesManagerOperations`
 * and `ExporterOperations` are re-exported for the command layer.
 */
pub mod export;
pub mod follow;
pub mod highlight;
pub mod mapping_file;
pub mod mapping_store;
pub mod models;
pub mod path_utils;
pub mod preferences;
pub mod reference_patcher;
pub mod remap;
pub mod rename_engine;
pub mod scene;
pub mod selection_sync;
pub mod session;

// Re-export key structures and enums
pub use models::{ArmatureSide, BoneMapRow, ExportFormat, FollowDirection, FollowMode, RenameMapping};
pub use scene::{ObjectMode, Scene, SceneError};

pub use mapping_store::MappingStore;
pub use remap::{ApplyReport, apply_mapping, repair_batch};
pub use rename_engine::{RenameError, RepairStrategy};

// Re-export persistence related items
pub use mapping_file::{CoreMappingFileManager, MappingFileOperations};

#[cfg(test)]
pub use mapping_file::MappingFileError;

pub use preferences::{CorePreferencesManager, ExportDefaults, PreferencesManagerOperations};

#[cfg(test)]
pub use preferences::PreferencesError;

// Re-export export related items
pub use export::{
    ExportError, ExportOptions, ExportRequest, ExportSummary, ExporterOperations, SnapshotExporter,
};

pub use follow::{FollowChange, FollowState};
pub use selection_sync::{ActiveBoneSource, SceneSelection, SelectionSync};
pub use session::{RetargetSession, RetargetSettings};
