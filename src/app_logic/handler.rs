use crate::core::{
    self, ActiveBoneSource, ArmatureSide, ExportError, ExportSummary, ExporterOperations,
    FollowChange, FollowDirection, MappingFileOperations, ObjectMode, PreferencesManagerOperations,
    RenameMapping, RepairStrategy, RetargetSession, RetargetSettings, Scene, SceneSelection,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

// Made pub(crate) for access from handler_tests.rs
pub(crate) const APP_NAME_FOR_PREFERENCES: &str = "RigRetarget";
const DEFAULT_MAPPING_FILE: &str = "bone_mapping.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Information,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub severity: MessageSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Finished,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub reports: Vec<Report>,
}

impl CommandResult {
    fn finished() -> Self {
        CommandResult {
            status: CommandStatus::Finished,
            reports: Vec::new(),
        }
    }

    fn info(message: impl Into<String>) -> Self {
        Self::finished().with(MessageSeverity::Information, message)
    }

    fn cancelled(severity: MessageSeverity, message: impl Into<String>) -> Self {
        CommandResult {
            status: CommandStatus::Cancelled,
            reports: Vec::new(),
        }
        .with(severity, message)
    }

    fn with(mut self, severity: MessageSeverity, message: impl Into<String>) -> Self {
        let message = message.into();
        match severity {
            MessageSeverity::Information => log::info!("AppLogic: {message}"),
            MessageSeverity::Warning => log::warn!("AppLogic: {message}"),
            MessageSeverity::Error => log::error!("AppLogic: {message}"),
        }
        self.reports.push(Report { severity, message });
        self
    }

    pub fn is_finished(&self) -> bool {
        self.status == CommandStatus::Finished
    }
}

/*
 * The command layer of the retargeting tool. Each public method corresponds to
 * one user-facing command; it validates its preconditions against the scene,
 * delegates to the core and folds every outcome into a `CommandResult`. Errors
 * never escape: a failure cancels the command and becomes an error report.
 *
 * File access goes through `MappingFileOperations` and
 * `PreferencesManagerOperations`, and exports through `ExporterOperations`, so
 * tests can substitute mocks for all three.
 */
pub struct RetargetAppLogic {
    pub(crate) session: RetargetSession,
    mapping_files: Arc<dyn MappingFileOperations>,
    preferences: Arc<dyn PreferencesManagerOperations>,
    exporter: Arc<dyn ExporterOperations>,
}

impl RetargetAppLogic {
    pub fn new(
        mapping_files: Arc<dyn MappingFileOperations>,
        preferences: Arc<dyn PreferencesManagerOperations>,
        exporter: Arc<dyn ExporterOperations>,
    ) -> Self {
        RetargetAppLogic {
            session: RetargetSession::new(RetargetSettings::default()),
            mapping_files,
            preferences,
            exporter,
        }
    }

    pub fn session(&self) -> &RetargetSession {
        &self.session
    }

    pub fn settings_mut(&mut self) -> &mut RetargetSettings {
        &mut self.session.settings
    }

    fn armature_name(&self, scene: &Scene, side: ArmatureSide) -> Option<String> {
        self.session
            .settings
            .armature_for(side)
            .filter(|name| scene.is_armature(name))
            .map(str::to_string)
    }

    fn both_armatures(&self, scene: &Scene) -> Option<(String, String)> {
        Some((
            self.armature_name(scene, ArmatureSide::Source)?,
            self.armature_name(scene, ArmatureSide::Target)?,
        ))
    }

    fn current_side_armature(&self, scene: &Scene) -> Option<String> {
        self.armature_name(scene, self.session.settings.current_side)
    }

    fn mark_mapped(&self, scene: &mut Scene) -> (usize, usize) {
        let settings = &self.session.settings;
        core::highlight::mark_mapped(
            scene,
            settings.source_armature.as_deref(),
            settings.target_armature.as_deref(),
            self.session.store.rows(),
        )
    }

    /*
     * Chooses the armature for one side. Picking a non-armature is refused.
     * When the table is still empty it is seeded from the source rig, or from
     * the target rig if no source is set.
     */
    pub fn set_armature(
        &mut self,
        scene: &Scene,
        side: ArmatureSide,
        name: Option<&str>,
    ) -> CommandResult {
        if let Some(name) = name
            && !scene.is_armature(name)
        {
            return CommandResult::cancelled(
                MessageSeverity::Error,
                format!("'{name}' is not an armature."),
            );
        }
        let slot = match side {
            ArmatureSide::Source => &mut self.session.settings.source_armature,
            ArmatureSide::Target => &mut self.session.settings.target_armature,
        };
        *slot = name.map(str::to_string);

        let mut result = CommandResult::finished();
        if self.session.store.is_empty() {
            let seed_from = self
                .armature_name(scene, ArmatureSide::Source)
                .or_else(|| self.armature_name(scene, ArmatureSide::Target));
            if let Some(seed_from) = seed_from
                && let Ok(armature) = scene.armature(&seed_from)
            {
                let count = self.session.store.seed_from_armature(armature);
                result = result.with(
                    MessageSeverity::Information,
                    format!("Listed {count} bones from '{seed_from}'."),
                );
            }
        }
        result
    }

    pub fn populate_from(&mut self, scene: &Scene, side: ArmatureSide) -> CommandResult {
        let Some(name) = self.armature_name(scene, side) else {
            return CommandResult::cancelled(
                MessageSeverity::Error,
                format!("Pick a valid {} armature.", side.label()),
            );
        };
        match scene.armature(&name) {
            Ok(armature) => {
                let count = self.session.store.seed_from_armature(armature);
                CommandResult::info(format!("Listed {count} bones from '{name}'."))
            }
            Err(e) => CommandResult::cancelled(MessageSeverity::Error, e.to_string()),
        }
    }

    pub fn set_rig_mode(&mut self, scene: &mut Scene, mode: ObjectMode) -> CommandResult {
        let mut changed = 0;
        for side in [ArmatureSide::Source, ArmatureSide::Target] {
            if let Some(name) = self.armature_name(scene, side)
                && let Ok(armature) = scene.armature_mut(&name)
            {
                armature.mode = mode;
                changed += 1;
            }
        }
        CommandResult::info(format!("{mode:?} mode set on {changed} armature(s)."))
    }

    pub fn highlight_rigs(&mut self, scene: &mut Scene) -> CommandResult {
        let Some((source, target)) = self.both_armatures(scene) else {
            return CommandResult::cancelled(
                MessageSeverity::Error,
                "Pick valid Source and Target armatures.",
            );
        };
        match core::highlight::highlight_rigs(scene, &source, &target) {
            Ok(()) => CommandResult::info("Applied Source and Target bone groups."),
            Err(e) => CommandResult::cancelled(MessageSeverity::Error, e.to_string()),
        }
    }

    pub fn refresh_mapped_colors(&mut self, scene: &mut Scene) -> CommandResult {
        let (source, target) = self.mark_mapped(scene);
        CommandResult::info(format!(
            "Mapped coloring applied. Source: {source}, Target: {target}"
        ))
    }

    /*
     * Records the pair of bones currently pointed at on the two rigs. Both rigs
     * are put into pose mode first.
     */
    pub fn capture_pair(&mut self, scene: &mut Scene) -> CommandResult {
        let Some((source, target)) = self.both_armatures(scene) else {
            return CommandResult::cancelled(
                MessageSeverity::Error,
                "Pick valid Source and Target armatures.",
            );
        };
        for name in [&source, &target] {
            if let Ok(armature) = scene.armature_mut(name) {
                armature.mode = ObjectMode::Pose;
            }
        }
        let selection = SceneSelection {
            scene,
            source_armature: Some(source.as_str()),
            target_armature: Some(target.as_str()),
        };
        let (Some(source_bone), Some(target_bone)) = (
            selection.active_bone(ArmatureSide::Source),
            selection.active_bone(ArmatureSide::Target),
        ) else {
            return CommandResult::cancelled(
                MessageSeverity::Error,
                "Select an active bone on Source and on Target, then try again.",
            );
        };
        let side = self.session.settings.current_side;
        self.session.store.capture(&source_bone, &target_bone, side);
        self.mark_mapped(scene);
        CommandResult::info(format!(
            "Captured: Original='{source_bone}' -> Rename='{target_bone}'"
        ))
    }

    /*
     * Renames Original -> Rename on one rig and patches every dependent
     * reference. When that rig feeds the Current column the affected rows get
     * their new names recorded.
     */
    pub fn apply_to(&mut self, scene: &mut Scene, side: ArmatureSide) -> CommandResult {
        let label = side.label();
        let Some(name) = self.armature_name(scene, side) else {
            return CommandResult::cancelled(
                MessageSeverity::Error,
                format!("Pick a valid {label} armature."),
            );
        };
        let mapping = match scene.armature(&name) {
            Ok(armature) => self.session.store.build_apply_mapping(armature),
            Err(e) => return CommandResult::cancelled(MessageSeverity::Error, e.to_string()),
        };
        if mapping.is_empty() {
            return CommandResult::cancelled(
                MessageSeverity::Information,
                format!("No applicable changes on {label} (check Original names exist)."),
            );
        }
        match core::apply_mapping(scene, &name, &mapping) {
            Ok(report) => {
                if self.session.settings.current_side == side {
                    self.session.store.record_applied(&mapping);
                }
                self.mark_mapped(scene);
                CommandResult::info(format!("[{label}] {report}"))
            }
            Err(e) => CommandResult::cancelled(MessageSeverity::Error, e.to_string()),
        }
    }

    /*
     * Shared body of the revert commands: renames Current -> Original on the rig
     * feeding the Current column for the rows picked by `include`, then resets
     * their Current column. The reset happens even without a rig to rename.
     */
    fn revert_rows<F>(&mut self, scene: &mut Scene, include: F) -> CommandResult
    where
        F: Fn(usize, &crate::core::BoneMapRow) -> bool,
    {
        let armature = self.current_side_armature(scene);
        let mapping = match &armature {
            Some(name) => match scene.armature(name) {
                Ok(arm) => self.session.store.build_revert_mapping(arm, &include),
                Err(_) => RenameMapping::new(),
            },
            None => RenameMapping::new(),
        };

        let mut result = CommandResult::finished();
        if let Some(name) = armature
            && !mapping.is_empty()
        {
            match core::apply_mapping(scene, &name, &mapping) {
                Ok(report) => {
                    let pairs: Vec<String> = mapping
                        .iter()
                        .map(|(cur, ori)| format!("'{cur}' -> '{ori}'"))
                        .collect();
                    result = result.with(
                        MessageSeverity::Information,
                        format!("Reverted {}. {report}", pairs.join(", ")),
                    );
                }
                Err(e) => return CommandResult::cancelled(MessageSeverity::Error, e.to_string()),
            }
        }
        let reset = self.session.store.reset_current_to_original(&include);
        result.with(
            MessageSeverity::Information,
            format!("Revert complete. Current reset on {reset} row(s)."),
        )
    }

    pub fn revert_row(&mut self, scene: &mut Scene, index: usize) -> CommandResult {
        if index >= self.session.store.len() {
            return CommandResult::cancelled(MessageSeverity::Error, "Invalid row index.");
        }
        self.revert_rows(scene, |i, _| i == index)
    }

    pub fn revert_marked(&mut self, scene: &mut Scene) -> CommandResult {
        self.revert_rows(scene, |_, row| row.marked)
    }

    pub fn revert_all(&mut self, scene: &mut Scene) -> CommandResult {
        self.revert_rows(scene, |_, _| true)
    }

    pub fn refresh_current(&mut self, scene: &Scene) -> CommandResult {
        let Some(name) = self.current_side_armature(scene) else {
            return CommandResult::cancelled(
                MessageSeverity::Information,
                "No rig set, Current stays as-is.",
            );
        };
        match scene.armature(&name) {
            Ok(armature) => {
                let count = self.session.store.refresh_current(armature);
                CommandResult::info(format!("Updated Current for {count} rows."))
            }
            Err(e) => CommandResult::cancelled(MessageSeverity::Error, e.to_string()),
        }
    }

    pub fn set_mark_all(&mut self, marked: bool) -> CommandResult {
        self.session.settings.mark_all = marked;
        self.session.store.set_mark_all(marked);
        CommandResult::finished()
    }

    pub fn set_row_marked(&mut self, index: usize, marked: bool) -> CommandResult {
        match self.session.store.row_mut(index) {
            Some(row) => {
                row.marked = marked;
                CommandResult::finished()
            }
            None => CommandResult::cancelled(MessageSeverity::Error, "Invalid row index."),
        }
    }

    pub fn set_row_rename(&mut self, index: usize, rename: &str) -> CommandResult {
        match self.session.store.row_mut(index) {
            Some(row) => {
                row.target_name = rename.trim().to_string();
                CommandResult::finished()
            }
            None => CommandResult::cancelled(MessageSeverity::Error, "Invalid row index."),
        }
    }

    pub fn remove_row(&mut self, index: usize) -> CommandResult {
        match self.session.store.remove_row(index) {
            Some(row) => CommandResult::info(format!("Removed row '{}'.", row.original_name)),
            None => CommandResult::cancelled(MessageSeverity::Error, "Invalid row index."),
        }
    }

    /// Makes `index` the active row and, with row following on, selects its bones on both rigs.
    pub fn select_row(&mut self, scene: &mut Scene, index: usize) -> CommandResult {
        if index >= self.session.store.len() {
            return CommandResult::cancelled(MessageSeverity::Error, "Invalid row index.");
        }
        self.session.store.set_active_index(Some(index));
        if self.session.settings.follow_row_selection {
            let source = self.armature_name(scene, ArmatureSide::Source);
            let target = self.armature_name(scene, ArmatureSide::Target);
            core::selection_sync::select_row_bones(
                scene,
                source.as_deref(),
                target.as_deref(),
                &self.session.store,
                index,
            );
        }
        CommandResult::finished()
    }

    pub fn toggle_auto_sync(&mut self) -> CommandResult {
        if self.session.selection_sync.toggle() {
            CommandResult::info("Auto-Sync ON")
        } else {
            CommandResult::info("Auto-Sync OFF")
        }
    }

    // Drives the selection poller; meant to be called from the host's idle loop.
    pub fn on_sync_tick(&mut self, scene: &Scene, now: Instant) -> Option<usize> {
        let settings = &self.session.settings;
        let selection = SceneSelection {
            scene,
            source_armature: settings.source_armature.as_deref(),
            target_armature: settings.target_armature.as_deref(),
        };
        self.session
            .selection_sync
            .tick(now, &selection, &mut self.session.store)
    }

    pub fn save_mapping(&mut self, path: Option<&Path>) -> CommandResult {
        let target_path = path
            .map(Path::to_path_buf)
            .or_else(|| self.session.settings.mapping_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MAPPING_FILE));
        let mapping = self.session.store.snapshot_for_save();
        match self.mapping_files.save_mapping(&target_path, &mapping) {
            Ok(written) => {
                let message = format!("Saved {} pairs to: {}", mapping.len(), written.display());
                self.session.settings.mapping_path = Some(written);
                CommandResult::info(message)
            }
            Err(e) => CommandResult::cancelled(
                MessageSeverity::Error,
                format!("Failed to write mapping: {e}"),
            ),
        }
    }

    /*
     * Loads a mapping file and merges it into the table. Rows are never
     * removed; blank Current cells are filled from the rig feeding the Current
     * column. A read failure leaves the table untouched.
     */
    pub fn load_mapping(&mut self, scene: &mut Scene, path: Option<&Path>) -> CommandResult {
        let Some(source_path) = path
            .map(Path::to_path_buf)
            .or_else(|| self.session.settings.mapping_path.clone())
        else {
            return CommandResult::cancelled(MessageSeverity::Error, "No file chosen.");
        };
        let mapping = match self.mapping_files.load_mapping(&source_path) {
            Ok(mapping) => mapping,
            Err(e) => {
                return CommandResult::cancelled(
                    MessageSeverity::Error,
                    format!("Failed to read mapping: {e}"),
                );
            }
        };
        let merged = self.session.store.merge_loaded(&mapping);
        self.session.settings.mapping_path = Some(core::path_utils::ensure_txt_extension(&source_path));
        let filled = match self
            .current_side_armature(scene)
            .and_then(|name| scene.armature(&name).ok())
        {
            Some(armature) => self.session.store.backfill_blank_current(armature),
            None => 0,
        };
        self.mark_mapped(scene);
        CommandResult::info(format!(
            "Merged {} rows, added {}. Current filled for {filled}.",
            merged.updated, merged.added
        ))
    }

    pub fn toggle_follow(&mut self, scene: &mut Scene, direction: FollowDirection) -> CommandResult {
        let Some((source, target)) = self.both_armatures(scene) else {
            return CommandResult::cancelled(
                MessageSeverity::Error,
                "Pick valid Source and Target armatures.",
            );
        };
        let label = match direction {
            FollowDirection::SourceToTarget => "Source -> Target",
            FollowDirection::TargetToSource => "Target -> Source",
        };
        let mode = self.session.settings.follow_mode;
        match self.session.follow.toggle(
            scene,
            (source.as_str(), target.as_str()),
            self.session.store.rows(),
            direction,
            mode,
        ) {
            Ok(FollowChange::Enabled { added, .. }) => {
                CommandResult::info(format!("Live follow {label} ON. Added {added} constraints."))
            }
            Ok(FollowChange::Disabled { removed }) => CommandResult::info(format!(
                "Live follow {label} OFF. Removed {removed} constraints."
            )),
            Err(e) => CommandResult::cancelled(MessageSeverity::Error, e.to_string()),
        }
    }

    pub fn clear_follow(&mut self, scene: &mut Scene) -> CommandResult {
        let settings = &self.session.settings;
        let source = settings.source_armature.clone().unwrap_or_default();
        let target = settings.target_armature.clone().unwrap_or_default();
        let removed = self.session.follow.clear(scene, (source.as_str(), target.as_str()));
        CommandResult::info(format!("Removed {removed} follow constraints."))
    }

    fn run_export<F>(&mut self, scene: &mut Scene, batch: bool, export: F) -> CommandResult
    where
        F: FnOnce(
            &mut Scene,
            &core::ExportOptions,
            &core::MappingStore,
            &dyn ExporterOperations,
        ) -> Result<ExportSummary, ExportError>,
    {
        let side = self.session.settings.export_side;
        let options = match self.session.settings.export_options() {
            Some(options) if scene.is_armature(&options.armature) => options,
            _ => {
                return CommandResult::cancelled(
                    MessageSeverity::Error,
                    format!("Pick a valid {} armature.", side.label()),
                );
            }
        };
        match export(scene, &options, &self.session.store, self.exporter.as_ref()) {
            Ok(summary) => {
                let mut result = CommandResult::finished();
                if summary.pose_only {
                    result = result.with(
                        MessageSeverity::Information,
                        "No actions found; exporting current pose only.",
                    );
                }
                let format = options.format.extension().to_uppercase();
                for (path, error) in &summary.failures {
                    result = result.with(
                        MessageSeverity::Warning,
                        format!("{format} export failed for {}: {error}", path.display()),
                    );
                }
                let message = match summary.written.as_slice() {
                    [single] if !batch => format!("Wrote {}", single.display()),
                    written => format!(
                        "Exported {} file(s) to {}",
                        written.len(),
                        options.output_dir.display()
                    ),
                };
                result.with(MessageSeverity::Information, message)
            }
            Err(e) => CommandResult::cancelled(MessageSeverity::Error, format!("Export failed: {e}")),
        }
    }

    pub fn export_current_action(&mut self, scene: &mut Scene) -> CommandResult {
        self.run_export(scene, false, core::export::export_current_action)
    }

    pub fn export_all_actions(&mut self, scene: &mut Scene) -> CommandResult {
        self.run_export(scene, true, core::export::export_all_actions)
    }

    pub fn export_all_actions_one_file(&mut self, scene: &mut Scene) -> CommandResult {
        if self.session.settings.export_format != core::ExportFormat::Fbx {
            return CommandResult::cancelled(
                MessageSeverity::Error,
                "This command is FBX-only. Switch the export format to FBX.",
            );
        }
        self.run_export(scene, false, core::export::export_all_actions_one_file)
    }

    pub fn load_export_defaults(&mut self) -> CommandResult {
        match self
            .preferences
            .load_export_defaults(APP_NAME_FOR_PREFERENCES)
        {
            Ok(defaults) => {
                self.session.settings.apply_export_defaults(&defaults);
                CommandResult::info("Loaded export defaults.")
            }
            Err(e) => CommandResult::cancelled(
                MessageSeverity::Error,
                format!("Could not load export defaults: {e}"),
            ),
        }
    }

    pub fn save_export_defaults(&mut self) -> CommandResult {
        let defaults = self.session.settings.export_defaults();
        match self
            .preferences
            .save_export_defaults(APP_NAME_FOR_PREFERENCES, &defaults)
        {
            Ok(()) => CommandResult::info("Saved export defaults."),
            Err(e) => CommandResult::cancelled(
                MessageSeverity::Error,
                format!("Could not save export defaults: {e}"),
            ),
        }
    }

    /// Finishes or rolls back a rename batch left half-done on one rig.
    pub fn repair_interrupted_rename(
        &mut self,
        scene: &mut Scene,
        side: ArmatureSide,
        strategy: RepairStrategy,
    ) -> CommandResult {
        let Some(name) = self.armature_name(scene, side) else {
            return CommandResult::cancelled(
                MessageSeverity::Error,
                format!("Pick a valid {} armature.", side.label()),
            );
        };
        match scene.armature(&name) {
            Ok(armature) if core::rename_engine::has_interrupted_batch(armature) => {}
            Ok(_) => return CommandResult::info(format!("No interrupted rename on '{name}'.")),
            Err(e) => return CommandResult::cancelled(MessageSeverity::Error, e.to_string()),
        }
        match core::repair_batch(scene, &name, strategy) {
            Ok((report, outcome)) => {
                if strategy == RepairStrategy::Complete
                    && self.session.settings.current_side == side
                {
                    self.session.store.record_applied(&outcome.completed);
                }
                self.mark_mapped(scene);
                CommandResult::info(format!(
                    "Repaired '{name}' ({strategy:?}): {} bone(s) renamed.",
                    report.renamed
                ))
            }
            Err(e) => CommandResult::cancelled(MessageSeverity::Error, e.to_string()),
        }
    }
}
