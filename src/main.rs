// src/main.rs

mod app_logic;
mod core;

use crate::app_logic::{CommandResult, MessageSeverity, RetargetAppLogic};
use crate::core::{
    ArmatureSide, CoreMappingFileManager, CorePreferencesManager, ExportFormat, RepairStrategy,
    Scene, SnapshotExporter,
};
use clap::{Parser, Subcommand, ValueEnum};
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

const LOG_FILE_NAME: &str = "rig_retarget.log";

#[derive(Parser)]
#[command(name = "rig_retarget")]
#[command(version = "0.1.0")]
#[command(about = "Bone mapping, collision-safe renaming and export for two-rig scenes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Name of the source armature object in the scene
    #[arg(long, global = true)]
    source: Option<String>,

    /// Name of the target armature object in the scene
    #[arg(long, global = true)]
    target: Option<String>,

    /// Log debug output to rig_retarget.log as well as the terminal
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SideArg {
    Source,
    Target,
}

impl From<SideArg> for ArmatureSide {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Source => ArmatureSide::Source,
            SideArg::Target => ArmatureSide::Target,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Fbx,
    Bvh,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Complete,
    Undo,
}

#[derive(Subcommand)]
enum Commands {
    /// Rename Original -> Rename on one rig and patch all references
    Apply {
        scene: PathBuf,
        mapping: PathBuf,
        #[arg(value_enum, default_value = "target")]
        side: SideArg,
    },

    /// Rename every mapped bone of one rig back to its original name
    RevertAll {
        scene: PathBuf,
        mapping: PathBuf,
        #[arg(value_enum, default_value = "target")]
        side: SideArg,
    },

    /// Export every clip of the export rig, one file per clip
    Export {
        scene: PathBuf,
        out_dir: PathBuf,
        #[arg(value_enum, default_value = "fbx")]
        format: FormatArg,

        /// Mapping applied temporarily while exporting
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// Rig to export
        #[arg(long, value_enum, default_value = "target")]
        side: SideArg,

        /// Write all clips as takes of a single FBX file
        #[arg(long)]
        one_file: bool,
    },

    /// Finish or roll back a rename batch that was interrupted
    Repair {
        scene: PathBuf,
        #[arg(value_enum, default_value = "complete")]
        strategy: StrategyArg,
        #[arg(long, value_enum, default_value = "target")]
        side: SideArg,
    },
}

fn init_logging(verbose: bool) {
    let file_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut loggers: Vec<Box<dyn simplelog::SharedLogger>> = vec![TermLogger::new(
        LevelFilter::Warn,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    match File::create(LOG_FILE_NAME) {
        Ok(file) => loggers.push(WriteLogger::new(file_level, Config::default(), file)),
        Err(e) => eprintln!("Could not create {LOG_FILE_NAME}: {e}"),
    }
    if let Err(e) = CombinedLogger::init(loggers) {
        eprintln!("Logger already initialized: {e}");
    }
}

fn print_reports(result: &CommandResult) {
    for report in &result.reports {
        match report.severity {
            MessageSeverity::Information => println!("{}", report.message),
            MessageSeverity::Warning => eprintln!("Warning: {}", report.message),
            MessageSeverity::Error => eprintln!("Error: {}", report.message),
        }
    }
}

// Prints the reports of one command and tells whether it finished.
fn finished(result: CommandResult) -> bool {
    print_reports(&result);
    result.is_finished()
}

/*
 * Runs one CLI command as a sequence of tool commands, stopping at the first
 * one that is cancelled. Returns `Some(writes_scene)` on success.
 */
fn run_command(command: Commands, logic: &mut RetargetAppLogic, scene: &mut Scene) -> Option<bool> {
    match command {
        Commands::Apply { mapping, side, .. } => {
            let side = ArmatureSide::from(side);
            logic.settings_mut().current_side = side;
            (finished(logic.load_mapping(scene, Some(&mapping)))
                && finished(logic.apply_to(scene, side)))
            .then_some(true)
        }
        Commands::RevertAll { mapping, side, .. } => {
            logic.settings_mut().current_side = ArmatureSide::from(side);
            (finished(logic.load_mapping(scene, Some(&mapping)))
                && finished(logic.revert_all(scene)))
            .then_some(true)
        }
        Commands::Export {
            out_dir,
            format,
            mapping,
            side,
            one_file,
            ..
        } => {
            let settings = logic.settings_mut();
            settings.export_side = ArmatureSide::from(side);
            settings.output_dir = Some(out_dir);
            settings.export_format = match format {
                FormatArg::Fbx => ExportFormat::Fbx,
                FormatArg::Bvh => ExportFormat::Bvh,
            };
            settings.rename_on_export = mapping.is_some();
            // Missing preferences only mean the built-in defaults stay in place.
            print_reports(&logic.load_export_defaults());
            if let Some(mapping) = mapping
                && !finished(logic.load_mapping(scene, Some(&mapping)))
            {
                return None;
            }
            let result = if one_file {
                logic.export_all_actions_one_file(scene)
            } else {
                logic.export_all_actions(scene)
            };
            finished(result).then_some(false)
        }
        Commands::Repair { strategy, side, .. } => {
            let strategy = match strategy {
                StrategyArg::Complete => RepairStrategy::Complete,
                StrategyArg::Undo => RepairStrategy::Undo,
            };
            finished(logic.repair_interrupted_rename(scene, ArmatureSide::from(side), strategy))
                .then_some(true)
        }
    }
}

fn save_scene(scene: &Scene, path: &Path) -> bool {
    match scene.save_to_path(path) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Error: Could not write {}: {e}", path.display());
            false
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    log::info!("Main: rig_retarget starting.");

    let scene_path = match &cli.command {
        Commands::Apply { scene, .. }
        | Commands::RevertAll { scene, .. }
        | Commands::Export { scene, .. }
        | Commands::Repair { scene, .. } => scene.clone(),
    };
    let mut scene = match Scene::load_from_path(&scene_path) {
        Ok(scene) => scene,
        Err(e) => {
            eprintln!("Error: Could not read {}: {e}", scene_path.display());
            return ExitCode::FAILURE;
        }
    };

    let mut logic = RetargetAppLogic::new(
        Arc::new(CoreMappingFileManager::new()),
        Arc::new(CorePreferencesManager::new()),
        Arc::new(SnapshotExporter::new()),
    );
    if !finished(logic.set_armature(&scene, ArmatureSide::Source, cli.source.as_deref()))
        || !finished(logic.set_armature(&scene, ArmatureSide::Target, cli.target.as_deref()))
    {
        return ExitCode::FAILURE;
    }
    let Some(writes_scene) = run_command(cli.command, &mut logic, &mut scene) else {
        return ExitCode::FAILURE;
    };
    if writes_scene && !save_scene(&scene, &scene_path) {
        return ExitCode::FAILURE;
    }
    log::info!("Main: Done.");
    ExitCode::SUCCESS
}
