/*
 * Performs bulk bone renames on one armature. Renaming happens in two phases:
 * every affected bone is first moved to `new + RESERVED_SUFFIX`, then each
 * suffixed bone takes its final name. This makes a batch safe against names
 * rotating inside the same mapping (A->B, B->A) regardless of order.
 *
 * Deform flags are snapshotted by old name before the batch and written back
 * onto the new names afterwards. A `RenameJournal` is stored on the armature
 * for the duration of the batch; if a batch is ever left half-done the journal
 * and the sentinel suffix let `repair_interrupted` either finish or undo it.
 */
use crate::core::models::RenameMapping;
use crate::core::scene::{Armature, ObjectMode, SceneError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};

pub const RESERVED_SUFFIX: &str = "__RT_PENDING__";

#[derive(Debug)]
pub enum RenameError {
    Scene(SceneError),
    DuplicateTarget(String),
    NameCollision(String),
}

impl From<SceneError> for RenameError {
    fn from(err: SceneError) -> Self {
        RenameError::Scene(err)
    }
}

impl std::fmt::Display for RenameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenameError::Scene(e) => write!(f, "Rename failed: {e}"),
            RenameError::DuplicateTarget(name) => {
                write!(f, "Several bones would be renamed to '{name}'")
            }
            RenameError::NameCollision(name) => write!(
                f,
                "Bone name '{name}' is held by a bone outside the rename batch"
            ),
        }
    }
}

impl std::error::Error for RenameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenameError::Scene(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RenameError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub old: String,
    pub new: String,
    pub finalized: bool,
}

// Record of a batch in flight. Present on an armature only while a batch runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameJournal {
    pub entries: Vec<JournalEntry>,
    pub started_at: i64,
}

impl RenameJournal {
    fn begin(pairs: &[(String, String)]) -> Self {
        RenameJournal {
            entries: pairs
                .iter()
                .map(|(old, new)| JournalEntry {
                    old: old.clone(),
                    new: new.clone(),
                    finalized: false,
                })
                .collect(),
            started_at: time::OffsetDateTime::now_utc().unix_timestamp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenameOutcome {
    pub renamed: usize,
    pub deform_restored: usize,
}

/*
 * Result of `repair_interrupted`. `completed` holds the old -> new pairs the
 * batch was driven to, keyed by the names references still use; `rolled_back`
 * holds the new -> old pairs `Undo` renamed back afterwards.
 */
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepairOutcome {
    pub renamed: usize,
    pub deform_restored: usize,
    pub completed: RenameMapping,
    pub rolled_back: RenameMapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStrategy {
    Complete,
    Undo,
}

/*
 * Holds an armature in edit mode and drops it back to object mode however the
 * scope is left. An armature stuck in edit mode blocks nearly every other
 * operation, so error paths must not skip the mode switch.
 */
struct EditModeGuard<'a> {
    armature: &'a mut Armature,
}

impl<'a> EditModeGuard<'a> {
    fn enter(armature: &'a mut Armature) -> Self {
        armature.mode = ObjectMode::Edit;
        EditModeGuard { armature }
    }
}

impl Deref for EditModeGuard<'_> {
    type Target = Armature;
    fn deref(&self) -> &Armature {
        self.armature
    }
}

impl DerefMut for EditModeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Armature {
        self.armature
    }
}

impl Drop for EditModeGuard<'_> {
    fn drop(&mut self) {
        self.armature.mode = ObjectMode::Object;
    }
}

fn pending_name(new: &str) -> String {
    format!("{new}{RESERVED_SUFFIX}")
}

/*
 * Rejects batches that cannot complete before any bone is touched: two keys
 * converging on one name, or a final name owned by a bone that is not itself
 * being renamed. Returns the order in which the pairs move to their sentinel
 * names in phase 1.
 */
fn check_batch(armature: &Armature, pairs: &[(String, String)]) -> Result<Vec<usize>> {
    let olds: HashSet<&str> = pairs.iter().map(|(o, _)| o.as_str()).collect();
    let mut seen = HashSet::new();
    for (_, new) in pairs {
        if !seen.insert(new.as_str()) {
            return Err(RenameError::DuplicateTarget(new.clone()));
        }
        if armature.has_bone(new) && !olds.contains(new.as_str()) {
            return Err(RenameError::NameCollision(new.clone()));
        }
    }
    phase_one_order(armature, pairs)
}

/*
 * Schedules phase 1 on a dry run of the bone names. A pair may move once its
 * sentinel name is free, which for an old name that already carries the
 * sentinel means after that bone has moved away itself. Sentinel names that
 * never free up (held outside the batch, or suffixed old names waiting on each
 * other in a cycle) reject the batch.
 */
fn phase_one_order(armature: &Armature, pairs: &[(String, String)]) -> Result<Vec<usize>> {
    let mut occupied: HashSet<String> = armature.bones.iter().map(|b| b.name.clone()).collect();
    let mut remaining: Vec<usize> = (0..pairs.len()).collect();
    let mut order = Vec::with_capacity(pairs.len());
    while !remaining.is_empty() {
        let before = remaining.len();
        remaining.retain(|&i| {
            let (old, new) = &pairs[i];
            let pending = pending_name(new);
            if pending != *old && occupied.contains(&pending) {
                return true;
            }
            occupied.remove(old);
            occupied.insert(pending);
            order.push(i);
            false
        });
        if remaining.len() == before {
            let (_, new) = &pairs[remaining[0]];
            return Err(RenameError::NameCollision(pending_name(new)));
        }
    }
    Ok(order)
}

fn run_two_phase(
    armature: &mut Armature,
    pairs: &[(String, String)],
    order: &[usize],
) -> Result<usize> {
    for &i in order {
        let (old, new) = &pairs[i];
        armature.rename_bone(old, &pending_name(new))?;
    }
    let mut applied = 0;
    for (i, (_, new)) in pairs.iter().enumerate() {
        let pending = pending_name(new);
        if armature.has_bone(&pending) {
            armature.rename_bone(&pending, new)?;
            if let Some(journal) = armature.pending_rename.as_mut() {
                journal.entries[i].finalized = true;
            }
            applied += 1;
        }
    }
    Ok(applied)
}

/*
 * Renames every `old -> new` pair of `mapping` that names an existing bone.
 * Identity pairs and empty targets are skipped. Returns the number of bones
 * renamed and the number of deform flags written back.
 */
pub fn rename_bones(armature: &mut Armature, mapping: &RenameMapping) -> Result<RenameOutcome> {
    let pairs: Vec<(String, String)> = mapping
        .iter()
        .filter(|(old, new)| !new.is_empty() && old != new && armature.has_bone(old))
        .map(|(old, new)| (old.to_string(), new.to_string()))
        .collect();
    if pairs.is_empty() {
        log::debug!("RenameEngine: Nothing to rename.");
        return Ok(RenameOutcome::default());
    }
    let order = check_batch(armature, &pairs)?;

    let deform_flags: HashMap<String, bool> = pairs
        .iter()
        .filter_map(|(old, _)| armature.bone(old).map(|b| (old.clone(), b.use_deform)))
        .collect();

    log::debug!("RenameEngine: Renaming {} bones.", pairs.len());
    armature.pending_rename = Some(RenameJournal::begin(&pairs));
    let renamed = {
        let mut edit = EditModeGuard::enter(armature);
        run_two_phase(&mut edit, &pairs, &order)?
    };
    armature.pending_rename = None;

    let mut deform_restored = 0;
    for (old, new) in &pairs {
        if let (Some(flag), Some(bone)) = (deform_flags.get(old), armature.bone_mut(new)) {
            bone.use_deform = *flag;
            deform_restored += 1;
        }
    }
    log::debug!("RenameEngine: Renamed {renamed} bones, restored {deform_restored} deform flags.");
    Ok(RenameOutcome {
        renamed,
        deform_restored,
    })
}

pub fn has_interrupted_batch(armature: &Armature) -> bool {
    armature.pending_rename.is_some()
        || armature
            .bones
            .iter()
            .any(|b| b.name.ends_with(RESERVED_SUFFIX))
}

/*
 * Finishes or rolls back a batch that stopped between phases. With a journal,
 * every entry is first driven to its new name; `Undo` then renames the whole
 * batch back to the old names through the normal two-phase path. Without a
 * journal the only safe move is stripping the sentinel suffix, which both
 * strategies do.
 */
pub fn repair_interrupted(
    armature: &mut Armature,
    strategy: RepairStrategy,
) -> Result<RepairOutcome> {
    let Some(journal) = armature.pending_rename.take() else {
        let strip: RenameMapping = armature
            .bones
            .iter()
            .filter_map(|b| {
                b.name
                    .strip_suffix(RESERVED_SUFFIX)
                    .map(|stripped| (b.name.clone(), stripped.to_string()))
            })
            .collect();
        log::debug!(
            "RenameEngine: No journal found, stripping sentinel from {} bones.",
            strip.len()
        );
        let outcome = rename_bones(armature, &strip)?;
        return Ok(RepairOutcome {
            renamed: outcome.renamed,
            deform_restored: outcome.deform_restored,
            completed: strip,
            rolled_back: RenameMapping::new(),
        });
    };

    let mut completion = RenameMapping::new();
    let mut completed = RenameMapping::new();
    for entry in &journal.entries {
        let pending = pending_name(&entry.new);
        let current = if armature.has_bone(&pending) {
            pending
        } else if entry.finalized {
            entry.new.clone()
        } else {
            entry.old.clone()
        };
        if !armature.has_bone(&current) {
            log::warn!(
                "RenameEngine: Journal entry '{}' -> '{}' has no matching bone.",
                entry.old,
                entry.new
            );
            continue;
        }
        completion.insert(current, entry.new.clone());
        completed.insert(entry.old.clone(), entry.new.clone());
    }
    log::debug!(
        "RenameEngine: Repairing interrupted batch of {} entries ({strategy:?}).",
        journal.entries.len()
    );
    let finished = rename_bones(armature, &completion)?;
    let mut outcome = RepairOutcome {
        renamed: finished.renamed,
        deform_restored: finished.deform_restored,
        completed,
        rolled_back: RenameMapping::new(),
    };

    if strategy == RepairStrategy::Undo {
        let rollback: RenameMapping = journal
            .entries
            .iter()
            .filter(|e| armature.has_bone(&e.new))
            .map(|e| (e.new.clone(), e.old.clone()))
            .collect();
        let undone = rename_bones(armature, &rollback)?;
        outcome.renamed += undone.renamed;
        outcome.deform_restored += undone.deform_restored;
        outcome.rolled_back = rollback;
    }
    Ok(outcome)
}
