/*
 * Owns the ordered bone mapping table for one working session. Each row keys
 * a bone by its original name and tracks the name it currently carries plus
 * the name the user wants it to have. Name-keyed operations (capture, merge)
 * address the first row whose original matches; duplicate originals are kept
 * in storage but never created by this type.
 *
 * The store never touches a scene. It reads armatures to build mappings and to
 * refresh the Current column, and records the outcome of renames performed by
 * the apply pipeline.
 */
use crate::core::models::{ArmatureSide, BoneMapRow, RenameMapping};
use crate::core::scene::Armature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub index: usize,
    pub inserted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    pub updated: usize,
    pub added: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingStore {
    rows: Vec<BoneMapRow>,
    active_index: Option<usize>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[BoneMapRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&BoneMapRow> {
        self.rows.get(index)
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut BoneMapRow> {
        self.rows.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_index
    }

    pub fn set_active_index(&mut self, index: Option<usize>) {
        self.active_index = index.filter(|&i| i < self.rows.len());
    }

    pub fn push_row(&mut self, row: BoneMapRow) -> usize {
        self.rows.push(row);
        self.rows.len() - 1
    }

    pub fn remove_row(&mut self, index: usize) -> Option<BoneMapRow> {
        if index >= self.rows.len() {
            return None;
        }
        let removed = self.rows.remove(index);
        self.clamp_active_index();
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.active_index = None;
    }

    fn clamp_active_index(&mut self) {
        if let Some(i) = self.active_index
            && i >= self.rows.len()
        {
            self.active_index = self.rows.len().checked_sub(1);
        }
    }

    /// Index of the first row whose original name is `original`.
    pub fn position_of(&self, original: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.original_name == original)
    }

    /// First row naming `name` in any of its Original, Current or Rename columns.
    pub fn find_row_for(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.rows.iter().position(|r| {
            r.original_name == name || r.current_name == name || r.target_name == name
        })
    }

    /*
     * Replaces the table with one identity row per bone of `armature`, in bone
     * order. The first row becomes active.
     */
    pub fn seed_from_armature(&mut self, armature: &Armature) -> usize {
        self.rows = armature
            .bones
            .iter()
            .map(|b| BoneMapRow::identity(&b.name))
            .collect();
        self.active_index = if self.rows.is_empty() { None } else { Some(0) };
        log::debug!("MappingStore: Seeded {} rows.", self.rows.len());
        self.rows.len()
    }

    /*
     * Records a captured Source/Target bone pair. The row keyed by the source
     * bone is updated in place or appended, its Current is set from whichever
     * side is the reference, and it becomes the active row.
     */
    pub fn capture(
        &mut self,
        source_bone: &str,
        target_bone: &str,
        current_side: ArmatureSide,
    ) -> CaptureOutcome {
        let current = match current_side {
            ArmatureSide::Target => target_bone,
            ArmatureSide::Source => source_bone,
        };
        let (index, inserted) = match self.position_of(source_bone) {
            Some(i) => (i, false),
            None => {
                let i = self.push_row(BoneMapRow {
                    original_name: source_bone.to_string(),
                    ..BoneMapRow::default()
                });
                (i, true)
            }
        };
        let row = &mut self.rows[index];
        row.target_name = target_bone.to_string();
        row.captured_source = source_bone.to_string();
        row.captured_target = target_bone.to_string();
        row.current_name = current.to_string();
        self.active_index = Some(index);
        log::debug!(
            "MappingStore: Captured '{source_bone}' -> '{target_bone}' (row {index}, inserted: {inserted})."
        );
        CaptureOutcome { index, inserted }
    }

    pub fn set_mark_all(&mut self, marked: bool) {
        for row in self.rows.iter_mut() {
            row.marked = marked;
        }
    }

    /*
     * Builds Original -> Rename for every mapped row whose original name is a
     * real bone on `armature`. Rows whose bone is gone are skipped silently.
     */
    pub fn build_apply_mapping(&self, armature: &Armature) -> RenameMapping {
        self.rows
            .iter()
            .filter(|r| r.is_mapped() && armature.has_bone(&r.original_name))
            .map(|r| (r.original_name.clone(), r.target_name.clone()))
            .collect()
    }

    /*
     * Builds Current -> Original for the rows picked by `include` whose Current
     * differs from the Original and still names a real bone.
     */
    pub fn build_revert_mapping<F>(&self, armature: &Armature, include: F) -> RenameMapping
    where
        F: Fn(usize, &BoneMapRow) -> bool,
    {
        self.rows
            .iter()
            .enumerate()
            .filter(|(i, r)| include(*i, r))
            .filter(|(_, r)| {
                !r.current_name.is_empty()
                    && !r.original_name.is_empty()
                    && r.current_name != r.original_name
                    && armature.has_bone(&r.current_name)
            })
            .map(|(_, r)| (r.current_name.clone(), r.original_name.clone()))
            .collect()
    }

    /// Sets Current to the new name for every row whose original was renamed.
    pub fn record_applied(&mut self, mapping: &RenameMapping) -> usize {
        let mut updated = 0;
        for row in self.rows.iter_mut() {
            if let Some(new) = mapping.get(&row.original_name) {
                row.current_name = new.to_string();
                updated += 1;
            }
        }
        updated
    }

    pub fn reset_current_to_original<F>(&mut self, include: F) -> usize
    where
        F: Fn(usize, &BoneMapRow) -> bool,
    {
        let mut reset = 0;
        for (i, row) in self.rows.iter_mut().enumerate() {
            if include(i, row) && row.current_name != row.original_name {
                row.current_name = row.original_name.clone();
                reset += 1;
            }
        }
        reset
    }

    /*
     * Re-derives Current from the live rig: the original name if the armature
     * has it, else the rename. With `only_blank` set, rows that already carry a
     * Current are left alone. Returns the number of rows written.
     */
    fn derive_current(&mut self, armature: &Armature, only_blank: bool) -> usize {
        let mut count = 0;
        for row in self.rows.iter_mut() {
            if only_blank && !row.current_name.is_empty() {
                continue;
            }
            if armature.has_bone(&row.original_name) {
                row.current_name = row.original_name.clone();
                count += 1;
            } else if armature.has_bone(&row.target_name) {
                row.current_name = row.target_name.clone();
                count += 1;
            }
        }
        count
    }

    pub fn refresh_current(&mut self, armature: &Armature) -> usize {
        self.derive_current(armature, false)
    }

    pub fn backfill_blank_current(&mut self, armature: &Armature) -> usize {
        self.derive_current(armature, true)
    }

    /*
     * Merges a loaded mapping into the table without deleting anything. An
     * existing original gets its Rename and capture snapshot updated in place;
     * a new original is appended with a blank Current. An empty value in the
     * file means "keep the original name".
     */
    pub fn merge_loaded(&mut self, mapping: &RenameMapping) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for (old, new) in mapping.iter() {
            let target = if new.is_empty() { old } else { new };
            match self.position_of(old) {
                Some(i) => {
                    let row = &mut self.rows[i];
                    row.target_name = target.to_string();
                    row.captured_source = old.to_string();
                    row.captured_target = target.to_string();
                    outcome.updated += 1;
                }
                None => {
                    self.rows.push(BoneMapRow {
                        original_name: old.to_string(),
                        current_name: String::new(),
                        target_name: target.to_string(),
                        captured_source: old.to_string(),
                        captured_target: target.to_string(),
                        marked: false,
                    });
                    outcome.added += 1;
                }
            }
        }
        self.clamp_active_index();
        log::debug!(
            "MappingStore: Merged {} rows, added {}.",
            outcome.updated,
            outcome.added
        );
        outcome
    }

    /*
     * Original -> Rename for every row where both are set, for saving. The
     * capture snapshot of each saved row is refreshed to the saved pair.
     */
    pub fn snapshot_for_save(&mut self) -> RenameMapping {
        let mut mapping = RenameMapping::new();
        for row in self.rows.iter_mut() {
            if row.original_name.is_empty() || row.target_name.is_empty() {
                continue;
            }
            row.captured_source = row.original_name.clone();
            row.captured_target = row.target_name.clone();
            mapping.insert(row.original_name.clone(), row.target_name.clone());
        }
        mapping
    }
}
