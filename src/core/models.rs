use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Which of the two rigs an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ArmatureSide {
    Source,
    #[default]
    Target,
}

impl ArmatureSide {
    pub fn label(self) -> &'static str {
        match self {
            ArmatureSide::Source => "Source",
            ArmatureSide::Target => "Target",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowDirection {
    SourceToTarget,
    TargetToSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FollowMode {
    #[default]
    RotationOnly,
    FullTransform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExportFormat {
    #[default]
    Fbx,
    Bvh,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Fbx => "fbx",
            ExportFormat::Bvh => "bvh",
        }
    }

    // Only the FBX path carries bound meshes along with the armature.
    pub fn includes_meshes(self) -> bool {
        matches!(self, ExportFormat::Fbx)
    }
}

/*
 * One row of the bone mapping table. `original_name` is the identity key,
 * `current_name` tracks what the bone is called right now on the configured
 * reference rig, and `target_name` is the desired rename.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BoneMapRow {
    pub original_name: String,
    pub current_name: String,
    pub target_name: String,
    pub captured_source: String,
    pub captured_target: String,
    pub marked: bool,
}

impl BoneMapRow {
    /// Creates an identity row: Current and Rename both equal the original.
    pub fn identity(name: &str) -> Self {
        BoneMapRow {
            original_name: name.to_string(),
            current_name: name.to_string(),
            target_name: name.to_string(),
            captured_source: name.to_string(),
            captured_target: name.to_string(),
            marked: false,
        }
    }

    pub fn is_mapped(&self) -> bool {
        !self.original_name.is_empty()
            && !self.target_name.is_empty()
            && self.original_name != self.target_name
    }
}

/*
 * An ordered old -> new bone name mapping. This is the single unit of work
 * handed to the rename engine and the reference patcher, so both see the exact
 * same pairs in the same order. Inserting an existing key replaces its value
 * but keeps the key's original position.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameMapping {
    pairs: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl RenameMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, old: impl Into<String>, new: impl Into<String>) {
        let old = old.into();
        let new = new.into();
        match self.index.get(&old) {
            Some(&pos) => self.pairs[pos].1 = new,
            None => {
                self.index.insert(old.clone(), self.pairs.len());
                self.pairs.push((old, new));
            }
        }
    }

    pub fn get(&self, old: &str) -> Option<&str> {
        self.index.get(old).map(|&pos| self.pairs[pos].1.as_str())
    }

    pub fn contains_key(&self, old: &str) -> bool {
        self.index.contains_key(old)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(o, n)| (o.as_str(), n.as_str()))
    }

    /// Returns new -> old in the same order. Later duplicates of a new name win.
    pub fn inverse(&self) -> RenameMapping {
        self.pairs
            .iter()
            .map(|(o, n)| (n.clone(), o.clone()))
            .collect()
    }
}

impl FromIterator<(String, String)> for RenameMapping {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut mapping = RenameMapping::new();
        for (old, new) in iter {
            mapping.insert(old, new);
        }
        mapping
    }
}
