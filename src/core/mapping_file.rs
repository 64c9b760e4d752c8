/*
 * Reads and writes bone mappings as plain UTF-8 text, one `old=new` pair per
 * line. Lines that are blank or start with `#` are ignored, the key ends at the
 * first `=`, and both sides are trimmed. A key that itself starts with `#` or
 * with the escape character `\` is written with one leading `\`, which the
 * parser strips again. Saved files always get a `.txt` extension and start
 * with two comment lines describing the format.
 *
 * Merging a loaded mapping into the table is the mapping store's job; this
 * module only converts between files and `RenameMapping` values.
 */
use crate::core::models::RenameMapping;
use crate::core::path_utils;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const MAPPING_FILE_EXTENSION: &str = "txt";
const KEY_ESCAPE: char = '\\';
const HEADER_LINES: [&str; 2] = [
    "# bone_old=bone_new",
    "# lines starting with # are comments",
];

#[derive(Debug)]
pub enum MappingFileError {
    Io(io::Error),
    Utf8Error(std::string::FromUtf8Error),
    FileNotFound(PathBuf),
}

impl From<io::Error> for MappingFileError {
    fn from(err: io::Error) -> Self {
        MappingFileError::Io(err)
    }
}

impl From<std::string::FromUtf8Error> for MappingFileError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        MappingFileError::Utf8Error(err)
    }
}

impl std::fmt::Display for MappingFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingFileError::Io(e) => write!(f, "Mapping file I/O error: {e}"),
            MappingFileError::Utf8Error(e) => write!(f, "Mapping file is not valid UTF-8: {e}"),
            MappingFileError::FileNotFound(path) => {
                write!(f, "Mapping file not found: {}", path.display())
            }
        }
    }
}

impl std::error::Error for MappingFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MappingFileError::Io(e) => Some(e),
            MappingFileError::Utf8Error(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MappingFileError>;

pub fn parse_mapping_text(text: &str) -> RenameMapping {
    let mut mapping = RenameMapping::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((old, new)) = line.split_once('=') else {
            continue;
        };
        let old = old.trim();
        let old = old.strip_prefix(KEY_ESCAPE).unwrap_or(old);
        if old.is_empty() {
            continue;
        }
        mapping.insert(old, new.trim());
    }
    mapping
}

pub fn mapping_to_text(mapping: &RenameMapping) -> String {
    let mut text = String::new();
    for header in HEADER_LINES {
        text.push_str(header);
        text.push('\n');
    }
    for (old, new) in mapping.iter() {
        if old.starts_with('#') || old.starts_with(KEY_ESCAPE) {
            text.push(KEY_ESCAPE);
        }
        text.push_str(old);
        text.push('=');
        text.push_str(new);
        text.push('\n');
    }
    text
}

pub trait MappingFileOperations: Send + Sync {
    fn load_mapping(&self, path: &Path) -> Result<RenameMapping>;
    /// Writes `mapping` and returns the path actually written, which always ends in `.txt`.
    fn save_mapping(&self, path: &Path, mapping: &RenameMapping) -> Result<PathBuf>;
}

pub struct CoreMappingFileManager {}

impl CoreMappingFileManager {
    pub fn new() -> Self {
        CoreMappingFileManager {}
    }
}

impl Default for CoreMappingFileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingFileOperations for CoreMappingFileManager {
    fn load_mapping(&self, path: &Path) -> Result<RenameMapping> {
        log::trace!("CoreMappingFileManager: Loading mapping from {path:?}");
        if !path.is_file() {
            return Err(MappingFileError::FileNotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        let text = String::from_utf8(bytes)?;
        let mapping = parse_mapping_text(&text);
        log::debug!(
            "CoreMappingFileManager: Loaded {} pairs from {path:?}.",
            mapping.len()
        );
        Ok(mapping)
    }

    fn save_mapping(&self, path: &Path, mapping: &RenameMapping) -> Result<PathBuf> {
        let file_path = path_utils::ensure_txt_extension(path);
        if let Some(parent) = file_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&file_path)?;
        file.write_all(mapping_to_text(mapping).as_bytes())?;
        log::debug!(
            "CoreMappingFileManager: Saved {} pairs to {file_path:?}.",
            mapping.len()
        );
        Ok(file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use tempfile::tempdir;

    #[test]
    fn test_parse_skips_comments_blank_and_malformed_lines() {
        let text = "# header\n\n  Hips = Pelvis \nno_equals_here\n=orphan\nNeck=\n";

        let mapping = parse_mapping_text(text);

        let pairs: Vec<_> = mapping.iter().collect();
        assert_eq!(pairs, vec![("Hips", "Pelvis"), ("Neck", "")]);
    }

    #[test]
    fn test_parse_splits_on_first_equals_and_keeps_later_duplicate() {
        let text = "A=B=C\nHips=Pelvis\nA=D\n";

        let mapping = parse_mapping_text(text);

        let pairs: Vec<_> = mapping.iter().collect();
        assert_eq!(pairs, vec![("A", "D"), ("Hips", "Pelvis")]);
    }

    #[test]
    fn test_mapping_to_text_writes_headers_first() {
        let mut mapping = RenameMapping::new();
        mapping.insert("mixamorig:Hips", "Hips");

        let text = mapping_to_text(&mapping);

        assert_eq!(
            text,
            "# bone_old=bone_new\n# lines starting with # are comments\nmixamorig:Hips=Hips\n"
        );
    }

    #[test]
    fn test_keys_starting_with_hash_or_escape_survive_text() {
        let mut mapping = RenameMapping::new();
        mapping.insert("#Hips", "Hips");
        mapping.insert("\\Spine", "#Spine");

        let text = mapping_to_text(&mapping);

        assert!(text.ends_with("\\#Hips=Hips\n\\\\Spine=#Spine\n"));
        assert_eq!(parse_mapping_text(&text), mapping);
    }

    fn random_name(rng: &mut impl Rng) -> String {
        const ALPHABET: [char; 13] = [
            'a', 'Z', '0', ':', '_', '#', '\\', ' ', '.', '"', ']', '=', '\u{e9}',
        ];
        let len = rng.random_range(1..=10);
        (0..len)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())])
            .collect::<String>()
            .trim()
            .to_string()
    }

    #[test]
    fn test_random_mappings_survive_text() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let mut mapping = RenameMapping::new();
            for _ in 0..rng.random_range(0..12) {
                let old = random_name(&mut rng).replace('=', "");
                let new = random_name(&mut rng);
                if old.trim().is_empty() || new.is_empty() {
                    continue;
                }
                mapping.insert(old.trim(), new);
            }

            let text = mapping_to_text(&mapping);

            assert_eq!(parse_mapping_text(&text), mapping, "text was:\n{text}");
        }
    }

    #[test]
    fn test_save_forces_txt_and_load_reads_back() -> Result<()> {
        // Arrange
        let dir = tempdir()?;
        let manager = CoreMappingFileManager::new();
        let mut mapping = RenameMapping::new();
        mapping.insert("mixamorig:Hips", "Hips");
        mapping.insert("mixamorig:Spine", "Spine");

        // Act
        let written = manager.save_mapping(&dir.path().join("nested/mixamo.map"), &mapping)?;
        let loaded = manager.load_mapping(&written)?;

        // Assert
        assert_eq!(written, dir.path().join("nested/mixamo.txt"));
        assert_eq!(loaded, mapping);
        Ok(())
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempdir().unwrap();
        let manager = CoreMappingFileManager::new();

        let result = manager.load_mapping(&dir.path().join("absent.txt"));

        assert!(matches!(result, Err(MappingFileError::FileNotFound(_))));
    }

    #[test]
    fn test_load_rejects_invalid_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, [0x48, 0x69, 0xFF, 0x3D, 0x41]).unwrap();

        let result = CoreMappingFileManager::new().load_mapping(&path);

        assert!(matches!(result, Err(MappingFileError::Utf8Error(_))));
    }
}
