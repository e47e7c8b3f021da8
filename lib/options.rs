//! Cache tuning knobs.

use serde::{Deserialize, Serialize};

use crate::path::PathStyle;

/// Largest bucket count a per-directory child index may grow to.
pub const MAX_INDEX_BUCKETS: usize = 1 << 16;

/// Options fixed at cache construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheOptions {
    /// Synthesize missing placeholders for names that do not exist.
    pub missing_objects: bool,

    /// Remember failed path lookups in the path index.
    pub missing_paths: bool,

    /// Compare names byte-for-byte instead of case-insensitively.
    pub case_sensitive: bool,

    /// How input paths are parsed.
    pub path_style: PathStyle,

    /// Child count at which a directory grows a byte-name index.
    pub narrow_index_threshold: usize,

    /// Child count at which a directory grows a wide-name index.
    pub wide_index_threshold: usize,

    /// Longest accepted input path, in code units.
    pub max_path_len: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            missing_objects: true,
            missing_paths: true,
            case_sensitive: false,
            path_style: PathStyle::Windows,
            narrow_index_threshold: 16,
            wide_index_threshold: 12,
            max_path_len: 1024,
        }
    }
}

impl CacheOptions {
    /// Options matching the conventions of the host the binary runs on.
    #[must_use]
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::default()
        } else {
            Self {
                case_sensitive: true,
                path_style: PathStyle::Posix,
                ..Self::default()
            }
        }
    }

    /// Validate the options.
    ///
    /// Returns the list of problems found, if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_path_len < 3 {
            errors.push(format!(
                "max-path-len {} is too small to hold any absolute path.",
                self.max_path_len
            ));
        }
        for (what, value) in [
            ("narrow-index-threshold", self.narrow_index_threshold),
            ("wide-index-threshold", self.wide_index_threshold),
        ] {
            if value == 0 {
                errors.push(format!("{what} must be at least 1."));
            } else if value > MAX_INDEX_BUCKETS {
                errors.push(format!(
                    "{what} {value} exceeds the largest index size {MAX_INDEX_BUCKETS}."
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
