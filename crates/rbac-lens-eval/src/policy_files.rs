//! Policy discovery

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use walkdir::WalkDir;

use crate::{Error, Result};

/// Directories never searched for policies
pub const IGNORED_DIRS: [&str; 2] = ["ignore", "utils"];

/// Policy file extension
pub const POLICY_EXTENSION: &str = "rego";

/// A single file, or every `.rego` file under a directory (skipping
/// [`IGNORED_DIRS`]), in file name order
pub fn policy_files(path: &Path) -> Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(path).map_err(|e| Error::io(path, e))?;
    if metadata.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let ignored = e.depth() > 0
                && e.file_type().is_dir()
                && e.file_name()
                    .to_str()
                    .is_some_and(|name| IGNORED_DIRS.contains(&name));
            !ignored
        });
    for entry in walker {
        let entry = entry.map_err(|e| Error::Walk {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let is_policy = entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some(POLICY_EXTENSION);
        if is_policy {
            files.push(entry.into_path());
        }
    }

    if files.is_empty() {
        return Err(Error::NoPolicies {
            path: path.to_path_buf(),
        });
    }
    Ok(files)
}

fn main_rule() -> Option<&'static Regex> {
    static MAIN_RULE: OnceLock<Option<Regex>> = OnceLock::new();
    MAIN_RULE
        .get_or_init(|| Regex::new(r"(?m)^\s*main\s*\[\s*\{.*\}\s*\].*$").ok())
        .as_ref()
}

/// Whether `policy` lacks its own `main[{...}]` rule and has to be
/// evaluated through the wrapper library
pub fn needs_wrapping(policy: &str) -> bool {
    main_rule().map_or(true, |re| !re.is_match(policy))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, "package policy\n").unwrap();
    }

    #[test]
    fn test_walk_skips_ignored_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.rego"));
        touch(&root.join("a.rego"));
        touch(&root.join("notes.md"));
        touch(&root.join("nested/c.rego"));
        touch(&root.join("utils/builtins.rego"));
        touch(&root.join("ignore/draft.rego"));

        let files = policy_files(root).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.rego"),
                PathBuf::from("b.rego"),
                PathBuf::from("nested/c.rego"),
            ]
        );
    }

    #[test]
    fn test_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let policy = dir.path().join("policy.txt");
        touch(&policy);

        assert_eq!(policy_files(&policy).unwrap(), vec![policy]);
    }

    #[test]
    fn test_no_policies_is_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("utils/wrapper.rego"));

        assert!(matches!(
            policy_files(dir.path()),
            Err(Error::NoPolicies { .. })
        ));
        assert!(matches!(
            policy_files(&dir.path().join("missing")),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn test_needs_wrapping() {
        let wrapped = "package policy\n\nmain[{\"violations\": violation}] {\n  violation := 1\n}\n";
        assert!(!needs_wrapping(wrapped));

        let spaced = "package policy\n  main [ { \"violations\": v } ] {\n}\n";
        assert!(!needs_wrapping(spaced));

        let bare = "package policy\n\nevaluateRoles(roles, owner) {\n  true\n}\n";
        assert!(needs_wrapping(bare));

        // "main" must start the rule
        assert!(needs_wrapping("package policy\nnot_main[{\"a\": 1}] { true }\n"));
    }
}
