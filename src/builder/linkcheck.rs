//! Link freshness checker.
//!
//! Decides whether a link output must be rebuilt against the external
//! libraries it links. Object-file staleness is not examined here: the
//! orchestrator forces a relink whenever any object was recompiled in the
//! current invocation, independent of this check.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::builder::errors::BuildError;
use crate::util::fs::mtime;

/// Decide whether `link_path` must be relinked against `libs`.
///
/// Relinking is always required when the output does not exist or when the
/// library list is empty (nothing external to check against). Otherwise the
/// first library resolvable in `search_dirs` supplies the reference
/// timestamp; if it was modified at or after the link output, relink.
///
/// `lib_file_name` converts a library name to its platform file name. If no
/// library resolves in any search path there is no timestamp to compare,
/// which is a configuration error, not a staleness signal.
pub fn needs_relink(
    link_path: &Path,
    search_dirs: &[PathBuf],
    libs: &[String],
    lib_file_name: impl Fn(&str) -> String,
) -> Result<bool> {
    if !link_path.is_file() || libs.is_empty() {
        return Ok(true);
    }

    let link_modified = mtime(link_path)?;

    for lib in libs {
        let file_name = lib_file_name(lib);
        for dir in search_dirs {
            let candidate = dir.join(&file_name);
            if candidate.is_file() {
                return Ok(mtime(&candidate)? >= link_modified);
            }
        }
    }

    Err(BuildError::UnresolvableLibrary {
        name: libs[0].clone(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};

    use tempfile::TempDir;

    fn unix_lib_name(name: &str) -> String {
        format!("lib{}.a", name)
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .append(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn test_missing_output_forces_relink() {
        let tmp = TempDir::new().unwrap();
        let needed = needs_relink(
            &tmp.path().join("libdemo.so"),
            &[tmp.path().to_path_buf()],
            &["m".to_string()],
            unix_lib_name,
        )
        .unwrap();
        assert!(needed);
    }

    #[test]
    fn test_empty_library_list_forces_relink() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("libdemo.so");
        fs::write(&out, "elf").unwrap();

        let needed = needs_relink(&out, &[tmp.path().to_path_buf()], &[], unix_lib_name).unwrap();
        assert!(needed);
    }

    #[test]
    fn test_newer_library_forces_relink() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("libdemo.so");
        let lib = tmp.path().join("libm.a");
        fs::write(&out, "elf").unwrap();
        fs::write(&lib, "ar").unwrap();

        let base = SystemTime::now();
        set_mtime(&out, base);
        set_mtime(&lib, base + Duration::from_secs(5));

        let needed = needs_relink(
            &out,
            &[tmp.path().to_path_buf()],
            &["m".to_string()],
            unix_lib_name,
        )
        .unwrap();
        assert!(needed);
    }

    #[test]
    fn test_older_library_is_fresh() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("libdemo.so");
        let lib = tmp.path().join("libm.a");
        fs::write(&out, "elf").unwrap();
        fs::write(&lib, "ar").unwrap();

        let base = SystemTime::now();
        set_mtime(&lib, base);
        set_mtime(&out, base + Duration::from_secs(5));

        let needed = needs_relink(
            &out,
            &[tmp.path().to_path_buf()],
            &["m".to_string()],
            unix_lib_name,
        )
        .unwrap();
        assert!(!needed);
    }

    #[test]
    fn test_first_resolvable_library_supplies_timestamp() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("libdemo.so");
        let second = tmp.path().join("libz.a");
        fs::write(&out, "elf").unwrap();
        fs::write(&second, "ar").unwrap();

        let base = SystemTime::now();
        set_mtime(&second, base);
        set_mtime(&out, base + Duration::from_secs(5));

        // "missing" never resolves; the check falls through to libz.
        let needed = needs_relink(
            &out,
            &[tmp.path().to_path_buf()],
            &["missing".to_string(), "z".to_string()],
            unix_lib_name,
        )
        .unwrap();
        assert!(!needed);
    }

    #[test]
    fn test_no_resolvable_library_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("libdemo.so");
        fs::write(&out, "elf").unwrap();

        let err = needs_relink(
            &out,
            &[tmp.path().to_path_buf()],
            &["nowhere".to_string()],
            unix_lib_name,
        )
        .unwrap_err();

        match err.downcast_ref::<BuildError>() {
            Some(BuildError::UnresolvableLibrary { name }) => assert_eq!(name, "nowhere"),
            other => panic!("expected UnresolvableLibrary, got {:?}", other),
        }
    }
}
