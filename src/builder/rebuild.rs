//! Rebuild decision engine.
//!
//! Decides, per translation unit, whether recompilation is required. The
//! checks are purely timestamp- and dependency-list-driven; the build
//! profile never influences staleness. Comparisons use `>=` throughout:
//! a same-timestamp write is treated as possibly newer, erring toward an
//! extra rebuild rather than staleness blindness.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::builder::depfile;
use crate::builder::layout::{ArtifactLayout, SourceUnit};
use crate::builder::toolchain::Toolchain;
use crate::util::fs::mtime;

/// Outcome of a staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Stale,
    UpToDate,
}

/// A source file that must be recompiled, paired with the artifacts the
/// compiler will produce for it. Created fresh on every invocation and
/// never persisted.
#[derive(Debug, Clone)]
pub struct RebuildRecord {
    pub source: SourceUnit,
    pub object: PathBuf,
    pub depfile: PathBuf,
}

/// Decide whether one source needs recompiling.
///
/// Checks run in order and short-circuit on the first hit:
/// 1. object missing;
/// 2. source modified at or after the object;
/// 3. (skip the rest when the source kind carries no dependency list);
/// 4. dependency list missing;
/// 5. any recorded header modified at or after the object. A recorded
///    header that no longer exists on disk also counts as stale.
pub fn source_freshness(
    source_path: &Path,
    object: &Path,
    dep: &Path,
    needs_deps: bool,
) -> Result<Freshness> {
    if !object.exists() {
        return Ok(Freshness::Stale);
    }

    let object_modified = mtime(object)?;
    if mtime(source_path)? >= object_modified {
        return Ok(Freshness::Stale);
    }

    if !needs_deps {
        return Ok(Freshness::UpToDate);
    }

    if !dep.exists() {
        return Ok(Freshness::Stale);
    }

    for header in depfile::read(dep)? {
        if !header.exists() {
            return Ok(Freshness::Stale);
        }
        if mtime(&header)? >= object_modified {
            return Ok(Freshness::Stale);
        }
    }

    Ok(Freshness::UpToDate)
}

/// Run the staleness check over a full source list, returning records for
/// exactly the sources that must be recompiled.
pub fn plan_rebuilds(
    toolchain: &dyn Toolchain,
    layout: &ArtifactLayout,
    sources: &[SourceUnit],
) -> Result<Vec<RebuildRecord>> {
    let mut rebuilds = Vec::new();

    for unit in sources {
        let details = toolchain.object_details(&unit.extension)?;
        let object = layout.object_path(unit, details.extension);
        let dep = layout.depfile_path(unit);

        let freshness = source_freshness(&unit.path, &object, &dep, details.needs_deps)?;
        if freshness == Freshness::Stale {
            rebuilds.push(RebuildRecord {
                source: unit.clone(),
                object,
                depfile: dep,
            });
        }
    }

    Ok(rebuilds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};

    use tempfile::TempDir;

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .append(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    /// Lay out source/object/dep files with controlled timestamps.
    struct Fixture {
        _tmp: TempDir,
        source: PathBuf,
        object: PathBuf,
        dep: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let source = tmp.path().join("main.c");
            let object = tmp.path().join("main.o");
            let dep = tmp.path().join("main.dep");
            fs::write(&source, "int main() {}").unwrap();
            Fixture {
                source,
                object,
                dep,
                _tmp: tmp,
            }
        }

        fn dir(&self) -> PathBuf {
            self.source.parent().unwrap().to_path_buf()
        }
    }

    #[test]
    fn test_missing_object_is_stale() {
        let fx = Fixture::new();
        let result = source_freshness(&fx.source, &fx.object, &fx.dep, true).unwrap();
        assert_eq!(result, Freshness::Stale);
    }

    #[test]
    fn test_source_newer_than_object_is_stale() {
        let fx = Fixture::new();
        fs::write(&fx.object, "obj").unwrap();

        let base = SystemTime::now();
        set_mtime(&fx.object, base);
        set_mtime(&fx.source, base + Duration::from_secs(5));

        let result = source_freshness(&fx.source, &fx.object, &fx.dep, true).unwrap();
        assert_eq!(result, Freshness::Stale);
    }

    #[test]
    fn test_equal_timestamps_count_as_stale() {
        let fx = Fixture::new();
        fs::write(&fx.object, "obj").unwrap();

        let base = SystemTime::now();
        set_mtime(&fx.object, base);
        set_mtime(&fx.source, base);

        let result = source_freshness(&fx.source, &fx.object, &fx.dep, true).unwrap();
        assert_eq!(result, Freshness::Stale);
    }

    #[test]
    fn test_missing_dep_list_is_stale_even_with_fresh_object() {
        let fx = Fixture::new();
        fs::write(&fx.object, "obj").unwrap();

        let base = SystemTime::now();
        set_mtime(&fx.source, base);
        set_mtime(&fx.object, base + Duration::from_secs(5));

        let result = source_freshness(&fx.source, &fx.object, &fx.dep, true).unwrap();
        assert_eq!(result, Freshness::Stale);
    }

    #[test]
    fn test_no_dep_tracking_skips_dep_checks() {
        let fx = Fixture::new();
        fs::write(&fx.object, "obj").unwrap();

        let base = SystemTime::now();
        set_mtime(&fx.source, base);
        set_mtime(&fx.object, base + Duration::from_secs(5));

        // Resource-style sources carry no dependency list; a missing dep
        // file must not mark them stale.
        let result = source_freshness(&fx.source, &fx.object, &fx.dep, false).unwrap();
        assert_eq!(result, Freshness::UpToDate);
    }

    #[test]
    fn test_touched_header_is_stale() {
        let fx = Fixture::new();
        fs::write(&fx.object, "obj").unwrap();
        let header = fx.dir().join("util.h");
        fs::write(&header, "#pragma once").unwrap();
        depfile::write(&fx.dep, &[header.clone()]).unwrap();

        let base = SystemTime::now();
        set_mtime(&fx.source, base);
        set_mtime(&fx.object, base + Duration::from_secs(5));
        set_mtime(&header, base + Duration::from_secs(10));

        let result = source_freshness(&fx.source, &fx.object, &fx.dep, true).unwrap();
        assert_eq!(result, Freshness::Stale);
    }

    #[test]
    fn test_all_headers_older_is_up_to_date() {
        let fx = Fixture::new();
        fs::write(&fx.object, "obj").unwrap();
        let header = fx.dir().join("util.h");
        fs::write(&header, "#pragma once").unwrap();
        depfile::write(&fx.dep, &[header.clone()]).unwrap();

        let base = SystemTime::now();
        set_mtime(&fx.source, base);
        set_mtime(&header, base);
        set_mtime(&fx.object, base + Duration::from_secs(5));

        let result = source_freshness(&fx.source, &fx.object, &fx.dep, true).unwrap();
        assert_eq!(result, Freshness::UpToDate);
    }

    #[test]
    fn test_vanished_header_is_stale() {
        let fx = Fixture::new();
        fs::write(&fx.object, "obj").unwrap();
        depfile::write(&fx.dep, &[fx.dir().join("gone.h")]).unwrap();

        let base = SystemTime::now();
        set_mtime(&fx.source, base);
        set_mtime(&fx.object, base + Duration::from_secs(5));

        let result = source_freshness(&fx.source, &fx.object, &fx.dep, true).unwrap();
        assert_eq!(result, Freshness::Stale);
    }
}
