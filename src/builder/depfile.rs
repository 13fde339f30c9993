//! Dependency record store.
//!
//! A dependency list is the per-object record of every header a translation
//! unit pulled in at its last successful compile: UTF-8 text, one absolute
//! path per line, each unique path appearing once in order of first
//! appearance. It is the only state that outlives a build invocation.
//!
//! The raw material differs per backend. GCC-family compilers emit a
//! Makefile-fragment listing (`-MD`/`-MF`); Visual C++ interleaves an
//! "including file" trace into normal compiler stdout. Both are normalized
//! here into the same on-disk format.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::builder::errors::BuildError;
use crate::util::fs::{absolutize, read_to_string, write_string};

/// Marker `cl.exe /showIncludes` prints in front of every header.
const CL_INCLUDE_NOTE: &str = "Note: including file:";

/// Write a dependency list, overwriting any existing file.
///
/// Paths are made absolute and de-duplicated, preserving the order of
/// first appearance.
pub fn write(path: &Path, headers: &[PathBuf]) -> Result<()> {
    let unique = dedup_absolute(headers.iter().map(|h| h.as_path()));
    let lines: Vec<String> = unique
        .iter()
        .map(|h| h.display().to_string())
        .collect();
    write_string(path, &lines.join("\n"))
}

/// Read a dependency list written by [`write`].
///
/// Fails with [`BuildError::MissingDependencyList`] if the file does not
/// exist; callers interpret that as "must rebuild", never as a hard error.
pub fn read(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(BuildError::MissingDependencyList {
            path: path.to_path_buf(),
        }
        .into());
    }

    let text = read_to_string(path)?;
    Ok(text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Parse the Makefile-fragment dependency listing emitted by GCC-family
/// compilers into an ordered, de-duplicated set of absolute header paths.
///
/// Line-continuation backslashes are stripped, the leading target-name
/// token is discarded, and both quoted and backslash-escaped
/// space-containing paths are handled.
pub fn parse_gcc_fragment(text: &str) -> Result<Vec<PathBuf>> {
    let mut joined = String::new();
    for line in text.lines() {
        let line = line.trim_end();
        let line = line.strip_suffix('\\').unwrap_or(line);
        joined.push_str(line.trim());
        joined.push(' ');
    }

    let tokens = tokenize_fragment(&joined)?;

    // Drop everything up to and including the target-name token. The
    // target may be a full path; its token always ends with the rule colon.
    let headers = match tokens.iter().position(|t| t.ends_with(':')) {
        Some(idx) => &tokens[idx + 1..],
        None => &tokens[..],
    };

    Ok(dedup_absolute(
        headers.iter().map(|t| Path::new(t.as_str())),
    ))
}

/// Split a combined `cl.exe /showIncludes` capture into genuine diagnostic
/// text and the traced header set.
///
/// Headers are lower-cased (Windows paths are case-insensitive) and
/// de-duplicated in order of first appearance. Everything that is not an
/// include note is returned as diagnostic text for failure reporting.
pub fn split_cl_output(raw: &str) -> (String, Vec<PathBuf>) {
    let mut headers = Vec::new();
    let mut seen = HashSet::new();
    let mut text = Vec::new();

    for line in raw.lines() {
        match line.find(CL_INCLUDE_NOTE) {
            Some(pos) => {
                let header = line[pos + CL_INCLUDE_NOTE.len()..]
                    .trim()
                    .to_ascii_lowercase();
                if !header.is_empty() && seen.insert(header.clone()) {
                    headers.push(PathBuf::from(header));
                }
            }
            None => text.push(line),
        }
    }

    (text.join("\n"), headers)
}

/// Tokenize one joined dependency fragment.
///
/// A `"` opens a quoted run that may contain whitespace; `\ ` escapes a
/// single space. Any other backslash is a literal path character, so
/// Windows-style paths pass through untouched.
fn tokenize_fragment(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => current.push(ch),
                    None => bail!("mismatched quotes in dependency fragment"),
                }
            },
            '\\' if matches!(chars.peek(), Some(' ') | Some('\t')) => {
                current.push(chars.next().unwrap());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    Ok(tokens)
}

/// Absolutize and de-duplicate, preserving order of first appearance.
fn dedup_absolute<'a>(paths: impl Iterator<Item = &'a Path>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for path in paths {
        let abs = absolutize(path);
        if seen.insert(abs.clone()) {
            unique.push(abs);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_dedups_and_keeps_order() {
        let tmp = TempDir::new().unwrap();
        let dep = tmp.path().join("main.dep");

        let headers = vec![
            PathBuf::from("/usr/include/b.h"),
            PathBuf::from("/usr/include/a.h"),
            PathBuf::from("/usr/include/b.h"),
            PathBuf::from("/usr/include/c.h"),
        ];
        write(&dep, &headers).unwrap();

        let read_back = read(&dep).unwrap();
        assert_eq!(
            read_back,
            vec![
                PathBuf::from("/usr/include/b.h"),
                PathBuf::from("/usr/include/a.h"),
                PathBuf::from("/usr/include/c.h"),
            ]
        );
    }

    #[test]
    fn test_read_missing_is_recoverable() {
        let tmp = TempDir::new().unwrap();
        let err = read(&tmp.path().join("absent.dep")).unwrap_err();
        let build_err = err.downcast_ref::<BuildError>().unwrap();
        assert!(build_err.is_stale_input());
    }

    #[test]
    fn test_write_overwrites_existing_file() {
        let tmp = TempDir::new().unwrap();
        let dep = tmp.path().join("main.dep");

        write(&dep, &[PathBuf::from("/old.h")]).unwrap();
        write(&dep, &[PathBuf::from("/new.h")]).unwrap();

        assert_eq!(read(&dep).unwrap(), vec![PathBuf::from("/new.h")]);
    }

    #[test]
    fn test_parse_gcc_fragment_basic() {
        let fragment = "obj/main.o: /src/main.c /inc/a.h \\\n /inc/b.h /inc/a.h\n";
        let headers = parse_gcc_fragment(fragment).unwrap();
        assert_eq!(
            headers,
            vec![
                PathBuf::from("/src/main.c"),
                PathBuf::from("/inc/a.h"),
                PathBuf::from("/inc/b.h"),
            ]
        );
    }

    #[test]
    fn test_parse_gcc_fragment_detached_colon() {
        let fragment = "main.o : /inc/a.h\n";
        let headers = parse_gcc_fragment(fragment).unwrap();
        assert_eq!(headers, vec![PathBuf::from("/inc/a.h")]);
    }

    #[test]
    fn test_parse_gcc_fragment_quoted_and_escaped_spaces() {
        let fragment =
            "main.o: \"/inc/with space.h\" /inc/also\\ spaced.h /inc/plain.h\n";
        let headers = parse_gcc_fragment(fragment).unwrap();
        assert_eq!(
            headers,
            vec![
                PathBuf::from("/inc/with space.h"),
                PathBuf::from("/inc/also spaced.h"),
                PathBuf::from("/inc/plain.h"),
            ]
        );
    }

    #[test]
    fn test_parse_gcc_fragment_mismatched_quote_is_error() {
        assert!(parse_gcc_fragment("main.o: \"/inc/broken.h\n").is_err());
    }

    #[test]
    fn test_split_cl_output_demultiplexes() {
        let raw = "main.cpp\n\
                   Note: including file: C:\\Inc\\A.h\n\
                   Note: including file:  c:\\inc\\a.h\n\
                   Note: including file: C:\\Inc\\B.h\n\
                   main.cpp(3): warning C4100: unreferenced parameter\n";

        let (text, headers) = split_cl_output(raw);

        assert_eq!(
            headers,
            vec![
                PathBuf::from("c:\\inc\\a.h"),
                PathBuf::from("c:\\inc\\b.h"),
            ]
        );
        assert!(text.contains("main.cpp"));
        assert!(text.contains("warning C4100"));
        assert!(!text.contains("including file"));
    }
}
