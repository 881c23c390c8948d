//! Fixed-size splitting of large bundles and recombination of the parts.
//!
//! A file `X.angry` split into parts produces `X.angry1`, `X.angry2`, ...
//! Every part but the last holds exactly `part_size` bytes. An empty source
//! produces a single empty part `X.angry1`.

use crate::error::{Error, Result};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Extension of a combined bundle; parts append their 1-based number.
pub const PART_EXTENSION: &str = "angry";

/// Default part size: 24 MiB.
pub const DEFAULT_PART_SIZE: u64 = 24 * 1024 * 1024;

/// File name of part `number` of `base`.
pub fn part_file_name(base: &str, number: u32) -> String {
    format!("{}.{}{}", base, PART_EXTENSION, number)
}

/// File name of the combined artifact for `base`.
pub fn combined_file_name(base: &str) -> String {
    format!("{}.{}", base, PART_EXTENSION)
}

/// Parse the part number out of `file_name` if it is a part of `base`.
///
/// Only canonical numbers are accepted (`X.angry2`, not `X.angry02`).
pub fn parse_part_number(base: &str, file_name: &str) -> Option<u32> {
    let digits = file_name
        .strip_prefix(base)?
        .strip_prefix('.')?
        .strip_prefix(PART_EXTENSION)?;
    let number: u32 = digits.parse().ok()?;
    if number == 0 || number.to_string() != digits {
        return None;
    }
    Some(number)
}

/// Split a reader into in-memory parts.
pub fn split<R: Read>(reader: R, part_size: u64) -> Result<Vec<Vec<u8>>> {
    let mut parts = Vec::new();
    split_with(reader, part_size, |_, data: &mut dyn Read| {
        let mut part = Vec::new();
        data.read_to_end(&mut part)?;
        parts.push(part);
        Ok(())
    })?;
    Ok(parts)
}

/// Drive a split, handing each part's bytes to `sink` with its number.
///
/// Returns the number of parts produced.
fn split_with<R, F>(mut reader: R, part_size: u64, mut sink: F) -> Result<u32>
where
    R: Read,
    F: FnMut(u32, &mut dyn Read) -> Result<()>,
{
    if part_size == 0 {
        return Err(Error::InvalidPartSize { size: part_size });
    }

    let mut number = 1;
    loop {
        let mut buffered = PeekedPart::new(&mut reader, part_size)?;
        if buffered.is_empty() && number > 1 {
            return Ok(number - 1);
        }

        sink(number, &mut buffered)?;
        let full = buffered.consumed() == part_size;
        buffered.drain()?;

        if !full {
            return Ok(number);
        }
        number += 1;
    }
}

/// Split `source` into numbered part files in `out_dir`.
///
/// Parts are named after the source's file stem. Each part is written to a
/// temporary file and renamed into place. Parts of the same name already in
/// `out_dir` are refused unless `replace`, in which case any left beyond the
/// new last part are removed.
pub fn split_file(
    source: &Path,
    out_dir: &Path,
    part_size: u64,
    replace: bool,
) -> Result<Vec<PathBuf>> {
    if !source.is_file() {
        return Err(Error::file_not_found(source));
    }
    let base = file_stem(source)?;
    fs::create_dir_all(out_dir)?;

    let existing = discover_parts(&base, out_dir)?;
    if let Some(&first) = existing.first()
        && !replace
    {
        return Err(Error::path_exists(out_dir.join(part_file_name(&base, first))));
    }

    let reader = io::BufReader::new(fs::File::open(source)?);
    let mut written = Vec::new();
    split_with(reader, part_size, |number, data| {
        let path = out_dir.join(part_file_name(&base, number));
        let mut temp_file = tempfile::NamedTempFile::new_in(out_dir)?;
        let len = io::copy(data, &mut temp_file)?;
        temp_file.flush()?;
        temp_file.persist(&path)?;

        tracing::debug!(part = number, len, path = %path.display(), "wrote part");
        written.push(path);
        Ok(())
    })?;

    let count = written.len() as u32;
    for number in existing.into_iter().filter(|&n| n > count) {
        let stale = out_dir.join(part_file_name(&base, number));
        fs::remove_file(&stale)?;
        tracing::debug!(part = number, path = %stale.display(), "removed stale part");
    }

    tracing::info!(
        source = %source.display(),
        parts = written.len(),
        part_size,
        "split complete"
    );
    Ok(written)
}

/// Outcome of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Path of the combined artifact.
    pub output: PathBuf,
    /// Number of parts consumed.
    pub parts: u32,
    /// Total bytes written.
    pub bytes: u64,
}

/// Find the part numbers of `base` present in `dir`, sorted.
pub fn discover_parts(base: &str, dir: &Path) -> Result<Vec<u32>> {
    let mut numbers = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str()
            && let Some(number) = parse_part_number(base, name)
        {
            numbers.push(number);
        }
    }
    numbers.sort_unstable();
    Ok(numbers)
}

/// Concatenate `base.angry1..N` in `dir` into `base.angry`.
///
/// Part 1 must exist and the numbers must be contiguous up to the highest
/// part present; otherwise the first missing number is reported and no
/// output is written. An existing output is only replaced if `overwrite`.
pub fn join(base: &str, dir: &Path, overwrite: bool) -> Result<JoinOutcome> {
    let output = dir.join(combined_file_name(base));
    if output.exists() && !overwrite {
        return Err(Error::path_exists(output));
    }

    let numbers = discover_parts(base, dir)?;
    if numbers.is_empty() {
        return Err(Error::missing_part(base, 1));
    }
    // Numbers are sorted and unique, so the first mismatch is the first gap
    for (expected, &found) in (1u32..).zip(&numbers) {
        if found != expected {
            return Err(Error::missing_part(base, expected));
        }
    }
    let count = numbers.len() as u32;

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
    let mut bytes = 0;
    for number in 1..=count {
        let path = dir.join(part_file_name(base, number));
        let mut part = fs::File::open(&path)?;
        let len = io::copy(&mut part, &mut temp_file)?;
        tracing::debug!(part = number, len, "appended part");
        bytes += len;
    }
    temp_file.flush()?;

    if overwrite {
        temp_file.persist(&output)?;
    } else {
        temp_file
            .persist_noclobber(&output)
            .map_err(|e| match e.error.kind() {
                io::ErrorKind::AlreadyExists => Error::path_exists(&output),
                _ => Error::from(e),
            })?;
    }

    tracing::info!(output = %output.display(), parts = count, bytes, "join complete");
    Ok(JoinOutcome {
        output,
        parts: count,
        bytes,
    })
}

/// Resolve a join argument: a path to `X.angry1` or a bare base name in `dir`.
pub fn resolve_join_target(input: &Path, dir: &Path) -> Result<(String, PathBuf)> {
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::file_not_found(input))?;

    let first_part_suffix = format!(".{}1", PART_EXTENSION);
    if let Some(base) = name.strip_suffix(&first_part_suffix) {
        let parent = input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dir.to_path_buf());
        return Ok((base.to_string(), parent));
    }
    Ok((name.to_string(), dir.to_path_buf()))
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::file_not_found(path))
}

/// Up to `limit` bytes of a reader, with the first byte read ahead so an
/// exhausted source can be told apart from an empty part.
struct PeekedPart<'a, R: Read> {
    first: Option<u8>,
    rest: io::Take<&'a mut R>,
    consumed: u64,
}

impl<'a, R: Read> PeekedPart<'a, R> {
    fn new(reader: &'a mut R, limit: u64) -> Result<Self> {
        let mut byte = [0u8; 1];
        let first = loop {
            match reader.read(&mut byte) {
                Ok(0) => break None,
                Ok(_) => break Some(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        let remaining = if first.is_some() { limit - 1 } else { 0 };
        Ok(Self {
            first,
            rest: reader.take(remaining),
            consumed: 0,
        })
    }

    fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Consume whatever the sink left unread so the next part starts aligned.
    fn drain(&mut self) -> Result<()> {
        io::copy(self, &mut io::sink())?;
        Ok(())
    }
}

impl<R: Read> Read for PeekedPart<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(byte) = self.first.take() {
            buf[0] = byte;
            self.consumed += 1;
            return Ok(1);
        }
        let n = self.rest.read(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_parts(dir: &Path, base: &str, parts: &[(u32, &[u8])]) {
        for (number, data) in parts {
            fs::write(dir.join(part_file_name(base, *number)), data).unwrap();
        }
    }

    #[test]
    fn test_part_names() {
        assert_eq!(part_file_name("level", 3), "level.angry3");
        assert_eq!(combined_file_name("level"), "level.angry");

        assert_eq!(parse_part_number("level", "level.angry12"), Some(12));
        assert_eq!(parse_part_number("level", "level.angry"), None);
        assert_eq!(parse_part_number("level", "level.angry0"), None);
        assert_eq!(parse_part_number("level", "level.angry02"), None);
        assert_eq!(parse_part_number("level", "level.angry+2"), None);
        assert_eq!(parse_part_number("level", "other.angry1"), None);
        assert_eq!(parse_part_number("lev", "level.angry1"), None);
    }

    #[test]
    fn test_split_sizes() {
        let data: Vec<u8> = (0..10u8).collect();

        let parts = split(&data[..], 4).unwrap();
        assert_eq!(parts, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);

        let parts = split(&data[..], 5).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], vec![5, 6, 7, 8, 9]);

        let parts = split(&data[..], 100).unwrap();
        assert_eq!(parts, vec![data.clone()]);
    }

    #[test]
    fn test_split_empty_source() {
        let parts = split(&b""[..], 4).unwrap();
        assert_eq!(parts, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn test_split_rejects_zero_part_size() {
        assert!(matches!(
            split(&b"abc"[..], 0),
            Err(Error::InvalidPartSize { size: 0 })
        ));
    }

    #[test]
    fn test_split_file_writes_numbered_parts() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("level.angry");
        fs::write(&source, vec![9u8; 25]).unwrap();

        let out_dir = temp_dir.path().join("out");
        let written = split_file(&source, &out_dir, 10, false).unwrap();

        assert_eq!(
            written,
            vec![
                out_dir.join("level.angry1"),
                out_dir.join("level.angry2"),
                out_dir.join("level.angry3"),
            ]
        );
        assert_eq!(fs::read(&written[0]).unwrap().len(), 10);
        assert_eq!(fs::read(&written[2]).unwrap().len(), 5);
    }

    #[test]
    fn test_resplit_refuses_existing_parts() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("level.angry");
        fs::write(&source, vec![1u8; 50]).unwrap();
        let out_dir = temp_dir.path().join("out");
        split_file(&source, &out_dir, 10, false).unwrap();

        fs::write(&source, vec![2u8; 25]).unwrap();
        let result = split_file(&source, &out_dir, 10, false);
        assert!(matches!(result, Err(Error::PathExists { .. })));
        assert_eq!(fs::read(out_dir.join("level.angry1")).unwrap(), vec![1u8; 10]);
    }

    #[test]
    fn test_resplit_smaller_source_removes_stale_parts() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("level.angry");
        fs::write(&source, vec![1u8; 50]).unwrap();
        let out_dir = temp_dir.path().join("out");
        assert_eq!(split_file(&source, &out_dir, 10, false).unwrap().len(), 5);

        fs::write(&source, vec![2u8; 25]).unwrap();
        assert_eq!(split_file(&source, &out_dir, 10, true).unwrap().len(), 3);
        assert_eq!(discover_parts("level", &out_dir).unwrap(), vec![1, 2, 3]);

        let outcome = join("level", &out_dir, false).unwrap();
        assert_eq!(outcome.parts, 3);
        assert_eq!(fs::read(&outcome.output).unwrap(), vec![2u8; 25]);
    }

    #[test]
    fn test_split_file_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let result = split_file(&temp_dir.path().join("nope.angry"), temp_dir.path(), 10, false);
        assert!(matches!(result, Err(Error::FileNotFound { .. })));
    }

    #[test]
    fn test_join_concatenates_in_order() {
        let temp_dir = TempDir::new().unwrap();
        write_parts(
            temp_dir.path(),
            "level",
            &[(2, b"world"), (1, b"hello "), (3, b"!")],
        );

        let outcome = join("level", temp_dir.path(), false).unwrap();
        assert_eq!(outcome.parts, 3);
        assert_eq!(outcome.bytes, 12);
        assert_eq!(fs::read(&outcome.output).unwrap(), b"hello world!");
    }

    #[test]
    fn test_join_gap_fails_without_output() {
        let temp_dir = TempDir::new().unwrap();
        write_parts(temp_dir.path(), "level", &[(1, b"a"), (3, b"c")]);

        let err = join("level", temp_dir.path(), false).unwrap_err();
        assert!(matches!(err, Error::MissingPart { number: 2, .. }));
        assert!(!temp_dir.path().join("level.angry").exists());

        // Only the two part files remain; no temporary output is left behind
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_join_missing_first_part() {
        let temp_dir = TempDir::new().unwrap();
        let err = join("level", temp_dir.path(), false).unwrap_err();
        assert!(matches!(err, Error::MissingPart { number: 1, .. }));

        write_parts(temp_dir.path(), "level", &[(2, b"b")]);
        let err = join("level", temp_dir.path(), false).unwrap_err();
        assert!(matches!(err, Error::MissingPart { number: 1, .. }));
        assert!(!temp_dir.path().join("level.angry").exists());
    }

    #[test]
    fn test_join_ignores_other_bases() {
        let temp_dir = TempDir::new().unwrap();
        write_parts(temp_dir.path(), "level", &[(1, b"a")]);
        write_parts(temp_dir.path(), "levelx", &[(2, b"zz")]);
        fs::write(temp_dir.path().join("level.angry02"), b"zz").unwrap();

        let outcome = join("level", temp_dir.path(), false).unwrap();
        assert_eq!(outcome.parts, 1);
        assert_eq!(fs::read(&outcome.output).unwrap(), b"a");
    }

    #[test]
    fn test_join_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        write_parts(temp_dir.path(), "level", &[(1, b"new")]);
        let output = temp_dir.path().join("level.angry");
        fs::write(&output, b"old").unwrap();

        assert!(matches!(
            join("level", temp_dir.path(), false),
            Err(Error::PathExists { .. })
        ));
        assert_eq!(fs::read(&output).unwrap(), b"old");

        join("level", temp_dir.path(), true).unwrap();
        assert_eq!(fs::read(&output).unwrap(), b"new");
    }

    #[test]
    fn test_resolve_join_target() {
        let dir = Path::new("/tmp/default");

        let (base, parent) = resolve_join_target(Path::new("/data/level.angry1"), dir).unwrap();
        assert_eq!(base, "level");
        assert_eq!(parent, PathBuf::from("/data"));

        let (base, parent) = resolve_join_target(Path::new("level.angry1"), dir).unwrap();
        assert_eq!(base, "level");
        assert_eq!(parent, dir);

        let (base, parent) = resolve_join_target(Path::new("level"), dir).unwrap();
        assert_eq!(base, "level");
        assert_eq!(parent, dir);
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// In-memory split: sizes are exact and concatenation restores the source
        #[test]
        fn prop_split_concat_roundtrip(
            data in prop::collection::vec(any::<u8>(), 0..2_000),
            part_size in 1u64..300,
        ) {
            let parts = split(&data[..], part_size)?;

            prop_assert!(!parts.is_empty());
            let (last, full) = parts.split_last().unwrap();
            prop_assert!(full.iter().all(|p| p.len() as u64 == part_size));
            if !data.is_empty() {
                prop_assert!(!last.is_empty());
            }
            prop_assert!(last.len() as u64 <= part_size);
            prop_assert_eq!(parts.concat(), data);
        }

        /// File split followed by join reproduces the source byte for byte,
        /// including empty sources and exact multiples of the part size
        #[test]
        fn prop_split_join_roundtrip(
            data in prop::collection::vec(any::<u8>(), 0..1_500),
            part_size in 1u64..200,
        ) {
            let temp_dir = TempDir::new().unwrap();
            let source = temp_dir.path().join("bundle.angry");
            fs::write(&source, &data).unwrap();

            let parts_dir = temp_dir.path().join("parts");
            let written = split_file(&source, &parts_dir, part_size, false)?;
            let expected_parts = if data.is_empty() {
                1
            } else {
                (data.len() as u64).div_ceil(part_size)
            };
            prop_assert_eq!(written.len() as u64, expected_parts);

            let outcome = join("bundle", &parts_dir, false)?;
            prop_assert_eq!(outcome.bytes, data.len() as u64);
            prop_assert_eq!(fs::read(&outcome.output).unwrap(), data);
        }
    }
}
