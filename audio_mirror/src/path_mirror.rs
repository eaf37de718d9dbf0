//! Source/destination diff.
//!
//! A source file needs converting when its mirrored destination (same
//! relative path, target extension) does not exist. The scan is stateless:
//! the destination tree itself is the record of what has been done.

use crate::error::{RootRole, ScanError};
use crate::format::FormatSpec;
use crate::task::{ConversionTask, LibraryPath};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extensions treated as audio when [`SourceFilter::AudioOnly`] is active.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "wav", "aiff", "aif", "wma", "alac", "spx", "wv", "ape", "mp2", "opus", "shn", "flac", "mp3",
    "au", "m4a", "ogg", "oga",
];

/// Which source files become conversion candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceFilter {
    /// Every file with an extension other than the target one.
    #[default]
    AnyExceptTarget,
    /// Only files whose extension is in [`AUDIO_EXTENSIONS`].
    AudioOnly,
}

impl SourceFilter {
    fn accepts(self, extension: &str) -> bool {
        match self {
            SourceFilter::AnyExceptTarget => true,
            SourceFilter::AudioOnly => AUDIO_EXTENSIONS.contains(&extension),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    Pending,
    AlreadyConverted,
    /// The source already has the target extension; nothing to convert.
    InTargetFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub source: LibraryPath,
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    pub state: CandidateState,
}

/// A directory or file the scan could not read. The scan continues past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct MirrorDiff {
    pub tasks: Vec<ConversionTask>,
    pub already_converted: usize,
    pub in_target_format: usize,
    /// Sources whose destination is already claimed by an earlier source
    /// (`a.flac` and `a.wav` both map to `a.opus`).
    pub collisions: Vec<LibraryPath>,
    pub warnings: Vec<ScanWarning>,
}

impl MirrorDiff {
    pub fn skipped(&self) -> usize {
        self.already_converted + self.in_target_format + self.collisions.len()
    }
}

#[derive(Debug, Clone)]
pub struct PathMirror {
    source_root: PathBuf,
    dest_root: PathBuf,
    target_extension: String,
    filter: SourceFilter,
    excluded: Vec<String>,
}

impl PathMirror {
    pub fn new(
        source_root: impl Into<PathBuf>,
        dest_root: impl Into<PathBuf>,
        target_extension: &str,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
            target_extension: normalize_extension(target_extension),
            filter: SourceFilter::default(),
            excluded: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: SourceFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Never treat files with these extensions as sources.
    pub fn excluding(mut self, extensions: &[&str]) -> Self {
        self.excluded
            .extend(extensions.iter().map(|e| normalize_extension(e)));
        self
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// Verifies both roots before walking.
    ///
    /// A missing destination root is fine: it is an empty tree that the
    /// workers create on demand.
    pub fn check_roots(&self) -> Result<(), ScanError> {
        check_root(&self.source_root, RootRole::Source, false)?;
        check_root(&self.dest_root, RootRole::Destination, true)
    }

    /// Lazily walks the source tree in component-wise lexicographic order.
    /// Each call starts a fresh walk.
    pub fn candidates(&self) -> Candidates<'_> {
        Candidates {
            mirror: self,
            walk: WalkDir::new(&self.source_root)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter(),
        }
    }

    pub fn diff(&self, format: &FormatSpec) -> Result<MirrorDiff, ScanError> {
        self.check_roots()?;

        let mut diff = MirrorDiff::default();
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        for item in self.candidates() {
            let candidate = match item {
                Ok(candidate) => candidate,
                Err(err) if err.depth() == 0 => {
                    return Err(ScanError::Walk {
                        path: self.source_root.clone(),
                        source: err,
                    });
                }
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    warn!(path = %path.display(), error = %err, "Skipping unreadable entry");
                    diff.warnings.push(ScanWarning {
                        path,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            match candidate.state {
                CandidateState::InTargetFormat => diff.in_target_format += 1,
                CandidateState::AlreadyConverted => diff.already_converted += 1,
                CandidateState::Pending => {
                    if !claimed.insert(candidate.dest_path.clone()) {
                        warn!(
                            source = %candidate.source,
                            dest = %candidate.dest_path.display(),
                            "Destination already claimed by another source"
                        );
                        diff.collisions.push(candidate.source);
                        continue;
                    }
                    diff.tasks.push(ConversionTask {
                        source: candidate.source,
                        source_path: candidate.source_path,
                        dest_path: candidate.dest_path,
                        format: format.clone(),
                    });
                }
            }
        }

        debug!(
            pending = diff.tasks.len(),
            already_converted = diff.already_converted,
            in_target_format = diff.in_target_format,
            collisions = diff.collisions.len(),
            warnings = diff.warnings.len(),
            "Scan complete"
        );

        Ok(diff)
    }

    fn classify(&self, path: &Path) -> Option<Candidate> {
        let extension = normalize_extension(path.extension()?.to_str()?);
        if extension.is_empty() || self.excluded.contains(&extension) {
            return None;
        }
        if !self.filter.accepts(&extension) {
            return None;
        }

        let relative = path.strip_prefix(&self.source_root).ok()?;
        let source = LibraryPath::new(relative);
        let dest_path = source.mirrored_under(&self.dest_root, &self.target_extension);

        let state = if extension == self.target_extension {
            CandidateState::InTargetFormat
        } else if dest_path.exists() {
            CandidateState::AlreadyConverted
        } else {
            CandidateState::Pending
        };

        Some(Candidate {
            source,
            source_path: path.to_path_buf(),
            dest_path,
            state,
        })
    }
}

/// Convenience wrapper: diff `source_root` against `dest_root` for `format`.
pub fn diff(
    source_root: &Path,
    dest_root: &Path,
    format: &FormatSpec,
) -> Result<MirrorDiff, ScanError> {
    PathMirror::new(source_root, dest_root, format.target_extension()).diff(format)
}

pub struct Candidates<'a> {
    mirror: &'a PathMirror,
    walk: walkdir::IntoIter,
}

impl Iterator for Candidates<'_> {
    type Item = Result<Candidate, walkdir::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walk.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err)),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(candidate) = self.mirror.classify(entry.path()) {
                return Some(Ok(candidate));
            }
        }
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

fn check_root(path: &Path, role: RootRole, missing_ok: bool) -> Result<(), ScanError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if missing_ok {
                return Ok(());
            }
            return Err(ScanError::RootNotFound {
                role,
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(ScanError::Unreadable {
                role,
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory {
            role,
            path: path.to_path_buf(),
        });
    }

    fs::read_dir(path).map_err(|source| ScanError::Unreadable {
        role,
        path: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::touch;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn opus() -> FormatSpec {
        FormatSpec::parse("opus", None).unwrap()
    }

    fn task_sources(diff: &MirrorDiff) -> Vec<String> {
        diff.tasks.iter().map(|t| t.source.to_string()).collect()
    }

    #[test]
    fn test_empty_destination_converts_everything() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch(src.path(), "a/x.flac");
        touch(src.path(), "a/y.wav");

        let diff = diff(src.path(), dst.path(), &opus()).unwrap();

        assert_eq!(task_sources(&diff), vec!["a/x.flac", "a/y.wav"]);
        assert_eq!(diff.tasks[0].dest_path, dst.path().join("a/x.opus"));
        assert_eq!(diff.tasks[1].dest_path, dst.path().join("a/y.opus"));
        assert_eq!(diff.tasks[0].source_path, src.path().join("a/x.flac"));
        assert_eq!(diff.skipped(), 0);
    }

    #[test]
    fn test_nested_source_mirrors_directory() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch(src.path(), "a.flac");
        touch(src.path(), "b/c.flac");

        let diff = diff(src.path(), dst.path(), &opus()).unwrap();

        let dests: Vec<PathBuf> = diff.tasks.iter().map(|t| t.dest_path.clone()).collect();
        assert_eq!(
            dests,
            vec![dst.path().join("a.opus"), dst.path().join("b/c.opus")]
        );
    }

    #[test]
    fn test_existing_destination_is_skipped() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch(src.path(), "a/x.flac");
        touch(src.path(), "a/y.wav");
        touch(dst.path(), "a/x.opus");

        let diff = diff(src.path(), dst.path(), &opus()).unwrap();

        assert_eq!(task_sources(&diff), vec!["a/y.wav"]);
        assert_eq!(diff.already_converted, 1);
    }

    #[test]
    fn test_source_in_target_format_is_skipped() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch(src.path(), "b/z.opus");
        touch(src.path(), "b/Z2.OPUS");

        let diff = diff(src.path(), dst.path(), &opus()).unwrap();

        assert!(diff.tasks.is_empty());
        assert_eq!(diff.in_target_format, 2);
    }

    #[test]
    fn test_files_without_extension_ignored() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch(src.path(), "README");
        touch(src.path(), "c/.hidden");
        touch(src.path(), "c/track.mp3");

        let diff = diff(src.path(), dst.path(), &opus()).unwrap();

        assert_eq!(task_sources(&diff), vec!["c/track.mp3"]);
        assert_eq!(diff.skipped(), 0);
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch(src.path(), "Loud.FLAC");

        let diff = diff(src.path(), dst.path(), &opus()).unwrap();
        assert_eq!(diff.tasks[0].dest_path, dst.path().join("Loud.opus"));
    }

    #[test]
    fn test_tasks_are_in_lexicographic_order() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        for rel in ["b-x.flac", "b/c.flac", "a.flac", "ba.flac", "b/a/z.flac"] {
            touch(src.path(), rel);
        }

        let diff = diff(src.path(), dst.path(), &opus()).unwrap();

        assert_eq!(
            task_sources(&diff),
            vec!["a.flac", "b/a/z.flac", "b/c.flac", "b-x.flac", "ba.flac"]
        );
    }

    #[test]
    fn test_colliding_sources_produce_one_task() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch(src.path(), "a.flac");
        touch(src.path(), "a.wav");

        let diff = diff(src.path(), dst.path(), &opus()).unwrap();

        assert_eq!(task_sources(&diff), vec!["a.flac"]);
        assert_eq!(diff.collisions, vec![LibraryPath::new("a.wav")]);
        assert_eq!(diff.skipped(), 1);
    }

    #[test]
    fn test_missing_destination_root_is_empty_tree() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch(src.path(), "x.flac");

        let diff = diff(src.path(), &dst.path().join("not-yet"), &opus()).unwrap();
        assert_eq!(diff.tasks.len(), 1);
    }

    #[test]
    fn test_missing_source_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = diff(&dir.path().join("nope"), dir.path(), &opus()).unwrap_err();
        assert!(matches!(
            err,
            ScanError::RootNotFound {
                role: RootRole::Source,
                ..
            }
        ));
    }

    #[test]
    fn test_destination_that_is_a_file_is_fatal() {
        let src = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "dest-file");

        let err = diff(src.path(), &dir.path().join("dest-file"), &opus()).unwrap_err();
        assert!(matches!(
            err,
            ScanError::NotADirectory {
                role: RootRole::Destination,
                ..
            }
        ));
    }

    #[test]
    fn test_audio_only_filter() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch(src.path(), "album/01.flac");
        touch(src.path(), "album/notes.txt");
        touch(src.path(), "album/cover.jpg");

        let mirror = PathMirror::new(src.path(), dst.path(), "opus");
        assert_eq!(mirror.diff(&opus()).unwrap().tasks.len(), 3);

        let mirror = mirror.with_filter(SourceFilter::AudioOnly);
        assert_eq!(task_sources(&mirror.diff(&opus()).unwrap()), vec!["album/01.flac"]);
    }

    #[test]
    fn test_excluded_extensions_never_become_tasks() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch(src.path(), "album/01.flac");
        touch(src.path(), "album/cover.JPG");

        let mirror = PathMirror::new(src.path(), dst.path(), ".opus").excluding(&["jpg"]);
        assert_eq!(task_sources(&mirror.diff(&opus()).unwrap()), vec!["album/01.flac"]);
    }

    #[test]
    fn test_candidates_can_be_restarted() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch(src.path(), "a.flac");
        touch(src.path(), "b.opus");

        let mirror = PathMirror::new(src.path(), dst.path(), "opus");
        let first: Vec<_> = mirror.candidates().map(|c| c.unwrap().state).collect();
        let second: Vec<_> = mirror.candidates().map(|c| c.unwrap().state).collect();
        assert_eq!(
            first,
            vec![CandidateState::Pending, CandidateState::InTargetFormat]
        );
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_is_a_warning() {
        use std::os::unix::fs::PermissionsExt;

        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch(src.path(), "ok/a.flac");
        touch(src.path(), "locked/b.flac");
        let locked = src.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores permission bits; nothing to observe in that case.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = diff(src.path(), dst.path(), &opus());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let diff = result.unwrap();
        assert_eq!(task_sources(&diff), vec!["ok/a.flac"]);
        assert_eq!(diff.warnings.len(), 1);
        assert_eq!(diff.warnings[0].path, locked);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Creating every planned destination leaves nothing to do.
        #[test]
        fn prop_diff_converges_once_destinations_exist(
            names in prop::collection::btree_set("[a-d]{1,3}(/[a-d]{1,2})?", 1..12),
            ext_picks in prop::collection::vec(0usize..4, 12),
        ) {
            let exts = ["flac", "wav", "mp3", "opus"];
            let src = TempDir::new().unwrap();
            let dst = TempDir::new().unwrap();

            let mut created = 0usize;
            for (i, name) in names.iter().enumerate() {
                let rel = format!("{}.{}", name, exts[ext_picks[i % ext_picks.len()]]);
                // A name can't be both a file stem and a directory.
                if fs::create_dir_all(src.path().join(&rel).parent().unwrap()).is_err() {
                    continue;
                }
                if fs::write(src.path().join(&rel), b"x").is_ok() {
                    created += 1;
                }
            }

            let first = diff(src.path(), dst.path(), &opus()).unwrap();
            prop_assert_eq!(
                first.tasks.len() + first.skipped(),
                created
            );

            for task in &first.tasks {
                fs::create_dir_all(task.dest_path.parent().unwrap()).unwrap();
                fs::write(&task.dest_path, b"converted").unwrap();
            }

            let second = diff(src.path(), dst.path(), &opus()).unwrap();
            prop_assert!(second.tasks.is_empty());
            prop_assert_eq!(second.already_converted, first.tasks.len() + first.collisions.len());

            let third = diff(src.path(), dst.path(), &opus()).unwrap();
            prop_assert!(third.tasks.is_empty());
            prop_assert_eq!(third.skipped(), second.skipped());
        }
    }
}
