// Copyright (c) 2025 - Cowboy AI, Inc.
//! Local Build Assets
//!
//! Container images and website bundles are built from local directories.
//! Resolving an asset that is not on disk yields
//! [`StackError::MissingAsset`], the one error the orchestrator treats as
//! recoverable.

use ignore::WalkBuilder;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::construct::fn_sub;
use crate::errors::{StackError, StackResult};

/// What an asset is built into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Docker build context plus Dockerfile
    DockerImage,
    /// Directory uploaded as-is
    Directory,
}

/// Location of a local build artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSource {
    directory: PathBuf,
    file: Option<PathBuf>,
    excluded: Vec<PathBuf>,
}

impl AssetSource {
    /// Docker image built from `directory` with the Dockerfile at `directory/dockerfile`
    pub fn docker_image(directory: impl Into<PathBuf>, dockerfile: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            file: Some(dockerfile.into()),
            excluded: Vec::new(),
        }
    }

    /// Directory deployed as-is
    pub fn directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            file: None,
            excluded: Vec::new(),
        }
    }

    pub fn kind(&self) -> AssetKind {
        match self.file {
            Some(_) => AssetKind::DockerImage,
            None => AssetKind::Directory,
        }
    }

    pub fn directory_path(&self) -> &Path {
        &self.directory
    }

    /// Prefix every relative path with `root`
    pub fn rooted_at(&self, root: &Path) -> Self {
        Self {
            directory: root.join(&self.directory),
            file: self.file.clone(),
            excluded: self.excluded.clone(),
        }
    }

    /// Leave `path` out of the fingerprint, typically the assembly output
    pub fn excluding(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    /// Check the artifact exists on disk and fingerprint its content
    pub fn resolve(&self) -> StackResult<ResolvedAsset> {
        if !self.directory.is_dir() {
            return Err(StackError::MissingAsset {
                path: self.directory.clone(),
            });
        }

        if let Some(file) = &self.file {
            let dockerfile = self.directory.join(file);
            if !dockerfile.is_file() {
                return Err(StackError::MissingAsset { path: dockerfile });
            }
        }

        let fingerprint = fingerprint_directory(&self.directory, &self.excluded)?;
        debug!(
            path = %self.directory.display(),
            fingerprint = %fingerprint,
            "Asset resolved"
        );

        Ok(ResolvedAsset {
            source: self.clone(),
            fingerprint,
        })
    }
}

/// An asset confirmed on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    source: AssetSource,
    fingerprint: String,
}

impl ResolvedAsset {
    pub fn kind(&self) -> AssetKind {
        self.source.kind()
    }

    /// SHA-256 over relative paths and contents of the build context
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Image URI in the bootstrap container repository
    pub fn image_uri(&self) -> Value {
        fn_sub(&format!(
            "${{AWS::AccountId}}.dkr.ecr.${{AWS::Region}}.${{AWS::URLSuffix}}/cdk-assets:{}",
            self.fingerprint
        ))
    }

    /// Object key of the zipped bundle in the bootstrap bucket
    pub fn object_key(&self) -> String {
        format!("{}.zip", self.fingerprint)
    }
}

/// Directory never part of a build context
const VCS_DIRECTORY: &str = ".git";

/// Ignore file honoured next to `.gitignore`
const DOCKER_IGNORE_FILE: &str = ".dockerignore";

/// Hash relative paths and contents of every file under `root`
///
/// Symlinks are hashed by target and never followed. Entries matched by
/// `.gitignore` or `.dockerignore`, the VCS directory and anything under
/// `excluded` are skipped.
fn fingerprint_directory(root: &Path, excluded: &[PathBuf]) -> StackResult<String> {
    let root = fs::canonicalize(root)?;
    let excluded: Vec<PathBuf> = excluded
        .iter()
        .filter_map(|path| fs::canonicalize(path).ok())
        .filter(|path| path != &root)
        .collect();

    let walker = WalkBuilder::new(&root)
        .hidden(false)
        .parents(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false)
        .require_git(false)
        .follow_links(false)
        .add_custom_ignore_filename(DOCKER_IGNORE_FILE)
        .filter_entry(move |entry| {
            entry.file_name() != VCS_DIRECTORY
                && !excluded.iter().any(|path| entry.path().starts_with(path))
        })
        .build();

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_file() || file_type.is_symlink() {
            let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            entries.push((relative.to_path_buf(), file_type.is_symlink()));
        }
    }
    entries.sort();

    let mut hasher = Sha256::new();
    for (relative, is_symlink) in &entries {
        let path = root.join(relative);
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        if *is_symlink {
            hasher.update(fs::read_link(&path)?.to_string_lossy().as_bytes());
        } else {
            io::copy(&mut fs::File::open(&path)?, &mut hasher)?;
        }
        hasher.update(b"\0");
    }

    debug!(files = entries.len(), "Build context walked");
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_directory_is_recoverable() {
        let err = AssetSource::directory("/definitely/not/here/dist")
            .resolve()
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().starts_with("Cannot find asset"));
    }

    #[test]
    fn test_missing_dockerfile_names_the_file() {
        let dir = TempDir::new().unwrap();
        let err = AssetSource::docker_image(dir.path(), "Dockerfile")
            .resolve()
            .unwrap_err();
        match err {
            StackError::MissingAsset { path } => assert!(path.ends_with("Dockerfile")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        fs::create_dir(dir.path().join("app")).unwrap();
        fs::write(dir.path().join("app/main.py"), "print(1)\n").unwrap();

        let source = AssetSource::docker_image(dir.path(), "Dockerfile");
        let first = source.resolve().unwrap();
        assert_eq!(first.kind(), AssetKind::DockerImage);
        assert_eq!(first.fingerprint().len(), 64);
        assert_eq!(source.resolve().unwrap().fingerprint(), first.fingerprint());

        fs::write(dir.path().join("app/main.py"), "print(2)\n").unwrap();
        assert_ne!(source.resolve().unwrap().fingerprint(), first.fingerprint());
    }

    #[test]
    fn test_fingerprint_skips_excluded_output() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        let out_dir = dir.path().join("cdk.out");
        let source = AssetSource::docker_image(dir.path(), "Dockerfile").excluding(&out_dir);
        let before = source.resolve().unwrap();

        fs::create_dir(&out_dir).unwrap();
        fs::write(out_dir.join("manifest.json"), "{\"runId\":1}").unwrap();
        assert_eq!(source.resolve().unwrap().fingerprint(), before.fingerprint());

        fs::write(out_dir.join("manifest.json"), "{\"runId\":2}").unwrap();
        assert_eq!(source.resolve().unwrap().fingerprint(), before.fingerprint());
    }

    #[test]
    fn test_fingerprint_honours_ignore_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        fs::write(dir.path().join(".dockerignore"), "bin/\n").unwrap();
        fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();
        let source = AssetSource::docker_image(dir.path(), "Dockerfile");
        let before = source.resolve().unwrap();

        for ignored in ["bin", "target", ".git"] {
            fs::create_dir(dir.path().join(ignored)).unwrap();
            fs::write(dir.path().join(ignored).join("noise"), ignored).unwrap();
        }
        assert_eq!(source.resolve().unwrap().fingerprint(), before.fingerprint());
    }

    #[cfg(unix)]
    #[test]
    fn test_fingerprint_does_not_follow_symlink_loops() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("nested/loop")).unwrap();

        let resolved = AssetSource::docker_image(dir.path(), "Dockerfile")
            .resolve()
            .unwrap();
        assert_eq!(resolved.fingerprint().len(), 64);
    }

    #[test]
    fn test_rooted_at() {
        let source = AssetSource::directory("web/dist").rooted_at(Path::new("/repo"));
        assert_eq!(source.directory_path(), Path::new("/repo/web/dist"));
    }
}
