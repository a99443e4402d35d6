//! Include-file storage and resolution.
//!
//! The [`FileStore`] owns every file a preprocessing session touches. File
//! contents are allocated into a caller-owned [`bumpalo::Bump`], so the
//! borrowed `&'src str` contents handed to lexers stay valid while the store
//! keeps growing; everything is freed together when the session's arena is
//! dropped.
//!
//! Resolution order follows the C convention: a quoted include searches the
//! including file's directory, then the user `-I` directories, then the
//! system directories; an angle-bracket include skips the first step.

use std::path::{Path, PathBuf};

use bumpalo::Bump;
use cinder_util::{Fatal, FxHashMap, FxHashSet, Symbol};

/// Index of a loaded file within its session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

/// Which include form a lookup came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncludeStyle {
    /// `#include "name"`.
    Quoted,
    /// `#include <name>`.
    Angled,
}

/// One loaded file.
#[derive(Debug)]
pub struct SourceFile<'src> {
    pub id: FileId,
    /// Name as written in the include or on the command line; used for
    /// spans and `__FILE__`.
    pub name: Symbol,
    /// Resolved path, for duplicate detection.
    pub path: PathBuf,
    pub contents: &'src str,
    /// The file whose `#include` loaded this one.
    pub parent: Option<FileId>,
}

/// Loads, caches, and resolves source files for one session.
pub struct FileStore<'src> {
    arena: &'src Bump,
    files: Vec<SourceFile<'src>>,
    by_path: FxHashMap<PathBuf, FileId>,
    include_dirs: Vec<PathBuf>,
    system_dirs: Vec<PathBuf>,
    pragma_once: FxHashSet<FileId>,
}

impl<'src> FileStore<'src> {
    /// Create a store allocating contents into `arena`.
    pub fn new(arena: &'src Bump) -> Self {
        Self {
            arena,
            files: Vec::new(),
            by_path: FxHashMap::default(),
            include_dirs: Vec::new(),
            system_dirs: Vec::new(),
            pragma_once: FxHashSet::default(),
        }
    }

    /// Append a user (`-I`) search directory.
    pub fn add_include_dir(&mut self, dir: impl Into<PathBuf>) {
        self.include_dirs.push(dir.into());
    }

    /// Append a system search directory.
    pub fn add_system_dir(&mut self, dir: impl Into<PathBuf>) {
        self.system_dirs.push(dir.into());
    }

    /// The arena contents live in.
    pub fn arena(&self) -> &'src Bump {
        self.arena
    }

    pub fn get(&self, id: FileId) -> &SourceFile<'src> {
        &self.files[id.0 as usize]
    }

    /// Load the session's root file.
    pub fn load_root(&mut self, path: &Path) -> Result<FileId, Fatal> {
        let contents = std::fs::read_to_string(path).map_err(|source| Fatal::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.insert(path.display().to_string(), path.to_path_buf(), &contents, None))
    }

    /// Register in-memory contents under a name, without touching the
    /// filesystem. The root entry of test sessions.
    pub fn add_virtual(&mut self, name: &str, contents: &str) -> FileId {
        self.insert(name.to_owned(), PathBuf::from(name), contents, None)
    }

    /// Resolve an include name against the search path and load it.
    ///
    /// Returns `None` when no candidate exists; the caller reports the
    /// diagnostic, since only it knows the directive's location.
    pub fn resolve_include(
        &mut self,
        name: &str,
        style: IncludeStyle,
        parent: Option<FileId>,
    ) -> Option<FileId> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if style == IncludeStyle::Quoted {
            if let Some(parent) = parent {
                let parent_path = &self.get(parent).path;
                if let Some(dir) = parent_path.parent() {
                    candidates.push(dir.join(name));
                }
            }
        }
        for dir in self.include_dirs.iter().chain(self.system_dirs.iter()) {
            candidates.push(dir.join(name));
        }

        for candidate in candidates {
            let resolved = candidate.canonicalize().unwrap_or(candidate);
            if let Some(&id) = self.by_path.get(&resolved) {
                return Some(id);
            }
            if let Ok(contents) = std::fs::read_to_string(&resolved) {
                tracing::debug!(file = %resolved.display(), "loaded include");
                return Some(self.insert(name.to_owned(), resolved, &contents, parent));
            }
        }
        None
    }

    /// Mark a file as `#pragma once`-guarded.
    pub fn mark_pragma_once(&mut self, id: FileId) {
        self.pragma_once.insert(id);
    }

    /// True if the file was marked by `#pragma once`.
    pub fn is_pragma_once(&self, id: FileId) -> bool {
        self.pragma_once.contains(&id)
    }

    fn insert(
        &mut self,
        name: String,
        path: PathBuf,
        contents: &str,
        parent: Option<FileId>,
    ) -> FileId {
        let id = FileId(self.files.len() as u32);
        let contents: &'src str = self.arena.alloc_str(contents);
        self.files.push(SourceFile {
            id,
            name: Symbol::intern(&name),
            path: path.clone(),
            contents,
            parent,
        });
        self.by_path.insert(path, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn virtual_files() {
        let arena = Bump::new();
        let mut store = FileStore::new(&arena);
        let id = store.add_virtual("main.c", "int x;\n");
        let file = store.get(id);
        assert_eq!(file.contents, "int x;\n");
        assert_eq!(file.name.as_str(), "main.c");
        assert!(file.parent.is_none());
    }

    #[test]
    fn quoted_include_searches_parent_dir_first() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("a.h"), "A").unwrap();
        fs::write(dir.path().join("a.h"), "TOP").unwrap();
        let root_path = sub.join("main.c");
        fs::write(&root_path, "").unwrap();

        let arena = Bump::new();
        let mut store = FileStore::new(&arena);
        store.add_include_dir(dir.path());
        let root = store.load_root(&root_path).unwrap();

        let id = store
            .resolve_include("a.h", IncludeStyle::Quoted, Some(root))
            .unwrap();
        assert_eq!(store.get(id).contents, "A");

        let angled = store
            .resolve_include("a.h", IncludeStyle::Angled, Some(root))
            .unwrap();
        assert_eq!(store.get(angled).contents, "TOP");
    }

    #[test]
    fn duplicate_loads_share_an_id() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("h.h"), "H").unwrap();

        let arena = Bump::new();
        let mut store = FileStore::new(&arena);
        store.add_include_dir(dir.path());
        let first = store.resolve_include("h.h", IncludeStyle::Angled, None).unwrap();
        let second = store.resolve_include("h.h", IncludeStyle::Angled, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_include_is_none() {
        let arena = Bump::new();
        let mut store = FileStore::new(&arena);
        assert!(store
            .resolve_include("nope.h", IncludeStyle::Angled, None)
            .is_none());
    }

    #[test]
    fn pragma_once_marking() {
        let arena = Bump::new();
        let mut store = FileStore::new(&arena);
        let id = store.add_virtual("x.h", "");
        assert!(!store.is_pragma_once(id));
        store.mark_pragma_once(id);
        assert!(store.is_pragma_once(id));
    }
}
