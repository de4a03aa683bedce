//! Persistent, lock-protected action storage.
//!
//! One [`ActionStore`] backs one tier (user or global) with one on-disk
//! file. The file is line-oriented and human-editable: lines this module
//! generated decode into [`AppletActionEntry`] records, everything else
//! (comments, legacy content, hand edits gone wrong) is carried as an
//! opaque record — preserved verbatim across saves, inspectable and
//! clearable, but never consulted for matching.
//!
//! # Locking
//!
//! All access goes through [`ActionStore::lock`], which returns a guard;
//! queries and mutations only exist on the guard, so every read-decide-
//! write sequence is a single critical section by construction. The guard
//! holds two locks: a process-wide mutex, and (for writable tiers) a
//! best-effort `flock` on a sidecar lock file against other launcher
//! processes sharing the same settings file. Holding the guard across a
//! blocking human prompt is expected; the coarse scope is what guarantees
//! at most one prompt per contested policy region.
//!
//! # Failure policy
//!
//! Loading never fails the caller: a missing or unreadable file is an
//! empty store plus a log line. Saving fails loudly with [`StoreError`],
//! and callers are expected to keep the decision they already made.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt as _;
use tracing::{debug, warn};

use super::action::ActionId;
use super::entry::AppletActionEntry;
use super::error::StoreError;

/// One persisted line: a decoded entry, or foreign content we keep
/// verbatim.
#[derive(Debug, Clone)]
enum Line {
    Entry(AppletActionEntry),
    Opaque(String),
}

#[derive(Debug, Default)]
struct StoreInner {
    loaded: bool,
    lines: Vec<Line>,
}

/// A persistent collection of remembered trust decisions for one tier.
#[derive(Debug)]
pub struct ActionStore {
    path: PathBuf,
    writable: bool,
    inner: Mutex<StoreInner>,
}

impl ActionStore {
    /// Opens a writable (user-tier) store backed by `path`.
    ///
    /// No I/O happens here; the file is loaded lazily on first lock.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writable: true,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Opens a read-only (global-tier) store backed by `path`.
    ///
    /// Mutating operations on the guard fail with
    /// [`StoreError::ReadOnly`].
    #[must_use]
    pub fn open_read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writable: false,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Enters the store's critical section.
    ///
    /// Blocks until no other thread holds the guard; for writable tiers
    /// it then takes a best-effort advisory lock against other processes.
    /// The first lock loads the backing file, tolerantly.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if a previous holder
    /// panicked; callers treat that as a canceled interaction.
    pub fn lock(&self) -> Result<ActionStoreGuard<'_>, StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::LockPoisoned)?;
        let file_lock = if self.writable {
            self.acquire_file_lock()
        } else {
            None
        };
        if !inner.loaded {
            inner.lines = self.load_lines();
            inner.loaded = true;
        }
        Ok(ActionStoreGuard {
            store: self,
            _file_lock: file_lock,
            inner,
        })
    }

    /// Takes the cross-process advisory lock, best-effort.
    ///
    /// Exclusion against other processes is desirable but its absence is
    /// not a reason to refuse a trust decision, so any failure here just
    /// logs and degrades to in-process locking.
    fn acquire_file_lock(&self) -> Option<File> {
        let mut lock_path = self.path.as_os_str().to_owned();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);
        if let Some(parent) = lock_path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(path = %lock_path.display(), %err, "cannot create lock file directory");
                return None;
            }
        }
        let file = match OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %lock_path.display(), %err, "cannot open lock file");
                return None;
            }
        };
        match file.lock_exclusive() {
            Ok(()) => Some(file),
            Err(err) => {
                warn!(path = %lock_path.display(), %err, "cannot take advisory lock");
                None
            }
        }
    }

    /// Reads and decodes the backing file. Never fails: unreadable files
    /// yield an empty store, undecodable lines become opaque records.
    fn load_lines(&self) -> Vec<Line> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no action storage file yet");
                return Vec::new();
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    %err,
                    "cannot read action storage, continuing with an empty store"
                );
                return Vec::new();
            }
        };

        let mut lines = Vec::new();
        let mut opaque = 0usize;
        for raw in content.lines() {
            if raw.trim().is_empty() || raw.trim_start().starts_with('#') {
                lines.push(Line::Opaque(raw.to_owned()));
                continue;
            }
            match AppletActionEntry::parse_line(raw) {
                Ok(entry) => lines.push(Line::Entry(entry)),
                Err(err) => {
                    opaque += 1;
                    debug!(
                        path = %self.path.display(),
                        line = raw,
                        %err,
                        "keeping undecodable action storage line as opaque"
                    );
                    lines.push(Line::Opaque(raw.to_owned()));
                }
            }
        }
        debug!(
            path = %self.path.display(),
            entries = lines.iter().filter(|l| matches!(l, Line::Entry(_))).count(),
            undecodable = opaque,
            "loaded action storage"
        );
        lines
    }
}

/// Exclusive access to an [`ActionStore`]'s contents.
///
/// Mutations write through to disk before returning.
#[derive(Debug)]
pub struct ActionStoreGuard<'a> {
    store: &'a ActionStore,
    /// Held for the guard's lifetime; dropping the handle releases the
    /// advisory lock.
    _file_lock: Option<File>,
    inner: MutexGuard<'a, StoreInner>,
}

impl ActionStoreGuard<'_> {
    /// Iterates the decoded entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &AppletActionEntry> {
        self.inner.lines.iter().filter_map(|line| match line {
            Line::Entry(entry) => Some(entry),
            Line::Opaque(_) => None,
        })
    }

    /// Number of decoded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    /// True when the store holds no decoded entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    /// Finds the entry matching a queried application.
    ///
    /// With `id` given, only entries recording a decision for that action
    /// qualify. When several entries match, the last-added one wins.
    #[must_use]
    pub fn matching_entry(
        &self,
        document_base: &str,
        code_base: &str,
        archives: &[String],
        id: Option<ActionId>,
    ) -> Option<&AppletActionEntry> {
        self.entries()
            .filter(|entry| match id {
                Some(id) => entry.matches_action(document_base, code_base, archives, id),
                None => entry.matches(document_base, code_base, archives),
            })
            .last()
    }

    /// Appends an entry and writes through.
    ///
    /// # Errors
    ///
    /// Fails on a read-only tier or when the write-through fails; the
    /// in-memory state keeps the new entry either way, so the next save
    /// retries it.
    pub fn add(&mut self, entry: AppletActionEntry) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner.lines.push(Line::Entry(entry));
        self.save()
    }

    /// Applies `mutate` to the matching entry, if any, and writes
    /// through.
    ///
    /// Returns whether an entry matched.
    ///
    /// # Errors
    ///
    /// Fails on a read-only tier or when the write-through fails.
    pub fn update_matching(
        &mut self,
        document_base: &str,
        code_base: &str,
        archives: &[String],
        id: Option<ActionId>,
        mutate: impl FnOnce(&mut AppletActionEntry),
    ) -> Result<bool, StoreError> {
        self.check_writable()?;
        let index = self.inner.lines.iter().rposition(|line| match line {
            Line::Entry(entry) => match id {
                Some(id) => entry.matches_action(document_base, code_base, archives, id),
                None => entry.matches(document_base, code_base, archives),
            },
            Line::Opaque(_) => false,
        });
        let Some(index) = index else {
            return Ok(false);
        };
        if let Line::Entry(entry) = &mut self.inner.lines[index] {
            mutate(entry);
        }
        self.save()?;
        Ok(true)
    }

    /// Removes the first entry equal to `entry` and writes through.
    ///
    /// Returns whether an entry was removed.
    ///
    /// # Errors
    ///
    /// Fails on a read-only tier or when the write-through fails.
    pub fn remove(&mut self, entry: &AppletActionEntry) -> Result<bool, StoreError> {
        self.check_writable()?;
        let index = self.inner.lines.iter().position(|line| match line {
            Line::Entry(existing) => existing == entry,
            Line::Opaque(_) => false,
        });
        let Some(index) = index else {
            return Ok(false);
        };
        self.inner.lines.remove(index);
        self.save()?;
        Ok(true)
    }

    /// Iterates the opaque (foreign/undecodable) lines, verbatim.
    pub fn opaque_lines(&self) -> impl Iterator<Item = &str> {
        self.inner.lines.iter().filter_map(|line| match line {
            Line::Opaque(raw) => Some(raw.as_str()),
            Line::Entry(_) => None,
        })
    }

    /// Drops all opaque lines and writes through. Returns how many were
    /// dropped.
    ///
    /// # Errors
    ///
    /// Fails on a read-only tier or when the write-through fails.
    pub fn clear_opaque_lines(&mut self) -> Result<usize, StoreError> {
        self.check_writable()?;
        let before = self.inner.lines.len();
        self.inner
            .lines
            .retain(|line| matches!(line, Line::Entry(_)));
        let dropped = before - self.inner.lines.len();
        if dropped > 0 {
            self.save()?;
        }
        Ok(dropped)
    }

    /// Persists the current contents atomically.
    ///
    /// Writes to a temp file in the target directory, syncs, then renames
    /// over the backing file, so a crash never leaves a torn settings
    /// file behind.
    ///
    /// # Errors
    ///
    /// Fails on a read-only tier or on any I/O failure.
    pub fn save(&self) -> Result<(), StoreError> {
        self.check_writable()?;
        let path = &self.store.path;
        let io_error = |reason: std::io::Error| StoreError::Io {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(io_error)?;

        let temp = tempfile::NamedTempFile::new_in(parent).map_err(io_error)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o600))
                .map_err(io_error)?;
        }

        let mut file = temp.as_file();
        for line in &self.inner.lines {
            let rendered = match line {
                Line::Entry(entry) => entry.to_line(),
                Line::Opaque(raw) => raw.clone(),
            };
            file.write_all(rendered.as_bytes()).map_err(io_error)?;
            file.write_all(b"\n").map_err(io_error)?;
        }
        file.sync_all().map_err(io_error)?;

        temp.persist(path).map_err(|err| StoreError::Persist {
            path: path.display().to_string(),
            reason: err.error.to_string(),
        })?;
        debug!(path = %path.display(), "persisted action storage");
        Ok(())
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.store.writable {
            Ok(())
        } else {
            Err(StoreError::ReadOnly {
                path: self.store.path.display().to_string(),
            })
        }
    }
}
