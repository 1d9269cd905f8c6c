//! Lazy per-file validation.
//!
//! Every file identity in an open dataset is in one of three states:
//!
//! ```text
//! Unknown ──(check passes)──▶ Validated
//!    │
//!    └────(check fails)─────▶ Invalid
//! ```
//!
//! Both target states are terminal for the session: once a file is checked
//! it is never checked again, and an `Invalid` entry never recovers. The
//! check itself (existence plus a structural sniff of the container header)
//! is injectable so callers and tests can substitute or instrument it.

use std::collections::HashSet;
use std::path::Path;

use crate::error::DecodeError;
use crate::index::FileRef;
use crate::tiff::sniff_file;

// =============================================================================
// FileState
// =============================================================================

/// Validation state of one file identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Never checked; assumed accessible
    Unknown,
    /// Existence and structural checks passed
    Validated,
    /// A check failed; terminal for the session
    Invalid,
}

// =============================================================================
// FileCheck
// =============================================================================

/// The existence/structural check run at most once per file identity.
pub trait FileCheck: Send {
    /// Check that the file exists and starts with the expected container
    /// header.
    fn check(&self, path: &Path) -> Result<(), DecodeError>;
}

/// Default check: the file opens and sniffs as a plane file.
#[derive(Debug, Default)]
pub struct TiffFileCheck;

impl FileCheck for TiffFileCheck {
    fn check(&self, path: &Path) -> Result<(), DecodeError> {
        sniff_file(path).map(|_| ())
    }
}

// =============================================================================
// ValidationCache
// =============================================================================

/// Session-scoped cache of per-file validation outcomes.
///
/// Maintains two disjoint sets over file identities. The cache itself holds
/// no locking; the owning engine serializes the check-then-update sequence.
pub struct ValidationCache {
    check: Box<dyn FileCheck>,
    validated: HashSet<FileRef>,
    invalid: HashSet<FileRef>,
}

impl ValidationCache {
    /// Create a cache over the given check component.
    pub fn new(check: Box<dyn FileCheck>) -> Self {
        Self {
            check,
            validated: HashSet::new(),
            invalid: HashSet::new(),
        }
    }

    /// Current state of a file identity. Never performs I/O.
    pub fn state(&self, file: &FileRef) -> FileState {
        if self.invalid.contains(file) {
            FileState::Invalid
        } else if self.validated.contains(file) {
            FileState::Validated
        } else {
            FileState::Unknown
        }
    }

    /// Resolve a file identity to a terminal state, running the underlying
    /// check only if the file is still `Unknown`.
    pub fn resolve(&mut self, file: &FileRef) -> FileState {
        match self.state(file) {
            FileState::Unknown => match self.check.check(Path::new(file.as_str())) {
                Ok(()) => {
                    self.validated.insert(file.clone());
                    FileState::Validated
                }
                Err(err) => {
                    tracing::warn!(file = %file, error = %err, "plane file failed validation");
                    self.invalid.insert(file.clone());
                    FileState::Invalid
                }
            },
            terminal => terminal,
        }
    }

    /// Record an externally observed outcome.
    ///
    /// Used when a decoder open or read fails after the check was skipped
    /// (trust-metadata mode) or passed: the failure is terminal exactly as
    /// if the check itself had failed. `Validated` → `Invalid` is allowed;
    /// `Invalid` → `Validated` is not.
    pub fn record(&mut self, file: &FileRef, valid: bool) {
        if valid {
            if !self.invalid.contains(file) {
                self.validated.insert(file.clone());
            }
        } else {
            self.validated.remove(file);
            self.invalid.insert(file.clone());
        }
    }

    /// Number of files in each terminal state, `(validated, invalid)`.
    pub fn counts(&self) -> (usize, usize) {
        (self.validated.len(), self.invalid.len())
    }

    /// Forget every outcome. Called on close.
    pub fn reset(&mut self) {
        self.validated.clear();
        self.invalid.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
