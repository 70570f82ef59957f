//! Rollback policy: deciding whether a failed unit of work is rolled back.
//!
//! Errors are compared by [`ErrorKind`], a dotted path such as
//! `storage.row_not_found`. A policy entry matches its own kind and every kind
//! nested below it, so listing `storage` covers all storage failures.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Hierarchical error kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorKind(Cow<'static, str>);

impl ErrorKind {
    pub const fn from_static(kind: &'static str) -> Self {
        Self(Cow::Borrowed(kind))
    }

    pub fn new(kind: impl Into<String>) -> Self {
        Self(Cow::Owned(kind.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The enclosing kind, `None` at the root.
    pub fn parent(&self) -> Option<ErrorKind> {
        self.0
            .rsplit_once('.')
            .map(|(parent, _)| ErrorKind::new(parent))
    }

    /// `true` when `self` is `ancestor` or nested below it.
    pub fn is_within(&self, ancestor: &ErrorKind) -> bool {
        match self.0.strip_prefix(ancestor.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ErrorKind {
    fn from(kind: &'static str) -> Self {
        Self::from_static(kind)
    }
}

/// Errors that can take part in rollback decisions.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Allow and deny lists of error kinds.
///
/// `no_rollback_on` always wins. With an empty `rollback_on` every other
/// error rolls back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackDirective {
    #[serde(default)]
    rollback_on: Vec<ErrorKind>,
    #[serde(default)]
    no_rollback_on: Vec<ErrorKind>,
}

impl RollbackDirective {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rollback_on(mut self, kind: impl Into<ErrorKind>) -> Self {
        self.rollback_on.push(kind.into());
        self
    }

    pub fn no_rollback_on(mut self, kind: impl Into<ErrorKind>) -> Self {
        self.no_rollback_on.push(kind.into());
        self
    }

    pub fn rollback_kinds(&self) -> &[ErrorKind] {
        &self.rollback_on
    }

    pub fn no_rollback_kinds(&self) -> &[ErrorKind] {
        &self.no_rollback_on
    }

    pub fn should_rollback(&self, kind: &ErrorKind) -> bool {
        if self.no_rollback_on.iter().any(|k| kind.is_within(k)) {
            return false;
        }
        if self.rollback_on.is_empty() {
            return true;
        }
        self.rollback_on.iter().any(|k| kind.is_within(k))
    }
}
