//! Bead identifiers. The prefix part of an id selects routing.

use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// The separator between the prefix and suffix of a bead id
pub const ID_SEPARATOR: char = '-';

/// A validated bead identifier.
///
/// Consists of two parts, a short alphabetic *prefix* and a *suffix*,
/// separated by [`ID_SEPARATOR`]. The prefix is what the routing table
/// resolves into an executor pool.
///
/// # Example
/// ```
/// # use gastown_core::identifier::BeadId;
/// let id = BeadId::new("gt-142a").unwrap();
/// assert_eq!(id.prefix(), "gt");
/// assert!(BeadId::new("142a").is_err());
/// assert!(BeadId::new("gt-").is_err());
/// ```
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BeadId(String);

impl BeadId {
    /// Create a new bead id.
    ///
    /// # Error
    /// Errors if the given value isn't a valid identifier.
    pub fn new<S: AsRef<str>>(val: S) -> Result<Self, InvalidBeadId> {
        let as_str = val.as_ref();
        let (prefix, suffix) = as_str
            .split_once(ID_SEPARATOR)
            .ok_or_else(|| InvalidBeadId::new(as_str))?;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(InvalidBeadId::new(as_str));
        }
        if suffix.is_empty()
            || !suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == ID_SEPARATOR)
        {
            return Err(InvalidBeadId::new(as_str));
        }
        Ok(Self(as_str.to_string()))
    }

    /// The routing prefix of this id
    pub fn prefix(&self) -> &str {
        self.0
            .split_once(ID_SEPARATOR)
            .map(|(prefix, _)| prefix)
            .unwrap_or(&self.0)
    }

    /// The suffix part of this id
    pub fn suffix(&self) -> &str {
        self.0
            .split_once(ID_SEPARATOR)
            .map(|(_, suffix)| suffix)
            .unwrap_or("")
    }

    /// This id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BeadId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for BeadId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

impl FromStr for BeadId {
    type Err = InvalidBeadId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BeadId::new(s)
    }
}

impl TryFrom<String> for BeadId {
    type Error = InvalidBeadId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BeadId::new(value)
    }
}

impl From<BeadId> for String {
    fn from(id: BeadId) -> Self {
        id.0
    }
}

impl AsRef<str> for BeadId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// An error for when an invalid bead id is attempted to be created
#[derive(Debug, thiserror::Error)]
#[error("Invalid bead id: {id:?} (expected <prefix>-<suffix>)")]
pub struct InvalidBeadId {
    id: String,
}

impl InvalidBeadId {
    fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}
