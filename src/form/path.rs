//! Dot-separated addresses into a [`FieldTree`](super::FieldTree).

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::controller::{FormError, FormResult};

/// Path of a node relative to the tree root, e.g. `address.city`.
///
/// The root path has no segments and is never produced by [`FieldPath::parse`];
/// it only exists as the starting point for building child paths.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub const SEPARATOR: char = '.';

    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn parse(input: &str) -> FormResult<Self> {
        if input.is_empty() {
            return Err(FormError::InvalidPath(input.to_string()));
        }
        let segments = input
            .split(Self::SEPARATOR)
            .map(str::to_string)
            .collect::<Vec<_>>();
        if segments.iter().any(String::is_empty) {
            return Err(FormError::InvalidPath(input.to_string()));
        }
        Ok(Self(segments))
    }

    /// Returns a new path one level deeper. `self` is left untouched, so sibling
    /// walks can each extend the same parent.
    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(key.into());
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, parent) = self.0.split_last()?;
        Some(Self(parent.to_vec()))
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        f.write_str(&self.0.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = FormError;

    fn from_str(input: &str) -> FormResult<Self> {
        Self::parse(input)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.join("."))
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Anything the store accepts where a path is expected.
pub trait IntoFieldPath {
    fn into_field_path(self) -> FormResult<FieldPath>;
}

impl IntoFieldPath for FieldPath {
    fn into_field_path(self) -> FormResult<FieldPath> {
        Ok(self)
    }
}

impl IntoFieldPath for &FieldPath {
    fn into_field_path(self) -> FormResult<FieldPath> {
        Ok(self.clone())
    }
}

impl IntoFieldPath for &str {
    fn into_field_path(self) -> FormResult<FieldPath> {
        FieldPath::parse(self)
    }
}

impl IntoFieldPath for String {
    fn into_field_path(self) -> FormResult<FieldPath> {
        FieldPath::parse(&self)
    }
}

impl IntoFieldPath for &String {
    fn into_field_path(self) -> FormResult<FieldPath> {
        FieldPath::parse(self)
    }
}
