// Version identity model for editor releases
//
// A `VersionIdentity` may be partially specified ("2019", "2019.4", "b", "(0123456789ab)").
// Partial values are used as filters against a catalog of full versions, which is why
// matching is asymmetric and comparison skips components that are unset on either side.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Length of the content hash published alongside each release
pub const CONTENT_HASH_LENGTH: usize = 12;

/// Release stage of a version, ordered by stability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    Undefined,
    Alpha,
    Beta,
    Patch,
    Final,
}

impl ReleaseType {
    /// Stability rank, alpha < beta < patch < final. Undefined has no rank.
    pub fn rank(self) -> i32 {
        match self {
            ReleaseType::Undefined => -1,
            ReleaseType::Alpha => 1,
            ReleaseType::Beta => 2,
            ReleaseType::Patch => 3,
            ReleaseType::Final => 4,
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_lowercase() {
            'a' => Some(ReleaseType::Alpha),
            'b' => Some(ReleaseType::Beta),
            'p' => Some(ReleaseType::Patch),
            'f' => Some(ReleaseType::Final),
            _ => None,
        }
    }

    pub fn letter(self) -> Option<char> {
        match self {
            ReleaseType::Undefined => None,
            ReleaseType::Alpha => Some('a'),
            ReleaseType::Beta => Some('b'),
            ReleaseType::Patch => Some('p'),
            ReleaseType::Final => Some('f'),
        }
    }

    /// Parse a release type by name ("final", "beta") or letter ("f", "b")
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "alpha" => Some(ReleaseType::Alpha),
            "beta" => Some(ReleaseType::Beta),
            "patch" => Some(ReleaseType::Patch),
            "final" | "release" => Some(ReleaseType::Final),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Self::from_letter(c),
                    _ => None,
                }
            }
        }
    }

    pub fn is_defined(self) -> bool {
        self != ReleaseType::Undefined
    }
}

impl fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReleaseType::Undefined => "undefined",
            ReleaseType::Alpha => "alpha",
            ReleaseType::Beta => "beta",
            ReleaseType::Patch => "patch",
            ReleaseType::Final => "final",
        };
        f.write_str(name)
    }
}

/// A possibly partial editor version, e.g. `2019.4.31f1 (bd5abf232a62)`.
///
/// Numeric components use `-1` for "unset". A component can only be set when every
/// more significant component is set: minor requires major, patch requires minor and
/// build requires patch.
///
/// `PartialEq`/`Hash` are strict (all numeric components and the type must match, the
/// content hash only when both sides carry one). Ordering is deliberately not `Ord`:
/// [`VersionIdentity::compare`] skips unset components, which is only a total order
/// over full versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionIdentity {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
    pub release_type: ReleaseType,
    pub build: i32,
    pub hash: Option<String>,
}

impl Default for VersionIdentity {
    fn default() -> Self {
        Self {
            major: -1,
            minor: -1,
            patch: -1,
            release_type: ReleaseType::Undefined,
            build: -1,
            hash: None,
        }
    }
}

impl VersionIdentity {
    /// Create a full version without content hash
    pub fn new(major: i32, minor: i32, patch: i32, release_type: ReleaseType, build: i32) -> Self {
        Self {
            major,
            minor,
            patch,
            release_type,
            build,
            hash: None,
        }
        .normalized()
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        let hash = hash.into().to_lowercase();
        self.hash = if is_content_hash(&hash) { Some(hash) } else { None };
        self
    }

    /// Parse a version string. Never fails: returns an invalid value when nothing parses.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return Self::default();
        }

        // Bare content hash. All-digit strings are only a hash if they are no version.
        if is_content_hash(input) && input.chars().any(|c| c.is_ascii_alphabetic()) {
            return Self::default().with_hash(input);
        }

        let (version_part, hash) = match split_trailing_hash(input) {
            Some((rest, hash)) => (rest, Some(hash)),
            None => (input, None),
        };

        let parsed = parse_numeric(version_part);
        match parsed {
            Some(mut version) => {
                if let Some(hash) = hash {
                    version = version.with_hash(hash);
                }
                version.normalized()
            }
            None if hash.is_none() && is_content_hash(input) => Self::default().with_hash(input),
            None => Self::default(),
        }
    }

    /// Clear any component whose more significant predecessor is unset
    fn normalized(mut self) -> Self {
        if self.major < 0 {
            self.major = -1;
            self.minor = -1;
        }
        if self.minor < 0 {
            self.minor = -1;
            self.patch = -1;
        }
        if self.patch < 0 {
            self.patch = -1;
            self.build = -1;
        }
        if self.build < 0 {
            self.build = -1;
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        self.major >= 0 || self.release_type.is_defined() || self.hash.is_some()
    }

    /// Every numeric component is set and the release type is defined
    pub fn is_full(&self) -> bool {
        self.major >= 0
            && self.minor >= 0
            && self.patch >= 0
            && self.build >= 0
            && self.release_type.is_defined()
    }

    /// Asymmetric partial match, `self` being the (possibly partial) filter.
    ///
    /// Components set on both sides must be equal, except the release type: the filter's
    /// type matches any candidate type that is at least as stable.
    pub fn fuzzy_matches(&self, other: &VersionIdentity) -> bool {
        let numeric = [
            (self.major, other.major),
            (self.minor, other.minor),
            (self.patch, other.patch),
            (self.build, other.build),
        ];
        for (mine, theirs) in numeric {
            if mine >= 0 && theirs >= 0 && mine != theirs {
                return false;
            }
        }

        if self.release_type.is_defined()
            && other.release_type.is_defined()
            && self.release_type.rank() > other.release_type.rank()
        {
            return false;
        }

        match (&self.hash, &other.hash) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => true,
        }
    }

    /// Lexicographic comparison over major, minor, patch, type rank, build and hash,
    /// skipping every component that is unset on either side.
    pub fn compare(&self, other: &VersionIdentity) -> Ordering {
        let numeric = [
            (self.major, other.major),
            (self.minor, other.minor),
            (self.patch, other.patch),
        ];
        for (mine, theirs) in numeric {
            if mine >= 0 && theirs >= 0 {
                match mine.cmp(&theirs) {
                    Ordering::Equal => {}
                    ordering => return ordering,
                }
            }
        }

        if self.release_type.is_defined() && other.release_type.is_defined() {
            match self.release_type.rank().cmp(&other.release_type.rank()) {
                Ordering::Equal => {}
                ordering => return ordering,
            }
        }

        if self.build >= 0 && other.build >= 0 {
            match self.build.cmp(&other.build) {
                Ordering::Equal => {}
                ordering => return ordering,
            }
        }

        match (&self.hash, &other.hash) {
            (Some(mine), Some(theirs)) => mine.cmp(theirs),
            _ => Ordering::Equal,
        }
    }

    /// `major.minor` label used to group listings
    pub fn major_minor(&self) -> String {
        if self.minor >= 0 {
            format!("{}.{}", self.major, self.minor)
        } else if self.major >= 0 {
            self.major.to_string()
        } else {
            "unknown".to_string()
        }
    }

    /// Version text without the content hash, e.g. `2019.4.31f1`
    pub fn short(&self) -> String {
        if self.hash.is_none() {
            return self.to_string();
        }
        let mut plain = self.clone();
        plain.hash = None;
        let text = plain.to_string();
        if text.is_empty() { self.to_string() } else { text }
    }
}

impl PartialEq for VersionIdentity {
    fn eq(&self, other: &Self) -> bool {
        if self.major != other.major
            || self.minor != other.minor
            || self.patch != other.patch
            || self.release_type != other.release_type
            || self.build != other.build
        {
            return false;
        }
        match (&self.hash, &other.hash) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => true,
        }
    }
}

impl Eq for VersionIdentity {}

impl Hash for VersionIdentity {
    // The content hash is excluded: equality ignores it when one side lacks it.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.release_type.hash(state);
        self.build.hash(state);
    }
}

impl fmt::Display for VersionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote_version = false;
        if self.major >= 0 {
            write!(f, "{}", self.major)?;
            if self.minor >= 0 {
                write!(f, ".{}", self.minor)?;
                if self.patch >= 0 {
                    write!(f, ".{}", self.patch)?;
                }
            }
            wrote_version = true;
        }
        if let Some(letter) = self.release_type.letter() {
            write!(f, "{}", letter)?;
            if self.build >= 0 {
                write!(f, "{}", self.build)?;
            }
            wrote_version = true;
        }
        if let Some(hash) = &self.hash {
            if wrote_version {
                write!(f, " ({})", hash)?;
            } else {
                f.write_str(hash)?;
            }
        }
        Ok(())
    }
}

impl From<VersionIdentity> for String {
    fn from(version: VersionIdentity) -> Self {
        version.to_string()
    }
}

impl TryFrom<String> for VersionIdentity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let version = VersionIdentity::parse(&value);
        if version.is_valid() {
            Ok(version)
        } else {
            Err(format!("invalid version '{}'", value))
        }
    }
}

impl std::str::FromStr for VersionIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionIdentity::try_from(s.to_string())
    }
}

fn is_content_hash(value: &str) -> bool {
    value.len() == CONTENT_HASH_LENGTH
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c.to_ascii_lowercase()))
}

/// Split `"<version> (<hash>)"` into its parts
fn split_trailing_hash(input: &str) -> Option<(&str, &str)> {
    let stripped = input.strip_suffix(')')?;
    let open = stripped.rfind('(')?;
    let hash = stripped[open + 1..].trim();
    if !is_content_hash(hash) {
        return None;
    }
    Some((stripped[..open].trim_end(), hash))
}

/// Parse `major[.minor[.patch]][type[build]]`, where every part is optional
fn parse_numeric(input: &str) -> Option<VersionIdentity> {
    let mut version = VersionIdentity::default();
    if input.is_empty() {
        return Some(version);
    }

    let bytes = input.as_bytes();
    let mut pos = 0;

    let read_number = |pos: &mut usize| -> Option<Option<i32>> {
        let start = *pos;
        while *pos < bytes.len() && bytes[*pos].is_ascii_digit() {
            *pos += 1;
        }
        if start == *pos {
            return Some(None);
        }
        input[start..*pos].parse::<i32>().ok().map(Some)
    };

    if let Some(major) = read_number(&mut pos)? {
        version.major = major;
        if pos < bytes.len() && bytes[pos] == b'.' {
            pos += 1;
            version.minor = read_number(&mut pos)??;
            if pos < bytes.len() && bytes[pos] == b'.' {
                pos += 1;
                version.patch = read_number(&mut pos)??;
            }
        }
    }

    if pos < bytes.len() {
        let letter = input[pos..].chars().next()?;
        version.release_type = ReleaseType::from_letter(letter)?;
        pos += letter.len_utf8();
        if let Some(build) = read_number(&mut pos)? {
            version.build = build;
        }
    }

    if pos != bytes.len() {
        return None;
    }

    Some(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(major: i32, minor: i32, patch: i32, t: ReleaseType, build: i32) -> VersionIdentity {
        VersionIdentity::new(major, minor, patch, t, build)
    }

    #[test]
    fn test_parse_full_version() {
        let v = VersionIdentity::parse("2019.4.31f1");
        assert_eq!(v.major, 2019);
        assert_eq!(v.minor, 4);
        assert_eq!(v.patch, 31);
        assert_eq!(v.release_type, ReleaseType::Final);
        assert_eq!(v.build, 1);
        assert!(v.hash.is_none());
        assert!(v.is_full());
    }

    #[test]
    fn test_parse_with_hash() {
        let v = VersionIdentity::parse("2021.3.0b12 (0123456789ab)");
        assert_eq!(v.release_type, ReleaseType::Beta);
        assert_eq!(v.build, 12);
        assert_eq!(v.hash.as_deref(), Some("0123456789ab"));
    }

    #[test]
    fn test_parse_partial_versions() {
        let v = VersionIdentity::parse("2019.4");
        assert_eq!((v.major, v.minor, v.patch), (2019, 4, -1));
        assert_eq!(v.release_type, ReleaseType::Undefined);
        assert!(v.is_valid());
        assert!(!v.is_full());

        let v = VersionIdentity::parse("f");
        assert_eq!(v.major, -1);
        assert_eq!(v.release_type, ReleaseType::Final);
        assert!(v.is_valid());

        let v = VersionIdentity::parse("2021");
        assert_eq!(v.major, 2021);
        assert_eq!(v.minor, -1);
    }

    #[test]
    fn test_parse_bare_hash() {
        let v = VersionIdentity::parse("bd5abf232a62");
        assert_eq!(v.major, -1);
        assert_eq!(v.hash.as_deref(), Some("bd5abf232a62"));
        assert!(v.is_valid());
    }

    #[test]
    fn test_parse_invalid_returns_invalid_value() {
        assert!(!VersionIdentity::parse("").is_valid());
        assert!(!VersionIdentity::parse("not a version").is_valid());
        assert!(!VersionIdentity::parse("2019.x").is_valid());
        assert!(!VersionIdentity::parse("2019.4.1q1").is_valid());
    }

    #[test]
    fn test_build_requires_patch() {
        // "2019f1" names a build without minor/patch, which is dropped
        let v = VersionIdentity::parse("2019f1");
        assert_eq!(v.major, 2019);
        assert_eq!(v.release_type, ReleaseType::Final);
        assert_eq!(v.build, -1);
    }

    #[test]
    fn test_prefix_completeness_for_generated_inputs() {
        let parts = ["", "2019", "2019.", "2019.4", ".4", "2019.4.1", "..1"];
        let suffixes = ["", "f", "f1", "b2", "x", " (0123456789ab)", "(zz)"];
        for part in parts {
            for suffix in suffixes {
                let input = format!("{}{}", part, suffix);
                let v = VersionIdentity::parse(&input);
                assert!(!(v.minor >= 0 && v.major < 0), "input {:?} -> {:?}", input, v);
                assert!(!(v.patch >= 0 && v.minor < 0), "input {:?} -> {:?}", input, v);
                assert!(!(v.build >= 0 && v.patch < 0), "input {:?} -> {:?}", input, v);
            }
        }
    }

    #[test]
    fn test_round_trip_full_versions() {
        let versions = vec![
            full(2019, 4, 31, ReleaseType::Final, 1),
            full(2021, 3, 0, ReleaseType::Beta, 12),
            full(2022, 1, 0, ReleaseType::Alpha, 3),
            full(5, 6, 7, ReleaseType::Patch, 4).with_hash("0123456789ab"),
        ];
        for v in versions {
            let parsed = VersionIdentity::parse(&v.to_string());
            assert_eq!(parsed, v);
            assert_eq!(parsed.hash, v.hash);
        }
    }

    #[test]
    fn test_fuzzy_match_is_asymmetric() {
        let beta_filter = VersionIdentity::parse("2021.3.0b");
        let final_filter = VersionIdentity::parse("2021.3.0f");
        let final_release = full(2021, 3, 0, ReleaseType::Final, 1);
        let beta_release = full(2021, 3, 0, ReleaseType::Beta, 1);

        assert!(beta_filter.fuzzy_matches(&final_release));
        assert!(!final_filter.fuzzy_matches(&beta_release));
        assert!(beta_release.fuzzy_matches(&final_release));
        assert!(!final_release.fuzzy_matches(&beta_release));
    }

    #[test]
    fn test_fuzzy_match_wildcards() {
        let release = full(2019, 4, 31, ReleaseType::Final, 1).with_hash("bd5abf232a62");
        assert!(VersionIdentity::parse("2019").fuzzy_matches(&release));
        assert!(VersionIdentity::parse("2019.4").fuzzy_matches(&release));
        assert!(VersionIdentity::parse("f").fuzzy_matches(&release));
        assert!(VersionIdentity::parse("bd5abf232a62").fuzzy_matches(&release));
        assert!(!VersionIdentity::parse("2020").fuzzy_matches(&release));
        assert!(!VersionIdentity::parse("0123456789ab").fuzzy_matches(&release));
    }

    #[test]
    fn test_compare_orders_full_versions() {
        let mut versions = vec![
            full(2019, 4, 31, ReleaseType::Final, 1),
            full(2021, 3, 0, ReleaseType::Beta, 2),
            full(2021, 3, 0, ReleaseType::Final, 1),
            full(2021, 3, 0, ReleaseType::Beta, 10),
            full(2019, 4, 31, ReleaseType::Patch, 1),
        ];
        versions.sort_by(|a, b| a.compare(b));
        let rendered: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["2019.4.31p1", "2019.4.31f1", "2021.3.0b2", "2021.3.0b10", "2021.3.0f1"]
        );
    }

    #[test]
    fn test_compare_skips_unset_components() {
        let partial = VersionIdentity::parse("2019");
        let release = full(2019, 4, 31, ReleaseType::Final, 1);
        assert_eq!(partial.compare(&release), Ordering::Equal);
        assert_ne!(partial, release);
    }

    #[test]
    fn test_equality_ignores_missing_hash() {
        let with_hash = full(2019, 4, 31, ReleaseType::Final, 1).with_hash("bd5abf232a62");
        let without_hash = full(2019, 4, 31, ReleaseType::Final, 1);
        let other_hash = full(2019, 4, 31, ReleaseType::Final, 1).with_hash("0123456789ab");
        assert_eq!(with_hash, without_hash);
        assert_ne!(with_hash, other_hash);
    }

    #[test]
    fn test_serde_as_string() {
        let v = full(2020, 1, 2, ReleaseType::Final, 3).with_hash("0123456789ab");
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"2020.1.2f3 (0123456789ab)\"");
        let back: VersionIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<VersionIdentity>("\"garbage\"").is_err());
    }

    #[test]
    fn test_short_drops_hash() {
        let v = full(2019, 4, 31, ReleaseType::Final, 1).with_hash("bd5abf232a62");
        assert_eq!(v.short(), "2019.4.31f1");
        assert_eq!(VersionIdentity::parse("bd5abf232a62").short(), "bd5abf232a62");
    }
}
