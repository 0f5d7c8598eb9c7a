//! JSON path representation for navigating snapshot structure.
//!
//! Paths are sequences of segments that describe a location in a JSON document.
//! Each segment is either a key (for objects) or an index (for arrays).
//!
//! A path has two textual forms:
//!
//! - the `$`-rooted JSONPath form used when references travel over the wire
//!   (`$.items[0].name`, `$['main/a']`), produced by `Display`;
//! - the RFC 6901 JSON pointer form used inside patch operations
//!   (`/items/0/name`), produced by [`Path::to_pointer`].

use crate::error::{StateError, StateResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A single segment in a JSON path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Seg {
    /// Object key access: `{"key": value}`
    Key(String),
    /// Array index access: `[index]`
    Index(usize),
}

impl Seg {
    /// Create a key segment.
    #[inline]
    pub fn key(k: impl Into<String>) -> Self {
        Seg::Key(k.into())
    }

    /// Create an index segment.
    #[inline]
    pub fn index(i: usize) -> Self {
        Seg::Index(i)
    }

    /// Get the key if this is a key segment.
    #[inline]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Seg::Key(k) => Some(k),
            Seg::Index(_) => None,
        }
    }

    /// Get the index if this is an index segment.
    #[inline]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Seg::Key(_) => None,
            Seg::Index(i) => Some(*i),
        }
    }

    /// The segment as an object key (indices become their decimal form).
    pub fn to_key(&self) -> String {
        match self {
            Seg::Key(k) => k.clone(),
            Seg::Index(i) => i.to_string(),
        }
    }

    /// The segment as an array index, if it can be read as one.
    ///
    /// Key segments holding a canonical decimal number are accepted, matching
    /// JSON pointer semantics where tokens are untyped.
    pub fn to_index(&self) -> Option<usize> {
        match self {
            Seg::Index(i) => Some(*i),
            Seg::Key(k) => parse_index_token(k),
        }
    }

    fn pointer_token(&self) -> String {
        match self {
            Seg::Key(k) => k.replace('~', "~0").replace('/', "~1"),
            Seg::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) if is_identifier(k) => write!(f, ".{}", k),
            Seg::Key(k) => write!(f, "['{}']", k.replace('\\', "\\\\").replace('\'', "\\'")),
            Seg::Index(i) => write!(f, "[{}]", i),
        }
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Key(s)
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::Key(s.to_owned())
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// A complete path into a JSON structure.
///
/// # Examples
///
/// ```
/// use meshsync_state::Path;
///
/// let path = Path::root().key("users").index(0).key("name");
/// assert_eq!(path.len(), 3);
/// assert_eq!(path.to_string(), "$.users[0].name");
/// assert_eq!(path.to_pointer(), "/users/0/name");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(Vec<Seg>);

impl Path {
    /// Create an empty path (root).
    #[inline]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Create a path from a vector of segments.
    #[inline]
    pub fn from_segments(segments: Vec<Seg>) -> Self {
        Self(segments)
    }

    /// Append a key segment and return self (builder pattern).
    #[inline]
    pub fn key(mut self, k: impl Into<String>) -> Self {
        self.0.push(Seg::Key(k.into()));
        self
    }

    /// Append an index segment and return self (builder pattern).
    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(Seg::Index(i));
        self
    }

    /// Push a segment onto the path (mutating).
    #[inline]
    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    /// Push a key segment onto the path (mutating).
    #[inline]
    pub fn push_key(&mut self, k: impl Into<String>) {
        self.0.push(Seg::Key(k.into()));
    }

    /// Push an index segment onto the path (mutating).
    #[inline]
    pub fn push_index(&mut self, i: usize) {
        self.0.push(Seg::Index(i));
    }

    /// Pop the last segment from the path.
    #[inline]
    pub fn pop(&mut self) -> Option<Seg> {
        self.0.pop()
    }

    /// Get the segments of this path.
    #[inline]
    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    /// Check if this path is empty (root).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of segments in this path.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get the last segment.
    #[inline]
    pub fn last(&self) -> Option<&Seg> {
        self.0.last()
    }

    /// Join this path with another path.
    #[inline]
    pub fn join(&self, other: &Path) -> Path {
        let mut result = self.clone();
        result.0.extend(other.0.iter().cloned());
        result
    }

    /// Append a segment and return a new path (non-mutating builder).
    #[inline]
    pub fn with_segment(&self, seg: Seg) -> Path {
        let mut result = self.clone();
        result.0.push(seg);
        result
    }

    /// Check if this path is a prefix of another path.
    ///
    /// A path is a prefix of itself.
    #[inline]
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Get the parent path (path without the last segment).
    #[inline]
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            let mut p = self.clone();
            p.pop();
            Some(p)
        }
    }

    /// Iterate over the segments.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Seg> {
        self.0.iter()
    }

    /// Render this path as an RFC 6901 JSON pointer (`""` for the root).
    pub fn to_pointer(&self) -> String {
        let mut out = String::new();
        for seg in &self.0 {
            out.push('/');
            out.push_str(&seg.pointer_token());
        }
        out
    }

    /// Parse an RFC 6901 JSON pointer.
    ///
    /// Canonical decimal tokens become [`Seg::Index`]; everything else,
    /// including the append marker `-`, becomes [`Seg::Key`].
    pub fn parse_pointer(input: &str) -> StateResult<Path> {
        if input.is_empty() {
            return Ok(Path::root());
        }
        let rest = input
            .strip_prefix('/')
            .ok_or_else(|| StateError::invalid_path(input, "pointer must start with '/'"))?;
        if rest.is_empty() {
            // "/" addresses the empty key in RFC 6901, but callers use it as root.
            return Ok(Path::root());
        }
        rest.split('/')
            .map(|token| {
                let unescaped = unescape_pointer_token(token)
                    .ok_or_else(|| StateError::invalid_path(input, "invalid '~' escape"))?;
                Ok(match parse_index_token(&unescaped) {
                    Some(i) => Seg::Index(i),
                    None => Seg::Key(unescaped),
                })
            })
            .collect()
    }

    /// Parse the `$`-rooted JSONPath form produced by `Display`.
    pub fn parse_json_path(input: &str) -> StateResult<Path> {
        let mut chars = input
            .strip_prefix('$')
            .ok_or_else(|| StateError::invalid_path(input, "path must start with '$'"))?
            .chars()
            .peekable();
        let mut path = Path::root();

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    let mut key = String::new();
                    while let Some(&next) = chars.peek() {
                        if next == '.' || next == '[' {
                            break;
                        }
                        key.push(next);
                        chars.next();
                    }
                    if key.is_empty() {
                        return Err(StateError::invalid_path(input, "empty key after '.'"));
                    }
                    path.push(Seg::Key(key));
                }
                '[' => match chars.peek().copied() {
                    Some(quote @ ('\'' | '"')) => {
                        chars.next();
                        let mut key = String::new();
                        loop {
                            match chars.next() {
                                Some('\\') => match chars.next() {
                                    Some(escaped) => key.push(escaped),
                                    None => {
                                        return Err(StateError::invalid_path(
                                            input,
                                            "dangling escape",
                                        ))
                                    }
                                },
                                Some(ch) if ch == quote => break,
                                Some(ch) => key.push(ch),
                                None => {
                                    return Err(StateError::invalid_path(
                                        input,
                                        "unterminated quoted key",
                                    ))
                                }
                            }
                        }
                        if chars.next() != Some(']') {
                            return Err(StateError::invalid_path(input, "expected ']'"));
                        }
                        path.push(Seg::Key(key));
                    }
                    _ => {
                        let mut digits = String::new();
                        let mut closed = false;
                        for ch in chars.by_ref() {
                            if ch == ']' {
                                closed = true;
                                break;
                            }
                            digits.push(ch);
                        }
                        if !closed {
                            return Err(StateError::invalid_path(input, "expected ']'"));
                        }
                        let index = digits.parse::<usize>().map_err(|_| {
                            StateError::invalid_path(input, format!("invalid index '{digits}'"))
                        })?;
                        path.push(Seg::Index(index));
                    }
                },
                other => {
                    return Err(StateError::invalid_path(
                        input,
                        format!("unexpected character '{other}'"),
                    ))
                }
            }
        }

        Ok(path)
    }

    /// Parse either textual form.
    ///
    /// `$…` is read as JSONPath, `/…` and `""` as a JSON pointer.
    pub fn parse(input: &str) -> StateResult<Path> {
        if input.starts_with('$') {
            Self::parse_json_path(input)
        } else {
            Self::parse_pointer(input)
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.0 {
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Path {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_pointer())
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Path::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl FromIterator<Seg> for Path {
    fn from_iter<I: IntoIterator<Item = Seg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Seg;
    type IntoIter = std::slice::Iter<'a, Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Seg;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_index_token(token: &str) -> Option<usize> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    token.parse().ok()
}

fn unescape_pointer_token(token: &str) -> Option<String> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Construct a `Path` from a sequence of segments.
///
/// # Examples
///
/// ```
/// use meshsync_state::path;
///
/// // String literals become Key segments, numbers become Index segments
/// let p = path!("items", 0, "name");
/// assert_eq!(p.to_pointer(), "/items/0/name");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::path!(@seg $seg));
        )+
        p
    }};
    (@seg $seg:expr) => {
        $crate::Seg::from($seg)
    };
}
