//! Name matching for path segments.

/// Wildcard character accepted in the leaf segment of a path.
pub const WILDCARD: char = '*';

/// Matches remote object names against a single path segment.
///
/// A glob segment is split on `*` into literal pieces. A name matches when it
/// starts with the first piece, ends with the last one and contains the
/// pieces in between, in order, without overlap. Every other character is
/// compared literally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    Exact(String),
    Glob(Vec<String>),
}

impl NamePattern {
    /// Build a pattern for `segment`. Wildcards are only honoured when
    /// `allow_glob` is set and the segment actually contains one.
    pub fn new(segment: &str, allow_glob: bool) -> Self {
        if allow_glob && segment.contains(WILDCARD) {
            NamePattern::Glob(segment.split(WILDCARD).map(str::to_string).collect())
        } else {
            NamePattern::Exact(segment.to_string())
        }
    }

    /// The literal name to filter by server-side, if any.
    pub fn exact_name(&self) -> Option<&str> {
        match self {
            NamePattern::Exact(name) => Some(name),
            NamePattern::Glob(_) => None,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Exact(expected) => expected == name,
            NamePattern::Glob(pieces) => glob_matches(pieces, name),
        }
    }
}

fn glob_matches(pieces: &[String], name: &str) -> bool {
    // A glob always has at least two pieces: the text before and after the first `*`.
    let (first, rest) = match pieces.split_first() {
        Some(split) => split,
        None => return name.is_empty(),
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return name == first,
    };

    if name.len() < first.len() + last.len() {
        return false;
    }
    if !name.starts_with(first.as_str()) || !name.ends_with(last.as_str()) {
        return false;
    }

    let mut remaining = &name[first.len()..name.len() - last.len()];
    for piece in middle {
        match remaining.find(piece.as_str()) {
            Some(pos) => remaining = &remaining[pos + piece.len()..],
            None => return false,
        }
    }
    true
}
