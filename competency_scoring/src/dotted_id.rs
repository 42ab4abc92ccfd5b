//! Dotted identifiers such as `2.3` (a key function) or `2.3.1` (a question).

use std::cmp::Ordering;
use std::fmt::Display;

use crate::config::EpaId;

fn segments(id: &str) -> Vec<i64> {
    // Anything that is not a number counts as 0, like an empty segment.
    id.split('.')
        .map(|s| s.trim().parse::<i64>().unwrap_or(0))
        .collect()
}

/// Compares two dotted identifiers segment by segment, as integers.
///
/// A missing trailing segment counts as 0, so `"2.3"` sorts before `"2.3.1"` and is equal
/// to `"2.3.0"`.
pub fn compare_dotted(a: &str, b: &str) -> Ordering {
    let pa = segments(a);
    let pb = segments(b);
    for i in 0..pa.len().max(pb.len()) {
        let x = pa.get(i).copied().unwrap_or(0);
        let y = pb.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

/// The EPA a key function or question id belongs to (its first segment).
pub fn epa_of(id: &str) -> Option<EpaId> {
    id.split('.').next()?.trim().parse::<EpaId>().ok()
}

/// A dotted identifier with a total order.
///
/// Identifiers that compare equal as numbers (`2.3` and `2.3.0`) are ordered by their text
/// so that sorting never depends on the input order.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct DottedId(String);

impl DottedId {
    pub fn new(id: &str) -> DottedId {
        DottedId(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Ord for DottedId {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_dotted(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for DottedId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for DottedId {
    fn from(s: &str) -> Self {
        DottedId::new(s)
    }
}

impl Display for DottedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn sort_dotted(ids: &mut [String]) {
    ids.sort_by(|a, b| compare_dotted(a, b).then_with(|| a.cmp(b)));
}
