//! Tolerant version-tag comparison.
//!
//! Release tags arrive in mixed shapes (`v2.3.0`, `2.3`, `1.2.0-beta+5`);
//! comparison only cares about the numeric components, so pre-release and
//! build metadata carry no ordering weight here.

use std::cmp::Ordering;

/// Extract the ordered numeric components of a version tag.
///
/// Strips one leading `v`/`V`, splits on `.`, `+` and `-`, and keeps only
/// the segments that parse as integers. Anything unparseable degrades to an
/// empty sequence, which compares as all-zero.
#[must_use]
pub fn normalize(raw: &str) -> Vec<u64> {
    let trimmed = raw.trim();
    let cleaned = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
    cleaned
        .split(['.', '+', '-'])
        .filter_map(|segment| segment.parse::<u64>().ok())
        .collect()
}

/// Compare two tags component-wise over at least three positions, reading
/// missing positions as 0.
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    let left = normalize(a);
    let right = normalize(b);
    let len = left.len().max(right.len()).max(3);
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
    Ordering::Equal
}

/// `true` only when `candidate` is strictly newer than `current`.
#[must_use]
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}
