// Version ordering used to decide whether a manifest entry is an update

use core::cmp::Ordering;

/// Version of this crate, handy as the `current_version` of firmware built on it
pub const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Strategy for ordering two version strings.
///
/// The matcher only ever asks "is the candidate newer / equal / older than
/// what is running", so any total order over strings will do.
pub trait VersionComparator {
    fn compare(&self, candidate: &str, current: &str) -> Ordering;
}

/// Plain codepoint-wise string ordering.
///
/// This is what deployed manifests rely on: `"9.0.0"` is newer than
/// `"10.0.0"` because `'9' > '1'`. Keep it the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lexicographic;

impl VersionComparator for Lexicographic {
    fn compare(&self, candidate: &str, current: &str) -> Ordering {
        candidate.cmp(current)
    }
}

/// Dotted numeric ordering (`1.10.0 > 1.9.0`).
///
/// Components are compared numerically when both parse as integers and
/// lexicographically otherwise. A leading `v` is ignored and missing
/// trailing components count as zero, so `"1.2"` equals `"1.2.0"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Semantic;

impl VersionComparator for Semantic {
    fn compare(&self, candidate: &str, current: &str) -> Ordering {
        let a = strip_prefix(candidate);
        let b = strip_prefix(current);
        let mut left = a.split('.');
        let mut right = b.split('.');

        loop {
            match (left.next(), right.next()) {
                (None, None) => return Ordering::Equal,
                (l, r) => {
                    let ord = compare_component(l.unwrap_or("0"), r.unwrap_or("0"));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
            }
        }
    }
}

fn strip_prefix(version: &str) -> &str {
    version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version)
}

fn compare_component(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Compare with the default (lexicographic) rule
pub fn compare(candidate: &str, current: &str) -> Ordering {
    Lexicographic.compare(candidate, current)
}
