//! Version ordering shared by the registry, bookkeeping and compatibility code.
//!
//! Migration versions are plain strings (`"1"`, `"002"`, `"1.10.0"`,
//! `"20240101_1"`). They are ordered "naturally": digit runs compare as
//! numbers, everything else compares lexically, so `"2" < "10"` and
//! `"1.2.0" < "1.10.0"`.

use semver::Version;
use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Number(&'a str),
    Text(&'a str),
}

fn strip_prefix(version: &str) -> &str {
    let trimmed = version.trim();
    match trimmed.strip_prefix(['v', 'V']) {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => trimmed,
    }
}

fn segments(version: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let bytes = version.as_bytes();
    let mut start = 0;

    while start < bytes.len() {
        let c = bytes[start];
        if matches!(c, b'.' | b'-' | b'_' | b'+') {
            start += 1;
            continue;
        }

        let numeric = c.is_ascii_digit();
        let mut end = start;
        while end < bytes.len() {
            let b = bytes[end];
            if matches!(b, b'.' | b'-' | b'_' | b'+') || b.is_ascii_digit() != numeric {
                break;
            }
            end += 1;
        }

        let text = &version[start..end];
        out.push(if numeric {
            Segment::Number(text)
        } else {
            Segment::Text(text)
        });
        start = end;
    }

    out
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Natural ordering of two version strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = segments(strip_prefix(a));
    let right = segments(strip_prefix(b));

    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l, r) {
            (Segment::Number(x), Segment::Number(y)) => compare_numeric(x, y),
            (Segment::Text(x), Segment::Text(y)) => x.cmp(y),
            (Segment::Number(_), Segment::Text(_)) => Ordering::Less,
            (Segment::Text(_), Segment::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    left.len().cmp(&right.len())
}

/// Two versions are the same migration version if they order equal (`"1"` == `"001"`).
pub fn same_version(a: &str, b: &str) -> bool {
    compare_versions(a, b) == Ordering::Equal
}

/// Parses a version as semver, padding short numeric forms.
///
/// `"3"` becomes `3.0.0`, `"1.2"` becomes `1.2.0` and a leading `v` is
/// ignored. Returns `None` for anything that is not numeric-dotted.
pub fn lenient_semver(version: &str) -> Option<Version> {
    let raw = strip_prefix(version);
    if let Ok(parsed) = Version::parse(raw) {
        return Some(parsed);
    }

    let parts: Vec<&str> = raw.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut numbers = [0u64; 3];
    for (idx, part) in parts.iter().enumerate() {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        numbers[idx] = part.parse().ok()?;
    }

    Some(Version::new(numbers[0], numbers[1], numbers[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_segments_compare_as_numbers() {
        assert_eq!(compare_versions("2", "10"), Ordering::Less);
        assert_eq!(compare_versions("1.2.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare_versions("010", "9"), Ordering::Greater);
    }

    #[test]
    fn test_leading_zeros_and_prefix_are_equal() {
        assert!(same_version("1", "001"));
        assert!(same_version("v1.2.0", "1.2.0"));
        assert!(!same_version("1", "1.0"));
    }

    #[test]
    fn test_shorter_prefix_sorts_first() {
        assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_versions("20240101_2", "20240101_10"), Ordering::Less);
    }

    #[test]
    fn test_sorting_is_total() {
        let mut versions = vec!["10", "2", "1.5", "1", "003"];
        versions.sort_by(|a, b| compare_versions(a, b));
        assert_eq!(versions, vec!["1", "1.5", "2", "003", "10"]);
    }

    #[test]
    fn test_lenient_semver() {
        assert_eq!(lenient_semver("3"), Some(Version::new(3, 0, 0)));
        assert_eq!(lenient_semver("v1.2"), Some(Version::new(1, 2, 0)));
        assert_eq!(lenient_semver("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(lenient_semver("2.0.0-rc.1").map(|v| v.pre.is_empty()), Some(false));
        assert_eq!(lenient_semver("20240101_init"), None);
        assert_eq!(lenient_semver(""), None);
    }
}
