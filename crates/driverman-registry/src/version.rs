use std::cmp::Ordering;

/// Compares two driver version strings.
///
/// Versions are split into segments on `.`, `-` and `_`. Segments made only of digits compare
/// numerically, other segments compare as strings, and a numeric segment sorts above a
/// non-numeric one. When one version is a prefix of the other, the shorter one is smaller.
///
/// Blank versions sort after every non-blank version, and two blank versions are equal.
///
/// ```
/// use std::cmp::Ordering;
/// use driverman_registry::compare_versions;
///
/// assert_eq!(compare_versions("2.9", "2.45.0"), Ordering::Less);
/// assert_eq!(compare_versions("70.0.3538.67", "70.0.3538.16"), Ordering::Greater);
/// assert_eq!(compare_versions("", "1.0"), Ordering::Greater);
/// ```
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.trim(), b.trim());

    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    let mut left = a.split(['.', '-', '_']);
    let mut right = b.split(['.', '-', '_']);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_segments(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Orders versions newest first, keeping blank versions last.
pub(crate) fn newest_first(a: Option<&str>, b: Option<&str>) -> Ordering {
    let (a, b) = (a.unwrap_or_default(), b.unwrap_or_default());
    match (a.trim().is_empty(), b.trim().is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_versions(b, a),
    }
}

fn compare_segments(x: &str, y: &str) -> Ordering {
    match (is_numeric(x), is_numeric(y)) {
        (true, true) => {
            let x = x.trim_start_matches('0');
            let y = y.trim_start_matches('0');
            x.len().cmp(&y.len()).then_with(|| x.cmp(y))
        }
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => x.cmp(y),
    }
}

fn is_numeric(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}
