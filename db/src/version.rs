//! Natural version comparison (§4.8), used to order the output of
//! `installed_versions` and to pick the "highest available version" during
//! `upgrade`. Recipe versions are not guaranteed to be SemVer, so this splits
//! each string into alternating digit/non-digit runs and compares run by run.

use std::cmp::Ordering;

/// Compares two version strings "naturally": digit runs compare numerically,
/// non-digit runs compare lexicographically, run by run left to right. A
/// version that runs out of runs before the other sorts first (`"1" < "1.0"`).
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = runs(a).into_iter();
    let mut right = runs(b).into_iter();

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = compare_run(&l, &r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_run(a: &str, b: &str) -> Ordering {
    let a_is_digits = a.chars().all(|c| c.is_ascii_digit());
    let b_is_digits = b.chars().all(|c| c.is_ascii_digit());

    match (a_is_digits, b_is_digits) {
        (true, true) => match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(an), Ok(bn)) => an.cmp(&bn),
            _ => a.cmp(b),
        },
        _ => a.cmp(b),
    }
}

fn runs(s: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut current_is_digit: Option<bool> = None;

    for c in s.chars() {
        let is_digit = c.is_ascii_digit();
        match current_is_digit {
            Some(prev) if prev == is_digit => current.push(c),
            _ => {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
                current.push(c);
                current_is_digit = Some(is_digit);
            }
        }
    }
    if !current.is_empty() {
        result.push(current);
    }
    result
}

/// Sorts version strings in place using [`natural_cmp`].
pub fn sort_versions(versions: &mut [String]) {
    versions.sort_by(|a, b| natural_cmp(a, b));
}

/// Returns the greatest of `versions` by [`natural_cmp`], if any.
pub fn max_version(versions: &[String]) -> Option<&String> {
    versions.iter().max_by(|a, b| natural_cmp(a, b))
}
