//! Edit distances used by fuzzy matching.

use std::cmp::min;

/// Edit distance allowed by `"fuzziness": "AUTO"` for a term of `len` characters.
pub fn auto_fuzziness(len: usize) -> usize {
    match len {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Optimal string alignment distance (insertions, deletions, substitutions
/// and adjacent transpositions), or `None` once it must exceed `threshold`.
#[allow(clippy::needless_range_loop)]
pub fn edit_distance_within(s1: &str, s2: &str, threshold: usize) -> Option<usize> {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let (len1, len2) = (a.len(), b.len());

    if len1.abs_diff(len2) > threshold {
        return None;
    }
    if len1 == 0 || len2 == 0 {
        return Some(len1.max(len2));
    }

    // Three rows: two back for transpositions.
    let mut before_prev = vec![0; len2 + 1];
    let mut prev: Vec<usize> = (0..=len2).collect();
    let mut curr = vec![0; len2 + 1];

    for i in 1..=len1 {
        curr[0] = i;
        let mut min_in_row = i;

        for j in 1..=len2 {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = min(min(prev[j] + 1, curr[j - 1] + 1), prev[j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = min(best, before_prev[j - 2] + 1);
            }
            curr[j] = best;
            min_in_row = min(min_in_row, best);
        }

        if min_in_row > threshold {
            return None;
        }

        std::mem::swap(&mut before_prev, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }

    let distance = prev[len2];
    (distance <= threshold).then_some(distance)
}

/// Whether `candidate` is within the AUTO edit distance of `term`.
pub fn fuzzy_matches(term: &str, candidate: &str) -> bool {
    let allowed = auto_fuzziness(term.chars().count());
    edit_distance_within(term, candidate, allowed).is_some()
}
