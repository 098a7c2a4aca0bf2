//! Fuzzy answer matching used to pre-sort answers during grading.

use crate::types::{AnswerBucket, Categorization};

/// Minimum similarity for an answer to be auto-placed into a bucket
pub const MATCH_THRESHOLD: f64 = 0.6;

const LEET_FOLDS: &[(char, char)] = &[
    ('0', 'o'),
    ('1', 'i'),
    ('3', 'e'),
    ('4', 'a'),
    ('5', 's'),
    ('7', 't'),
    ('8', 'b'),
    ('9', 'g'),
];

const DIGRAPH_FOLDS: &[(&str, &str)] = &[("ph", "f"), ("ck", "k"), ("th", "t"), ("qu", "kw")];

/// Lowercase and keep only alphanumerics (drops punctuation and all whitespace)
pub fn normalize_for_match(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn fold(s: &str) -> String {
    let mut folded: String = s
        .chars()
        .map(|c| {
            LEET_FOLDS
                .iter()
                .find(|(digit, _)| *digit == c)
                .map(|(_, letter)| *letter)
                .unwrap_or(c)
        })
        .collect();
    for (from, to) in DIGRAPH_FOLDS {
        folded = folded.replace(from, to);
    }
    folded
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Similarity in `[0, 1]`; symmetric, and 1.0 for strings equal after normalization
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize_for_match(a);
    let b = normalize_for_match(b);
    if a == b {
        return 1.0;
    }

    let a = fold(&a);
    let b = fold(&b);
    if a == b {
        return 0.95;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (shorter, longer) = if a.len() < b.len() { (&a, &b) } else { (&b, &a) };

    if shorter.is_empty() || longer.windows(shorter.len()).any(|w| w == shorter.as_slice()) {
        return shorter.len() as f64 / longer.len() as f64 * 0.9;
    }

    let distance = levenshtein(&a, &b);
    (1.0 - distance as f64 / longer.len() as f64).max(0.0)
}

/// Index and score of the best target clearing the threshold; ties keep the earliest
pub fn best_match<S: AsRef<str>>(candidate: &str, targets: &[S]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, target) in targets.iter().enumerate() {
        let score = similarity(candidate, target.as_ref());
        if score < MATCH_THRESHOLD {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best
}

/// Bucket id used for the accepted answer at `index`
pub fn accepted_bucket_id(index: usize) -> String {
    format!("accepted-{}", index)
}

/// Pre-place each distinct raw answer into its best accepted-answer bucket
///
/// One bucket is created per accepted answer (even when empty) so the host can
/// drag remaining answers into it. Answers that clear no threshold stay
/// uncategorized.
pub fn auto_categorize<S: AsRef<str>>(answers: &[S], accepted: &[String]) -> Categorization {
    let mut buckets: Vec<AnswerBucket> = accepted
        .iter()
        .enumerate()
        .map(|(i, label)| AnswerBucket {
            id: accepted_bucket_id(i),
            label: label.clone(),
            answers: Vec::new(),
        })
        .collect();
    let mut uncategorized = Vec::new();

    for answer in answers {
        let answer = answer.as_ref();
        match best_match(answer, accepted) {
            Some((index, _)) => buckets[index].answers.push(answer.to_string()),
            None => uncategorized.push(answer.to_string()),
        }
    }

    Categorization {
        buckets,
        wrong: Vec::new(),
        uncategorized,
    }
}
