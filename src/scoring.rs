//! Answer aggregation and rarity scoring.
//!
//! A group of `k` members out of `n` submissions earns `ceil(n / k)` points per
//! member. Members of the wrong bucket always earn 0.

use crate::error::{SessionError, SessionResult};
use crate::types::{AnswerCategory, AnswerGroup, Categorization, ParticipantId, Submission};
use std::collections::HashMap;

/// Grouping key for raw answers: trimmed and case-folded
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

pub fn points_for(total: usize, group_size: usize) -> u32 {
    if group_size == 0 {
        return 0;
    }
    total.div_ceil(group_size) as u32
}

fn push_member(group: &mut AnswerGroup, submission: &Submission) {
    group.players.push(submission.name.clone());
    group.participant_ids.push(submission.participant_id.clone());
    group.count += 1;
}

fn new_group(answer: String, bucket_id: Option<String>, category: AnswerCategory) -> AnswerGroup {
    AnswerGroup {
        answer,
        bucket_id,
        category,
        players: Vec::new(),
        participant_ids: Vec::new(),
        count: 0,
        points: 0,
    }
}

/// Display order: points descending, insertion order among equals
fn sort_for_display(groups: &mut [AnswerGroup]) {
    groups.sort_by(|a, b| b.points.cmp(&a.points));
}

/// Group by normalized text and score each group
pub fn score_ungraded(submissions: &[Submission]) -> Vec<AnswerGroup> {
    let total = submissions.len();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<AnswerGroup> = Vec::new();

    for submission in submissions {
        let key = normalize(&submission.text);
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(new_group(
                submission.text.trim().to_string(),
                None,
                AnswerCategory::Ungraded,
            ));
            groups.len() - 1
        });
        push_member(&mut groups[slot], submission);
    }

    for group in &mut groups {
        group.points = points_for(total, group.count);
    }
    sort_for_display(&mut groups);
    groups
}

enum Placement {
    Bucket(usize),
    Wrong,
}

/// Score against a host-approved categorization
///
/// Every distinct submitted answer must be placed in a bucket or the wrong
/// list. An answer listed in several buckets belongs to the first one.
pub fn score_graded(
    submissions: &[Submission],
    categorization: &Categorization,
) -> SessionResult<Vec<AnswerGroup>> {
    let mut placements: HashMap<String, Placement> = HashMap::new();
    for (i, bucket) in categorization.buckets.iter().enumerate() {
        for answer in &bucket.answers {
            placements
                .entry(normalize(answer))
                .or_insert(Placement::Bucket(i));
        }
    }
    for answer in &categorization.wrong {
        placements
            .entry(normalize(answer))
            .or_insert(Placement::Wrong);
    }

    let missing: std::collections::HashSet<String> = submissions
        .iter()
        .map(|s| normalize(&s.text))
        .filter(|key| !placements.contains_key(key))
        .collect();
    if !missing.is_empty() {
        return Err(SessionError::IncompleteCategorization {
            missing: missing.len(),
        });
    }

    let total = submissions.len();
    let mut bucket_groups: Vec<Option<AnswerGroup>> =
        vec![None; categorization.buckets.len()];
    let mut wrong_group: Option<AnswerGroup> = None;

    for submission in submissions {
        let group = match placements.get(&normalize(&submission.text)) {
            Some(Placement::Bucket(i)) => bucket_groups[*i].get_or_insert_with(|| {
                let bucket = &categorization.buckets[*i];
                new_group(
                    bucket.label.clone(),
                    Some(bucket.id.clone()),
                    AnswerCategory::Accepted,
                )
            }),
            Some(Placement::Wrong) => wrong_group.get_or_insert_with(|| {
                new_group("Wrong".to_string(), None, AnswerCategory::Wrong)
            }),
            None => continue,
        };
        push_member(group, submission);
    }

    let mut groups: Vec<AnswerGroup> = bucket_groups.into_iter().flatten().collect();
    for group in &mut groups {
        group.points = points_for(total, group.count);
    }
    groups.extend(wrong_group);
    sort_for_display(&mut groups);
    Ok(groups)
}

/// Flatten groups into the points each participant earned
pub fn points_by_participant(groups: &[AnswerGroup]) -> HashMap<ParticipantId, u32> {
    groups
        .iter()
        .flat_map(|g| g.participant_ids.iter().map(move |id| (id.clone(), g.points)))
        .collect()
}
