use std::collections::HashSet;

pub const EXACT_MATCH_SCORE: u32 = 10_000;
pub const CONTAINS_MATCH_BASE_SCORE: u32 = 7_000;
pub const TOKEN_MATCH_SCORE_MULTIPLIER: f64 = 5_000.0;

/// Scores how well `candidate` matches `expected`, both already flattened.
///
/// Tiers, highest first: equality, containment (base plus the shorter length),
/// Jaccard overlap of space-separated tokens. Zero means no plausible match.
pub fn score_match(candidate: &str, expected: &str) -> u32 {
    if candidate.is_empty() || expected.is_empty() {
        return 0;
    }
    if candidate == expected {
        return EXACT_MATCH_SCORE;
    }
    if candidate.contains(expected) || expected.contains(candidate) {
        let shorter = candidate.chars().count().min(expected.chars().count());
        let bonus = u32::try_from(shorter).unwrap_or(u32::MAX);
        return CONTAINS_MATCH_BASE_SCORE
            .saturating_add(bonus)
            .min(EXACT_MATCH_SCORE - 1);
    }

    let candidate_tokens: HashSet<&str> = candidate.split(' ').filter(|t| !t.is_empty()).collect();
    let expected_tokens: HashSet<&str> = expected.split(' ').filter(|t| !t.is_empty()).collect();
    if candidate_tokens.is_empty() || expected_tokens.is_empty() {
        return 0;
    }

    let shared = candidate_tokens.intersection(&expected_tokens).count();
    let union = candidate_tokens.len() + expected_tokens.len() - shared;
    if union == 0 {
        return 0;
    }
    let jaccard = shared as f64 / union as f64;
    (jaccard * TOKEN_MATCH_SCORE_MULTIPLIER).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_inputs_score_zero() {
        assert_eq!(score_match("", "a"), 0);
        assert_eq!(score_match("a", ""), 0);
        assert_eq!(score_match("", ""), 0);
    }

    #[test]
    fn exact_match_scores_maximum() {
        assert_eq!(score_match("Walk dog", "Walk dog"), EXACT_MATCH_SCORE);
    }

    #[test]
    fn containment_adds_shorter_length() {
        assert_eq!(score_match("Walk dog twice", "Walk dog"), 7_008);
        assert_eq!(score_match("dog", "Walk dog"), 7_003);
    }

    #[test]
    fn containment_never_reaches_exact_tier() {
        let long = "word ".repeat(2_000);
        let longer = format!("{long}tail");
        let score = score_match(&longer, long.trim_end());
        assert!(score < EXACT_MATCH_SCORE);
        assert!(score >= CONTAINS_MATCH_BASE_SCORE);
    }

    #[test]
    fn token_overlap_uses_jaccard() {
        // {buy, oat, milk} vs {buy, milk, today}: 2 shared of 4.
        assert_eq!(score_match("buy oat milk", "buy milk today"), 2_500);
        assert_eq!(score_match("alpha beta", "gamma delta"), 0);
    }

    #[test]
    fn tiers_are_ordered() {
        let exact = score_match("pay rent now", "pay rent now");
        let contains = score_match("pay rent now please", "pay rent now");
        let overlap = score_match("pay the rent now", "pay rent today now");
        assert!(exact > contains);
        assert!(contains > overlap);
        assert!(overlap > 0);
        assert!(overlap <= TOKEN_MATCH_SCORE_MULTIPLIER as u32);
    }
}
