use crate::block::assemble_block;
use crate::flatten::flatten;
use crate::score::{score_match, CONTAINS_MATCH_BASE_SCORE, EXACT_MATCH_SCORE};
use crate::task::is_task_line;
use std::collections::HashMap;
use tracing::debug;

pub const FALLBACK_FULL_SCAN_MIN_SCORE: u32 = 1_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub before: usize,
    pub after: usize,
}

pub const SEARCH_WINDOWS: [SearchWindow; 3] = [
    SearchWindow { before: 50, after: 150 },
    SearchWindow { before: 200, after: 600 },
    SearchWindow { before: 600, after: 1200 },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMatch {
    pub index: usize,
    pub score: u32,
}

struct Candidates<'a, S> {
    lines: &'a [S],
    expected: &'a str,
    plain: HashMap<usize, String>,
    best: Option<LineMatch>,
}

impl<'a, S: AsRef<str>> Candidates<'a, S> {
    fn new(lines: &'a [S], expected: &'a str) -> Self {
        Self {
            lines,
            expected,
            plain: HashMap::new(),
            best: None,
        }
    }

    fn plain_at(&mut self, idx: usize) -> Option<&str> {
        let lines = self.lines;
        if !is_task_line(lines.get(idx)?.as_ref()) {
            return None;
        }
        let plain = self
            .plain
            .entry(idx)
            .or_insert_with(|| flatten(&assemble_block(lines, idx)));
        Some(plain.as_str())
    }

    fn best_score(&self) -> u32 {
        self.best.map(|m| m.score).unwrap_or(0)
    }

    fn consider(&mut self, idx: usize) {
        let expected = self.expected;
        let Some(plain) = self.plain_at(idx) else {
            return;
        };
        let score = score_match(plain, expected);
        if score > self.best_score() {
            self.best = Some(LineMatch { index: idx, score });
        }
    }
}

fn outward(base: usize, start: usize, end: usize) -> impl Iterator<Item = usize> {
    let reach = base.saturating_sub(start).max(end.saturating_sub(base));
    (0..=reach)
        .flat_map(move |d| {
            let before = base.checked_sub(d);
            let after = (d > 0).then(|| base.saturating_add(d));
            before.into_iter().chain(after)
        })
        .filter(move |idx| (start..end).contains(idx))
}

/// Finds the document line of a clicked task.
///
/// `hint` is the approximate zero-based line from the rendered view and
/// `expected` the rendered text of the task. The hint and its neighbours are
/// tried for an exact match first, then growing windows around them, then the
/// whole document when confidence is still low. Inside a window lines are
/// visited nearest the base first, and ties keep the first candidate seen.
pub fn resolve_task_line<S: AsRef<str>>(
    lines: &[S],
    hint: Option<usize>,
    expected: &str,
) -> Option<LineMatch> {
    let expected = flatten(expected);
    let bases: Vec<usize> = match hint {
        Some(h) => {
            let mut out = vec![h];
            if let Some(prev) = h.checked_sub(1) {
                out.push(prev);
            }
            out.push(h.saturating_add(1));
            out
        }
        None => Vec::new(),
    };

    let mut candidates = Candidates::new(lines, &expected);

    for &idx in &bases {
        if candidates.plain_at(idx) == Some(expected.as_str()) {
            debug!(index = idx, "task resolved next to hint");
            return Some(LineMatch {
                index: idx,
                score: EXACT_MATCH_SCORE,
            });
        }
    }

    let total = lines.len();
    for &base in &bases {
        for window in SEARCH_WINDOWS {
            let start = base.saturating_sub(window.before);
            let end = base.saturating_add(window.after).saturating_add(1).min(total);
            for idx in outward(base, start, end) {
                candidates.consider(idx);
            }
            if candidates.best_score() >= CONTAINS_MATCH_BASE_SCORE {
                debug!(base, ?window, best = ?candidates.best, "task resolved in window");
                return candidates.best;
            }
        }
    }

    if candidates.best_score() < FALLBACK_FULL_SCAN_MIN_SCORE && !expected.is_empty() {
        debug!(best = ?candidates.best, "falling back to full document scan");
        for idx in 0..total {
            candidates.consider(idx);
        }
    }

    debug!(best = ?candidates.best, "task resolution finished");
    candidates.best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::click::truncate_preview;
    use crate::edit::Snapshot;
    use crate::markdown::{render_markdown, PreviewStyles};

    fn doc(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    fn filler(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("note line {i}")).collect()
    }

    #[test]
    fn exact_hint_returns_that_line() {
        let lines = doc(&["# Tasks", "- [ ] Buy milk", "- [ ] Walk dog"]);
        let found = resolve_task_line(&lines, Some(2), "Walk dog").unwrap();
        assert_eq!(found, LineMatch { index: 2, score: EXACT_MATCH_SCORE });
    }

    #[test]
    fn off_by_one_hint_is_tolerated() {
        let lines = doc(&["# Tasks", "- [ ] Buy milk", "", "- [ ] Walk dog", "", "tail"]);
        for hint in [2, 4] {
            let found = resolve_task_line(&lines, Some(hint), "Walk dog").unwrap();
            assert_eq!(found.index, 3);
            assert_eq!(found.score, EXACT_MATCH_SCORE);
        }
    }

    #[test]
    fn hint_prefers_itself_over_neighbour_duplicates() {
        let lines = doc(&["- [ ] Same", "- [ ] Same", "- [ ] Same"]);
        let found = resolve_task_line(&lines, Some(1), "Same").unwrap();
        assert_eq!(found.index, 1);
    }

    #[test]
    fn window_search_finds_nearby_task() {
        let mut lines = filler(40);
        lines[30] = "- [x] Renew **passport**".to_string();
        lines[31] = String::new();
        let found = resolve_task_line(&lines, Some(5), "Renew passport").unwrap();
        assert_eq!(found.index, 30);
        assert_eq!(found.score, EXACT_MATCH_SCORE);
    }

    #[test]
    fn stale_hint_falls_back_to_full_scan() {
        let mut lines = filler(5_000);
        lines[4_500] = "- [ ] Unique far away task".to_string();
        lines[10] = "- [ ] Something else entirely".to_string();
        let found = resolve_task_line(&lines, Some(3), "Unique far away task").unwrap();
        assert_eq!(found.index, 4_500);
    }

    #[test]
    fn missing_hint_uses_full_scan() {
        let lines = doc(&["intro", "- [ ] Call [[Mom|mom]]", "- [ ] Call dad"]);
        let found = resolve_task_line(&lines, None, "Call mom").unwrap();
        assert_eq!(found.index, 1);
    }

    #[test]
    fn confident_window_match_skips_full_scan() {
        let mut lines = filler(3_000);
        lines[20] = "- [ ] Water plants on the balcony".to_string();
        lines[2_900] = "- [ ] Water plants".to_string();
        let found = resolve_task_line(&lines, Some(15), "Water plants").unwrap();
        assert_eq!(found.index, 20);
        assert!(found.score >= CONTAINS_MATCH_BASE_SCORE);
    }

    #[test]
    fn continuation_lines_take_part_in_matching() {
        let lines = doc(&["- [ ] Parent", "  continued text", "- [ ] Sibling"]);
        let found = resolve_task_line(&lines, Some(0), "Parent continued text").unwrap();
        assert_eq!(found, LineMatch { index: 0, score: EXACT_MATCH_SCORE });
    }

    #[test]
    fn no_task_match_returns_none() {
        let lines = doc(&["plain", "- [ ] Something"]);
        assert_eq!(resolve_task_line(&lines, Some(0), "unrelated words"), None);
        assert_eq!(resolve_task_line(&lines, None, ""), None);
        let empty: Vec<String> = Vec::new();
        assert_eq!(resolve_task_line(&empty, Some(0), "x"), None);
    }

    #[test]
    fn ties_keep_candidate_nearest_the_hint() {
        let mut lines = filler(20);
        lines[3] = "- [ ] Duplicate item".to_string();
        lines[12] = "- [ ] Duplicate item".to_string();
        let found = resolve_task_line(&lines, Some(8), "Duplicate item").unwrap();
        assert_eq!(found.index, 12);

        lines[3] = "note".to_string();
        lines[4] = "- [ ] Duplicate item".to_string();
        let found = resolve_task_line(&lines, Some(8), "Duplicate item").unwrap();
        assert_eq!(found.index, 4);
    }

    #[test]
    fn outward_order_alternates_around_base() {
        assert_eq!(outward(5, 3, 9).collect::<Vec<_>>(), vec![5, 4, 6, 3, 7, 8]);
        assert_eq!(outward(10, 0, 3).collect::<Vec<_>>(), vec![2, 1, 0]);
        assert_eq!(outward(0, 0, 0).count(), 0);
    }

    #[test]
    fn hint_past_end_still_searches_window() {
        let lines = doc(&["- [ ] First", "- [ ] Second"]);
        let found = resolve_task_line(&lines, Some(40), "Second").unwrap();
        assert_eq!(found.index, 1);
    }

    fn rendered_click(source: &str, nth: usize) -> (Option<usize>, String) {
        let doc = render_markdown(source, PreviewStyles::default(), 4, None);
        let item = doc
            .lines
            .iter()
            .filter_map(|line| line.checkbox.as_ref())
            .nth(nth)
            .unwrap()
            .item;
        let preview = truncate_preview(&doc.item_text(item), 300).unwrap_or_default();
        (doc.source_hint(item), preview)
    }

    fn resolve_rendered(source: &str, nth: usize) -> Option<LineMatch> {
        let lines = Snapshot::from_text(source).lines;
        let (hint, preview) = rendered_click(source, nth);
        resolve_task_line(&lines, hint, &preview)
    }

    #[test]
    fn rendered_parent_and_child_resolve_to_their_own_lines() {
        let source = "- [ ] Parent\n  - [ ] Child\n- [ ] Parent sibling\n";
        let parent = resolve_rendered(source, 0).unwrap();
        assert_eq!(parent.index, 0);
        let child = resolve_rendered(source, 1).unwrap();
        assert_eq!(child, LineMatch { index: 1, score: EXACT_MATCH_SCORE });
        assert_eq!(resolve_rendered(source, 2).unwrap().index, 2);
    }

    #[test]
    fn rendered_deeply_nested_tasks_resolve_to_their_own_lines() {
        let source = "- [x] Trip\n  - [ ] Book **flight**\n    - [!] Check [visa](https://example.com)\n  - [ ] Pack\n";
        for (nth, expected) in [(0, 0), (1, 1), (2, 2), (3, 3)] {
            assert_eq!(resolve_rendered(source, nth).unwrap().index, expected);
        }
    }

    #[test]
    fn rendered_quoted_task_with_lazy_continuation() {
        let source = "intro\n\n> - [ ] Quoted task\nlazy continuation\n\n- [ ] Quoted\n";
        let (hint, preview) = rendered_click(source, 0);
        assert_eq!(hint, Some(2));
        assert_eq!(preview, "Quoted task lazy continuation");
        let found = resolve_rendered(source, 0).unwrap();
        assert_eq!(found, LineMatch { index: 2, score: EXACT_MATCH_SCORE });
        assert_eq!(resolve_rendered(source, 1).unwrap().index, 5);
    }

    #[test]
    fn rendered_ordered_checkbox_offers_no_click_target() {
        let source = "1. [ ] Alpha\n\n- [ ] Alpha beta\n";
        let (hint, preview) = rendered_click(source, 0);
        assert_eq!(hint, Some(2));
        assert_eq!(preview, "Alpha beta");
        assert_eq!(resolve_rendered(source, 0).unwrap().index, 2);
    }
}
