use crate::edit::{apply_live, write_cycled, DocumentStore, EditError, LineBuffer, Snapshot};
use crate::resolve::resolve_task_line;
use crate::task::{MarkerCycle, TaskLine};
use std::time::{Duration, Instant};
use tracing::debug;

pub const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Preview,
    Source,
}

impl ViewMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Source => "source",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Preview => Self::Source,
            Self::Source => Self::Preview,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickTarget {
    pub element: usize,
    pub hint: Option<usize>,
    pub preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Cycled { index: usize, line: String },
    Skipped(Skip),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    NoMatch,
    NotTask,
}

/// Parses a line hint the way `parseInt` reads a decimal attribute:
/// surrounding whitespace and trailing garbage are ignored, negatives rejected.
pub fn parse_line_hint(raw: &str) -> Option<usize> {
    let trimmed = raw.trim_start();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits: &str = {
        let end = trimmed
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(idx, _)| idx)
            .unwrap_or(trimmed.len());
        &trimmed[..end]
    };
    digits.parse().ok()
}

pub fn truncate_preview(text: &str, max_chars: usize) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().count() <= max_chars {
        return Some(text.to_string());
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    Some(out)
}

#[derive(Debug, Clone)]
pub struct ClickDebounce {
    window: Duration,
    last: Option<(usize, Instant)>,
}

impl ClickDebounce {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn should_handle(&mut self, element: usize, now: Instant) -> bool {
        if let Some((last_element, at)) = self.last {
            if last_element == element && now.saturating_duration_since(at) < self.window {
                debug!(element, "duplicate click suppressed");
                return false;
            }
        }
        self.last = Some((element, now));
        true
    }
}

pub fn handle_preview_click<D: DocumentStore + ?Sized>(
    store: &D,
    target: &ClickTarget,
    cycle: &MarkerCycle,
) -> Result<Outcome, EditError> {
    let mut snapshot = Snapshot::from_text(&store.read_whole()?);
    let expected = target.preview.as_deref().unwrap_or_default();
    let Some(found) = resolve_task_line(&snapshot.lines, target.hint, expected) else {
        debug!(hint = ?target.hint, "no task matched click");
        return Ok(Outcome::Skipped(Skip::NoMatch));
    };
    match write_cycled(store, &mut snapshot, found.index, cycle)? {
        Some(line) => Ok(Outcome::Cycled {
            index: found.index,
            line,
        }),
        None => Ok(Outcome::Skipped(Skip::NotTask)),
    }
}

pub fn handle_source_click<B: LineBuffer + ?Sized>(
    buffer: &mut B,
    position: Option<Position>,
    cycle: &MarkerCycle,
) -> Outcome {
    let Some(pos) = position else {
        return Outcome::Skipped(Skip::NoMatch);
    };
    if pos.line >= buffer.line_count() {
        return Outcome::Skipped(Skip::NoMatch);
    }
    if !hits_checkbox(buffer, pos) {
        return Outcome::Skipped(Skip::NotTask);
    }
    cycle_at(buffer, pos.line, cycle)
}

pub fn hits_checkbox<B: LineBuffer + ?Sized>(buffer: &B, pos: Position) -> bool {
    let Some(text) = buffer.line_text(pos.line) else {
        return false;
    };
    TaskLine::parse(&text).is_some_and(|task| {
        let (start, end) = task.bracket_columns();
        (start..end).contains(&pos.column)
    })
}

pub fn cycle_at<B: LineBuffer + ?Sized>(buffer: &mut B, line: usize, cycle: &MarkerCycle) -> Outcome {
    match apply_live(buffer, line, cycle) {
        Some(updated) => Outcome::Cycled {
            index: line,
            line: updated,
        },
        None => Outcome::Skipped(Skip::NotTask),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::tests::MemoryStore;

    #[test]
    fn parse_line_hint_behaves_like_parse_int() {
        assert_eq!(parse_line_hint("12"), Some(12));
        assert_eq!(parse_line_hint("  7px"), Some(7));
        assert_eq!(parse_line_hint("-3"), None);
        assert_eq!(parse_line_hint("abc"), None);
        assert_eq!(parse_line_hint(""), None);
    }

    #[test]
    fn preview_is_trimmed_and_capped() {
        assert_eq!(truncate_preview("  Walk dog \n", 300).as_deref(), Some("Walk dog"));
        assert_eq!(truncate_preview("   ", 300), None);
        let long = "a".repeat(400);
        let cut = truncate_preview(&long, 300).unwrap();
        assert_eq!(cut.chars().count(), 300);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn debounce_ignores_quick_repeat_on_same_element() {
        let mut debounce = ClickDebounce::new(Duration::from_millis(250));
        let t0 = Instant::now();
        assert!(debounce.should_handle(1, t0));
        assert!(!debounce.should_handle(1, t0 + Duration::from_millis(100)));
        assert!(debounce.should_handle(2, t0 + Duration::from_millis(120)));
        assert!(debounce.should_handle(2, t0 + Duration::from_millis(400)));
    }

    #[test]
    fn preview_click_cycles_second_task() {
        let store = MemoryStore::with_text("- [ ] Buy milk\n- [ ] Walk dog");
        let target = ClickTarget {
            element: 1,
            hint: Some(1),
            preview: Some("Walk dog".to_string()),
        };
        let outcome = handle_preview_click(&store, &target, &MarkerCycle::default()).unwrap();
        assert_eq!(
            outcome,
            Outcome::Cycled {
                index: 1,
                line: "- [*] Walk dog".to_string()
            }
        );
        assert_eq!(*store.text.borrow(), "- [ ] Buy milk\n- [*] Walk dog");
    }

    #[test]
    fn preview_click_without_match_writes_nothing() {
        let store = MemoryStore::with_text("- [ ] Buy milk\nnotes");
        let target = ClickTarget {
            element: 0,
            hint: Some(1),
            preview: Some("Feed cat".to_string()),
        };
        let outcome = handle_preview_click(&store, &target, &MarkerCycle::default()).unwrap();
        assert_eq!(outcome, Outcome::Skipped(Skip::NoMatch));
        assert_eq!(*store.writes.borrow(), 0);
    }

    #[test]
    fn preview_click_surfaces_write_failure() {
        let store = MemoryStore {
            fail_write: true,
            ..MemoryStore::with_text("- [ ] Buy milk")
        };
        let target = ClickTarget {
            element: 0,
            hint: Some(0),
            preview: Some("Buy milk".to_string()),
        };
        assert!(handle_preview_click(&store, &target, &MarkerCycle::default()).is_err());
        assert_eq!(*store.text.borrow(), "- [ ] Buy milk");
    }

    #[test]
    fn preview_click_with_stale_hint_and_crlf() {
        let mut text = String::from("- [ ] Old chore\r\n");
        for i in 0..3_000 {
            text.push_str(&format!("line {i}\r\n"));
        }
        text.push_str("> - [x] Quoted **task**");
        let store = MemoryStore::with_text(&text);
        let target = ClickTarget {
            element: 3,
            hint: Some(0),
            preview: Some("Quoted task".to_string()),
        };
        let outcome = handle_preview_click(&store, &target, &MarkerCycle::default()).unwrap();
        assert!(matches!(outcome, Outcome::Cycled { index: 3_001, .. }));
        assert!(store.text.borrow().ends_with("line 2999\r\n> - [-] Quoted **task**"));
    }

    #[test]
    fn source_click_requires_bracket_hit() {
        let mut lines = vec!["  - [ ] Buy milk".to_string(), "plain".to_string()];
        let cycle = MarkerCycle::default();
        let miss = handle_source_click(&mut lines, Some(Position { line: 0, column: 10 }), &cycle);
        assert_eq!(miss, Outcome::Skipped(Skip::NotTask));
        let hit = handle_source_click(&mut lines, Some(Position { line: 0, column: 5 }), &cycle);
        assert_eq!(
            hit,
            Outcome::Cycled {
                index: 0,
                line: "  - [*] Buy milk".to_string()
            }
        );
        assert!(!hits_checkbox(&lines, Position { line: 0, column: 1 }));
        assert!(hits_checkbox(&lines, Position { line: 0, column: 4 }));
        assert!(!hits_checkbox(&lines, Position { line: 5, column: 4 }));
        let plain = handle_source_click(&mut lines, Some(Position { line: 1, column: 0 }), &cycle);
        assert_eq!(plain, Outcome::Skipped(Skip::NotTask));
        assert_eq!(
            handle_source_click(&mut lines, None, &cycle),
            Outcome::Skipped(Skip::NoMatch)
        );
    }
}
