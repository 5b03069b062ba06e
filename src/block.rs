use crate::task::is_task_line;
use regex::Regex;
use std::sync::LazyLock;

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:>\s*)*[-*+]\s+").unwrap());
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,6}\s+").unwrap());

fn indent_width(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Joins the task at `start` with its continuation lines, space separated.
///
/// Stops before an empty line, a list item indented no deeper than the task,
/// or a heading. Non-task lines come back unchanged.
pub fn assemble_block<S: AsRef<str>>(lines: &[S], start: usize) -> String {
    let Some(base) = lines.get(start).map(|l| l.as_ref()) else {
        return String::new();
    };
    if !is_task_line(base) {
        return base.to_string();
    }

    let base_indent = indent_width(base);
    let mut parts = vec![base];
    for line in lines[start + 1..].iter().map(|l| l.as_ref()) {
        if line.is_empty() {
            break;
        }
        if indent_width(line) <= base_indent && LIST_ITEM_RE.is_match(line) {
            break;
        }
        if HEADING_RE.is_match(line) {
            break;
        }
        parts.push(line);
    }
    parts.join(" ")
}
