use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

pub const DEFAULT_MARKERS: [&str; 6] = ["*", "x", "-", "!", ">", " "];

// (prefix up to the bracket)(marker)
static TASK_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*(?:>\s*)*[-*+]\s*)\[([^\]]*)\]").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CycleError {
    #[error("marker sequence is empty")]
    Empty,
    #[error("marker {0:?} appears more than once")]
    Duplicate(String),
    #[error("marker {0:?} must be a single character other than ']'")]
    Invalid(String),
}

/// A list item carrying a bracketed status marker, split so that
/// `prefix + "[" + marker + "]" + body` is the original line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLine<'a> {
    pub prefix: &'a str,
    pub marker: &'a str,
    pub body: &'a str,
}

impl<'a> TaskLine<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let caps = TASK_LINE_RE.captures(line)?;
        let whole = caps.get(0)?;
        let prefix = caps.get(1)?.as_str();
        let marker = caps.get(2)?.as_str();
        Some(Self {
            prefix,
            marker,
            body: &line[whole.end()..],
        })
    }

    pub fn render_with(&self, marker: &str) -> String {
        format!("{}[{}]{}", self.prefix, marker, self.body)
    }

    /// Display columns of the bracketed marker, `[` through `]` inclusive.
    pub fn bracket_columns(&self) -> (usize, usize) {
        let start = self.prefix.chars().count();
        let end = start + self.marker.chars().count() + 2;
        (start, end)
    }
}

pub fn is_task_line(line: &str) -> bool {
    TASK_LINE_RE.is_match(line)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerCycle {
    markers: Vec<String>,
}

impl Default for MarkerCycle {
    fn default() -> Self {
        Self {
            markers: DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl MarkerCycle {
    pub fn new<I, S>(markers: I) -> Result<Self, CycleError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for marker in markers {
            let marker = marker.into();
            if marker.chars().count() != 1 || marker == "]" {
                return Err(CycleError::Invalid(marker));
            }
            if out.contains(&marker) {
                return Err(CycleError::Duplicate(marker));
            }
            out.push(marker);
        }
        if out.is_empty() {
            return Err(CycleError::Empty);
        }
        Ok(Self { markers: out })
    }

    pub fn from_chars(sequence: &str) -> Result<Self, CycleError> {
        Self::new(sequence.chars().map(String::from))
    }

    pub fn next(&self, marker: &str) -> &str {
        let first = &self.markers[0];
        match self.markers.iter().position(|m| m == marker) {
            Some(idx) => &self.markers[(idx + 1) % self.markers.len()],
            None => first,
        }
    }

    pub fn as_sequence(&self) -> String {
        self.markers.concat()
    }
}

pub fn cycle_line(line: &str, cycle: &MarkerCycle) -> Option<String> {
    let task = TaskLine::parse(line)?;
    Some(task.render_with(cycle.next(task.marker)))
}
