use regex::Regex;
use std::sync::LazyLock;

static TASK_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:>\s*)*[-*+]\s*\[[^\]]*\]\s*").unwrap());
static WIKI_LINK_ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]|]+)\|([^\]]+)\]\]").unwrap());
static WIKI_LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").unwrap());
static MD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static INLINE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
static BOLD_ASTERISKS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static BOLD_UNDERSCORES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__([^_]+)__").unwrap());
static ITALIC_ASTERISKS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static ITALIC_UNDERSCORES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_([^_]+)_").unwrap());
static RESIDUE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[>*#]").unwrap());

pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reduces a task line, a task block or rendered task text to comparable plain text.
///
/// Rules run in order; each one sees the output of the previous:
/// task prefix, aliased wiki links, wiki links, inline links, code spans,
/// bold, italics, leftover `>`/`*`/`#`, whitespace.
pub fn flatten(text: &str) -> String {
    let mut out = TASK_PREFIX_RE.replace(text, "").into_owned();
    out = WIKI_LINK_ALIAS_RE.replace_all(&out, "${2}").into_owned();
    out = WIKI_LINK_RE.replace_all(&out, "${1}").into_owned();
    out = MD_LINK_RE.replace_all(&out, "${1}").into_owned();
    out = INLINE_CODE_RE.replace_all(&out, "${1}").into_owned();
    out = BOLD_ASTERISKS_RE.replace_all(&out, "${1}").into_owned();
    out = BOLD_UNDERSCORES_RE.replace_all(&out, "${1}").into_owned();
    out = ITALIC_ASTERISKS_RE.replace_all(&out, "${1}").into_owned();
    out = ITALIC_UNDERSCORES_RE.replace_all(&out, "${1}").into_owned();
    out = RESIDUE_RE.replace_all(&out, " ").into_owned();
    normalize(&out)
}
