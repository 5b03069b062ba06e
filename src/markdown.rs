use crate::task::TaskLine;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use std::borrow::Cow;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

#[derive(Debug, Clone, Copy)]
pub struct PreviewStyles {
    pub base: Style,
    pub heading: Style,
    pub prefix: Style,
    pub inline_code: Style,
    pub code_block: Style,
    pub rule: Style,
    pub checkbox: Style,
    pub link: Style,
}

impl Default for PreviewStyles {
    fn default() -> Self {
        Self {
            base: Style::default(),
            heading: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            prefix: Style::default().fg(Color::DarkGray),
            inline_code: Style::default().fg(Color::Yellow),
            code_block: Style::default().fg(Color::Gray),
            rule: Style::default().fg(Color::DarkGray),
            checkbox: Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
            link: Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::UNDERLINED),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkbox {
    pub start: usize,
    pub end: usize,
    pub marker: String,
    pub item: usize,
}

#[derive(Debug, Clone)]
pub struct RenderedLine {
    pub line: Line<'static>,
    pub plain: String,
    /// Byte offset in `plain` where the item text starts (after prefix and checkbox).
    pub text_start: usize,
    pub checkbox: Option<Checkbox>,
    pub items: Vec<usize>,
    pub continues: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RenderedDocument {
    pub lines: Vec<RenderedLine>,
    item_sources: Vec<usize>,
}

impl RenderedDocument {
    pub fn checkbox_at(&self, row: usize, column: usize) -> Option<&Checkbox> {
        self.lines
            .get(row)?
            .checkbox
            .as_ref()
            .filter(|cb| column >= cb.start && column < cb.end)
    }

    pub fn source_hint(&self, item: usize) -> Option<usize> {
        self.item_sources.get(item).copied()
    }

    /// Rendered text of an item without its checkbox. Nested items are left out.
    pub fn item_text(&self, item: usize) -> String {
        let mut out = String::new();
        let mut first = true;
        for row in self.lines.iter().filter(|row| row.items.last() == Some(&item)) {
            if !first && !row.continues {
                out.push('\n');
            }
            first = false;
            out.push_str(row.plain.get(row.text_start..).unwrap_or_default());
        }
        out
    }
}

#[derive(Clone, Copy)]
enum ListKind {
    Bullet,
    Ordered { next: u64 },
}

#[derive(Default)]
struct LineBuilder {
    spans: Vec<Span<'static>>,
    plain: String,
    text_start: usize,
    checkbox: Option<Checkbox>,
    started: bool,
}

impl LineBuilder {
    fn width(&self) -> usize {
        self.plain.width()
    }

    fn push(&mut self, text: &str, style: Style) {
        if text.is_empty() {
            return;
        }
        self.plain.push_str(text);
        if let Some(last) = self.spans.last_mut() {
            if last.style == style {
                last.content.to_mut().push_str(text);
                return;
            }
        }
        self.spans.push(Span::styled(text.to_string(), style));
    }
}

struct Renderer<'a> {
    source_lines: Vec<&'a str>,
    line_starts: Vec<usize>,
    styles: PreviewStyles,
    tab_width: usize,
    out: Vec<RenderedLine>,
    line: LineBuilder,
    quote_level: usize,
    list_stack: Vec<ListKind>,
    item_stack: Vec<usize>,
    item_sources: Vec<usize>,
    pending_bullet: Option<String>,
    pending_task: Option<String>,
    skip_literal: Vec<char>,
    skip_space: bool,
    heading: bool,
    code_block: bool,
    strong: usize,
    emphasis: usize,
    strike: usize,
    link: usize,
}

impl<'a> Renderer<'a> {
    fn new(input: &'a str, styles: PreviewStyles, tab_width: usize) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(input.match_indices('\n').map(|(idx, _)| idx + 1));
        Self {
            source_lines: input.split('\n').collect(),
            line_starts,
            styles,
            tab_width,
            out: Vec::new(),
            line: LineBuilder::default(),
            quote_level: 0,
            list_stack: Vec::new(),
            item_stack: Vec::new(),
            item_sources: Vec::new(),
            pending_bullet: None,
            pending_task: None,
            skip_literal: Vec::new(),
            skip_space: false,
            heading: false,
            code_block: false,
            strong: 0,
            emphasis: 0,
            strike: 0,
            link: 0,
        }
    }

    fn source_line(&self, offset: usize) -> usize {
        self.line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }

    fn prefix(&mut self) -> String {
        let mut prefix = "│ ".repeat(self.quote_level);
        let depth = self.list_stack.len();
        if depth > 0 {
            prefix.push_str(&"  ".repeat(depth - 1));
            match self.pending_bullet.take() {
                Some(bullet) => prefix.push_str(&bullet),
                None => prefix.push_str("  "),
            }
        }
        prefix
    }

    fn ensure_prefix(&mut self) {
        if self.line.started {
            return;
        }
        self.line.started = true;
        let prefix = self.prefix();
        self.line.push(&prefix, self.styles.prefix);
        self.line.text_start = self.line.plain.len();
    }

    fn inline_style(&self) -> Style {
        let mut style = if self.heading {
            self.styles.heading
        } else if self.link > 0 {
            self.styles.link
        } else {
            self.styles.base
        };
        if self.strong > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.emphasis > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if self.strike > 0 {
            style = style.add_modifier(Modifier::CROSSED_OUT);
        }
        style
    }

    fn flush(&mut self) {
        if !self.line.started {
            return;
        }
        let line = std::mem::take(&mut self.line);
        self.out.push(RenderedLine {
            line: Line::from(line.spans),
            plain: line.plain,
            text_start: line.text_start,
            checkbox: line.checkbox,
            items: self.item_stack.clone(),
            continues: false,
        });
    }

    fn blank(&mut self) {
        self.flush();
        if self.out.last().is_none_or(|l| l.plain.trim().is_empty()) {
            return;
        }
        self.out.push(RenderedLine {
            line: Line::default(),
            plain: String::new(),
            text_start: 0,
            checkbox: None,
            items: Vec::new(),
            continues: false,
        });
    }

    fn push_glyph(&mut self, marker: &str) -> (usize, usize) {
        self.ensure_prefix();
        let glyph = format!("[{marker}]");
        let start = self.line.width();
        let end = start + glyph.width();
        self.line.push(&glyph, self.styles.checkbox);
        self.line.push(" ", self.styles.base);
        self.line.text_start = self.line.plain.len();
        (start, end)
    }

    fn push_checkbox(&mut self, marker: String) {
        let (start, end) = self.push_glyph(&marker);
        if let Some(&item) = self.item_stack.last() {
            self.line.checkbox = Some(Checkbox {
                start,
                end,
                marker,
                item,
            });
        }
    }

    fn strip_literal_marker<'t>(&mut self, mut text: &'t str) -> &'t str {
        while let Some(&expected) = self.skip_literal.first() {
            match text.chars().next() {
                Some(ch) if ch == expected => {
                    text = &text[ch.len_utf8()..];
                    self.skip_literal.remove(0);
                    if self.skip_literal.is_empty() {
                        self.skip_space = true;
                    }
                }
                Some(_) => {
                    self.skip_literal.clear();
                    break;
                }
                None => return text,
            }
        }
        if self.skip_space && !text.is_empty() {
            self.skip_space = false;
            text = text.strip_prefix(' ').unwrap_or(text);
        }
        text
    }

    fn text(&mut self, text: &str) {
        if self.code_block {
            self.code_text(text);
            return;
        }
        if let Some(marker) = self.pending_task.take() {
            self.skip_literal = format!("[{marker}]").chars().collect();
            self.push_checkbox(marker);
        }
        let text = self.strip_literal_marker(text);
        if text.is_empty() {
            return;
        }
        self.ensure_prefix();
        let expanded = expand_tabs(text, self.tab_width);
        let style = self.inline_style();
        self.line.push(&expanded, style);
    }

    fn code_text(&mut self, text: &str) {
        for (idx, part) in text.split('\n').enumerate() {
            if idx > 0 {
                self.flush();
            }
            if part.is_empty() && idx > 0 {
                continue;
            }
            self.ensure_prefix();
            let expanded = expand_tabs(part, self.tab_width);
            self.line.push("  ", self.styles.prefix);
            self.line.push(&expanded, self.styles.code_block);
        }
    }

    fn start(&mut self, tag: Tag<'_>, offset: usize) {
        match tag {
            Tag::Heading { .. } => {
                self.blank();
                self.heading = true;
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.code_block = true;
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote_level += 1;
            }
            Tag::List(start) => {
                self.flush();
                self.list_stack.push(match start {
                    Some(next) => ListKind::Ordered { next },
                    None => ListKind::Bullet,
                });
            }
            Tag::Item => {
                self.flush();
                let id = self.item_sources.len();
                let line = self.source_line(offset);
                self.item_sources.push(line);
                self.item_stack.push(id);
                self.pending_bullet = Some(self.next_bullet());
                self.pending_task = self
                    .source_lines
                    .get(line)
                    .and_then(|l| TaskLine::parse(l))
                    .map(|task| task.marker.to_string());
                self.skip_literal.clear();
                self.skip_space = false;
            }
            Tag::Emphasis => self.emphasis += 1,
            Tag::Strong => self.strong += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link { .. } => self.link += 1,
            Tag::TableRow | Tag::TableHead => self.flush(),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if self.item_stack.is_empty() {
                    self.blank();
                } else {
                    self.flush();
                }
            }
            TagEnd::Heading(_) => {
                self.flush();
                self.heading = false;
                self.blank();
            }
            TagEnd::CodeBlock => {
                self.flush();
                self.code_block = false;
                self.blank();
            }
            TagEnd::BlockQuote => {
                self.flush();
                self.quote_level = self.quote_level.saturating_sub(1);
                if self.quote_level == 0 {
                    self.blank();
                }
            }
            TagEnd::List(_) => {
                self.flush();
                self.list_stack.pop();
                if self.list_stack.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => {
                self.flush();
                self.item_stack.pop();
                self.pending_task = None;
                self.pending_bullet = None;
            }
            TagEnd::Emphasis => self.emphasis = self.emphasis.saturating_sub(1),
            TagEnd::Strong => self.strong = self.strong.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link => self.link = self.link.saturating_sub(1),
            TagEnd::TableCell => {
                self.ensure_prefix();
                self.line.push(" │ ", self.styles.prefix);
            }
            TagEnd::TableRow | TagEnd::TableHead => self.flush(),
            TagEnd::Table => self.blank(),
            _ => {}
        }
    }

    fn next_bullet(&mut self) -> String {
        let depth = self.list_stack.len();
        match self.list_stack.last_mut() {
            Some(ListKind::Ordered { next }) => {
                let bullet = format!("{next}. ");
                *next += 1;
                bullet
            }
            Some(ListKind::Bullet) => format!("{} ", bullet_for_depth(depth)),
            None => String::new(),
        }
    }

    fn finish(mut self) -> RenderedDocument {
        self.flush();
        while self.out.last().is_some_and(|l| l.plain.is_empty()) {
            self.out.pop();
        }
        RenderedDocument {
            lines: self.out,
            item_sources: self.item_sources,
        }
    }
}

fn bullet_for_depth(depth: usize) -> &'static str {
    match depth % 3 {
        1 => "•",
        2 => "◦",
        _ => "▪",
    }
}

fn normalize_line_endings(input: &str) -> Cow<'_, str> {
    if input.contains('\r') {
        Cow::Owned(input.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(input)
    }
}

fn expand_tabs(text: &str, tab_width: usize) -> String {
    if !text.contains('\t') {
        return text.to_string();
    }
    text.replace('\t', &" ".repeat(tab_width.max(1)))
}

pub fn render_markdown(
    input: &str,
    styles: PreviewStyles,
    tab_width: usize,
    width: Option<usize>,
) -> RenderedDocument {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let normalized = normalize_line_endings(input);
    let mut renderer = Renderer::new(normalized.as_ref(), styles, tab_width);
    for (event, range) in Parser::new_ext(normalized.as_ref(), options).into_offset_iter() {
        match event {
            Event::Start(tag) => renderer.start(tag, range.start),
            Event::End(tag) => renderer.end(tag),
            Event::Text(text) => renderer.text(&text),
            Event::Code(text) => {
                if let Some(marker) = renderer.pending_task.take() {
                    renderer.push_checkbox(marker);
                }
                renderer.ensure_prefix();
                let style = renderer.styles.inline_code;
                renderer.line.push(&text, style);
            }
            Event::Html(text) | Event::InlineHtml(text) => renderer.text(&text),
            Event::SoftBreak => renderer.text(" "),
            Event::HardBreak => renderer.flush(),
            Event::Rule => {
                renderer.flush();
                renderer.ensure_prefix();
                let style = renderer.styles.rule;
                renderer.line.push(&"─".repeat(40), style);
                renderer.blank();
            }
            // Ordered items have no `[m]` source line to write back to.
            Event::TaskListMarker(checked) => match renderer.pending_task.take() {
                Some(marker) => renderer.push_checkbox(marker),
                None => {
                    renderer.push_glyph(if checked { "x" } else { " " });
                }
            },
            _ => {}
        }
    }

    let mut doc = renderer.finish();
    if let Some(width) = width.filter(|w| *w > 0) {
        doc.lines = doc
            .lines
            .into_iter()
            .flat_map(|line| wrap_line(line, width))
            .collect();
    }
    doc
}

fn wrap_line(line: RenderedLine, width: usize) -> Vec<RenderedLine> {
    if line.plain.width() <= width {
        return vec![line];
    }
    let indent_width = line.plain[..line.text_start].width();
    let indent = if indent_width * 2 < width {
        " ".repeat(indent_width)
    } else {
        String::new()
    };

    let mut rows: Vec<(Vec<Span<'static>>, String)> = vec![(Vec::new(), String::new())];
    let mut row_width = 0usize;
    for span in &line.line.spans {
        for ch in span.content.chars() {
            let ch_width = ch.width().unwrap_or(0);
            if row_width + ch_width > width && row_width > indent.len() {
                rows.push((vec![Span::raw(indent.clone())], indent.clone()));
                row_width = indent.len();
            }
            if let Some((spans, plain)) = rows.last_mut() {
                plain.push(ch);
                match spans.last_mut() {
                    Some(last) if last.style == span.style => last.content.to_mut().push(ch),
                    _ => spans.push(Span::styled(ch.to_string(), span.style)),
                }
            }
            row_width += ch_width;
        }
    }

    let mut out = Vec::with_capacity(rows.len());
    for (idx, (spans, plain)) in rows.into_iter().enumerate() {
        let first = idx == 0;
        out.push(RenderedLine {
            line: Line::from(spans),
            text_start: if first {
                line.text_start.min(plain.len())
            } else {
                indent.len()
            },
            plain,
            checkbox: if first { line.checkbox.clone() } else { None },
            items: line.items.clone(),
            continues: !first,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::click::truncate_preview;

    fn render(input: &str) -> RenderedDocument {
        render_markdown(input, PreviewStyles::default(), 4, None)
    }

    fn checkbox_rows(doc: &RenderedDocument) -> Vec<(usize, Checkbox)> {
        doc.lines
            .iter()
            .enumerate()
            .filter_map(|(idx, l)| l.checkbox.clone().map(|cb| (idx, cb)))
            .collect()
    }

    #[test]
    fn normalize_line_endings_converts_crlf_and_cr() {
        assert!(matches!(normalize_line_endings("a\nb"), Cow::Borrowed(_)));
        assert_eq!(normalize_line_endings("a\r\nb\rc").as_ref(), "a\nb\nc");
    }

    #[test]
    fn standard_task_markers_render_as_checkboxes() {
        let doc = render("- [ ] Buy milk\n- [x] Walk dog\n");
        let boxes = checkbox_rows(&doc);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].1.marker, " ");
        assert_eq!(boxes[1].1.marker, "x");
        assert_eq!(doc.source_hint(boxes[1].1.item), Some(1));
        assert_eq!(doc.item_text(boxes[1].1.item), "Walk dog");
    }

    #[test]
    fn custom_markers_are_lifted_out_of_the_text() {
        let doc = render("# Todo\n\n- [*] Started\n- [!] Urgent **now**\n- [>] Later\n");
        let boxes = checkbox_rows(&doc);
        let markers: Vec<&str> = boxes.iter().map(|(_, cb)| cb.marker.as_str()).collect();
        assert_eq!(markers, vec!["*", "!", ">"]);
        assert_eq!(doc.item_text(boxes[0].1.item), "Started");
        assert_eq!(doc.item_text(boxes[1].1.item), "Urgent now");
        assert_eq!(doc.source_hint(boxes[2].1.item), Some(4));
    }

    #[test]
    fn checkbox_hit_testing_uses_display_columns() {
        let doc = render("- [ ] Buy milk\n");
        let (row, cb) = checkbox_rows(&doc)[0].clone();
        assert_eq!(doc.lines[row].plain, "• [ ] Buy milk");
        assert_eq!((cb.start, cb.end), (2, 5));
        assert!(doc.checkbox_at(row, 2).is_some());
        assert!(doc.checkbox_at(row, 4).is_some());
        assert!(doc.checkbox_at(row, 5).is_none());
        assert!(doc.checkbox_at(row, 0).is_none());
    }

    #[test]
    fn nested_items_stay_out_of_parent_text() {
        let doc = render("- [ ] Parent\n  continued text\n  - [x] Child\n- [ ] Sibling\n");
        let boxes = checkbox_rows(&doc);
        assert_eq!(boxes.len(), 3);
        let parent = boxes[0].1.item;
        assert_eq!(doc.item_text(parent), "Parent continued text");
        assert_eq!(doc.item_text(boxes[1].1.item), "Child");
        assert_eq!(doc.source_hint(boxes[1].1.item), Some(2));
        assert_eq!(doc.item_text(boxes[2].1.item), "Sibling");
    }

    #[test]
    fn ordered_task_glyph_is_not_clickable() {
        let doc = render("1. [ ] Alpha\n\n- [ ] Alpha beta\n");
        assert_eq!(doc.lines[0].plain, "1. [ ] Alpha");
        assert!(doc.lines[0].checkbox.is_none());
        let boxes = checkbox_rows(&doc);
        assert_eq!(boxes.len(), 1);
        assert_eq!(doc.source_hint(boxes[0].1.item), Some(2));
    }

    #[test]
    fn quoted_tasks_keep_source_hint() {
        let doc = render("intro\n\n> - [-] Quoted task\n");
        let boxes = checkbox_rows(&doc);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].1.marker, "-");
        assert_eq!(doc.source_hint(boxes[0].1.item), Some(2));
        assert_eq!(doc.item_text(boxes[0].1.item), "Quoted task");
    }

    #[test]
    fn wrapped_rows_rejoin_without_breaks() {
        let doc = render_markdown(
            "- [ ] A fairly long task description\n",
            PreviewStyles::default(),
            4,
            Some(16),
        );
        assert!(doc.lines.len() > 1);
        assert!(doc.lines[0].checkbox.is_some());
        assert!(doc.lines[1].checkbox.is_none());
        let item = doc.lines[0].checkbox.as_ref().unwrap().item;
        assert_eq!(
            truncate_preview(&doc.item_text(item), 300).as_deref(),
            Some("A fairly long task description")
        );
    }
}
