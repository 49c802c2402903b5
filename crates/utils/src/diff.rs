use serde::{Deserialize, Serialize};
use similar::{DiffTag, TextDiff};

/// Character similarity a removed/added line pair needs before it is shown as
/// an in-place edit with hint lines instead of a plain removal and addition.
const CLOSE_MATCH_CUTOFF: f32 = 0.75;

pub const MATCH_HTML: &str = r#"<span class="diff-match">Outputs Match!</span>"#;
pub const ERROR_HTML: &str =
    r#"<span class="diff-error">Error during generation or comparison.</span>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineKind {
    Unchanged,
    Added,
    Removed,
    Hint,
}

impl DiffLineKind {
    /// Two-character prefix used by line differs.
    pub fn marker(self) -> &'static str {
        match self {
            DiffLineKind::Unchanged => "  ",
            DiffLineKind::Added => "+ ",
            DiffLineKind::Removed => "- ",
            DiffLineKind::Hint => "? ",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            DiffLineKind::Unchanged => "diff-unchanged",
            DiffLineKind::Added => "diff-added",
            DiffLineKind::Removed => "diff-removed",
            DiffLineKind::Hint => "diff-info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    /// Line text exactly as it appeared in the input, terminator included.
    /// For hints this is the marker guide.
    pub content: String,
}

impl DiffLine {
    fn new(kind: DiffLineKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn display(&self) -> String {
        format!("{}{}", self.kind.marker(), self.content)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDiff {
    pub lines: Vec<DiffLine>,
}

impl RenderedDiff {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Rebuilds the expected text from unchanged and removed lines.
    pub fn expected_text(&self) -> String {
        self.collect(|kind| matches!(kind, DiffLineKind::Unchanged | DiffLineKind::Removed))
    }

    /// Rebuilds the actual text from unchanged and added lines.
    pub fn actual_text(&self) -> String {
        self.collect(|kind| matches!(kind, DiffLineKind::Unchanged | DiffLineKind::Added))
    }

    fn collect(&self, keep: impl Fn(DiffLineKind) -> bool) -> String {
        self.lines
            .iter()
            .filter(|line| keep(line.kind))
            .map(|line| line.content.as_str())
            .collect()
    }

    /// Renders every line inside one `<pre>` block, one `<span>` per line.
    pub fn to_html(&self) -> String {
        let mut html = String::from("<pre>");
        for line in &self.lines {
            html.push_str(&format!(
                r#"<span class="{}">{}{}</span>"#,
                line.kind.css_class(),
                line.kind.marker(),
                escape_html(&line.content)
            ));
        }
        html.push_str("</pre>");
        html
    }
}

/// Line-by-line comparison of `expected` against `actual`.
///
/// Lines keep their terminators so unchanged and removed lines concatenate
/// back to `expected`, and unchanged and added lines back to `actual`. When a
/// replaced block contains a sufficiently similar pair of lines, the pair is
/// emitted as an edit followed by hint lines that point at the differing
/// characters.
pub fn render(expected: &str, actual: &str) -> RenderedDiff {
    let diff = TextDiff::from_lines(expected, actual);
    let old = diff.old_slices();
    let new = diff.new_slices();

    let mut lines = Vec::new();
    let mut ops = diff.ops().iter().map(|op| op.as_tag_tuple()).peekable();
    while let Some((tag, old_range, new_range)) = ops.next() {
        match tag {
            DiffTag::Equal => push_all(&mut lines, DiffLineKind::Unchanged, &old[old_range]),
            DiffTag::Insert => push_all(&mut lines, DiffLineKind::Added, &new[new_range]),
            DiffTag::Delete => match ops.next_if(|(tag, ..)| matches!(tag, DiffTag::Insert)) {
                Some((_, _, inserted)) => replace_block(&mut lines, &old[old_range], &new[inserted]),
                None => push_all(&mut lines, DiffLineKind::Removed, &old[old_range]),
            },
            DiffTag::Replace => replace_block(&mut lines, &old[old_range], &new[new_range]),
        }
    }

    RenderedDiff { lines }
}

fn push_all(out: &mut Vec<DiffLine>, kind: DiffLineKind, lines: &[&str]) {
    out.extend(lines.iter().map(|line| DiffLine::new(kind, *line)));
}

/// Finds the closest removed/added pair, emits it as an edit and recurses on
/// the lines on either side of it.
fn replace_block(out: &mut Vec<DiffLine>, removed: &[&str], added: &[&str]) {
    let mut best_ratio = CLOSE_MATCH_CUTOFF - 0.01;
    let mut best = None;
    let mut identical = None;

    for (j, new_line) in added.iter().enumerate() {
        for (i, old_line) in removed.iter().enumerate() {
            if old_line == new_line {
                identical.get_or_insert((i, j));
                continue;
            }
            if ratio_upper_bound(old_line, new_line) <= best_ratio {
                continue;
            }
            let ratio = TextDiff::from_chars(*old_line, *new_line).ratio();
            if ratio > best_ratio {
                best_ratio = ratio;
                best = Some((i, j));
            }
        }
    }

    let (i, j, edited) = match (best, identical) {
        (Some((i, j)), _) if best_ratio >= CLOSE_MATCH_CUTOFF => (i, j, true),
        (_, Some((i, j))) => (i, j, false),
        _ => {
            push_all(out, DiffLineKind::Removed, removed);
            push_all(out, DiffLineKind::Added, added);
            return;
        }
    };

    replace_or_dump(out, &removed[..i], &added[..j]);
    if edited {
        push_edit(out, removed[i], added[j]);
    } else {
        out.push(DiffLine::new(DiffLineKind::Unchanged, removed[i]));
    }
    replace_or_dump(out, &removed[i + 1..], &added[j + 1..]);
}

fn replace_or_dump(out: &mut Vec<DiffLine>, removed: &[&str], added: &[&str]) {
    match (removed.is_empty(), added.is_empty()) {
        (false, false) => replace_block(out, removed, added),
        (false, true) => push_all(out, DiffLineKind::Removed, removed),
        (true, false) => push_all(out, DiffLineKind::Added, added),
        (true, true) => {}
    }
}

fn ratio_upper_bound(a: &str, b: &str) -> f32 {
    let (la, lb) = (a.chars().count(), b.chars().count());
    if la + lb == 0 {
        return 1.0;
    }
    2.0 * la.min(lb) as f32 / (la + lb) as f32
}

fn push_edit(out: &mut Vec<DiffLine>, old_line: &str, new_line: &str) {
    let diff = TextDiff::from_chars(old_line, new_line);
    let mut old_tags = String::new();
    let mut new_tags = String::new();
    for op in diff.ops() {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        let (old_tag, new_tag) = match tag {
            DiffTag::Equal => (' ', ' '),
            DiffTag::Delete => ('-', ' '),
            DiffTag::Insert => (' ', '+'),
            DiffTag::Replace => ('^', '^'),
        };
        old_tags.extend(std::iter::repeat_n(old_tag, old_range.len()));
        new_tags.extend(std::iter::repeat_n(new_tag, new_range.len()));
    }

    out.push(DiffLine::new(DiffLineKind::Removed, old_line));
    if let Some(hint) = hint_line(old_line, &old_tags) {
        out.push(DiffLine::new(DiffLineKind::Hint, hint));
    }
    out.push(DiffLine::new(DiffLineKind::Added, new_line));
    if let Some(hint) = hint_line(new_line, &new_tags) {
        out.push(DiffLine::new(DiffLineKind::Hint, hint));
    }
}

/// Keeps tabs and other whitespace from the original line under unchanged
/// positions so the guide lines up when displayed.
fn hint_line(line: &str, tags: &str) -> Option<String> {
    let guide: String = line
        .chars()
        .zip(tags.chars())
        .map(|(c, tag)| if tag == ' ' && c.is_whitespace() { c } else { tag })
        .collect();
    let guide = guide.trim_end();
    if guide.is_empty() {
        None
    } else {
        Some(format!("{guide}\n"))
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
