//! Suppression of reasoning spans in model output.
//!
//! Models that "think out loud" wrap their reasoning in markers such as
//! `<think>...</think>` or a `**Thinking:** ... **Answer:**` pair. When the
//! user asks to hide reasoning, [`ThinkingFilter`] drops those spans while
//! streaming and lets everything else through.
//!
//! Markers are matched case-insensitively at character granularity, so text
//! before an opening marker and after a closing marker survives. A marker can
//! be split across fragments (`<thin` + `k>`): the filter holds back the
//! tail of a fragment that could still grow into a marker and decides once
//! the next fragment arrives. The held tail is shorter than the longest
//! marker and is released by [`ThinkingFilter::finish`].

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterState {
    #[default]
    Passing,
    Suppressing,
}

/// What to swallow right after a closing marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoration {
    Whitespace,
    /// `**Answer:**` style labels leave `:` and `*` behind as well.
    Label,
}

impl Decoration {
    fn matches(self, c: char) -> bool {
        match self {
            Decoration::Whitespace => c.is_whitespace(),
            Decoration::Label => c.is_whitespace() || c == ':' || c == '*',
        }
    }
}

struct Marker {
    text: &'static str,
    decoration: Decoration,
}

const fn marker(text: &'static str, decoration: Decoration) -> Marker {
    Marker { text, decoration }
}

const OPEN_MARKERS: &[Marker] = &[
    marker("<think>", Decoration::Whitespace),
    marker("<thinking>", Decoration::Whitespace),
    marker("[thinking]", Decoration::Whitespace),
    marker("**thinking", Decoration::Label),
    marker("thinking:", Decoration::Label),
    marker("<thought>", Decoration::Whitespace),
    marker("[thought]", Decoration::Whitespace),
];

const CLOSE_MARKERS: &[Marker] = &[
    marker("</think>", Decoration::Whitespace),
    marker("</thinking>", Decoration::Whitespace),
    marker("</thought>", Decoration::Whitespace),
    marker("[/thinking]", Decoration::Whitespace),
    marker("[/thought]", Decoration::Whitespace),
    marker("**answer", Decoration::Label),
    marker("answer:", Decoration::Label),
];

static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t\r]*\n){2,}").expect("valid blank-line pattern"));

#[derive(Debug, Default)]
pub struct ThinkingFilter {
    state: FilterState,
    pending: String,
    decoration: Option<Decoration>,
}

impl ThinkingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Feed one content fragment and return the part that may be shown.
    pub fn push(&mut self, fragment: &str) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.push_str(fragment);

        let mut output = String::new();
        let mut rest = input.as_str();
        loop {
            match self.state {
                FilterState::Passing => {
                    rest = self.strip_decoration(rest);
                    if rest.is_empty() {
                        break;
                    }
                    if let Some((start, found)) = find_marker(rest, OPEN_MARKERS) {
                        output.push_str(&rest[..start]);
                        rest = &rest[start + found.text.len()..];
                        self.state = FilterState::Suppressing;
                        debug!(marker = found.text, "reasoning span opened");
                        continue;
                    }
                    let split = rest.len() - partial_marker_len(rest, OPEN_MARKERS);
                    output.push_str(&rest[..split]);
                    self.pending = rest[split..].to_string();
                    break;
                }
                FilterState::Suppressing => {
                    if let Some((start, found)) = find_marker(rest, CLOSE_MARKERS) {
                        rest = &rest[start + found.text.len()..];
                        self.state = FilterState::Passing;
                        self.decoration = Some(found.decoration);
                        debug!(marker = found.text, "reasoning span closed");
                        continue;
                    }
                    let split = rest.len() - partial_marker_len(rest, CLOSE_MARKERS);
                    self.pending = rest[split..].to_string();
                    break;
                }
            }
        }
        output
    }

    /// End of input. A held-back tail is released if it turned out not to be
    /// a marker; an unterminated reasoning span stays hidden.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        match self.state {
            FilterState::Passing => self.strip_decoration(&pending).to_string(),
            FilterState::Suppressing => String::new(),
        }
    }

    fn strip_decoration<'a>(&mut self, text: &'a str) -> &'a str {
        let Some(decoration) = self.decoration else {
            return text;
        };
        let trimmed = text.trim_start_matches(|c| decoration.matches(c));
        if !trimmed.is_empty() {
            self.decoration = None;
        }
        trimmed
    }
}

/// Filter a complete response in one go, including whitespace cleanup.
pub fn filter_thinking(text: &str) -> String {
    let mut filter = ThinkingFilter::new();
    let mut output = filter.push(text);
    output.push_str(&filter.finish());
    normalize_whitespace(&output)
}

/// Collapse runs of three or more newlines to two and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    EXCESS_BLANK_LINES
        .replace_all(text, "\n\n")
        .trim()
        .to_string()
}

/// Earliest marker occurrence; the longest marker wins a tie.
fn find_marker(text: &str, markers: &'static [Marker]) -> Option<(usize, &'static Marker)> {
    // ASCII lowercasing keeps byte offsets aligned with `text`
    let lowered = text.to_ascii_lowercase();
    markers
        .iter()
        .filter_map(|marker| lowered.find(marker.text).map(|start| (start, marker)))
        .min_by(|(a_start, a), (b_start, b)| {
            a_start
                .cmp(b_start)
                .then_with(|| b.text.len().cmp(&a.text.len()))
        })
}

/// Length of the longest tail of `text` that is a proper prefix of a marker.
fn partial_marker_len(text: &str, markers: &[Marker]) -> usize {
    let longest = markers.iter().map(|m| m.text.len()).max().unwrap_or(0);
    let limit = longest.saturating_sub(1).min(text.len());

    for len in (1..=limit).rev() {
        let start = text.len() - len;
        if !text.is_char_boundary(start) {
            continue;
        }
        let tail = text[start..].to_ascii_lowercase();
        if markers
            .iter()
            .any(|m| m.text.len() > len && m.text.starts_with(&tail))
        {
            return len;
        }
    }
    0
}
