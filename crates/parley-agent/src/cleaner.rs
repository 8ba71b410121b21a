//! Turns a raw delta into a participant's visible response.
//!
//! Steps, in order:
//! 1. drop chrome lines (loading indicators, spinner frames, box borders)
//!    and strip leading response-marker glyphs
//! 2. drop the echoed input at the top of the delta
//! 3. optionally cut the next turn's prompt off the end
//! 4. collapse runs of three or more blank lines into one
//!
//! Leading indentation of content lines is preserved. The cleaner never
//! fails: text it cannot classify passes through. `clean` is pure and
//! idempotent.

use parley_core::{CleanerConfig, ParticipantConfig};

use crate::readiness::line_has_indicator;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputCleaner {
    loading_indicators: Vec<String>,
    prompt_indicators: Vec<String>,
    response_markers: Vec<String>,
    spinner_glyphs: Vec<String>,
    strip_box_drawing: bool,
}

impl OutputCleaner {
    pub fn new(config: &CleanerConfig) -> Self {
        Self {
            loading_indicators: Vec::new(),
            prompt_indicators: Vec::new(),
            response_markers: non_empty(&config.response_markers),
            spinner_glyphs: non_empty(&config.spinner_glyphs),
            strip_box_drawing: config.strip_box_drawing,
        }
    }

    /// Cleaner using a participant's loading vocabulary as chrome and its
    /// ready indicators as the next-prompt signature.
    pub fn for_participant(config: &CleanerConfig, participant: &ParticipantConfig) -> Self {
        Self::new(config)
            .with_loading_indicators(participant.loading_indicators.clone())
            .with_prompt_indicators(participant.ready_indicators.clone())
    }

    pub fn with_loading_indicators(mut self, indicators: Vec<String>) -> Self {
        self.loading_indicators = non_empty(&indicators);
        self
    }

    pub fn with_prompt_indicators(mut self, indicators: Vec<String>) -> Self {
        self.prompt_indicators = indicators
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect();
        self
    }

    /// Clean `raw_text`. `sent_input` is the text dispatched for this turn.
    pub fn clean(
        &self,
        raw_text: &str,
        sent_input: Option<&str>,
        strip_trailing_prompt: bool,
    ) -> String {
        let mut lines: Vec<String> = raw_text
            .lines()
            .filter_map(|line| self.strip_chrome(line.trim_end()))
            .collect();

        if let Some(input) = sent_input {
            self.remove_echo(&mut lines, input);
        }
        if strip_trailing_prompt {
            self.strip_trailing_prompt(&mut lines);
        }
        collapse_blank_runs(&mut lines);

        let start = lines
            .iter()
            .position(|l| !l.is_empty())
            .unwrap_or(lines.len());
        let end = lines
            .iter()
            .rposition(|l| !l.is_empty())
            .map_or(start, |idx| idx + 1);
        lines[start..end].join("\n")
    }

    /// Whether `line` is a next-turn prompt.
    pub fn is_prompt_line(&self, line: &str) -> bool {
        let text = line.trim();
        !text.is_empty()
            && self.prompt_indicators.iter().any(|indicator| {
                text.starts_with(indicator.trim_start()) || text == indicator.trim()
            })
    }

    /// Drop a chrome line, or return it with response markers stripped.
    fn strip_chrome(&self, line: &str) -> Option<String> {
        let indent = &line[..line.len() - line.trim_start().len()];
        let mut rest = line.trim_start();
        let mut had_marker = false;
        while let Some(marker) = self
            .response_markers
            .iter()
            .find(|marker| rest.starts_with(marker.as_str()))
        {
            rest = rest[marker.len()..].trim_start();
            had_marker = true;
        }
        if had_marker && rest.is_empty() {
            return None;
        }
        if rest.is_empty() {
            return Some(String::new());
        }

        if self
            .loading_indicators
            .iter()
            .any(|indicator| line_has_indicator(rest, indicator))
        {
            return None;
        }
        if self.spinner_glyphs.iter().any(|glyph| {
            rest.strip_prefix(glyph.as_str())
                .is_some_and(|after| after.is_empty() || after.starts_with(char::is_whitespace))
        }) {
            return None;
        }
        if self.strip_box_drawing
            && rest
                .chars()
                .all(|c| is_box_drawing(c) || c.is_whitespace())
        {
            return None;
        }

        Some(format!("{indent}{rest}"))
    }

    /// Remove echoed input lines from the leading block of the delta.
    fn remove_echo(&self, lines: &mut Vec<String>, input: &str) {
        let echoes: Vec<&str> = input
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if echoes.is_empty() {
            return;
        }

        let mut leading = 0;
        for line in lines.iter() {
            let text = line.trim();
            if text.is_empty() || self.is_echo(text, &echoes) {
                leading += 1;
            } else {
                break;
            }
        }
        lines.drain(..leading);
    }

    fn is_echo(&self, text: &str, echoes: &[&str]) -> bool {
        if echoes.contains(&text) {
            return true;
        }
        self.prompt_indicators.iter().any(|indicator| {
            text.strip_prefix(indicator.trim())
                .is_some_and(|rest| echoes.contains(&rest.trim()))
        })
    }

    /// Cut at the topmost prompt line of the trailing run of prompt and
    /// blank lines. Indicator text inside the response body is left alone.
    fn strip_trailing_prompt(&self, lines: &mut Vec<String>) {
        if self.prompt_indicators.is_empty() {
            return;
        }
        let mut cut = None;
        for (idx, line) in lines.iter().enumerate().rev() {
            if line.trim().is_empty() {
                continue;
            }
            if self.is_prompt_line(line) {
                cut = Some(idx);
                continue;
            }
            break;
        }
        if let Some(idx) = cut {
            lines.truncate(idx);
        }
    }
}

fn non_empty(items: &[String]) -> Vec<String> {
    items.iter().filter(|s| !s.is_empty()).cloned().collect()
}

fn is_box_drawing(c: char) -> bool {
    matches!(c, '\u{2500}'..='\u{257F}')
}

/// Collapse runs of more than two blank lines into a single blank line.
fn collapse_blank_runs(lines: &mut Vec<String>) {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut run = 0;
    for line in lines.drain(..) {
        if line.is_empty() {
            run += 1;
            continue;
        }
        match run {
            0 => {}
            1 | 2 => out.extend(std::iter::repeat(String::new()).take(run)),
            _ => out.push(String::new()),
        }
        run = 0;
        out.push(line);
    }
    // Trailing blanks are dropped by the caller.
    *lines = out;
}
