use crate::config::LayoutConfig;
use crate::text_metrics;
use crate::theme::Theme;

use super::TextBlock;

/// Wrapped, measured label block for a publication title.
pub(super) fn measure_label(text: &str, theme: &Theme, config: &LayoutConfig) -> TextBlock {
    let font_size = config.font_size;
    let family = theme.font_family.as_str();
    let fast = config.fast_text_metrics;
    let max_width = config.max_label_width_chars.max(1) as f32 * average_char_width(family, font_size, fast);

    let mut lines: Vec<String> = split_lines(text)
        .into_iter()
        .flat_map(|line| wrap_line(&line, max_width, font_size, family, fast))
        .collect();
    if lines.is_empty() {
        lines.push(String::new());
    }

    let width = lines
        .iter()
        .map(|line| text_width(line, font_size, family, fast))
        .fold(0.0, f32::max);
    let height = lines.len() as f32 * font_size * config.label_line_height;
    TextBlock {
        lines,
        width,
        height,
    }
}

/// Titles from bibliographic sources carry stray whitespace and embedded
/// newlines; collapse runs of blanks and keep explicit line breaks.
pub(super) fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

pub(super) fn wrap_line(
    line: &str,
    max_width: f32,
    font_size: f32,
    family: &str,
    fast: bool,
) -> Vec<String> {
    if text_width(line, font_size, family, fast) <= max_width {
        return vec![line.to_string()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{current} {word}");
        if text_width(&candidate, font_size, family, fast) > max_width {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

pub(super) fn text_width(text: &str, font_size: f32, family: &str, fast: bool) -> f32 {
    if fast {
        return estimated_width(text, font_size);
    }
    text_metrics::measure_text_width(text, font_size, family)
        .unwrap_or_else(|| estimated_width(text, font_size))
}

/// Em fraction per character class for a generic sans-serif face.
fn char_em(ch: char) -> f32 {
    match ch {
        ' ' => 0.28,
        'i' | 'j' | 'l' | 'I' | '.' | ',' | ':' | ';' | '\'' | '!' | '|' => 0.26,
        'f' | 't' | 'r' | '(' | ')' | '[' | ']' | '-' => 0.35,
        'm' | 'w' | 'M' | 'W' | '@' | '%' => 0.88,
        'A'..='Z' => 0.67,
        '0'..='9' => 0.56,
        c if c.is_ascii() => 0.53,
        c if unicode_wide(c) => 1.0,
        _ => 0.6,
    }
}

fn unicode_wide(ch: char) -> bool {
    matches!(ch as u32, 0x1100..=0x115F | 0x2E80..=0xA4CF | 0xAC00..=0xD7A3 | 0xF900..=0xFAFF | 0xFF00..=0xFF60)
}

fn estimated_width(text: &str, font_size: f32) -> f32 {
    text.chars().map(char_em).sum::<f32>() * font_size
}

fn average_char_width(family: &str, font_size: f32, fast: bool) -> f32 {
    let estimate = font_size * 0.55;
    if fast {
        return estimate;
    }
    text_metrics::average_char_width(family, font_size).unwrap_or(estimate)
}
