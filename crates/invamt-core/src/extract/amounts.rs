//! Amount candidate extraction.

use std::collections::HashSet;
use std::str::FromStr;

use regex::Captures;
use rust_decimal::Decimal;
use tracing::{debug, trace};

use crate::models::config::ExtractionConfig;
use crate::models::record::{canonical_amount, AmountCandidate};

use super::correction::correct_ocr_digits;
use super::patterns::{
    currency_code, DATE_DMY, DATE_LONG, DATE_YMD, MONEY_PATTERN, PERCENTAGE, PHONE,
    PHONE_MIN_DIGITS, TIME, WORD,
};
use super::FieldExtractor;

/// Amount candidate extractor.
pub struct AmountExtractor {
    config: ExtractionConfig,
    indicators: HashSet<String>,
}

impl AmountExtractor {
    pub fn new() -> Self {
        Self::with_config(ExtractionConfig::default())
    }

    pub fn with_config(config: ExtractionConfig) -> Self {
        let indicators = config
            .indicator_words
            .iter()
            .map(|w| w.to_lowercase())
            .collect();
        Self { config, indicators }
    }

    /// Byte spans of non-monetary numeric shapes (dates, phones, times, percentages).
    fn exclusion_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();

        if self.config.exclude_dates {
            for re in [&*DATE_DMY, &*DATE_YMD, &*DATE_LONG] {
                spans.extend(re.find_iter(text).map(|m| (m.start(), m.end())));
            }
        }

        if self.config.exclude_phone_numbers {
            spans.extend(
                PHONE
                    .find_iter(text)
                    .filter(|m| m.as_str().chars().filter(char::is_ascii_digit).count() >= PHONE_MIN_DIGITS)
                    .map(|m| (m.start(), m.end())),
            );
        }

        if self.config.exclude_times {
            spans.extend(TIME.find_iter(text).map(|m| (m.start(), m.end())));
        }

        if self.config.exclude_percentages {
            spans.extend(PERCENTAGE.find_iter(text).map(|m| (m.start(), m.end())));
        }

        spans
    }

    fn has_indicator(&self, window: &str) -> bool {
        WORD.find_iter(window)
            .any(|w| self.indicators.contains(&w.as_str().to_lowercase()))
    }

    fn candidate_from(
        &self,
        text: &str,
        caps: &Captures<'_>,
        exclusions: &[(usize, usize)],
    ) -> Option<AmountCandidate> {
        let full = caps.get(0)?;
        let num = caps.name("num")?.as_str();

        let open = caps.name("open").is_some();
        let close = caps.name("close").is_some();
        let mut start = full.start();
        let mut end = full.end();
        if open && !close {
            start += 1;
        }
        if close && !open {
            end -= 1;
        }

        // Glued to a word or an identifier marker: part of something else.
        if let Some(prev) = text[..start].chars().next_back() {
            if prev.is_alphanumeric() || prev == '#' {
                return None;
            }
        }
        if let Some(next) = text[end..].chars().next() {
            if next.is_alphanumeric() {
                return None;
            }
        }

        let currency = ["pre_sym", "pre_code", "pre_s", "post"]
            .iter()
            .find_map(|g| caps.name(g))
            .map(|m| m.as_str().to_string());

        let window = window_before(text, start, self.config.context_window);
        let indicator_adjacent = self.has_indicator(window);
        let accepted = currency.is_some()
            || indicator_adjacent
            || (self.config.accept_bare_decimals && has_two_fraction_digits(num));
        if !accepted {
            trace!("skipping bare number {:?} without monetary context", num);
            return None;
        }

        if currency.is_none() && exclusions.iter().any(|&(s, e)| start < e && s < end) {
            debug!("excluding {:?} at {}..{}: non-monetary numeric pattern", num, start, end);
            return None;
        }

        let negative = (open && close)
            || caps.name("minus").is_some()
            || caps.name("minus_inner").is_some();
        let value = parse_amount(num)?;
        let value = if negative { -value } else { value };

        Some(AmountCandidate {
            value,
            raw: text[start..end].to_string(),
            span: (start, end),
            context: context_words(window),
            currency,
            indicator_adjacent,
        })
    }
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for AmountExtractor {
    type Output = AmountCandidate;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let shadow = if self.config.ocr_corrections {
            correct_ocr_digits(text)
        } else {
            text.to_string()
        };
        let exclusions = self.exclusion_spans(&shadow);

        let mut results = Vec::new();
        let mut seen = HashSet::new();

        for caps in MONEY_PATTERN.captures_iter(&shadow) {
            let Some(candidate) = self.candidate_from(text, &caps, &exclusions) else {
                continue;
            };
            if seen.insert((candidate.value, candidate.span)) {
                results.push(candidate);
            }
        }

        debug!("extracted {} amount candidates", results.len());
        results
    }
}

/// Up to `width` bytes of text before `start`, on a char boundary.
fn window_before(text: &str, start: usize, width: usize) -> &str {
    let mut from = start.saturating_sub(width);
    while !text.is_char_boundary(from) {
        from += 1;
    }
    &text[from..start]
}

/// Last two words before an amount, preferring the amount's own line.
///
/// Numeric tokens are skipped so a neighbouring amount never becomes context.
fn context_words(window: &str) -> Option<String> {
    for segment in window.rsplit('\n') {
        let words: Vec<&str> = segment
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.chars().any(char::is_alphabetic))
            .collect();
        if !words.is_empty() {
            let tail = &words[words.len().saturating_sub(2)..];
            return Some(tail.join(" "));
        }
    }
    None
}

fn has_two_fraction_digits(num: &str) -> bool {
    match num.rfind(['.', ',']) {
        Some(pos) => num.len() - pos - 1 == 2,
        None => false,
    }
}

/// Parse a monetary string in any common notation into a canonical amount.
///
/// Accepts `$1,000.00`, `1 234,56 zł`, `(12.50)`, `-5`, `USD 50`. The last of
/// `,`/`.` is the decimal separator when both appear; a single separator
/// followed by exactly three digits is a thousands separator.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let trimmed = s.trim();
    let parenthesized = trimmed.starts_with('(') && trimmed.ends_with(')');
    let negative = parenthesized || {
        let bare = trimmed.trim_matches(|c: char| !c.is_ascii_digit() && c != '-');
        bare.starts_with('-') || bare.ends_with('-')
    };

    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => single_separator(&cleaned, ','),
        (None, Some(_)) => single_separator(&cleaned, '.'),
        (None, None) => cleaned,
    };
    let normalized = normalized.trim_end_matches('.');
    let normalized = if normalized.starts_with('.') {
        format!("0{}", normalized)
    } else {
        normalized.to_string()
    };

    let value = Decimal::from_str(&normalized).ok()?;
    let value = if negative { -value } else { value };
    Some(canonical_amount(value))
}

/// Resolve a number that uses only one separator character.
fn single_separator(cleaned: &str, sep: char) -> String {
    let count = cleaned.matches(sep).count();
    if count > 1 {
        return cleaned.replace(sep, "");
    }

    let (before, after) = cleaned.split_once(sep).unwrap_or((cleaned, ""));
    let thousands = after.len() == 3 && (1..=3).contains(&before.len()) && before != "0";
    if thousands {
        cleaned.replace(sep, "")
    } else {
        cleaned.replace(sep, ".")
    }
}

/// Format an amount with comma thousands separators (1,234.56).
pub fn format_amount(amount: Decimal) -> String {
    let s = canonical_amount(amount).to_string();
    let (sign, s) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.as_str()),
    };
    let (integer_part, decimal_part) = s.split_once('.').unwrap_or((s, "00"));

    let chars: Vec<char> = integer_part.chars().collect();
    let mut formatted = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(*c);
    }

    format!("{}{}.{}", sign, formatted, decimal_part)
}

/// ISO currency code of the most frequent marker among candidates.
pub fn dominant_currency(candidates: &[AmountCandidate]) -> Option<String> {
    let mut counts: Vec<(&'static str, usize)> = Vec::new();
    for code in candidates
        .iter()
        .filter_map(|c| c.currency.as_deref())
        .filter_map(currency_code)
    {
        match counts.iter_mut().find(|(c, _)| *c == code) {
            Some((_, n)) => *n += 1,
            None => counts.push((code, 1)),
        }
    }
    // First seen wins ties.
    let mut best: Option<(&'static str, usize)> = None;
    for (code, n) in counts {
        if best.is_none_or(|(_, m)| n > m) {
            best = Some((code, n));
        }
    }
    best.map(|(code, _)| code.to_string())
}
