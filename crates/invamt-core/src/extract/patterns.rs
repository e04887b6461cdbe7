//! Common regex patterns for amount extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Amount with optional currency marker on either side.
    // Alternatives of <num> in priority order:
    //   1 234,56     space-grouped, optional fraction (1 000, 1 234.56)
    //   1,234.56     comma/dot/apostrophe-grouped
    //   1234.56      ungrouped
    pub static ref MONEY_PATTERN: Regex = Regex::new(
        r"(?x)
        (?P<open>\()?
        (?P<minus>-)?
        (?:
            (?P<pre_sym>[$€£₹¥])\s?
          | \b(?P<pre_code>USD|EUR|GBP|INR|PLN|CHF|JPY|CAD|AUD)\s?
          | \b(?P<pre_s>S)
        )?
        (?P<minus_inner>-)?
        (?P<num>
            \d{1,3}(?:[\x20\x{00a0}\x{202f}]\d{3})+(?:[.,]\d{1,2})?
          | \d{1,3}(?:[,.']\d{3})+(?:[.,]\d{1,2})?
          | \d+(?:[.,]\d{1,2})?
        )
        (?P<close>\))?
        (?:\s?(?P<post>[$€£₹¥]|zł|(?:USD|EUR|GBP|INR|PLN|CHF|JPY|CAD|AUD)\b))?
        "
    ).unwrap();

    // Calendar dates: 15.01.2024, 01/15/24, 2024-01-15, 15 Jan 2024, January 15, 2024
    pub static ref DATE_DMY: Regex = Regex::new(
        r"\b\d{1,2}[./\-]\d{1,2}[./\-](?:\d{4}|\d{2})\b"
    ).unwrap();

    pub static ref DATE_YMD: Regex = Regex::new(
        r"\b\d{4}[./\-]\d{1,2}[./\-]\d{1,2}\b"
    ).unwrap();

    pub static ref DATE_LONG: Regex = Regex::new(
        r"(?i)\b\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+\d{4}\b|\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}\b"
    ).unwrap();

    // Phone-like groups: +1 555-123-4567, (555) 123 4567, 555-1234
    pub static ref PHONE: Regex = Regex::new(
        r"(?:\+\d{1,3}[\s\-]?)?(?:\(\d{2,4}\)\s?)?\d{3}[\s\-]\d{3,4}(?:[\s\-]\d{2,4})?"
    ).unwrap();

    // Clock times: 12:30, 09:15:00
    pub static ref TIME: Regex = Regex::new(
        r"\b\d{1,2}:\d{2}(?::\d{2})?\b"
    ).unwrap();

    // Percentages: 23%, 7.5 %
    pub static ref PERCENTAGE: Regex = Regex::new(
        r"\d+(?:[.,]\d+)?\s?%"
    ).unwrap();

    // Words used for indicator lookup.
    pub static ref WORD: Regex = Regex::new(
        r"[\p{L}\p{N}][\p{L}\p{N}'\-]*"
    ).unwrap();
}

/// Minimum digits for a phone-like match to count as a phone number.
pub const PHONE_MIN_DIGITS: usize = 7;

/// Map a currency marker to its ISO code.
pub fn currency_code(marker: &str) -> Option<&'static str> {
    match marker {
        "$" | "S" | "USD" => Some("USD"),
        "€" | "EUR" => Some("EUR"),
        "£" | "GBP" => Some("GBP"),
        "₹" | "INR" => Some("INR"),
        "zł" | "PLN" => Some("PLN"),
        "¥" | "JPY" => Some("JPY"),
        "CHF" => Some("CHF"),
        "CAD" => Some("CAD"),
        "AUD" => Some("AUD"),
        _ => None,
    }
}
