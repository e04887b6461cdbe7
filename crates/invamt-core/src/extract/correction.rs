//! OCR confusion correction inside numeric tokens.
//!
//! Corrections are applied to a shadow copy of the text. Every replacement is
//! one ASCII byte for one ASCII byte, so byte offsets in the shadow copy are
//! valid offsets into the original text.

/// Letters commonly misread for digits.
fn confusable_digit(c: char) -> Option<char> {
    match c {
        'O' | 'o' => Some('0'),
        'l' | 'I' => Some('1'),
        'Z' => Some('2'),
        'g' | 'q' => Some('9'),
        'B' => Some('8'),
        _ => None,
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == ','
}

fn is_currency_symbol(c: char) -> bool {
    matches!(c, '$' | '€' | '£' | '₹' | '¥')
}

/// Return `text` with confusable letters replaced inside numeric tokens.
///
/// A token (run of ASCII alphanumerics, `.` and `,`) is corrected when all of
/// its letters are confusables, it holds at least one digit, and it either has
/// two or more digits or follows a currency symbol. A leading `S` directly
/// before a digit is kept as a dollar marker.
pub fn correct_ocr_digits(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut i = 0;

    while i < chars.len() {
        let (_, c) = chars[i];
        if !is_token_char(c) {
            out.push(c);
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && is_token_char(chars[i].1) {
            i += 1;
        }
        let token: Vec<char> = chars[start..i].iter().map(|(_, c)| *c).collect();
        let after_currency = start > 0 && is_currency_symbol(chars[start - 1].1);
        push_token(&mut out, &token, after_currency);
    }

    out
}

fn push_token(out: &mut String, token: &[char], after_currency: bool) {
    // "S5O.OO" reads as "$50.00": keep the S, correct the rest.
    let (prefix, body, after_currency) = match token {
        ['S', next, ..] if next.is_ascii_digit() => (Some('S'), &token[1..], true),
        _ => (None, token, after_currency),
    };

    let digits = body.iter().filter(|c| c.is_ascii_digit()).count();
    let letters: Vec<&char> = body.iter().filter(|c| c.is_ascii_alphabetic()).collect();
    let correctable = !letters.is_empty()
        && digits > 0
        && letters.iter().all(|c| confusable_digit(**c).is_some())
        && (digits >= 2 || after_currency);

    if let Some(p) = prefix {
        out.push(p);
    }
    for &c in body {
        if correctable {
            out.push(confusable_digit(c).unwrap_or(c));
        } else {
            out.push(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrects_numeric_tokens() {
        assert_eq!(correct_ocr_digits("Total $5O.OO"), "Total $50.00");
        assert_eq!(correct_ocr_digits("Due 1,2B4.5O"), "Due 1,284.50");
        assert_eq!(correct_ocr_digits("S5O.OO"), "S50.00");
    }

    #[test]
    fn test_leaves_words_alone() {
        assert_eq!(correct_ocr_digits("Invoice B2B"), "Invoice B2B");
        assert_eq!(correct_ocr_digits("ISO9001 certified"), "ISO9001 certified");
        assert_eq!(correct_ocr_digits("Good to go"), "Good to go");
    }

    #[test]
    fn test_preserves_length() {
        let text = "Razem: 1 2O0,00 zł — płatne gotówką";
        let corrected = correct_ocr_digits(text);
        assert_eq!(corrected.len(), text.len());
        assert!(corrected.contains("1 200,00"));
    }
}
