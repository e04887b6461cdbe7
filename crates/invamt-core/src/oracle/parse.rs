//! Defensive parsing of oracle completions.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::debug;

use crate::extract::parse_amount;
use crate::extract::patterns::currency_code;
use crate::models::record::{canonical_amount, Label, LabelProposal};

/// Label proposals and document currency read from an oracle completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPayload {
    pub proposals: Vec<LabelProposal>,
    pub currency: Option<String>,
}

/// Parse the structured payload out of a free-text completion.
///
/// The payload is the span from the first `{` to the last `}`. It must carry
/// an `amounts` list of `{type, value, source}` objects; a flat
/// `{"label": number}` object is accepted as well. In strict mode any entry
/// with a missing label or a non-numeric value rejects the whole payload,
/// otherwise such entries are skipped. Returns `None` when nothing usable is
/// found.
pub fn parse_oracle_output(raw: &str, strict: bool) -> Option<ParsedPayload> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }

    let value: Value = match serde_json::from_str(&raw[start..=end]) {
        Ok(value) => value,
        Err(e) => {
            debug!("oracle payload is not valid JSON: {}", e);
            return None;
        }
    };
    let object = value.as_object()?;

    let currency = object
        .get("currency")
        .and_then(Value::as_str)
        .and_then(normalize_currency);

    let proposals = match object.get("amounts") {
        Some(Value::Array(entries)) => parse_entries(entries, strict)?,
        Some(_) => return None,
        None => parse_flat(object, strict)?,
    };

    Some(ParsedPayload {
        proposals,
        currency,
    })
}

fn parse_entries(entries: &[Value], strict: bool) -> Option<Vec<LabelProposal>> {
    let mut proposals = Vec::with_capacity(entries.len());

    for entry in entries {
        match parse_entry(entry) {
            Some(proposal) => proposals.push(proposal),
            None if strict => {
                debug!("rejecting oracle payload: malformed entry {}", entry);
                return None;
            }
            None => debug!("skipping malformed oracle entry {}", entry),
        }
    }

    Some(proposals)
}

fn parse_entry(entry: &Value) -> Option<LabelProposal> {
    let object = entry.as_object()?;
    let raw_label = object
        .get("type")
        .or_else(|| object.get("label"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|l| !l.is_empty())?;
    let value = object.get("value").and_then(value_to_decimal)?;
    let source = object
        .get("source")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(LabelProposal {
        label: normalize_label(raw_label),
        raw_label: raw_label.to_string(),
        value,
        source,
    })
}

fn parse_flat(object: &Map<String, Value>, strict: bool) -> Option<Vec<LabelProposal>> {
    let mut proposals = Vec::new();

    for (key, value) in object {
        if matches!(key.as_str(), "currency" | "status" | "reason") {
            continue;
        }
        match value_to_decimal(value) {
            Some(amount) => proposals.push(LabelProposal {
                label: normalize_label(key),
                raw_label: key.clone(),
                value: amount,
                source: None,
            }),
            None if strict => return None,
            None => debug!("skipping non-numeric oracle field {}", key),
        }
    }

    if proposals.is_empty() {
        None
    } else {
        Some(proposals)
    }
}

fn value_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
                .map(canonical_amount)
        }
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

fn normalize_currency(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if let Some(code) = currency_code(trimmed) {
        return Some(code.to_string());
    }
    let upper = trimmed.to_ascii_uppercase();
    if upper.len() == 3 && upper.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(upper)
    } else {
        None
    }
}

/// Map a free-form label name onto the canonical vocabulary.
///
/// Names are lowercased and snake-cased first (`Amount DUE`, `AmountDue` and
/// `amount-due` all become `amount_due`). Unknown names map to
/// [`Label::Other`].
pub fn normalize_label(raw: &str) -> Label {
    let snake = to_snake_case(raw);

    match snake.as_str() {
        "sub_total" | "subtotal" | "sub_totals" | "subtotal_amount" | "net" | "net_total"
        | "total_net" | "net_amount" | "amount_before_tax" => Label::SubTotal,
        "tax" | "taxes" | "vat" | "gst" | "hst" | "sales_tax" | "tax_amount" | "total_tax"
        | "vat_amount" => Label::Tax,
        "discount" | "discounts" | "discount_amount" | "savings" => Label::Discount,
        "shipping" | "shipping_cost" | "shipping_and_handling" | "freight" | "delivery"
        | "postage" => Label::Shipping,
        "total" | "grand_total" | "total_amount" | "invoice_total" | "gross_total"
        | "total_gross" => Label::Total,
        "paid" | "amount_paid" | "payment" | "payments" | "total_paid" => Label::AmountPaid,
        "due" | "amount_due" | "balance" | "balance_due" | "total_due" | "amount_payable"
        | "to_pay" => Label::AmountDue,
        other => Label::from_canonical(other).unwrap_or(Label::Other),
    }
}

fn to_snake_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    let mut prev_lower = false;

    for c in raw.trim().chars() {
        if c.is_alphanumeric() {
            if c.is_uppercase() && prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        } else {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }

    out.trim_matches('_').to_string()
}
