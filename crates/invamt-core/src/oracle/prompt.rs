//! Prompt construction for the labeling oracle.

use crate::models::record::{AmountCandidate, RawText};

/// Maximum characters of document text embedded in a prompt.
const MAX_DOCUMENT_CHARS: usize = 4000;

const SYSTEM_INSTRUCTIONS: &str = r#"You are a data extraction bot. The user lists monetary amounts found on an invoice together with the text printed next to each amount. Label every amount and answer with JSON only.

Rules:
1. "currency": the single ISO currency code of the document (USD, EUR, INR, ...). Treat a leading S as USD.
2. "amounts": a list with one object per labeled amount.
3. Each object has exactly the keys "type", "value" and "source".
4. "type" is a concise snake_case label derived from the nearby text, for example sub_total, tax, discount, shipping, total, amount_paid, amount_due.
5. "value" is a JSON number copied from the listed amount, never a string.
6. "source" reconstructs the origin as "text: 'Context: Amount'".
7. The final payable amount is "amount_due". Use "total" only when the document also shows a separate paid, balance or due line.
8. Include "status": "ok".

Example input:
- Amount: ₹1200, Nearby Text: Total
- Amount: ₹1000, Nearby Text: Paid
- Amount: ₹200, Nearby Text: Due

Example output:
{"currency": "INR", "amounts": [{"type": "total", "value": 1200, "source": "text: 'Total: ₹1200'"}, {"type": "amount_paid", "value": 1000, "source": "text: 'Paid: ₹1000'"}, {"type": "amount_due", "value": 200, "source": "text: 'Due: ₹200'"}], "status": "ok"}"#;

/// A prompt split into system instructions and user content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OraclePrompt {
    pub system: String,
    pub user: String,
}

/// Build the labeling prompt for a document and its amount candidates.
pub fn build_prompt(raw: &RawText, candidates: &[AmountCandidate]) -> OraclePrompt {
    let mut user = String::new();

    for candidate in candidates {
        user.push_str(&format!(
            "- Amount: {}, Nearby Text: {}\n",
            candidate.raw.trim(),
            candidate.context_or_unknown()
        ));
    }

    let document: String = raw.as_str().chars().take(MAX_DOCUMENT_CHARS).collect();
    if !document.trim().is_empty() {
        user.push_str("\nDocument text:\n");
        user.push_str(document.trim());
        user.push('\n');
    }

    OraclePrompt {
        system: SYSTEM_INSTRUCTIONS.to_string(),
        user,
    }
}
