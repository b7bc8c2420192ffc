//! User-facing message texts.

use gatepass_domain::id::AccessCode;

use crate::domain::types::{MessageFormat, Notification};

pub const POOL_EXHAUSTED_TEXT: &str = "❌ No codes left";

/// Delivery message carrying the code and, when configured, the sign-up form link.
pub fn code_delivery(code: &AccessCode, form_prefill_base: Option<&str>) -> Notification {
    let mut text = format!(
        "✅ Verification complete!\n\n🔑 *{}*",
        escape_markdown(code.as_str())
    );
    if let Some(base) = form_prefill_base {
        text.push_str(&format!(
            "\n\nFill the form to finish signing up: [Click here]({base}{})",
            code.as_str()
        ));
    }
    Notification {
        text,
        format: MessageFormat::Markdown,
    }
}

pub fn pool_exhausted() -> Notification {
    Notification {
        text: POOL_EXHAUSTED_TEXT.to_owned(),
        format: MessageFormat::Plain,
    }
}

/// Escape the characters legacy Markdown treats as entity delimiters.
fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
