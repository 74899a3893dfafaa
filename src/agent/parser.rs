//! Action invocation parser.
//!
//! spec.md §4.7 deliberately leaves the exact textual grammar to the
//! implementer ("implementers must supply a grammar that satisfies §4.7 and
//! the round-trip tests"), specifying only the shape: a bracketed structure
//! with a name attribute and named argument children, trailing content after
//! the closing marker discarded. This parser implements that shape as an
//! XML-like tag:
//!
//! ```text
//! <action name="spawn_agent">
//!   <arg name="role">reconnaissance</arg>
//!   <arg name="task">enumerate subdomains</arg>
//! </action>
//! ```
//!
//! using `regex`, the same crate the teacher already depends on for pattern
//! matching (`security.rs`, `validation.rs`).

use crate::models::ActionInvocation;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<action\s+name="([^"]+)"\s*>(.*?)</action>"#).expect("static pattern")
    })
}

fn arg_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<arg\s+name="([^"]+)"\s*>(.*?)</arg>"#).expect("static pattern"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "action parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Extracts every well-formed `<action>` block, in order, discarding any
/// content before the first or between blocks. Returns a parse error only
/// when the text contains an opening `<action` tag that never closes —
/// anything else (plain prose, no invocations at all) is simply zero
/// results, not an error, per spec.md's "report as a parse error
/// observation, never as a crash".
pub fn parse_invocations(text: &str) -> Result<Vec<ActionInvocation>, ParseError> {
    let mut invocations = Vec::new();
    for caps in action_re().captures_iter(text) {
        let name = caps[1].trim().to_string();
        if name.is_empty() {
            return Err(ParseError { message: "action tag missing a name".to_string() });
        }
        let body = &caps[2];
        let mut invocation = ActionInvocation::new(name);
        for arg_caps in arg_re().captures_iter(body) {
            let key = arg_caps[1].trim().to_string();
            let raw = arg_caps[2].trim();
            invocation = invocation.with_arg(key, coerce_arg(raw));
        }
        invocations.push(invocation);
    }

    if invocations.is_empty() && text.contains("<action") {
        return Err(ParseError { message: "unterminated action tag".to_string() });
    }

    Ok(invocations)
}

/// Extracts only the first invocation, discarding anything after its
/// closing marker — the mode spec.md's §4.7 describes as the default.
pub fn parse_first_invocation(text: &str) -> Result<Option<ActionInvocation>, ParseError> {
    Ok(parse_invocations(text)?.into_iter().next())
}

fn coerce_arg(raw: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        if v.is_number() || v.is_boolean() || v.is_null() {
            return v;
        }
    }
    Value::String(raw.to_string())
}
