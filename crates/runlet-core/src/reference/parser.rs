//! Reference string parsing.
//!
//! A parameter value is a reference iff it starts with `${`, ends with `}`,
//! and has a `:` in its interior; anything else is a literal and is never
//! parsed. The interior splits on the first `:` into the kind tag and the
//! identifier/path remainder.

use runlet_types::error::ResolutionError;
use runlet_types::reference::{ParsedReference, ReferenceKind};

/// Whether a raw parameter string is a reference.
///
/// Literals -- including strings that merely *contain* `${...}` -- are not
/// references; only a value that is exactly one wrapped `kind:remainder`
/// form qualifies.
pub fn is_reference(value: &str) -> bool {
    value.starts_with("${")
        && value.ends_with('}')
        && value.len() > 3
        && value[2..value.len() - 1].contains(':')
}

/// Parse a reference string into its typed form.
///
/// Callers should gate on [`is_reference`] first; a non-reference value
/// here is a malformed-syntax error, not a literal fallback.
pub fn parse(value: &str) -> Result<ParsedReference, ResolutionError> {
    if !is_reference(value) {
        return Err(ResolutionError::InvalidReference(format!(
            "malformed reference syntax: '{value}'"
        )));
    }

    let interior = &value[2..value.len() - 1];
    // Split on the first ':' only; identifiers and paths may contain more.
    let Some((kind_tag, remainder)) = interior.split_once(':') else {
        return Err(ResolutionError::InvalidReference(format!(
            "malformed reference syntax: '{value}'"
        )));
    };

    let kind: ReferenceKind = kind_tag.parse()?;

    let parsed = match kind {
        // The remainder *is* the literal value.
        ReferenceKind::Static => ParsedReference {
            kind,
            id: Some(remainder.to_string()),
            path: None,
        },
        // The remainder is entirely a path into the trigger payload.
        ReferenceKind::Trigger => ParsedReference {
            kind,
            id: None,
            path: Some(remainder.to_string()),
        },
        // Everything else: id, then an optional path after the first '.'.
        ReferenceKind::Node
        | ReferenceKind::Value
        | ReferenceKind::Credential
        | ReferenceKind::Database
        | ReferenceKind::File => match remainder.split_once('.') {
            Some((id, path)) => ParsedReference {
                kind,
                id: Some(id.to_string()),
                path: Some(path.to_string()),
            },
            None => ParsedReference {
                kind,
                id: Some(remainder.to_string()),
                path: None,
            },
        },
    };

    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
