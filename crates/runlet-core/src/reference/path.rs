//! Nested path resolution over JSON values.
//!
//! Paths use dot-separated keys and bracket indices: `user.tags[2].name`.
//! Bracket groups are tokenized first, then the remaining dot segments;
//! the walker applies object-key or array-index lookup per token. Every
//! miss fails loudly with the offending segment named -- no silent
//! defaults.

use runlet_types::error::PathError;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Tokenization
// ---------------------------------------------------------------------------

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object-key lookup.
    Key(String),
    /// Array-index lookup. Kept raw so a non-integer index reports its
    /// own error instead of a tokenizer failure.
    Index(String),
}

/// Tokenize a path string into key and index segments.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, PathError> {
    let mut segments = Vec::new();

    for dot_part in path.split('.') {
        // Each dot segment is a leading key (possibly empty for pure
        // bracket forms like `[0]`) followed by zero or more `[...]`
        // groups.
        let mut rest = dot_part;
        let key_end = rest.find('[').unwrap_or(rest.len());
        let key = &rest[..key_end];
        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        } else if key_end == rest.len() {
            // An empty dot segment ("a..b", trailing '.') is malformed.
            return Err(PathError::Malformed {
                path: path.to_string(),
            });
        }
        rest = &rest[key_end..];

        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return Err(PathError::Malformed {
                    path: path.to_string(),
                });
            }
            let Some(close) = rest.find(']') else {
                return Err(PathError::Malformed {
                    path: path.to_string(),
                });
            };
            segments.push(PathSegment::Index(rest[1..close].to_string()));
            rest = &rest[close + 1..];
        }
    }

    Ok(segments)
}

// ---------------------------------------------------------------------------
// Walking
// ---------------------------------------------------------------------------

/// Walk `value` along `path` and return the sub-value it names.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Result<&'a Value, PathError> {
    let mut current = value;

    for segment in parse_path(path)? {
        current = match segment {
            PathSegment::Key(key) => match current {
                Value::Object(map) => {
                    map.get(&key).ok_or(PathError::MissingKey { segment: key })?
                }
                _ => return Err(PathError::KeyOnNonObject { segment: key }),
            },
            PathSegment::Index(raw) => match current {
                Value::Array(items) => {
                    let index: usize = raw
                        .parse()
                        .map_err(|_| PathError::NonIntegerIndex { segment: raw })?;
                    items.get(index).ok_or(PathError::IndexOutOfRange {
                        index,
                        len: items.len(),
                    })?
                }
                _ => return Err(PathError::IndexOnNonArray { segment: raw }),
            },
        };
    }

    Ok(current)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
