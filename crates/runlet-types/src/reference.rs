//! Reference and parameter-type enums.
//!
//! A node parameter value of the form `${kind:identifier[.path]}` is a
//! reference, resolved at dispatch time. The seven kinds form a closed enum
//! so that adding a kind is a compiler-checked change, and the parsed form
//! re-serializes to an equivalent reference string.

use std::fmt;

use crate::error::{CoercionError, InvalidReferenceKind};

// ---------------------------------------------------------------------------
// ReferenceKind
// ---------------------------------------------------------------------------

/// The source a reference resolves from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// The literal value captured in the reference itself.
    Static,
    /// A path into the execution's trigger payload.
    Trigger,
    /// A path into another node's recorded output.
    Node,
    /// A workspace variable (possibly secret).
    Value,
    /// A workspace credential (decrypted; may be consumed as an opaque blob).
    Credential,
    /// A workspace database connection (projected to safe fields).
    Database,
    /// A workspace file (content or metadata).
    File,
}

impl ReferenceKind {
    /// All kinds, in the order they appear in reference strings.
    pub const ALL: [ReferenceKind; 7] = [
        Self::Static,
        Self::Trigger,
        Self::Node,
        Self::Value,
        Self::Credential,
        Self::Database,
        Self::File,
    ];

    /// The tag used in `${kind:...}` reference strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Trigger => "trigger",
            Self::Node => "node",
            Self::Value => "value",
            Self::Credential => "credential",
            Self::Database => "database",
            Self::File => "file",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReferenceKind {
    type Err = InvalidReferenceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Self::Static),
            "trigger" => Ok(Self::Trigger),
            "node" => Ok(Self::Node),
            "value" => Ok(Self::Value),
            "credential" => Ok(Self::Credential),
            "database" => Ok(Self::Database),
            "file" => Ok(Self::File),
            other => Err(InvalidReferenceKind(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ParsedReference
// ---------------------------------------------------------------------------

/// A parsed `${kind:identifier[.path]}` reference.
///
/// - `Static`: `id` holds the literal, no path.
/// - `Trigger`: no id, `path` holds the whole remainder.
/// - all other kinds: `id` is the referenced entity, `path` the optional
///   sub-path into its resolved value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference {
    pub kind: ReferenceKind,
    pub id: Option<String>,
    pub path: Option<String>,
}

impl fmt::Display for ParsedReference {
    /// Re-serialize to the persisted reference string format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}:", self.kind)?;
        match (&self.id, &self.path) {
            (Some(id), Some(path)) => write!(f, "{id}.{path}")?,
            (Some(id), None) => write!(f, "{id}")?,
            (None, Some(path)) => write!(f, "{path}")?,
            (None, None) => {}
        }
        write!(f, "}}")
    }
}

// ---------------------------------------------------------------------------
// ParamType
// ---------------------------------------------------------------------------

/// Closed set of coercion targets for resolved parameter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// Parse a declared type name, case-insensitively, accepting the alias
    /// spellings workflow definitions use.
    pub fn parse(name: &str, param: &str) -> Result<Self, CoercionError> {
        match name.to_ascii_lowercase().as_str() {
            "string" | "text" | "str" => Ok(Self::String),
            "number" | "integer" | "int" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "boolean" | "bool" => Ok(Self::Boolean),
            "array" | "list" => Ok(Self::Array),
            "object" | "dict" | "json" => Ok(Self::Object),
            _ => Err(CoercionError::UnknownTarget {
                param: param.to_string(),
                target: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // ReferenceKind
    // -----------------------------------------------------------------------

    #[test]
    fn test_kind_roundtrip() {
        for kind in ReferenceKind::ALL {
            let parsed: ReferenceKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_kind_unknown_rejected() {
        let err = "secret".parse::<ReferenceKind>().unwrap_err();
        assert!(err.to_string().contains("secret"));
    }

    // -----------------------------------------------------------------------
    // ParsedReference display round-trip
    // -----------------------------------------------------------------------

    #[test]
    fn test_display_node_reference() {
        let parsed = ParsedReference {
            kind: ReferenceKind::Node,
            id: Some("NOD-1".to_string()),
            path: Some("result.items[0].name".to_string()),
        };
        assert_eq!(parsed.to_string(), "${node:NOD-1.result.items[0].name}");
    }

    #[test]
    fn test_display_trigger_reference() {
        let parsed = ParsedReference {
            kind: ReferenceKind::Trigger,
            id: None,
            path: Some("event.branch".to_string()),
        };
        assert_eq!(parsed.to_string(), "${trigger:event.branch}");
    }

    #[test]
    fn test_display_static_reference() {
        let parsed = ParsedReference {
            kind: ReferenceKind::Static,
            id: Some("hello".to_string()),
            path: None,
        };
        assert_eq!(parsed.to_string(), "${static:hello}");
    }

    // -----------------------------------------------------------------------
    // ParamType
    // -----------------------------------------------------------------------

    #[test]
    fn test_param_type_aliases() {
        assert_eq!(ParamType::parse("STR", "p").unwrap(), ParamType::String);
        assert_eq!(ParamType::parse("Text", "p").unwrap(), ParamType::String);
        assert_eq!(ParamType::parse("number", "p").unwrap(), ParamType::Integer);
        assert_eq!(ParamType::parse("int", "p").unwrap(), ParamType::Integer);
        assert_eq!(ParamType::parse("Float", "p").unwrap(), ParamType::Float);
        assert_eq!(ParamType::parse("bool", "p").unwrap(), ParamType::Boolean);
        assert_eq!(ParamType::parse("list", "p").unwrap(), ParamType::Array);
        assert_eq!(ParamType::parse("dict", "p").unwrap(), ParamType::Object);
        assert_eq!(ParamType::parse("json", "p").unwrap(), ParamType::Object);
    }

    #[test]
    fn test_param_type_unknown_names_valid_set() {
        let err = ParamType::parse("tuple", "retries").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("retries"));
        assert!(msg.contains("tuple"));
        assert!(msg.contains("boolean"));
    }
}
