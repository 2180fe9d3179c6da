use core::fmt;

/// All errors that can occur while building, parsing, or editing headers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed header records (non-ASCII text, stray continuation records).
    #[error("invalid FITS header")]
    InvalidHeader,
    /// Premature end of data while reading header blocks.
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// Keyword contains characters outside `[A-Z0-9_-]` or is reserved.
    #[error("invalid keyword name: {0}")]
    InvalidKeyword(String),
    /// Keyword longer than 8 characters without the HIERARCH convention.
    #[error("keyword too long: {0}")]
    KeywordTooLong(String),
    /// A value or comment that cannot be represented in a card.
    #[error("invalid header value: {0}")]
    InvalidValue(String),
    /// The keyword is not present in the header.
    #[error("keyword not found: {0}")]
    KeywordNotFound(String),
    /// The keyword is already present and may not be repeated.
    #[error("duplicate keyword: {0}")]
    DuplicateKeyword(String),
    /// A rename that would break header invariants.
    #[error("cannot rename {from} to {to}: {reason}")]
    InvalidRename {
        from: String,
        to: String,
        reason: &'static str,
    },
    /// Insertion position past the end of the header.
    #[error("position {position} out of range for header with {len} cards")]
    PositionOutOfRange { position: usize, len: usize },
    /// A schema definition or validation failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// The keyword property a schema rule was checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Mandatory,
    Position,
    Value,
    Valid,
    Indices,
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Property::Mandatory => "mandatory",
            Property::Position => "position",
            Property::Value => "value",
            Property::Valid => "valid",
            Property::Indices => "indices",
        };
        f.write_str(name)
    }
}

/// Errors raised by schema composition and header validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    /// The schema itself, or a predicate inside it, is malformed.
    #[error("schema definition error in {schema}: {message}")]
    Definition { schema: String, message: String },
    /// A header failed a well-formed schema rule.
    #[error("schema validation error in {schema}: {message}")]
    Validation {
        schema: String,
        keyword: String,
        property: Property,
        message: String,
    },
}

impl SchemaError {
    pub(crate) fn definition(schema: &str, message: impl Into<String>) -> Self {
        SchemaError::Definition {
            schema: String::from(schema),
            message: message.into(),
        }
    }

    pub(crate) fn validation(
        schema: &str,
        keyword: &str,
        property: Property,
        message: impl Into<String>,
    ) -> Self {
        SchemaError::Validation {
            schema: String::from(schema),
            keyword: String::from(keyword),
            property,
            message: message.into(),
        }
    }

    /// Returns `true` for errors in the schema rather than the header.
    pub fn is_definition(&self) -> bool {
        matches!(self, SchemaError::Definition { .. })
    }

    /// Returns `true` for header validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, SchemaError::Validation { .. })
    }

    /// The offending keyword of a validation failure.
    pub fn keyword(&self) -> Option<&str> {
        match self {
            SchemaError::Validation { keyword, .. } => Some(keyword),
            SchemaError::Definition { .. } => None,
        }
    }

    /// The unmet property of a validation failure.
    pub fn property(&self) -> Option<Property> {
        match self {
            SchemaError::Validation { property, .. } => Some(*property),
            SchemaError::Definition { .. } => None,
        }
    }
}
