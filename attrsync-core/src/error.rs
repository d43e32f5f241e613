use thiserror::Error;

use crate::{
    accessor::AccessorError,
    model::{AttributeFamily, AttributeName, ObjectRef},
    value::FieldKind,
};

/// Failure of a single plan, apply, read or import call.
///
/// Nothing here is retried or rolled back. Every operation is a pure function
/// of the configuration and a fresh read, so re-invoking it is the recovery.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Reading the current state failed; nothing was computed or written.
    #[error("could not read attributes of {object}")]
    RemoteRead {
        object: ObjectRef,
        #[source]
        source: AccessorError,
    },

    /// The write was attempted and failed; the remote state is unchanged.
    #[error("could not write attributes of {object}")]
    RemoteWrite {
        object: ObjectRef,
        #[source]
        source: AccessorError,
    },

    /// The write went through, but reading the object back failed.
    #[error("wrote attributes of {object}, but could not read them back")]
    Unverified {
        object: ObjectRef,
        #[source]
        source: AccessorError,
    },

    #[error("custom field '{name}' is declared as {declared}, but the configuration provides a value of type {desired}")]
    TypeMismatch {
        name: AttributeName,
        declared: FieldKind,
        desired: FieldKind,
    },

    #[error("invalid value for custom field '{name}'")]
    InvalidValue {
        name: AttributeName,
        #[source]
        source: CodecError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cannot parse {value:?} as {kind}: {reason}")]
    InvalidConfigValue {
        kind: FieldKind,
        value: String,
        reason: String,
    },

    #[error("remote returned {found} for a {kind} field")]
    UnexpectedWireValue {
        kind: FieldKind,
        found: serde_json::Value,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{family} lists '{name}' more than once")]
    DuplicateAttribute {
        family: AttributeFamily,
        name: AttributeName,
    },

    #[error("invalid import item '{item}': {reason}")]
    InvalidImportItem { item: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mismatch_message_names_both_kinds() {
        let err = ReconcileError::TypeMismatch {
            name: "in_service".into(),
            declared: FieldKind::Boolean,
            desired: FieldKind::Integer,
        };
        assert_eq!(
            err.to_string(),
            "custom field 'in_service' is declared as boolean, but the configuration provides a value of type integer"
        );
    }

    #[test]
    fn remote_read_keeps_source() {
        let err = ReconcileError::RemoteRead {
            object: ObjectRef::new("dcim.site", "7"),
            source: AccessorError::Unavailable {
                message: "connection refused".to_string(),
            },
        };
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "remote unavailable: connection refused");
    }
}
