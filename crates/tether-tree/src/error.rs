#![forbid(unsafe_code)]

//! Error types for the component tree.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | [`BindError::NotFound`] | No ancestor exposes the name | `warn!`, observer falls back to its default |
//! | [`BindError::TypeMismatch`] | Name exists with another value type | `error!`, observer falls back to its default |
//! | [`TreeError`] | Stale id, cyclic reparent | Returned to the caller, tree unchanged |
//! | [`InspectError`] | Unknown field or wrong value type on write | Returned to the caller, value unchanged |
//!
//! Binding failures never abort activation; they degrade the affected
//! binding to "inactive" and emit exactly one log line.

use crate::component::ComponentId;
use crate::tree::NodeId;

/// Why an observer or proxy could not bind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    /// No data source in the scope chain exposes `name`.
    #[error("observable `{name}` not found for {origin}")]
    NotFound { name: String, origin: String },
    /// `name` exists, but only with a different value type.
    #[error("observable `{name}` on {source_path} holds {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        source_path: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl BindError {
    /// Emit the single log line for this failure.
    pub(crate) fn emit(&self) {
        match self {
            Self::NotFound { name, origin } => {
                tracing::warn!(name = %name, origin = %origin, "{self}");
            }
            Self::TypeMismatch {
                name,
                expected,
                found,
                ..
            } => {
                tracing::error!(name = %name, expected = *expected, found = *found, "{self}");
            }
        }
    }
}

/// Structural errors from tree operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("unknown or destroyed node {0:?}")]
    UnknownNode(NodeId),
    #[error("unknown component {0:?}")]
    UnknownComponent(ComponentId),
    #[error("cannot move {node:?} under itself or its descendant {parent:?}")]
    Cycle { node: NodeId, parent: NodeId },
}

/// Errors from the inspection surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InspectError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("component {component:?} exposes no field `{field}`")]
    UnknownField {
        component: ComponentId,
        field: String,
    },
    #[error("field `{field}` holds {expected}; the written value has another type")]
    WrongType {
        field: String,
        expected: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_messages() {
        let missing = BindError::NotFound {
            name: "message".into(),
            origin: "/root/leaf/Label".into(),
        };
        assert_eq!(
            missing.to_string(),
            "observable `message` not found for /root/leaf/Label"
        );

        let mismatch = BindError::TypeMismatch {
            name: "count".into(),
            source_path: "/root/Model".into(),
            expected: "alloc::string::String",
            found: "i32",
        };
        assert!(mismatch.to_string().contains("holds i32"));
    }
}
