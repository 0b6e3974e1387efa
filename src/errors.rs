//! Error taxonomy for the procedural-language subsystem.

use std::fmt;

/// Errors surfaced by compilation, marshaling, caching and dispatch.
///
/// Compile and execution failures carry the script engine's message (and for
/// execution, its stack) so the host can report them verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlScriptError {
    /// Script syntax or compile failure.
    Compile {
        message: String,
        line: usize,
        column: usize,
    },
    /// Uncaught script exception, including out-of-budget aborts.
    Execution { message: String, stack: Vec<String> },
    /// Value shape mismatched against the target relational type.
    TypeMismatch { message: String },
    /// Composite result missing a declared column.
    MissingColumn { message: String },
    /// Cache, context or catalog creation failure.
    Resource { message: String },
    /// Pending interrupt observed mid-call.
    Cancelled,
}

impl PlScriptError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            stack: Vec::new(),
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
        }
    }

    pub fn missing_column(message: impl Into<String>) -> Self {
        Self::MissingColumn {
            message: message.into(),
        }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
        }
    }

    /// Pushes a stack frame label onto an execution error, leaving every
    /// other kind untouched so precise taxonomy survives propagation.
    pub fn with_frame(mut self, frame: &str) -> Self {
        if let Self::Execution { stack, .. } = &mut self {
            stack.push(frame.to_string());
        }
        self
    }
}

impl fmt::Display for PlScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile {
                message,
                line,
                column,
            } => write!(f, "compile error: {message} (line {line}, col {column})"),
            Self::Execution { message, stack } => {
                write!(f, "execution error: {message}")?;
                for frame in stack {
                    write!(f, "\n    at {frame}")?;
                }
                Ok(())
            }
            Self::TypeMismatch { message } => write!(f, "type mismatch: {message}"),
            Self::MissingColumn { message } => write!(f, "missing column: {message}"),
            Self::Resource { message } => write!(f, "resource error: {message}"),
            Self::Cancelled => write!(f, "call cancelled by interrupt"),
        }
    }
}

impl std::error::Error for PlScriptError {}

#[cfg(test)]
mod tests {
    use super::PlScriptError;

    #[test]
    fn execution_display_includes_stack_frames() {
        let err = PlScriptError::execution("boom")
            .with_frame("inner")
            .with_frame("outer");
        let rendered = err.to_string();
        assert!(rendered.starts_with("execution error: boom"));
        assert!(rendered.contains("at inner"));
        assert!(rendered.contains("at outer"));
    }

    #[test]
    fn with_frame_preserves_non_execution_kinds() {
        let err = PlScriptError::type_mismatch("no").with_frame("f");
        assert_eq!(
            err,
            PlScriptError::TypeMismatch {
                message: "no".to_string()
            }
        );
    }
}
