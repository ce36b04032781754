#![forbid(unsafe_code)]

//! Usage errors raised when a binding is configured incorrectly.
//!
//! These are programmer errors: they surface synchronously from the call that
//! violates the precondition and never from a mutation.

/// Errors from store and binding constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// A derivation was requested over an empty key list.
    EmptyKeys,
    /// A custom `set` handler was supplied together with
    /// [`BindOptions::no_set`](crate::BindOptions::no_set).
    SetHandlerWithNoSet {
        /// Store kind the binding was requested on (`"array"`, `"map"`).
        store: &'static str,
    },
}

impl std::fmt::Display for HookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKeys => write!(f, "derive: at least one key is required"),
            Self::SetHandlerWithNoSet { store } => write!(
                f,
                "bind {store}: cannot pass a set handler when the no_set option is enabled"
            ),
        }
    }
}

impl std::error::Error for HookError {}
