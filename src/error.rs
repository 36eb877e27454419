//! Error types for the simulated OSGi runtime.

use thiserror::Error;

/// Errors raised by the mock registry, injector and lifecycle driver.
///
/// Every failure is fatal for the call that triggered it; nothing in this
/// crate retries. Variants carry owned strings so errors can be cloned and
/// compared in tests.
///
/// # Examples
///
/// ```rust
/// use osgi_mock::OsgiError;
///
/// let err = OsgiError::AlreadyUnregistered;
/// assert_eq!(err.to_string(), "Service was already unregistered");
///
/// let err = OsgiError::ReferenceViolation {
///     reference: "logger".into(),
///     interface: "com.example.Logger".into(),
///     class: "com.example.Service".into(),
/// };
/// assert!(err.to_string().contains("'logger'"));
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OsgiError {
    /// The component type has no parsed descriptor.
    #[error("No OSGi SCR metadata found for class {class}")]
    NoScrMetadata { class: String },

    /// A mandatory reference could not be satisfied at injection time.
    #[error("Unable to inject mandatory reference '{reference}' ({interface}) for class {class}: no matching services were found")]
    ReferenceViolation {
        reference: String,
        interface: String,
        class: String,
    },

    /// Unregistering a record that is no longer in the registry.
    #[error("Service was already unregistered")]
    AlreadyUnregistered,

    /// No bind/unbind method or field could carry the reference, or the
    /// field type does not fit the reference cardinality.
    #[error("Unable to bind reference '{reference}' in class {class}: {detail}")]
    UnsupportedBind {
        reference: String,
        class: String,
        detail: String,
    },

    /// An explicitly named lifecycle method has no compatible signature.
    #[error("No matching method '{method}' with a supported signature found in class {class}")]
    LifecycleMethod { class: String, method: String },

    /// Lifecycle transition not allowed from the current state.
    #[error("Invalid lifecycle transition for {class}: {detail}")]
    Lifecycle { class: String, detail: String },

    /// Filter string could not be parsed.
    #[error("Invalid filter '{filter}': {detail}")]
    InvalidSyntax { filter: String, detail: String },

    /// Downcast of a type-erased value failed
    #[error("Type mismatch for: {0}")]
    TypeMismatch(&'static str),

    /// Component code (constructor, method, materializer) reported a failure.
    #[error("Component {class} failed: {detail}")]
    Component { class: String, detail: String },

    /// The configuration store failed; wraps the underlying I/O error text.
    #[error("Configuration store failure: {0}")]
    ConfigurationIo(String),

    /// Filesystem failure outside the configuration store (data files).
    #[error("I/O failure: {0}")]
    Io(String),
}

impl OsgiError {
    /// Convenience for component code returning an error from an invoker.
    pub fn component(class: impl Into<String>, detail: impl Into<String>) -> Self {
        OsgiError::Component {
            class: class.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn configuration_io(err: std::io::Error) -> Self {
        OsgiError::ConfigurationIo(err.to_string())
    }

    pub(crate) fn io(err: std::io::Error) -> Self {
        OsgiError::Io(err.to_string())
    }
}

/// Result type for OSGi mock operations.
pub type OsgiResult<T> = Result<T, OsgiError>;
