use std::fmt;

use jwx_error::{BoxError, ErrorExt, OpaqueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
/// Category of a [`JoseError`].
pub enum ErrorKind {
    /// Malformed input: wrong compact part count, bad base64url,
    /// unparseable or duplicate-keyed JSON, missing required headers.
    Structural,
    /// A declared algorithm was rejected by the active `AlgorithmConstraints`.
    AlgorithmConstraintViolation,
    /// Unknown or unavailable algorithm identifier (including unknown `zip` values).
    InvalidAlgorithm,
    /// Missing, wrong-type, wrong-size or wrong-curve key.
    Key,
    /// Signature, tag, padding or unwrap failure.
    ///
    /// Carries no further detail.
    CryptographicFailure,
    /// No unique key could be selected for a message.
    UnresolvableKey,
    /// A header listed in `crit` is not understood.
    UnsupportedCriticalExtension,
    /// Compressing or decompressing the payload failed.
    Compression,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Structural => "structural error",
            Self::AlgorithmConstraintViolation => "algorithm constraint violation",
            Self::InvalidAlgorithm => "invalid algorithm",
            Self::Key => "invalid key",
            Self::CryptographicFailure => "cryptographic failure",
            Self::UnresolvableKey => "unresolvable key",
            Self::UnsupportedCriticalExtension => "unsupported critical extension",
            Self::Compression => "compression error",
        })
    }
}

/// Error returned by every JOSE operation of this crate.
///
/// The [`ErrorKind`] is the stable part to match on. All kinds except
/// [`ErrorKind::CryptographicFailure`] carry a context chain describing what failed.
/// Cryptographic failures are deliberately bare, so a failed MAC, a bad
/// padding block and an invalid signature look exactly the same to a caller.
pub struct JoseError {
    kind: ErrorKind,
    inner: Option<OpaqueError>,
}

impl JoseError {
    pub(crate) fn new(kind: ErrorKind, error: impl Into<BoxError>) -> Self {
        let inner = OpaqueError::from_boxed(error.into());
        if kind == ErrorKind::CryptographicFailure {
            return Self::cryptographic_failure();
        }
        Self {
            kind,
            inner: Some(inner),
        }
    }

    pub(crate) fn from_display(
        kind: ErrorKind,
        msg: impl fmt::Display + fmt::Debug + Send + Sync + 'static,
    ) -> Self {
        Self::new(kind, OpaqueError::from_display(msg).into_boxed())
    }

    /// The single, detail-free cryptographic failure.
    pub fn cryptographic_failure() -> Self {
        Self {
            kind: ErrorKind::CryptographicFailure,
            inner: None,
        }
    }

    /// Convert an error produced by a user supplied extension point
    /// (e.g. a custom [`Signer`](crate::jose::Signer)),
    /// keeping the kind of the first [`JoseError`] found in its chain.
    pub(crate) fn from_boxed_or(kind: ErrorKind, error: BoxError) -> Self {
        match error.downcast::<Self>() {
            Ok(err) => *err,
            Err(other) => {
                let other = OpaqueError::from_boxed(other);
                let kind = other
                    .chain()
                    .find_map(|cause| cause.downcast_ref::<Self>())
                    .map_or(kind, Self::kind);
                Self::new(kind, other.into_boxed())
            }
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Find an error of type `T` in the wrapped error or any of its causes.
    ///
    /// Useful to inspect e.g. a [`ConstraintViolation`](crate::jose::ConstraintViolation).
    pub fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: std::error::Error + 'static,
    {
        let inner = self.inner.as_ref()?;
        inner
            .downcast_ref()
            .or_else(|| inner.chain().find_map(|cause| cause.downcast_ref()))
    }
}

impl fmt::Debug for JoseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(inner) => f
                .debug_struct("JoseError")
                .field("kind", &self.kind)
                .field("inner", inner)
                .finish(),
            None => f.debug_struct("JoseError").field("kind", &self.kind).finish(),
        }
    }
}

impl fmt::Display for JoseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(inner) => write!(f, "{}: {inner}", self.kind),
            None => fmt::Display::fmt(&self.kind, f),
        }
    }
}

impl std::error::Error for JoseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner
            .as_ref()
            .map(|inner| inner as &(dyn std::error::Error + 'static))
    }
}

/// Attach an [`ErrorKind`] to a contextualised result.
pub(crate) trait WithKind<T> {
    fn with_kind(self, kind: ErrorKind) -> Result<T, JoseError>;
}

impl<T> WithKind<T> for Result<T, OpaqueError> {
    fn with_kind(self, kind: ErrorKind) -> Result<T, JoseError> {
        self.map_err(|err| JoseError::new(kind, err.into_boxed()))
    }
}
