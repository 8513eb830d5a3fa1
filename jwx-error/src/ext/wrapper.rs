use crate::BoxError;
use std::fmt::{self, Debug, Display};

#[repr(transparent)]
/// A type-erased error type that can be used as a trait object.
///
/// Used by the jwx crates to hide the concrete error type of
/// lower level failures (provider errors, codec errors, ...).
///
/// See the [crate level documentation](crate) for more information.
pub struct OpaqueError(BoxError);

impl OpaqueError {
    /// create an [`OpaqueError`] from an std error
    pub fn from_std(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(error))
    }

    /// create an [`OpaqueError`] from a display object
    pub fn from_display(msg: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::from_std(MessageError(msg))
    }

    /// create an [`OpaqueError`] from a boxed error
    pub fn from_boxed(inner: BoxError) -> Self {
        Self(inner)
    }

    /// Returns true if the underlying error is of type `T`.
    pub fn is<T>(&self) -> bool
    where
        T: std::error::Error + 'static,
    {
        self.0.is::<T>()
    }

    /// Consumes the [`OpaqueError`] and returns it as a [`BoxError`].
    pub fn into_boxed(self) -> BoxError {
        self.0
    }

    /// Attempts to downcast the error to the concrete type `T`.
    pub fn downcast<T>(self) -> Result<T, Self>
    where
        T: std::error::Error + 'static,
    {
        match self.0.downcast::<T>() {
            Ok(error) => Ok(*error),
            Err(inner) => Err(Self(inner)),
        }
    }

    /// Attempts to downcast the error to a shared reference
    /// of the concrete type `T`.
    pub fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: std::error::Error + 'static,
    {
        self.0.downcast_ref()
    }
}

impl Debug for OpaqueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for OpaqueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for OpaqueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<BoxError> for OpaqueError {
    fn from(error: BoxError) -> Self {
        Self(error)
    }
}

#[repr(transparent)]
/// An error type that wraps a message.
pub(crate) struct MessageError<M>(pub(crate) M);

impl<M> Debug for MessageError<M>
where
    M: Display + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl<M> Display for MessageError<M>
where
    M: Display + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<M> std::error::Error for MessageError<M> where M: Display + Debug + 'static {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct UnwrapFailed(usize);

    impl Display for UnwrapFailed {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "unwrap failed after {} bytes", self.0)
        }
    }

    impl std::error::Error for UnwrapFailed {}

    #[test]
    fn opaque_error_is() {
        let error = OpaqueError::from_std(UnwrapFailed(1));
        assert!(error.is::<UnwrapFailed>());
        assert!(!OpaqueError::from_display("hello").is::<UnwrapFailed>());
    }

    #[test]
    fn opaque_error_downcast() {
        let error = OpaqueError::from_std(UnwrapFailed(24));
        let inner = error.downcast::<UnwrapFailed>().unwrap();
        assert_eq!(inner.0, 24);

        let error = OpaqueError::from_display("hello");
        assert!(error.downcast::<UnwrapFailed>().is_err());
    }

    #[test]
    fn opaque_error_downcast_ref() {
        let error = OpaqueError::from_std(UnwrapFailed(3));
        assert_eq!(error.downcast_ref::<UnwrapFailed>().unwrap().0, 3);
        assert!(
            OpaqueError::from_display("hello")
                .downcast_ref::<UnwrapFailed>()
                .is_none()
        );
    }

    #[test]
    fn opaque_error_roundtrips_boxed() {
        let error = OpaqueError::from_boxed(Box::new(UnwrapFailed(7)));
        let boxed = error.into_boxed();
        assert_eq!(boxed.to_string(), "unwrap failed after 7 bytes");
        let error = OpaqueError::from(boxed);
        assert!(error.is::<UnwrapFailed>());
    }
}
