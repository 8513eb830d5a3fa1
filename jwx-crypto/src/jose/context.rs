use std::{fmt, sync::Arc};

use aws_lc_rs::rand::{SecureRandom, SystemRandom};
use jwx_error::ErrorContext;
use jwx_utils::macros::generate_set_and_with;
use zeroize::Zeroizing;

use crate::jose::{ErrorKind, JoseError, error::WithKind};

/// Source of randomness for CEKs, IVs and ephemeral keys.
///
/// Swap it out in tests to get deterministic output.
/// Signature nonces and RSA padding randomness are always drawn
/// by the crypto provider itself and never go through this trait.
pub trait RandomSource: Send + Sync + 'static {
    /// Fill `dest` entirely with random bytes.
    fn fill(&self, dest: &mut [u8]) -> Result<(), JoseError>;
}

#[derive(Clone, Default)]
/// [`RandomSource`] backed by the operating system CSPRNG.
pub struct SystemRandomSource(SystemRandom);

impl SystemRandomSource {
    /// Create a new [`SystemRandomSource`].
    #[must_use]
    pub fn new() -> Self {
        Self(SystemRandom::new())
    }
}

impl fmt::Debug for SystemRandomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemRandomSource").finish()
    }
}

impl RandomSource for SystemRandomSource {
    fn fill(&self, dest: &mut [u8]) -> Result<(), JoseError> {
        self.0
            .fill(dest)
            .context("fill buffer from system random")
            .with_kind(ErrorKind::CryptographicFailure)
    }
}

#[derive(Clone)]
/// Provider level settings shared by producers and consumers.
pub struct ProviderContext {
    rng: Arc<dyn RandomSource>,
    do_key_validation: bool,
}

impl Default for ProviderContext {
    fn default() -> Self {
        Self {
            rng: Arc::new(SystemRandomSource::new()),
            do_key_validation: true,
        }
    }
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("do_key_validation", &self.do_key_validation)
            .finish_non_exhaustive()
    }
}

impl ProviderContext {
    /// Create a [`ProviderContext`] using the system random source and key validation enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    generate_set_and_with!(
        /// Replace the [`RandomSource`] used for CEKs, IVs and ephemeral keys.
        pub fn random_source(mut self, rng: impl RandomSource) -> Self {
            self.rng = Arc::new(rng);
            self
        }
    );

    generate_set_and_with!(
        /// Enable or disable minimum key size checks.
        ///
        /// Only meant for interop with legacy peers. Key type and curve checks
        /// stay in place regardless.
        pub fn do_key_validation(mut self, validate: bool) -> Self {
            self.do_key_validation = validate;
            self
        }
    );

    /// Whether minimum key size checks are enforced.
    pub fn key_validation_enabled(&self) -> bool {
        self.do_key_validation
    }

    /// Access the configured [`RandomSource`].
    pub fn rng(&self) -> &dyn RandomSource {
        self.rng.as_ref()
    }

    pub(crate) fn random_bytes(&self, len: usize) -> Result<Zeroizing<Vec<u8>>, JoseError> {
        let mut bytes = Zeroizing::new(vec![0u8; len]);
        self.rng.fill(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// Replays a fixed byte sequence, cycling when exhausted.
    pub(crate) struct FixedRandom {
        bytes: Vec<u8>,
        offset: Mutex<usize>,
    }

    impl FixedRandom {
        pub(crate) fn new(bytes: impl Into<Vec<u8>>) -> Self {
            Self {
                bytes: bytes.into(),
                offset: Mutex::new(0),
            }
        }
    }

    impl RandomSource for FixedRandom {
        fn fill(&self, dest: &mut [u8]) -> Result<(), JoseError> {
            let mut offset = self.offset.lock().unwrap();
            for byte in dest.iter_mut() {
                *byte = self.bytes[*offset % self.bytes.len()];
                *offset += 1;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FixedRandom;
    use super::*;

    #[test]
    fn default_context_validates_keys() {
        let ctx = ProviderContext::new();
        assert!(ctx.key_validation_enabled());
        let ctx = ctx.with_do_key_validation(false);
        assert!(!ctx.key_validation_enabled());
    }

    #[test]
    fn system_random_fills_buffer() {
        let ctx = ProviderContext::default();
        let a = ctx.random_bytes(32).unwrap();
        let b = ctx.random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(*a, *b);
    }

    #[test]
    fn injected_random_source_is_used() {
        let ctx = ProviderContext::new().with_random_source(FixedRandom::new([1, 2, 3]));
        let bytes = ctx.random_bytes(5).unwrap();
        assert_eq!(*bytes, vec![1, 2, 3, 1, 2]);
    }
}
