//! Injectable source of randomness for identifiers (DN qualifiers, token IDs,
//! audit request IDs). Key material is generated from a
//! [`CryptoRngCore`](rand_core::CryptoRngCore) instead, see
//! [`KeyManager`](crate::keys::KeyManager).
use std::sync::Arc;

use rand_core::{OsRng, RngCore};
use uuid::Uuid;

/// A source of random bytes which can be shared between concurrent
/// operations.
///
/// The provided methods derive identifiers from [`RandomSource::fill_bytes`],
/// so deterministic implementations used in tests produce deterministic
/// identifiers.
pub trait RandomSource: Send + Sync {
    /// Fills `dest` with random bytes. Failing to gather entropy is fatal.
    fn fill_bytes(&self, dest: &mut [u8]);

    /// Returns a random (version 4) UUID.
    fn uuid(&self) -> Uuid {
        let mut bytes = [0; 16];
        self.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }

    /// Returns 16 random bytes as lowercase hex string.
    fn hex_id(&self) -> String {
        let mut bytes = [0; 16];
        self.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

/// The default [`RandomSource`] backed by the operating system's CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

impl<T: RandomSource + ?Sized> RandomSource for &T {
    fn fill_bytes(&self, dest: &mut [u8]) {
        (**self).fill_bytes(dest);
    }
}

impl<T: RandomSource + ?Sized> RandomSource for Arc<T> {
    fn fill_bytes(&self, dest: &mut [u8]) {
        (**self).fill_bytes(dest);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicU8, Ordering};

    use super::*;

    /// Fills every requested buffer with the same byte, which is incremented
    /// after each call.
    #[derive(Debug, Default)]
    pub(crate) struct CountingRandom(AtomicU8);

    impl RandomSource for CountingRandom {
        fn fill_bytes(&self, dest: &mut [u8]) {
            let value = self.0.fetch_add(1, Ordering::Relaxed);
            dest.fill(value);
        }
    }

    #[test]
    fn uuid_is_version_4() {
        let random = CountingRandom::default();
        let first = random.uuid();
        let second = random.uuid();

        assert_eq!(first.get_version_num(), 4);
        assert_ne!(first, second);
    }

    #[test]
    fn hex_id_is_32_lowercase_chars() {
        let random = CountingRandom::default();
        random.fill_bytes(&mut [0; 1]);

        assert_eq!(random.hex_id(), "01".repeat(16));
    }

    #[test]
    fn os_random_differs() {
        assert_ne!(OsRandom.hex_id(), OsRandom.hex_id());
    }
}
