//! Passphrase generation

use rand::distributions::{Distribution, Uniform};
use rand::rngs::OsRng;
use rand::{CryptoRng, Rng};

use crate::error::{Result, SecuredNetworkError};

/// Alphanumeric alphabet without look-alikes (0/O/o, 1/l/I)
pub const PASSPHRASE_ALPHABET: &[u8] =
    b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz23456789";

/// Length used when the operator does not give one
pub const RECOMMENDED_PASSPHRASE_LENGTH: i64 = 1000;

/// Longest passphrase that still fits a forwarded host string comfortably
pub const MAX_PASSPHRASE_LENGTH: i64 = 8192;

/// Generate a passphrase from the operating system RNG
pub fn generate(length: i64) -> Result<String> {
    generate_with(&mut OsRng, length)
}

/// Generate a passphrase of exactly `length` characters from `rng`.
///
/// Lengths below 1 or above [`MAX_PASSPHRASE_LENGTH`] are rejected.
pub fn generate_with<R: Rng + CryptoRng>(rng: &mut R, length: i64) -> Result<String> {
    if !(1..=MAX_PASSPHRASE_LENGTH).contains(&length) {
        return Err(SecuredNetworkError::InvalidPassphraseLength(length));
    }

    let index = Uniform::from(0..PASSPHRASE_ALPHABET.len());
    let passphrase = (0..length)
        .map(|_| PASSPHRASE_ALPHABET[index.sample(&mut *rng)] as char)
        .collect();
    Ok(passphrase)
}
