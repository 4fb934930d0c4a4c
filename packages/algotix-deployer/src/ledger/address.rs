//! Account address codec.
//!
//! An address is the unpadded RFC 4648 base32 encoding of the 32-byte
//! ed25519 public key followed by a 4-byte checksum: the last four bytes of
//! SHA-512/256 over the key.

use data_encoding::BASE32_NOPAD;
use sha2::{Digest, Sha512_256};

use crate::error::{Error, Result};

const CHECKSUM_LEN: usize = 4;
/// Encoded length of 36 bytes.
pub const ADDRESS_LEN: usize = 58;

/// Address of an ed25519 public key.
pub fn encode_address(public_key: &[u8; 32]) -> String {
    let mut bytes = Vec::with_capacity(32 + CHECKSUM_LEN);
    bytes.extend_from_slice(public_key);
    bytes.extend_from_slice(&checksum(public_key));
    BASE32_NOPAD.encode(&bytes)
}

/// Public key behind `address`, verifying length and checksum.
pub fn decode_address(address: &str) -> Result<[u8; 32]> {
    let invalid = |why: &str| Error::InvalidConfiguration(format!("invalid address {address:?}: {why}"));

    if address.len() != ADDRESS_LEN {
        return Err(invalid("wrong length"));
    }
    let bytes = BASE32_NOPAD
        .decode(address.as_bytes())
        .map_err(|_| invalid("not base32"))?;
    if bytes.len() != 32 + CHECKSUM_LEN {
        return Err(invalid("wrong length"));
    }
    let (key, sum) = bytes.split_at(32);
    let mut public_key = [0u8; 32];
    public_key.copy_from_slice(key);
    if &checksum(&public_key)[..] != sum {
        return Err(invalid("checksum mismatch"));
    }
    Ok(public_key)
}

/// Fail with `InvalidConfiguration` unless `address` is well formed.
pub fn validate_address(address: &str) -> Result<()> {
    decode_address(address).map(|_| ())
}

fn checksum(public_key: &[u8; 32]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha512_256::digest(public_key);
    let mut sum = [0u8; CHECKSUM_LEN];
    sum.copy_from_slice(&digest[digest.len() - CHECKSUM_LEN..]);
    sum
}
