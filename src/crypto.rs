//! Challenge-response computation for the authentication handshake
//!
//! The device issues a 16-byte random challenge; possession of the shared key
//! is proven by returning the challenge encrypted as a single AES-128 block.
//! One block, never reused, so no chaining mode is involved.

use crate::types::{BandError, Result};
use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;

/// Length of the key, the challenge, and the response
pub const BLOCK_LEN: usize = 16;

/// Encrypt `challenge` under `key`, producing the handshake response
///
/// Pure and deterministic: identical inputs always produce identical output.
pub fn compute_response(key: &[u8], challenge: &[u8; BLOCK_LEN]) -> Result<[u8; BLOCK_LEN]> {
    if key.len() != BLOCK_LEN {
        return Err(BandError::InvalidKeyLength(key.len()));
    }

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut block = GenericArray::clone_from_slice(challenge);
    cipher.encrypt_block(&mut block);

    let mut response = [0u8; BLOCK_LEN];
    response.copy_from_slice(&block);
    Ok(response)
}
