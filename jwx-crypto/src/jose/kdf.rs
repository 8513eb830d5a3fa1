//! Concat KDF as profiled by [`rfc7518`] section 4.6.2 for ECDH-ES.
//!
//! [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518#section-4.6.2

use aws_lc_rs::digest::{self, SHA256, SHA256_OUTPUT_LEN};
use zeroize::Zeroizing;

use crate::jose::{ErrorKind, JoseError};

/// Derive `key_data_len_bits` bits of key material from an ECDH shared secret.
///
/// Implements the single-step KDF of NIST SP 800-56A with SHA-256, where
/// `OtherInfo` is composed of the length-prefixed `algorithm_id`,
/// `party_u_info` and `party_v_info` followed by the key length in bits.
pub fn concat_kdf(
    shared_secret: &[u8],
    key_data_len_bits: usize,
    algorithm_id: &[u8],
    party_u_info: &[u8],
    party_v_info: &[u8],
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    if key_data_len_bits == 0 || key_data_len_bits % 8 != 0 {
        return Err(JoseError::from_display(
            ErrorKind::Key,
            format!("derived key length must be a positive multiple of 8 bits, got {key_data_len_bits}"),
        ));
    }
    let key_data_len_bits_be = u32::try_from(key_data_len_bits)
        .map_err(|err| JoseError::new(ErrorKind::Key, err))?
        .to_be_bytes();
    let other_info = other_info(algorithm_id, party_u_info, party_v_info, key_data_len_bits_be)?;

    let key_len = key_data_len_bits / 8;
    let rounds = key_len.div_ceil(SHA256_OUTPUT_LEN);

    let mut derived = Zeroizing::new(Vec::with_capacity(rounds * SHA256_OUTPUT_LEN));
    for counter in 1..=rounds {
        let counter = u32::try_from(counter).map_err(|err| JoseError::new(ErrorKind::Key, err))?;
        let mut ctx = digest::Context::new(&SHA256);
        ctx.update(&counter.to_be_bytes());
        ctx.update(shared_secret);
        ctx.update(&other_info);
        derived.extend_from_slice(ctx.finish().as_ref());
    }
    derived.truncate(key_len);
    Ok(derived)
}

fn other_info(
    algorithm_id: &[u8],
    party_u_info: &[u8],
    party_v_info: &[u8],
    key_data_len_bits_be: [u8; 4],
) -> Result<Vec<u8>, JoseError> {
    let mut info = Vec::with_capacity(
        12 + algorithm_id.len() + party_u_info.len() + party_v_info.len() + 4,
    );
    for datum in [algorithm_id, party_u_info, party_v_info] {
        let len = u32::try_from(datum.len()).map_err(|err| JoseError::new(ErrorKind::Key, err))?;
        info.extend_from_slice(&len.to_be_bytes());
        info.extend_from_slice(datum);
    }
    info.extend_from_slice(&key_data_len_bits_be);
    Ok(info)
}
