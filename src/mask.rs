/// XOR `data` with `key`, byte `i` against key byte `i % 4`.  Masking and unmasking are the same
/// operation.
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        chunk[0] ^= key[0];
        chunk[1] ^= key[1];
        chunk[2] ^= key[2];
        chunk[3] ^= key[3];
    }
    for (b, k) in chunks.into_remainder().iter_mut().zip(key) {
        *b ^= k;
    }
}

/// A fresh masking key from the platform's random source.
#[cfg(feature = "getrandom")]
pub(crate) fn generate_mask() -> Result<[u8; 4], getrandom::Error> {
    let mut key = [0u8; 4];
    getrandom::getrandom(&mut key)?;
    Ok(key)
}
