/// 32-bit FNV-1a digest of a session token.
///
/// Fast and non-cryptographic on purpose: the hash exists so the hub can
/// compare keepalive tokens and check fleet-wide uniqueness without
/// storing comparisons of full strings, not to resist forgery. A zero
/// hash is reserved to mean "no token issued"; callers that roll tokens
/// must re-roll on a zero digest.
pub fn token_hash32(token: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in token.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
