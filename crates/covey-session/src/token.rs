//! Random secrets: session tokens and town passwords.

use covey_protocol::SessionToken;
use rand::Rng;

/// Returns `len` random bytes rendered as lowercase hex (`2 * len` chars).
pub fn random_hex(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| format!("{:02x}", rng.random::<u8>()))
        .collect()
}

/// Generates a fresh session token: 128 bits of randomness, 32 hex chars.
pub fn generate_token() -> SessionToken {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    SessionToken::new(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
}
