//! Server-side identifier generation.

use gavel_protocol::{PlayerId, RoomCode};
use rand::Rng;

/// The alphabet for room codes. Ambiguous characters (I, O, 0, 1) are
/// excluded since codes are typed or read aloud.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generates a random player id: a 32-character hex string (128 bits).
///
/// The id doubles as the bearer reconnection token, so it must be
/// unguessable. 128 bits is enough that collisions and brute-force
/// guesses are both out of reach.
pub(crate) fn generate_player_id() -> PlayerId {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    PlayerId(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

/// Generates a random room code of `len` characters from [`CODE_ALPHABET`].
///
/// Uniqueness against live rooms is the registry's job; this only picks
/// the characters.
pub(crate) fn generate_room_code(len: usize) -> RoomCode {
    let mut rng = rand::rng();
    let code = (0..len)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    RoomCode(code)
}
