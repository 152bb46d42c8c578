use rand::RngCore;
use std::fmt::Write;

/// Raw size of a session identifier before hex rendering.
pub const SESSION_SIZE: usize = 16;

/// Produces a fresh session identifier: `SESSION_SIZE` random bytes rendered
/// as lowercase hex. One is assigned to every accepted connection and echoed
/// back in the connect/quit acknowledgements.
pub fn fresh_session() -> String {
    let mut raw = [0u8; SESSION_SIZE];
    rand::thread_rng().fill_bytes(&mut raw);

    let mut rendered = String::with_capacity(SESSION_SIZE * 2);
    for byte in raw.iter() {
        write!(rendered, "{:02x}", byte).expect("Error rendering session");
    }

    rendered
}
