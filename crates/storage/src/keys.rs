//! Object key layout.
//!
//! Keys are pure functions of `(session_id, index)`, which makes every
//! upload idempotent: re-running a session writes the same keys and
//! overwrites stale objects instead of leaking duplicates.

/// Prefix under which every object of one session lives.
pub fn session_prefix(session_id: &str) -> String {
    format!("sessions/{session_id}")
}

/// Key for one delivered image. `index` is zero-based and stable for
/// the lifetime of the session.
pub fn image_key(session_id: &str, index: usize) -> String {
    format!("{}/images/image_{index}.jpg", session_prefix(session_id))
}

/// Key for the packaged ZIP album of a session.
pub fn album_key(session_id: &str) -> String {
    format!("{}/album.zip", session_prefix(session_id))
}
