//! Job id generation: a unique 16-hex-char id, falling back to a nanosecond
//! timestamp if the secure entropy source fails (§4.C).

/// Generates a 16-hex-char job id from 8 bytes of OS entropy. Falls back to
/// a zero-padded nanosecond timestamp on the rare `getrandom` failure, the
/// literal fallback path §4.C describes.
pub fn generate_job_id() -> String {
    let mut bytes = [0u8; 8];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => bytes.iter().map(|b| format!("{b:02x}")).collect(),
        Err(_) => {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64;
            format!("{nanos:016x}")
        }
    }
}
