//! Persistent signing key for the gateway's cookie session

use std::fs;
use std::io::prelude::*;
use std::path::Path;
use actix_web::cookie::Key;

/// Reads the key material from `path`, or generates it and writes it there
/// so logins survive a gateway restart.
pub fn get_session_key(path: &str) -> std::io::Result<Key> {
    if Path::new(path).exists() {
        let contents = fs::read(path)?;
        if contents.len() >= 64 {
            return Ok(Key::from(&contents));
        }
        log::warn!("session key at {} is too short, generating a new one", path);
    }

    let key = Key::generate();
    let mut file = fs::File::create(path)?;
    file.write_all(key.master())?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_across_reads() {
        let path = std::env::temp_dir().join(format!("session-key-{}", uuid::Uuid::new_v4()));
        let path = path.to_str().unwrap();

        let first = get_session_key(path).unwrap();
        let second = get_session_key(path).unwrap();
        assert_eq!(first.master(), second.master(), "second read reuses the stored key");

        fs::remove_file(path).unwrap();
    }
}
