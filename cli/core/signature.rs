use sha2::Digest;
use sha2::Sha256;
use std::path::Path;
use tracing::*;

pub type Signature = String;

fn sha256_hex(bytes: &[u8]) -> Signature {
    let mut s = Sha256::new();
    s.update(bytes);
    format!("{:x}", s.finalize())
}

/// Digest of a file's bytes, as lowercase hex.
///
/// Returns the empty string when the file cannot be read. That is distinct
/// from the digest of an empty file, which is a full-length digest.
pub fn file_signature(path: impl AsRef<Path>) -> Signature {
    let path = path.as_ref();
    match std::fs::read(path) {
        Ok(bytes) => sha256_hex(&bytes),
        Err(err) => {
            trace!("Could not read {:?} for hashing: {:?}", path, err);
            Signature::new()
        }
    }
}

/// Digest of a command string.
pub fn command_signature(command: &str) -> Signature {
    sha256_hex(command.as_bytes())
}

/// The rebuild trigger for a whole target: the command, followed by every
/// input's digest in declared order, each prefixed with a literal `|`.
/// The separator is part of the wire format; changing it changes digests.
pub fn target_signature(command: &str, inputs: &[String]) -> Signature {
    let mut combined = command.to_string();
    for input in inputs {
        combined.push('|');
        combined.push_str(&file_signature(input));
    }
    sha256_hex(combined.as_bytes())
}
