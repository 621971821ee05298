use std::{fs::File, io, path::Path};

use blake2::{digest::typenum::U32, Blake2b, Digest};

/// BLAKE2b with a 256-bit output.
type Blake2b256 = Blake2b<U32>;

/// Hex-encoded blake2b-256 digest of the file at `path`.
///
/// The file is streamed through the hasher and never held in memory as a whole.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut hasher = Blake2b256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
