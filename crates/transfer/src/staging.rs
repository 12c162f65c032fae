use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::TransferError;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// StagedBody
// ---------------------------------------------------------------------------

/// An encoded body written to disk, ready to be handed to a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBody {
    path: PathBuf,
    len: u64,
    checksum: String,
}

impl StagedBody {
    /// Writes `body` to a new file in `dir`.
    ///
    /// The file name is the current time in microseconds. A numeric suffix is
    /// appended when a file with that name already exists, so two stagings
    /// never share a path.
    pub fn write(dir: &Path, body: &[u8]) -> Result<Self, TransferError> {
        std::fs::create_dir_all(dir)?;
        let stamp = chrono::Utc::now().timestamp_micros();

        let mut attempt: u32 = 0;
        loop {
            let name = if attempt == 0 {
                format!("{stamp}.tmp")
            } else {
                format!("{stamp}-{attempt}.tmp")
            };
            let path = dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(body)?;
                    file.sync_all()?;
                    debug!(path = %path.display(), bytes = body.len(), "staged upload body");
                    return Ok(Self {
                        path,
                        len: body.len() as u64,
                        checksum: checksum_bytes(body),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// SHA-256 hex digest of the staged bytes.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Re-reads the file and checks it still matches what was staged.
    pub fn verify(&self) -> Result<(), TransferError> {
        if calculate_file_checksum(&self.path)? != self.checksum {
            return Err(TransferError::Encoding(format!(
                "staged body {} changed on disk",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Deletes the staged file. A file that is already gone is not an error.
    pub fn remove(&self) -> Result<(), TransferError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
