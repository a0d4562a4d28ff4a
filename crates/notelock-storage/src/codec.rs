//! Encrypted note file format: AES-256-GCM with an HKDF-derived per-file key
//! and 4 KiB segments.
//!
//! ```text
//! header  = "NLK" (3) | scheme tag 0x01 (1) | salt (32) | nonce prefix (7)
//! segment = AES-256-GCM ciphertext || 16-byte tag, at most 4096 bytes
//! file    = header || segment_0 || ... || segment_n
//!
//! file key      = HKDF-SHA256(ikm = master key, salt, info = "notelock/aes256-gcm-hkdf-4kb")
//! segment nonce = nonce prefix (7) | segment index u32 BE (4) | last flag (1)
//! AAD           = header
//! ```
//!
//! The last segment is always present (an empty note is one empty segment), so
//! truncating, reordering or splicing segments fails authentication. Files
//! written in this layout must stay readable; new layouts get a new scheme tag.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use notelock_core::error::NoteError;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::key_custodian::{MasterKeyHandle, KEY_SIZE};

pub const MAGIC: &[u8; 3] = b"NLK";
pub const SCHEME_AES256_GCM_HKDF_4KB: u8 = 0x01;
pub const SALT_SIZE: usize = 32;
pub const NONCE_PREFIX_SIZE: usize = 7;
pub const HEADER_SIZE: usize = MAGIC.len() + 1 + SALT_SIZE + NONCE_PREFIX_SIZE;
pub const SEGMENT_SIZE: usize = 4096;
pub const TAG_SIZE: usize = 16;

const PLAINTEXT_SEGMENT_SIZE: usize = SEGMENT_SIZE - TAG_SIZE;
const HKDF_INFO: &[u8] = b"notelock/aes256-gcm-hkdf-4kb";

/// On-disk bytes of an encrypted note.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedNoteFile {
    bytes: Vec<u8>,
}

impl EncryptedNoteFile {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn scheme(&self) -> Option<u8> {
        self.bytes.get(MAGIC.len()).copied()
    }

    pub fn salt(&self) -> Option<&[u8]> {
        self.bytes.get(MAGIC.len() + 1..MAGIC.len() + 1 + SALT_SIZE)
    }

    pub fn nonce_prefix(&self) -> Option<&[u8]> {
        self.bytes.get(HEADER_SIZE - NONCE_PREFIX_SIZE..HEADER_SIZE)
    }

    /// Segment frames after the header (empty when the file is truncated).
    pub fn segments(&self) -> impl Iterator<Item = &[u8]> {
        self.bytes
            .get(HEADER_SIZE..)
            .unwrap_or_default()
            .chunks(SEGMENT_SIZE)
    }
}

impl fmt::Debug for EncryptedNoteFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedNoteFile")
            .field("scheme", &self.scheme())
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Encrypt `plaintext` under a fresh random salt and nonce prefix.
pub fn encrypt(plaintext: &[u8], key: &MasterKeyHandle) -> Result<EncryptedNoteFile, NoteError> {
    let master = key.unlock()?;

    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let mut prefix = [0u8; NONCE_PREFIX_SIZE];
    OsRng.fill_bytes(&mut prefix);

    let mut header = Vec::with_capacity(HEADER_SIZE);
    header.extend_from_slice(MAGIC);
    header.push(SCHEME_AES256_GCM_HKDF_4KB);
    header.extend_from_slice(&salt);
    header.extend_from_slice(&prefix);

    let cipher = file_cipher(master, &salt)?;
    let segments: Vec<&[u8]> = if plaintext.is_empty() {
        vec![plaintext]
    } else {
        plaintext.chunks(PLAINTEXT_SEGMENT_SIZE).collect()
    };
    let last = segments.len() - 1;

    let mut out = Vec::with_capacity(HEADER_SIZE + plaintext.len() + segments.len() * TAG_SIZE);
    out.extend_from_slice(&header);
    for (index, segment) in segments.into_iter().enumerate() {
        let nonce = segment_nonce(&prefix, index, index == last)?;
        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: segment,
                    aad: &header,
                },
            )
            .map_err(|e| NoteError::io(format!("segment encryption failed: {e}")))?;
        out.extend_from_slice(&sealed);
    }

    Ok(EncryptedNoteFile { bytes: out })
}

/// Authenticate every segment, then return the plaintext. Nothing is returned
/// unless the whole file verifies.
pub fn decrypt(file: &EncryptedNoteFile, key: &MasterKeyHandle) -> Result<Vec<u8>, NoteError> {
    let master = key.unlock()?;
    let header = parse_header(&file.bytes)?;
    let cipher = file_cipher(master, header.salt)?;

    let segments: Vec<&[u8]> = file.segments().collect();
    if segments.is_empty() {
        return Err(NoteError::AuthenticationTagMismatch);
    }
    let last = segments.len() - 1;

    let mut plaintext = Vec::with_capacity(file.bytes.len() - HEADER_SIZE);
    for (index, segment) in segments.into_iter().enumerate() {
        let nonce = segment_nonce(header.prefix, index, index == last)?;
        let opened = cipher.decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: segment,
                aad: header.raw,
            },
        );
        match opened {
            Ok(mut chunk) => {
                plaintext.extend_from_slice(&chunk);
                chunk.zeroize();
            }
            Err(_) => {
                plaintext.zeroize();
                return Err(NoteError::AuthenticationTagMismatch);
            }
        }
    }

    Ok(plaintext)
}

/// Check that `file` decrypts under `key` without keeping the plaintext.
pub fn verify(file: &EncryptedNoteFile, key: &MasterKeyHandle) -> Result<(), NoteError> {
    decrypt(file, key).map(|mut plaintext| plaintext.zeroize())
}

struct Header<'a> {
    raw: &'a [u8],
    salt: &'a [u8],
    prefix: &'a [u8],
}

fn parse_header(bytes: &[u8]) -> Result<Header<'_>, NoteError> {
    if !bytes.starts_with(MAGIC) {
        return Err(NoteError::UnsupportedFormat {
            reason: "missing magic".to_string(),
        });
    }
    match bytes.get(MAGIC.len()) {
        Some(&SCHEME_AES256_GCM_HKDF_4KB) => {}
        Some(other) => {
            return Err(NoteError::UnsupportedFormat {
                reason: format!("unknown scheme tag {other:#04x}"),
            })
        }
        None => return Err(NoteError::AuthenticationTagMismatch),
    }
    let raw = bytes
        .get(..HEADER_SIZE)
        .ok_or(NoteError::AuthenticationTagMismatch)?;
    Ok(Header {
        raw,
        salt: &raw[MAGIC.len() + 1..MAGIC.len() + 1 + SALT_SIZE],
        prefix: &raw[HEADER_SIZE - NONCE_PREFIX_SIZE..],
    })
}

fn file_cipher(master: &[u8; KEY_SIZE], salt: &[u8]) -> Result<Aes256Gcm, NoteError> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), master);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(HKDF_INFO, &mut okm)
        .map_err(|e| NoteError::KeyGeneration {
            reason: format!("HKDF expand failed: {e}"),
        })?;
    let cipher = Aes256Gcm::new_from_slice(&okm).map_err(|e| NoteError::KeyGeneration {
        reason: format!("cipher init failed: {e}"),
    });
    okm.zeroize();
    cipher
}

fn segment_nonce(prefix: &[u8], index: usize, last: bool) -> Result<[u8; 12], NoteError> {
    let index = u32::try_from(index).map_err(|_| NoteError::io("note too large to encrypt"))?;
    let mut nonce = [0u8; 12];
    nonce[..NONCE_PREFIX_SIZE].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_SIZE..11].copy_from_slice(&index.to_be_bytes());
    nonce[11] = u8::from(last);
    Ok(nonce)
}
