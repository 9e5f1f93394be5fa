// crypto.rs - AES-128-CTR payload decryption for ELL-II frames

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;

use crate::*;

pub const AES_KEY_SIZE: usize = 16;
pub const IV_SIZE: usize = 16;

pub type DecryptedPayload = heapless::Vec<u8, MAX_PACKET_SIZE>;

/// Counter block for the frame.
///
/// ```text
/// [0..8]   M-field + A-field   frame[2..10]
/// [8]      CC                  frame[11]
/// [9..13]  session number      frame[13..17]
/// [13..16] 0x00, counter runs big-endian from here
/// ```
pub fn build_iv(frame: &[u8]) -> Option<[u8; IV_SIZE]> {
    if frame.len() < CIPHER_OFFSET {
        return None;
    }
    let mut iv = [0u8; IV_SIZE];
    iv[0..8].copy_from_slice(&frame[OFFSET_M_FIELD..OFFSET_M_FIELD + 8]);
    iv[8] = frame[OFFSET_CI_FIELD];
    iv[9..13].copy_from_slice(&frame[OFFSET_ACCESS_NO..OFFSET_ACCESS_NO + 4]);
    Some(iv)
}

/// Decrypt `frame[17 .. L-1]`, giving `L - 18` plaintext bytes.
pub fn decrypt_payload(
    frame: &[u8],
    key: &[u8; AES_KEY_SIZE],
) -> Result<DecryptedPayload, FrameError> {
    let l_field = *frame.first().ok_or(FrameError::Truncated { have: 0, need: 1 })? as usize;
    let end = l_field.saturating_sub(CRC_SIZE - 1);
    if end <= CIPHER_OFFSET {
        debug!("Crypto: no ciphertext in L={} frame", l_field);
        return Err(FrameError::NoCiphertext);
    }
    if frame.len() < end {
        return Err(FrameError::Truncated {
            have: frame.len(),
            need: end,
        });
    }
    let iv = build_iv(frame).ok_or(FrameError::Truncated {
        have: frame.len(),
        need: CIPHER_OFFSET,
    })?;

    let mut plain = DecryptedPayload::new();
    plain
        .extend_from_slice(&frame[CIPHER_OFFSET..end])
        .map_err(|_| FrameError::Crypto("ciphertext longer than buffer"))?;

    let mut cipher = Ctr128BE::<Aes128>::new(key.into(), &iv.into());
    cipher
        .try_apply_keystream(&mut plain)
        .map_err(|_| FrameError::Crypto("keystream exhausted"))?;

    trace!("Crypto: plaintext[{}]: {:02X?}", plain.len(), plain.as_slice());
    Ok(plain)
}


// EOF
