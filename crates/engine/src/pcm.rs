//! PCM s16le decoding.

/// Convert PCM s16le bytes to f32 samples normalized to `[-1.0, 1.0)`.
///
/// Divides by 32768 (not 32767) so that the full `i16` range maps to
/// `[-1.0, ~0.99997]`: `i16::MIN` lands exactly on `-1.0` and no value
/// leaves the unit interval. A trailing odd byte must have been rejected by
/// the caller; this function only sees complete sample pairs.
pub fn s16le_to_f32(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect()
}
