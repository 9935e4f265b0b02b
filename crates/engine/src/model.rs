//! Embedded Silero VAD v5 model.

/// Silero VAD v5 ONNX graph, embedded at build time.
///
/// BUILD REQUIREMENT: the model file must exist at
/// `crates/engine/models/silero_vad.onnx` before compiling with
/// `--features onnx`. Download it once from the Silero VAD release assets
/// (~2 MB); a missing file fails the build with "couldn't read
/// silero_vad.onnx".
pub(crate) static SILERO_MODEL: &[u8] =
    include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/models/silero_vad.onnx"));
