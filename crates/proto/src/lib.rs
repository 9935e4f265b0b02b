//! Generated gRPC bindings for the VAD adapter wire protocol.

pub mod v1 {
    tonic::include_proto!("vad.v1");
}
