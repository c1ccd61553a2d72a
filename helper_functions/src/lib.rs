pub mod misc;
pub mod verifier;
