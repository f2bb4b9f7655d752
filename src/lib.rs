//! Core protocol types for RTSP-based streaming: the `Transport` header
//! codec, an H.264 sequence parameter set decoder, and an RTP reorder
//! buffer.
//!
//! This crate deliberately does no I/O and manages no sessions; it turns
//! bytes into typed values (and back) so a client or server built on top
//! of it can stay focused on transport plumbing.

pub mod h264;
pub mod headers;
pub mod rtp;
