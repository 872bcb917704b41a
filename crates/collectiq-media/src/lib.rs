//! Media plumbing for the carrier leg: wire frames, playback framing,
//! streaming TTS, live STT and turn detection.

pub mod framing;
pub mod stt;
pub mod tts_stream;
pub mod turn;
pub mod twilio;
