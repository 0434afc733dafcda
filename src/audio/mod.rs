//! Audio capture, per-frame DSP, utterance recording and barge-in.

pub mod barge;
pub mod capture;
pub mod probe;
pub mod recorder;
pub mod ring_buffer;

pub use barge::{BargeGate, BargeInListener, BargeMonitor, BargeParams, LeakBaseline};
pub use capture::{list_devices, resolve_input_device, start_block_stream, start_capture};
pub use probe::{FrameVad, VoiceActivity, VoiceDecision};
pub use recorder::{MicRecorder, RecordProfile, Utterance, UtteranceSource};
pub use ring_buffer::{sample_ring_buffer, SampleConsumer, SampleProducer};
