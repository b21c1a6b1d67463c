mod accumulator;
mod controller;
pub mod delta;
mod frames;

pub use accumulator::Capture;
pub use controller::{RelayController, RelayOutcome};
pub use frames::{DONE_SENTINEL, Frame, FrameReassembler, encode_data_frame, encode_done_frame};
