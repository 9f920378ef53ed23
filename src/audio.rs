mod decoder;
mod output;
mod playout;
mod power;
mod scheduler;
mod session;

pub use decoder::{AudioDecoder, PcmDecoder, create_decoder};
pub use output::{AudioDeviceInfo, AudioOutput, OutputError, OutputHandle, list_devices};
pub use playout::{DelayMode, DelayModel, PlayoutClock, PlayoutTuning};
pub use power::{AudioGate, PowerMeter};
pub use scheduler::{AudioScheduler, OutputSink, PlayoutEvent, Scheduled, SchedulerConfig};
pub use session::{AudioSession, PacketOutcome};
