mod decoder;
mod graduation;
mod pipeline;
mod queue;
mod terminal;
mod viewport;

pub use decoder::{RawWaterfallDecoder, SpectralFrame, WaterfallDecoder, create_waterfall_decoder};
pub use graduation::{BAND_PLAN, Band, BandMarker, Graduation, Tick, TickKind, tick_spacing};
pub use pipeline::{
    DrawPipeline, FrameRenderer, RenderRow, SpectrumSmoother, WaterfallConfig, colour_index,
};
pub use queue::{BoundedQueue, FrameQueue};
pub use terminal::LogRenderer;
pub use viewport::{FrequencyAxis, Viewport, ViewportError, ViewportMapper};
