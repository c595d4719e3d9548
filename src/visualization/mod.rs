pub mod annotate;
pub mod bridge;
pub mod viewer;

pub use bridge::{
    latest_channel, FrameImage, LatestReceiver, LatestSender, MapSnapshot, SendOutcome,
    ViewerChannels, VisualizationBridge,
};
pub use viewer::spawn_viewer;
