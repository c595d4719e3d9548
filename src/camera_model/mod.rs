pub mod generic;
pub mod pinhole;

pub use generic::CameraModel;
pub use pinhole::PinholeCamera;
