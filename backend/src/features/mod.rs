pub mod builder;
pub mod composite;
pub mod frame;
pub mod scaler;

pub use builder::{AlignedSequence, FeatureBuilder, FeatureError, SEQ_LENGTH};
pub use composite::{Backscatter, Compositor, Scene};
pub use frame::{FEATURE_COUNT, FeatureFrame, FrameError};
pub use scaler::StandardScaler;
