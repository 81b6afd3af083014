// Geotrail Android JNI Library
// Exposes the geotrail capture pipeline to Kotlin via JNI

pub mod android_jni;
pub mod capture_bridge;
pub mod error;
pub mod sensor_receiver;
pub mod session;

pub use capture_bridge::PolledCaptureTrigger;
pub use error::{BridgeError, JResult};
pub use sensor_receiver::{CameraSample, LocationSample};
pub use session::AndroidSession;
