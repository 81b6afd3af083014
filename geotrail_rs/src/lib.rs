//! Geotagged photo capture and delivery pipeline.
//!
//! A [`Session`] schedules captures by time or distance travelled, tags each
//! frame with the best recent location fix, persists it, and hands it to a
//! background uploader that may downsample before sending.

pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod geodesy;
pub mod health_monitor;
pub mod live_status;
pub mod location_fusion;
pub mod metadata;
pub mod processing;
pub mod queue;
pub mod remote;
pub mod scheduler;
pub mod sensors;
pub mod session;
pub mod stats;
pub mod storage;
pub mod types;
pub mod upload;

pub use capture::{
    CameraParams, CaptureJob, CaptureTrigger, DeviceInfo, FlashMode, FrameCallback, WhiteBalance,
};
pub use codec::{ImageCodec, JpegCodec};
pub use config::SessionConfig;
pub use error::{CaptureResult, GeotrailError};
pub use live_status::LiveStatus;
pub use location_fusion::LocationFusion;
pub use metadata::PhotoTags;
pub use remote::{DirectoryRemote, HttpRemote, RemoteStore};
pub use scheduler::ScheduleMode;
pub use session::{Collaborators, FixSink, LocationFeed, Session, SessionState};
pub use stats::StatsSnapshot;
pub use storage::{LocalPhotoStore, PhotoStore};
pub use types::{Fix, LocationSource, Orientation};
