// skyctl-core: Property synchronization, command dispatch, and device controllers for INDIGO servers.

pub mod astro;
pub mod ccd;
pub mod command;
pub mod config;
pub mod error;
pub mod model;
pub mod mount;
pub mod pointing;
pub mod session;
pub mod simulator;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use ccd::{
    AcquisitionPhase, AcquisitionProgress, AcquisitionReport, Binning, CcdController, CcdSettings,
    ExposureRequest, FileImageSink, FrameType, ImageFrame, ImageSink, MemoryImageSink, UploadMode,
};
pub use command::{Clock, Command, ElapsedTimer, Expectation, TokioClock};
pub use config::SessionConfig;
pub use error::CoreError;
pub use model::{
    Device, DeviceConnection, Element, ElementValue, Property, PropertyId, PropertyKey,
    PropertyListItem, WriteType,
};
pub use mount::{
    AlignmentMethod, Direction, MountCommand, MountController, MountOutcome, MountSettings,
    MountStatus, PierSide, SlewRate, SyncPoint, SyncPointLog,
};
pub use pointing::{ModelConfig, PointingModel, SyncGrid};
pub use session::{ConnectionState, NewPropertyValue, Session};
pub use simulator::{Simulator, SimulatorConfig};
pub use store::PropertyStore;
pub use stream::SnapshotStream;

// Wire-level state enums are part of the public model.
pub use skyctl_api::{PropertyPerm, PropertyState, PropertyType};
