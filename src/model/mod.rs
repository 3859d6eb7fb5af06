mod types;
pub mod wire;

pub use types::{
    filename_from_path, Analytics, Direction, Lane, LaneChangeEvent, PersistedViolation,
    SchemaError, UploadResult, ViolationEvent, ViolationIdentity,
};
pub use wire::TimestampValue;
