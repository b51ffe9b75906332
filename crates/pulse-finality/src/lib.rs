pub mod tracker;

pub use tracker::{
    FinalityConfig, FinalityEntry, FinalityEvent, FinalityStatus, FinalityTracker, TrackerStats,
};
