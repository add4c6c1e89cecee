pub mod children;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod filter;
pub mod memory;
pub mod milestones;
pub mod models;
pub mod mutations;
pub mod palette;
pub mod pg;
pub mod photos;
pub mod rest;
pub mod store;
pub mod timeline;

pub use children::ChildService;
pub use config::BitsConfig;
pub use error::BitsError;
pub use feed::{CacheVersion, FeedOutcome, FeedState, Timeline, TimelineFeed};
pub use filter::BitFilter;
pub use memory::MemoryStore;
pub use milestones::MilestoneService;
pub use mutations::BitMutations;
pub use pg::PgStore;
pub use photos::FsPhotoStore;
pub use rest::{RestBackend, RestConfig};
pub use store::{BitStore, ChildStore, Identity, MilestoneStore, Page, PhotoStore, Transcriber};
pub use timeline::{group_by_month, MonthGroup};
