//! Persistence layer: JSON documents on disk.

pub mod json;
pub mod model;
pub mod profiles;

pub use json::JsonStore;
pub use model::{CollegeRegistry, DEFAULT_LANGUAGE, OTHER_COLLEGE, UserProfile};
pub use profiles::{Profiles, Registry};
