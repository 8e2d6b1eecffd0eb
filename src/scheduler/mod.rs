//! Scheduling
//!
//! Two cooperating pieces: [`UpdateScheduler`] decides when to pull new
//! content from the feed, and [`PostScheduler`] spreads the pulled posts
//! over randomized publish times inside the window until the next pull
//! (capped at the end of the current day).

pub mod posts;
pub mod update;

pub use posts::PostScheduler;
pub use update::UpdateScheduler;
