pub mod dates;
pub mod events;
pub mod scoring;
