pub mod admin;
pub mod artifacts;
pub mod jobs;
pub mod streams;
