pub mod settings;
pub mod task;
pub mod user;
