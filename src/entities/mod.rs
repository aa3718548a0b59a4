pub mod prelude;

pub mod automation_tasks;
pub mod user_settings;
pub mod users;
