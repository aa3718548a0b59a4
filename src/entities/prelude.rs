pub use super::automation_tasks::Entity as AutomationTasks;
pub use super::user_settings::Entity as UserSettings;
pub use super::users::Entity as Users;
