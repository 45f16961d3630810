pub mod alert;
pub mod config_listener;
pub mod prober;
pub mod scheduler;
pub mod task_listener;
pub mod transition;
