//! Provisioning command channel.
//!
//! A second listener on the shared bus handles structured action
//! messages (user provisioning against the MDaemon mail server, health
//! pings). It is unrelated to the check scheduler beyond sharing the
//! bus; faults are isolated per message so one malformed payload never
//! stops the subscription.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bus::{BusError, MessageBus};

pub const TASKS_CHANNEL: &str = "netadmin_tasks";

#[derive(Debug, Deserialize)]
struct TaskMessage {
    #[serde(default)]
    action: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

pub struct TaskListener {
    /// Directory watched by MDaemon for semaphore trigger files.
    trigger_path: PathBuf,
}

impl TaskListener {
    pub fn new(trigger_path: impl Into<PathBuf>) -> Self {
        Self {
            trigger_path: trigger_path.into(),
        }
    }

    pub async fn start(
        self,
        bus: Arc<dyn MessageBus>,
    ) -> Result<JoinHandle<()>, BusError> {
        let mut subscription = bus.subscribe(TASKS_CHANNEL).await?;

        Ok(tokio::spawn(async move {
            loop {
                match subscription.recv().await {
                    Ok(message) => self.handle_message(&message).await,
                    Err(BusError::Lagged(dropped)) => {
                        warn!(dropped = dropped, "Task subscriber lagged");
                    }
                    Err(e) => {
                        warn!(error = %e, "Task channel closed, listener exiting");
                        break;
                    }
                }
            }
        }))
    }

    async fn handle_message(&self, message: &str) {
        info!(message = %message, "Received task message");
        let task: TaskMessage = match serde_json::from_str(message) {
            Ok(task) => task,
            Err(e) => {
                error!(error = %e, "Error processing task message");
                return;
            }
        };

        match task.action.to_uppercase().as_str() {
            "CREATE_USER" => self.handle_create_user(&task).await,
            "PING" => info!("PING received. System is healthy."),
            other => warn!(action = other, "Unknown action"),
        }
    }

    /// MDaemon picks up `.SEM` semaphore files dropped into its trigger
    /// directory; the file body carries the user details.
    async fn handle_create_user(&self, task: &TaskMessage) {
        let username = task.username.as_deref().unwrap_or("unknown");
        let email = task
            .payload
            .as_ref()
            .and_then(|p| p.get("email"))
            .and_then(Value::as_str)
            .unwrap_or("");

        let now = Utc::now();
        let filename = format!("ADDUSER_{}_{}.SEM", username, now.timestamp_millis());
        let path = self.trigger_path.join(filename);

        let body = format!(
            "Command: CreateUser\nUsername: {username}\nEmail: {email}\nCreated: {now}\n"
        );

        match tokio::fs::write(&path, body).await {
            Ok(()) => info!(path = %path.display(), "Created MDaemon semaphore file"),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to create semaphore file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_user_writes_semaphore_file() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TaskListener::new(dir.path());

        listener
            .handle_message(
                r#"{"action":"CREATE_USER","username":"jdoe","payload":{"email":"jdoe@example.com"}}"#,
            )
            .await;

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let path = entries[0].as_ref().unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("ADDUSER_jdoe_"));
        assert!(name.ends_with(".SEM"));

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("Username: jdoe"));
        assert!(body.contains("Email: jdoe@example.com"));
    }

    #[tokio::test]
    async fn malformed_and_unknown_messages_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TaskListener::new(dir.path());

        listener.handle_message("not json at all").await;
        listener
            .handle_message(r#"{"action":"DELETE_EVERYTHING"}"#)
            .await;
        listener.handle_message(r#"{"action":"PING"}"#).await;

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
