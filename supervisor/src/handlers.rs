//! Built-in command handlers
//!
//! | command     | effect                                                      |
//! |-------------|-------------------------------------------------------------|
//! | `heartbeat` | none beyond the liveness refresh done on receipt            |
//! | `status`    | replies to the sender with the health report                |
//! | `restart`   | restarts the process named in `data.process`                |
//! | `shutdown`  | shuts the supervisor down when addressed to it              |
//!
//! Handlers run synchronously on the main loop, so anything async is
//! spawned onto the runtime.

use serde_json::json;
use shared::messages::{HEARTBEAT_COMMAND, SHUTDOWN_COMMAND};
use shared::{process_debug, process_info, process_warn, Message};

use crate::supervisor::Supervisor;

pub const STATUS_COMMAND: &str = "status";
pub const RESTART_COMMAND: &str = "restart";

/// Register the built-in handlers on `supervisor`
///
/// The handlers hold clones of the supervisor; `shutdown` unregisters them.
pub fn register_builtin_handlers(supervisor: &Supervisor) {
    supervisor.register_handler(HEARTBEAT_COMMAND, |message: &Message| {
        process_debug!(message.source, "💓 Heartbeat");
    });

    let status = supervisor.clone();
    supervisor.register_handler(STATUS_COMMAND, move |request: &Message| {
        let supervisor = status.clone();
        let request = request.clone();
        tokio::spawn(async move {
            let report = supervisor.health_report().await;
            let data = json!({
                "healthy": report.is_healthy(),
                "report": report,
                "text": report.to_string(),
            });
            let reply = Message::response_to(&request, data);
            if let Err(e) = supervisor.send_message(&request.source, &reply).await {
                process_warn!(request.source, "⚠️ Status reply not delivered: {}", e);
            }
        });
    });

    let restart = supervisor.clone();
    supervisor.register_handler(RESTART_COMMAND, move |request: &Message| {
        let Some(name) = request.data.get("process").and_then(|v| v.as_str()).map(str::to_string) else {
            process_warn!(request.source, "⚠️ Restart request without data.process");
            return;
        };
        let supervisor = restart.clone();
        tokio::spawn(async move {
            match supervisor.restart(&name).await {
                Ok(pid) => process_info!(name, "🔄 Restarted on request (pid {})", pid),
                Err(e) => process_warn!(name, "⚠️ Requested restart failed: {}", e),
            }
        });
    });

    let shutdown = supervisor.clone();
    supervisor.register_handler(SHUTDOWN_COMMAND, move |request: &Message| {
        if request.target != shutdown.settings().supervisor_name {
            return;
        }
        process_info!(request.source, "🛑 Shutdown requested");
        let supervisor = shutdown.clone();
        tokio::spawn(async move { supervisor.shutdown().await });
    });
}
