//! Command-name based message dispatch
//!
//! Handlers are plain synchronous callbacks. They run on the dispatching
//! task, in registration order, after the handler table lock has been
//! released, so a handler may register further handlers. Handlers that
//! need to do async work spawn a task.

use shared::Message;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Default)]
pub struct MessageRouter {
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Vec<Handler>>> {
        self.handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a handler for `command`
    pub fn register<F>(&self, command: impl Into<String>, handler: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.table().entry(command.into()).or_default().push(Arc::new(handler));
    }

    /// Invoke every handler registered for the message's command
    ///
    /// # Returns
    /// Number of handlers invoked; messages without handlers are dropped
    pub fn dispatch(&self, message: &Message) -> usize {
        let handlers = match self.table().get(&message.command) {
            Some(handlers) => handlers.clone(),
            None => return 0,
        };

        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }

    pub fn handler_count(&self, command: &str) -> usize {
        self.table().get(command).map_or(0, Vec::len)
    }

    pub fn unregister_all(&self) {
        self.table().clear();
    }
}
