//! Startup/shutdown sequencing for transport session runtimes
//!
//! Streamed-HTTP mode runs one session context per registry. Contexts are
//! opened in declaration order; every opened context is closed in reverse
//! order on shutdown, and a failed open unwinds the already-opened ones
//! before the error propagates. No context may leak on any exit path.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::errors::AppError;

#[async_trait]
pub trait SessionContext: Send + Sync {
    fn name(&self) -> &'static str;
    async fn open(&self) -> Result<(), AppError>;
    async fn close(&self);
}

pub struct LifecycleManager {
    contexts: Vec<Arc<dyn SessionContext>>,
    opened: Mutex<Vec<Arc<dyn SessionContext>>>,
}

impl LifecycleManager {
    pub fn new(contexts: Vec<Arc<dyn SessionContext>>) -> Self {
        Self {
            contexts,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub async fn open_all(&self) -> Result<(), AppError> {
        for context in &self.contexts {
            if let Err(err) = context.open().await {
                error!(
                    context = context.name(),
                    error = %err,
                    "session context startup failed, unwinding opened contexts"
                );
                self.close_all().await;
                return Err(err);
            }

            info!(context = context.name(), "session context opened");
            self.opened.lock().await.push(context.clone());
        }

        Ok(())
    }

    pub async fn close_all(&self) {
        let mut opened = self.opened.lock().await;
        while let Some(context) = opened.pop() {
            context.close().await;
            info!(context = context.name(), "session context closed");
        }
    }
}
