//! Health command - backend status over the health socket

use std::time::Duration;

use tracing::debug;

use crate::commands::Command;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::OutputStyle;

pub struct HealthCommand {
    ctx: AppContext,
    watch: bool,
    timeout: Duration,
}

impl HealthCommand {
    pub fn new(ctx: AppContext, watch: bool, timeout: Duration) -> Self {
        Self {
            ctx,
            watch,
            timeout,
        }
    }

    async fn watch(&self) -> CliResult<()> {
        let monitor = self.ctx.health_monitor()?;
        let use_colors = self.ctx.style.use_colors;

        let states = monitor.on_connection_state(move |state| {
            println!("{}", OutputStyle { use_colors }.connection(state));
        });
        let statuses = monitor.on_health_status(move |status| {
            println!("{}", OutputStyle { use_colors }.health(status));
        });
        monitor.connect();

        tokio::signal::ctrl_c().await?;
        debug!("Interrupted, closing health socket");
        states.unsubscribe();
        statuses.unsubscribe();
        monitor.disconnect(true);
        Ok(())
    }

    async fn check_once(&self) -> CliResult<()> {
        let monitor = self.ctx.health_monitor()?;
        let mut updates = monitor.watch_status();
        monitor.connect();

        let received = tokio::time::timeout(self.timeout, async {
            loop {
                if let Some(status) = updates.borrow_and_update().clone() {
                    return Some(status);
                }
                if updates.changed().await.is_err() {
                    return None;
                }
            }
        })
        .await;
        monitor.disconnect(false);

        match received {
            Ok(Some(status)) => {
                println!("{}", self.ctx.style.health(&status));
                Ok(())
            }
            Ok(None) => Err(CliError::Health("health monitor stopped".to_string())),
            Err(_) => Err(CliError::Health(format!(
                "no status from {} within {}s",
                self.ctx.config.api.health_ws_url(),
                self.timeout.as_secs()
            ))),
        }
    }
}

#[async_trait::async_trait]
impl Command for HealthCommand {
    async fn execute(&self) -> CliResult<()> {
        if self.watch {
            self.watch().await
        } else {
            self.check_once().await
        }
    }
}
