//! Host power control

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::{AppError, Result};

/// Delay between answering the request and running the command
pub const POWER_COMMAND_DELAY: Duration = Duration::from_millis(500);

/// Power-off and reboot of the host
#[async_trait]
pub trait PowerControl: Send + Sync {
    async fn power_off(&self) -> Result<()>;
    async fn reboot(&self) -> Result<()>;
}

/// Runs configured system commands (`sudo poweroff`, `sudo reboot`)
pub struct SystemPower {
    power_off_command: Vec<String>,
    reboot_command: Vec<String>,
    delay: Duration,
}

impl SystemPower {
    pub fn new(power_off_command: Vec<String>, reboot_command: Vec<String>) -> Self {
        Self {
            power_off_command,
            reboot_command,
            delay: POWER_COMMAND_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Schedule `command` in the background and return immediately
    fn schedule(&self, action: &'static str, command: &[String]) -> Result<()> {
        let (program, args) = command.split_first().ok_or_else(|| {
            AppError::Config(format!("{} command is not configured", action))
        })?;

        let program = program.clone();
        let args = args.to_vec();
        let delay = self.delay;

        info!("Scheduling {} in {:?}: {} {}", action, delay, program, args.join(" "));
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match Command::new(&program).args(&args).status().await {
                Ok(status) if status.success() => info!("{} command finished", action),
                Ok(status) => warn!("{} command exited with {}", action, status),
                Err(e) => error!("Failed to run {} command '{}': {}", action, program, e),
            }
        });
        Ok(())
    }
}

#[async_trait]
impl PowerControl for SystemPower {
    async fn power_off(&self) -> Result<()> {
        self.schedule("power-off", &self.power_off_command)
    }

    async fn reboot(&self) -> Result<()> {
        self.schedule("reboot", &self.reboot_command)
    }
}
