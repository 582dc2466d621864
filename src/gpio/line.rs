//! GPIO output line drivers

use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use tracing::{debug, info};

use super::types::{IrCutConfig, LineLevel};
use crate::error::{AppError, Result};

const GPIO_CONSUMER: &str = "ircam-ircut";

/// A single digital output
pub trait IrCutLine: Send + Sync {
    /// Drive the line. Writing the current level again is harmless.
    fn set(&mut self, level: LineLevel) -> Result<()>;

    /// Give the line back to the kernel
    fn release(&mut self);

    /// `false` when no physical line sits behind this driver
    fn is_connected(&self) -> bool {
        true
    }
}

/// Line requested through the GPIO character device
pub struct GpioIrCutLine {
    chip: String,
    offset: u32,
    handle: Option<LineHandle>,
}

impl GpioIrCutLine {
    /// Request `offset` on `chip` as an output starting at `initial`
    pub fn open(chip: &str, offset: u32, initial: LineLevel) -> Result<Self> {
        info!("Requesting IR-cut GPIO {} line {}", chip, offset);

        let mut gpio_chip = Chip::new(chip)
            .map_err(|e| AppError::Hardware(format!("GPIO chip open failed: {}", e)))?;

        let line = gpio_chip
            .get_line(offset)
            .map_err(|e| AppError::Hardware(format!("GPIO line {} failed: {}", offset, e)))?;

        let handle = line
            .request(LineRequestFlags::OUTPUT, initial.as_value(), GPIO_CONSUMER)
            .map_err(|e| AppError::Hardware(format!("GPIO request failed: {}", e)))?;

        debug!("GPIO line {} configured, initial {}", offset, initial);
        Ok(Self {
            chip: chip.to_string(),
            offset,
            handle: Some(handle),
        })
    }
}

impl IrCutLine for GpioIrCutLine {
    fn set(&mut self, level: LineLevel) -> Result<()> {
        let handle = self.handle.as_ref().ok_or_else(|| {
            AppError::Hardware(format!(
                "GPIO {} line {} already released",
                self.chip, self.offset
            ))
        })?;
        handle
            .set_value(level.as_value())
            .map_err(|e| AppError::Hardware(format!("GPIO set failed: {}", e)))
    }

    fn release(&mut self) {
        if self.handle.take().is_some() {
            debug!("Released GPIO {} line {}", self.chip, self.offset);
        }
    }
}

/// Stand-in used when no IR-cut line is wired up
#[derive(Debug, Default)]
pub struct DisabledIrCutLine;

impl IrCutLine for DisabledIrCutLine {
    fn set(&mut self, level: LineLevel) -> Result<()> {
        debug!("IR-cut line not configured, ignoring write {}", level);
        Ok(())
    }

    fn release(&mut self) {}

    fn is_connected(&self) -> bool {
        false
    }
}

/// A configured line that could not be requested. Every write fails.
#[derive(Debug)]
pub struct UnavailableIrCutLine {
    reason: String,
}

impl UnavailableIrCutLine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl IrCutLine for UnavailableIrCutLine {
    fn set(&mut self, level: LineLevel) -> Result<()> {
        Err(AppError::Hardware(format!(
            "IR-cut line unavailable, cannot drive {}: {}",
            level, self.reason
        )))
    }

    fn release(&mut self) {}
}

/// Open the configured line, or the disabled stand-in when none is configured
pub fn open_ir_cut_line(config: &IrCutConfig, initial: LineLevel) -> Result<Box<dyn IrCutLine>> {
    if !config.is_configured() {
        info!("No IR-cut GPIO configured, filter control disabled");
        return Ok(Box::new(DisabledIrCutLine));
    }
    Ok(Box::new(GpioIrCutLine::open(
        &config.chip,
        config.line,
        initial,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_line_accepts_writes() {
        let mut line = DisabledIrCutLine;
        line.set(LineLevel::High).unwrap();
        line.set(LineLevel::Low).unwrap();
        line.release();
    }

    #[test]
    fn test_unconfigured_opens_disabled_line() {
        let mut line = open_ir_cut_line(&IrCutConfig::default(), LineLevel::High).unwrap();
        assert!(!line.is_connected());
        assert!(line.set(LineLevel::Low).is_ok());
    }

    #[test]
    fn test_unavailable_line_fails_every_write() {
        let mut line = UnavailableIrCutLine::new("no such chip");
        assert!(line.is_connected());
        let err = line.set(LineLevel::Low).unwrap_err();
        assert!(matches!(err, AppError::Hardware(_)));
        assert!(err.to_string().contains("no such chip"));
    }

    #[test]
    fn test_missing_chip_is_hardware_error() {
        let config = IrCutConfig {
            chip: "/dev/gpiochip-does-not-exist".to_string(),
            line: 3,
            ..Default::default()
        };
        let err = open_ir_cut_line(&config, LineLevel::High).err().unwrap();
        assert!(matches!(err, AppError::Hardware(_)));
    }
}
