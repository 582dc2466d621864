//! IR-cut filter control on top of a GPIO line

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use super::line::IrCutLine;
use super::types::{ActiveLevel, IrFilterState, LineLevel};
use crate::error::Result;

/// Shared, read-only view of the last state written to the filter
pub type IrFilterObserver = Arc<RwLock<Option<IrFilterState>>>;

/// Drives the IR-cut filter and remembers what it last wrote.
///
/// The recorded state is updated only after the line write succeeded, so it
/// always matches the physical line. It is `None` until the first write, and
/// stays `None` when no line is configured.
pub struct IrCutFilter {
    line: Box<dyn IrCutLine>,
    active_level: ActiveLevel,
    observed: IrFilterObserver,
}

impl IrCutFilter {
    pub fn new(line: Box<dyn IrCutLine>, active_level: ActiveLevel) -> Self {
        Self {
            line,
            active_level,
            observed: Arc::new(RwLock::new(None)),
        }
    }

    /// Move the filter into `state`
    pub fn apply(&mut self, state: IrFilterState) -> Result<()> {
        if !self.line.is_connected() {
            debug!("No IR-cut line, filter {} ignored", state);
            return Ok(());
        }
        let level = LineLevel::for_state(state, self.active_level);
        self.line.set(level)?;
        *self.observed.write() = Some(state);
        debug!("IR-cut filter {} (line {})", state, level);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.line.is_connected()
    }

    pub fn state(&self) -> Option<IrFilterState> {
        *self.observed.read()
    }

    /// Handle for reading the filter state without the device lock
    pub fn observer(&self) -> IrFilterObserver {
        self.observed.clone()
    }

    pub fn release(&mut self) {
        self.line.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::{DisabledIrCutLine, UnavailableIrCutLine};
    use crate::testing::MockLine;

    #[test]
    fn test_apply_records_state_and_level() {
        let line = MockLine::new();
        let mut filter = IrCutFilter::new(Box::new(line.clone()), ActiveLevel::High);
        assert_eq!(filter.state(), None);

        filter.apply(IrFilterState::Disengaged).unwrap();
        assert_eq!(filter.state(), Some(IrFilterState::Disengaged));
        assert_eq!(line.level(), Some(LineLevel::Low));

        filter.apply(IrFilterState::Engaged).unwrap();
        assert_eq!(filter.observer().read().clone(), Some(IrFilterState::Engaged));
        assert_eq!(line.level(), Some(LineLevel::High));
    }

    #[test]
    fn test_active_low_inverts_line() {
        let line = MockLine::new();
        let mut filter = IrCutFilter::new(Box::new(line.clone()), ActiveLevel::Low);
        filter.apply(IrFilterState::Engaged).unwrap();
        assert_eq!(line.level(), Some(LineLevel::Low));
    }

    #[test]
    fn test_failed_write_keeps_previous_state() {
        let line = MockLine::new();
        let mut filter = IrCutFilter::new(Box::new(line.clone()), ActiveLevel::High);
        filter.apply(IrFilterState::Engaged).unwrap();

        line.fail_writes(true);
        assert!(filter.apply(IrFilterState::Disengaged).is_err());
        assert_eq!(filter.state(), Some(IrFilterState::Engaged));
    }

    #[test]
    fn test_missing_line_records_nothing() {
        let mut filter = IrCutFilter::new(Box::new(DisabledIrCutLine), ActiveLevel::High);
        assert!(!filter.is_connected());

        filter.apply(IrFilterState::Disengaged).unwrap();
        assert_eq!(filter.state(), None);
    }

    #[test]
    fn test_unavailable_line_is_hardware_error() {
        let mut filter = IrCutFilter::new(
            Box::new(UnavailableIrCutLine::new("chip busy")),
            ActiveLevel::High,
        );
        let err = filter.apply(IrFilterState::Engaged).unwrap_err();
        assert!(matches!(err, crate::error::AppError::Hardware(_)));
        assert_eq!(filter.state(), None);
    }
}
