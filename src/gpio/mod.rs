//! IR-cut filter GPIO control

mod filter;
mod line;
mod types;

pub use filter::{IrCutFilter, IrFilterObserver};
pub use line::{
    open_ir_cut_line, DisabledIrCutLine, GpioIrCutLine, IrCutLine, UnavailableIrCutLine,
};
pub use types::{ActiveLevel, IrCutConfig, IrFilterState, LineLevel};
