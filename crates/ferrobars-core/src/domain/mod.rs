//! Validated value types shared by the pipeline and the read path.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Uppercase ticker |
//! | [`Period`] | Calendar look-back such as `3mo` or `1y` |

mod period;
mod symbol;

pub use period::Period;
pub use symbol::Symbol;
