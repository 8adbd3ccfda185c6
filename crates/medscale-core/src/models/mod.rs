//! Domain models for clinical scales.

mod calculation;
mod draft;
mod localized;
mod rule;
mod scale;
mod variable;

pub use calculation::*;
pub use draft::*;
pub use localized::*;
pub use rule::*;
pub use scale::*;
pub use variable::*;
