//! Caller-facing handle: blocking pulls, a stdin sink and kill requests.

mod error;
mod process;
mod stdin;

pub use error::*;
pub use process::*;
pub use stdin::Stdin;
