//! LSX (XML) format module

pub mod float;
mod reader;
mod writer;

pub use float::{format_f32, format_f64};
pub use reader::{parse_lsx, read_lsx};
pub use writer::{serialize_lsx, serialize_lsx_with_options, write_lsx, LsxWriteOptions};
