//! URI decoding and the resolved dispatch target.

mod core;
mod decoder;

pub use self::core::{Invocation, MultipartConfig};
pub use self::decoder::InvocationDecoder;
