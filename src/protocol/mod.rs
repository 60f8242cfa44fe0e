pub mod codec;
pub mod error;
pub mod frame;
pub mod session;
pub mod wire;

pub use error::{Error as S7Error, ErrorClass, ErrorCode, Result as S7Result};
