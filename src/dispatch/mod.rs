//! Request/response model and the forward, include and error dispatch
//! engine.

pub mod attributes;
mod core;
mod request;
mod response;

pub use self::core::RequestDispatcher;
pub use self::request::{
    DispatchFrame, DispatcherType, HeaderVec, Request, MAX_INLINE_HEADERS,
};
pub use self::response::{Response, ResponsePolicy};
