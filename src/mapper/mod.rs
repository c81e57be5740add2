//! URI-to-chain resolution: pattern tables, servlet and filter mapping, and
//! the rewrite hook.

mod filter;
mod rewrite;
mod servlet;
mod url_map;

pub use self::filter::{FilterMapper, FilterMapping};
pub use self::rewrite::RewriteDispatch;
pub use self::servlet::{ServletMapper, ServletRegistration};
pub use self::url_map::{UrlMap, UrlMatch, UrlPattern};
