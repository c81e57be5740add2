//! Well-known request attribute names exposed during sub-dispatch.

pub const FORWARD_REQUEST_URI: &str = "javax.servlet.forward.request_uri";
pub const FORWARD_CONTEXT_PATH: &str = "javax.servlet.forward.context_path";
pub const FORWARD_SERVLET_PATH: &str = "javax.servlet.forward.servlet_path";
pub const FORWARD_PATH_INFO: &str = "javax.servlet.forward.path_info";
pub const FORWARD_QUERY_STRING: &str = "javax.servlet.forward.query_string";

pub const INCLUDE_REQUEST_URI: &str = "javax.servlet.include.request_uri";
pub const INCLUDE_CONTEXT_PATH: &str = "javax.servlet.include.context_path";
pub const INCLUDE_SERVLET_PATH: &str = "javax.servlet.include.servlet_path";
pub const INCLUDE_PATH_INFO: &str = "javax.servlet.include.path_info";
pub const INCLUDE_QUERY_STRING: &str = "javax.servlet.include.query_string";

pub const ERROR_STATUS_CODE: &str = "javax.servlet.error.status_code";
pub const ERROR_EXCEPTION_TYPE: &str = "javax.servlet.error.exception_type";
pub const ERROR_MESSAGE: &str = "javax.servlet.error.message";
pub const ERROR_REQUEST_URI: &str = "javax.servlet.error.request_uri";
pub const ERROR_SERVLET_NAME: &str = "javax.servlet.error.servlet_name";
