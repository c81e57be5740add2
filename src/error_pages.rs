//! Error-page resolution and rendering.
//!
//! A failed request resolves to an error page by precedence: the error's
//! type chain walked most-specific first (exact name, then simple name),
//! then the response status code, then the app's default location. A matched
//! page is rendered by an error dispatch into the app; anything else falls
//! back to a built-in HTML page, detailed in development mode and generic in
//! production.

use crate::dispatch::attributes::{
    ERROR_EXCEPTION_TYPE, ERROR_MESSAGE, ERROR_REQUEST_URI, ERROR_SERVLET_NAME, ERROR_STATUS_CODE,
};
use crate::dispatch::{Request, Response};
use crate::error::DispatchError;
use crate::webapp::WebApp;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

fn simple_name(type_name: &str) -> &str {
    type_name
        .rsplit(['.', ':'])
        .next()
        .unwrap_or(type_name)
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn status_reason(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

/// Per-web-app table of error-page locations.
pub struct ErrorPageManager {
    by_type: HashMap<String, String>,
    by_status: HashMap<u16, String>,
    default_location: Option<String>,
    dev_mode: bool,
}

impl ErrorPageManager {
    pub fn new(dev_mode: bool) -> Self {
        Self {
            by_type: HashMap::new(),
            by_status: HashMap::new(),
            default_location: None,
            dev_mode,
        }
    }

    pub fn set_dev_mode(&mut self, dev_mode: bool) {
        self.dev_mode = dev_mode;
    }

    pub fn add_error_page_for_type(&mut self, type_name: &str, location: &str) {
        self.by_type
            .insert(type_name.to_string(), location.to_string());
    }

    pub fn add_error_page_for_status(&mut self, status: u16, location: &str) {
        self.by_status.insert(status, location.to_string());
    }

    pub fn set_default_location(&mut self, location: &str) {
        self.default_location = Some(location.to_string());
    }

    /// Resolve the page location for an error by precedence: exact type
    /// name up the ancestry chain, then simple type name up the chain, then
    /// status code, then the default.
    pub fn resolve_location(&self, error: &DispatchError, status: u16) -> Option<&str> {
        let types = error.error_types();
        for type_name in &types {
            if let Some(location) = self.by_type.get(type_name.as_str()) {
                return Some(location);
            }
        }
        for type_name in &types {
            if let Some(location) = self.by_type.get(simple_name(type_name)) {
                return Some(location);
            }
        }
        if let Some(location) = self.by_status.get(&status) {
            return Some(location);
        }
        self.default_location.as_deref()
    }

    /// Status-code error entry point: resolves and renders like a dispatch
    /// failure with that status. A 304 carries no body by contract.
    pub fn send_error(
        &self,
        status: u16,
        message: &str,
        req: &mut Request,
        res: &mut Response,
        web_app: Option<&Arc<WebApp>>,
    ) {
        if status == 304 {
            res.reset_buffer();
            res.set_status(status);
            return;
        }
        let error = DispatchError::status(status, message);
        self.send_servlet_error(&error, req, res, web_app);
    }

    /// Route a dispatch failure to its error page, falling back to the
    /// built-in page when no page matches or the page itself fails.
    pub fn send_servlet_error(
        &self,
        error: &DispatchError,
        req: &mut Request,
        res: &mut Response,
        web_app: Option<&Arc<WebApp>>,
    ) {
        if error.is_client_disconnect() {
            return;
        }
        let status = error.status_code();

        // Already inside an error dispatch: render directly rather than
        // recursing through another error page.
        if req.get_attribute(ERROR_STATUS_CODE).is_some() {
            tracing::warn!(
                request_id = %req.id,
                status,
                error = %error,
                "error raised inside an error page"
            );
            self.render_default(error, status, req, res);
            return;
        }

        if let DispatchError::Unavailable {
            permanent: false,
            retry_after_secs,
            ..
        } = error
        {
            if let Some(secs) = retry_after_secs {
                res.set_header("Retry-After", secs.to_string());
            }
        }

        let location = self.resolve_location(error, status).map(str::to_string);
        if let (Some(location), Some(web_app)) = (location, web_app) {
            match web_app.get_request_dispatcher(&location) {
                Ok(dispatcher) => {
                    res.set_has_error(true);
                    res.reset_buffer();
                    res.set_status(status);
                    req.set_attribute(ERROR_STATUS_CODE, Value::from(status));
                    req.set_attribute(ERROR_MESSAGE, Value::String(error.to_string()));
                    if let Some(type_name) = error.error_types().first() {
                        req.set_attribute(
                            ERROR_EXCEPTION_TYPE,
                            Value::String(type_name.clone()),
                        );
                    }
                    req.set_attribute(ERROR_REQUEST_URI, Value::String(req.uri().to_string()));
                    if let Some(name) = req.servlet_name() {
                        req.set_attribute(ERROR_SERVLET_NAME, Value::String(name.to_string()));
                    }
                    tracing::debug!(
                        request_id = %req.id,
                        status,
                        location = %location,
                        "dispatching to error page"
                    );
                    match dispatcher.error(req, res) {
                        Ok(()) => return,
                        Err(page_err) => {
                            tracing::warn!(
                                location = %location,
                                error = %page_err,
                                "error page failed"
                            );
                        }
                    }
                }
                Err(resolve_err) => {
                    tracing::warn!(
                        location = %location,
                        error = %resolve_err,
                        "error page did not resolve"
                    );
                }
            }
        }

        self.render_default(error, status, req, res);
    }

    fn render_default(
        &self,
        error: &DispatchError,
        status: u16,
        req: &mut Request,
        res: &mut Response,
    ) {
        res.reset_buffer();
        res.set_status_with_reason(status, status_reason(status));
        res.set_content_type("text/html; charset=utf-8");

        let reason = status_reason(status);
        res.println("<html><head>");
        res.println(&format!("<title>{status} {reason}</title>"));
        res.println("</head><body>");
        res.println(&format!("<h1>{status} {reason}</h1>"));
        if self.dev_mode {
            res.println(&format!("<p>{}</p>", html_escape(&error.to_string())));
            res.println(&format!(
                "<p><code>{}</code></p>",
                html_escape(req.uri())
            ));
        } else {
            let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
            res.println(&format!("<p><small>{timestamp}</small></p>"));
        }
        res.println("</body></html>");

        // Old MSIE replaces short error bodies with its own page; pad past
        // its threshold.
        if req
            .get_header("User-Agent")
            .map(|ua| ua.contains("MSIE"))
            .unwrap_or(false)
        {
            res.print("<!-- ");
            for _ in 0..64 {
                res.print("padding ");
            }
            res.println("-->");
        }
    }
}
