//! Request builder.
//!
//! Turns a [`RequestDescriptor`] plus a body and method into a
//! [`TransportCall`]. The descriptor is a closed enum, so dispatch is explicit:
//!
//! | Descriptor | URL | Transport | Cancel handle |
//! |------------|-----|-----------|---------------|
//! | [`RequestDescriptor::Path`] | the path, `{name}` substituted from the body | configured adapter | yes |
//! | [`RequestDescriptor::PathFn`] | computed from the body | configured adapter | yes |
//! | [`RequestDescriptor::Custom`] | none | the function itself | no |
//!
//! # Examples
//!
//! ```
//! use art_fetch::request::{build_request, RequestDescriptor};
//! use art_fetch::transport::PlainTransport;
//! use art_fetch::config::{ArtSettings, RequestOptions};
//! use art_fetch::types::Method;
//! use std::sync::Arc;
//!
//! let transport = Arc::new(PlainTransport::new(&ArtSettings::default()));
//! let descriptor = RequestDescriptor::from("/users/{id}");
//! let body = serde_json::json!({"id": 7}).as_object().cloned();
//! let built = build_request(&descriptor, body, None, &RequestOptions::default(), None, None, transport);
//! assert_eq!(built.url.as_deref(), Some("/users/7"));
//! assert_eq!(built.method, Some(Method::Get));
//! ```

use crate::config::{ConvertPage, RequestOptions};
use crate::error::Result;
use crate::transport::{self, Transport, TransportCall, TransportKind};
use crate::types::{Body, Method, PageInfo, RawResponse};
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

/// Computes a URL from the request body
pub type PathFn = Arc<dyn Fn(&Body) -> String + Send + Sync>;
/// Performs the whole request itself
pub type CustomFn = Arc<dyn Fn(Body) -> BoxFuture<'static, Result<RawResponse>> + Send + Sync>;

/// What a store requests.
#[derive(Clone)]
pub enum RequestDescriptor {
    /// Literal path or URL template such as `/users/{id}`
    Path(String),
    /// URL computed from the body
    PathFn(PathFn),
    /// Fully custom request bypassing the built-in transports
    Custom(CustomFn),
}

impl RequestDescriptor {
    /// Descriptor computing its URL from the body
    pub fn path_fn<F>(f: F) -> Self
    where
        F: Fn(&Body) -> String + Send + Sync + 'static,
    {
        RequestDescriptor::PathFn(Arc::new(f))
    }

    /// Descriptor performing the request itself
    pub fn custom<F, Fut>(f: F) -> Self
    where
        F: Fn(Body) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RawResponse>> + Send + 'static,
    {
        RequestDescriptor::Custom(Arc::new(move |body| f(body).boxed()))
    }

    /// Identity used for cache keys; only literal paths have one
    pub fn identity(&self) -> Option<&str> {
        match self {
            RequestDescriptor::Path(path) => Some(path),
            _ => None,
        }
    }

    /// Whether the descriptor bypasses the built-in transports
    pub fn is_custom(&self) -> bool {
        matches!(self, RequestDescriptor::Custom(_))
    }
}

impl From<&str> for RequestDescriptor {
    fn from(path: &str) -> Self {
        RequestDescriptor::Path(path.to_string())
    }
}

impl From<String> for RequestDescriptor {
    fn from(path: String) -> Self {
        RequestDescriptor::Path(path)
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestDescriptor::Path(path) => f.debug_tuple("Path").field(path).finish(),
            RequestDescriptor::PathFn(_) => f.write_str("PathFn(..)"),
            RequestDescriptor::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A built request: the call plus what it resolved to.
pub struct BuiltRequest {
    /// The prepared call
    pub call: TransportCall,
    /// Resolved URL, absent for custom descriptors
    pub url: Option<String>,
    /// Effective method, absent for custom descriptors
    pub method: Option<Method>,
    /// Body as sent
    pub body: Option<Body>,
}

impl BuiltRequest {
    /// Adapter that will run the call
    pub fn kind(&self) -> TransportKind {
        self.call.kind()
    }
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid"))
}

/// Default page encoding: `current`, `pageSize` and `nextToken` when present
pub fn encode_page(page: &PageInfo) -> Body {
    let mut body = Body::new();
    body.insert("current".into(), Value::from(page.current));
    body.insert("pageSize".into(), Value::from(page.page_size));
    if let Some(token) = &page.next_token {
        body.insert("nextToken".into(), Value::String(token.clone()));
    }
    body
}

/// Merge page fields ahead of the caller's body; caller fields win.
pub fn merge_page_info(body: Option<Body>, page: &PageInfo, convert_page: Option<&ConvertPage>) -> Body {
    let mut merged = match convert_page {
        Some(convert) => convert(page),
        None => encode_page(page),
    };
    if let Some(body) = body {
        merged.extend(body);
    }
    merged
}

/// Substitute `{name}` placeholders with matching body fields.
///
/// Placeholders without a matching field are left untouched, and substituted
/// fields stay in the body.
pub fn substitute_path(url: &str, body: Option<&Body>) -> String {
    let Some(body) = body else {
        return url.to_string();
    };
    placeholder()
        .replace_all(url, |caps: &regex::Captures<'_>| match body.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => caps[0].to_string(),
            Some(other) => other.to_string(),
        })
        .into_owned()
}

/// Pick the method when none was given: templated URLs GET, otherwise POST
/// when a body is present.
pub fn default_method(url: &str, body: Option<&Body>) -> Method {
    let templated = url.contains('{') && url.contains('}');
    if templated || body.is_none() {
        Method::Get
    } else {
        Method::Post
    }
}

/// Build the call for one attempt sequence.
pub fn build_request(
    descriptor: &RequestDescriptor,
    body: Option<Body>,
    method: Option<Method>,
    options: &RequestOptions,
    page_info: Option<&PageInfo>,
    convert_page: Option<&ConvertPage>,
    transport: Arc<dyn Transport>,
) -> BuiltRequest {
    let body = match page_info {
        Some(page) => Some(merge_page_info(body, page, convert_page)),
        None => body,
    };

    let template = match descriptor {
        RequestDescriptor::Custom(custom) => {
            let custom = Arc::clone(custom);
            let sent = body.clone().unwrap_or_default();
            let payload = sent.clone();
            let request: transport::RequestFn = Arc::new(move || custom(payload.clone()));
            return BuiltRequest {
                call: TransportCall::new(request, None, TransportKind::Custom),
                url: None,
                method: None,
                body: Some(sent),
            };
        }
        RequestDescriptor::Path(path) => path.clone(),
        RequestDescriptor::PathFn(f) => f(body.as_ref().unwrap_or(&Body::new())),
    };

    let method = method.unwrap_or_else(|| default_method(&template, body.as_ref()));
    let url = substitute_path(&template, body.as_ref());
    let body = match body {
        Some(body) => Some(body),
        None if method == Method::Post => Some(Body::new()),
        None => None,
    };

    let call = transport::execute(transport, method, url.clone(), body.clone(), options.clone());
    BuiltRequest {
        call,
        url: Some(url),
        method: Some(method),
        body,
    }
}
