//! Origin allow-list, checked on the handshake request.
//!
//! # Design Decisions
//! - The host part of `Origin` is compared byte for byte, no case folding
//! - A missing `Origin` compares as the empty string and is refused
//! - Refusal answers 403 and closes without upgrading; the rest of the
//!   chain never sees the request

use std::net::SocketAddr;
use std::rc::Rc;

use hyper::header::ORIGIN;
use hyper::{StatusCode, Uri};

use crate::events::{EventDispatcher, ServerEvent};
use crate::stack::{reject, Handshake, HttpComponent, HttpResponse};

/// Hosts that are always allowed when the check is active.
pub const DEFAULT_ORIGINS: [&str; 2] = ["localhost", "127.0.0.1"];

pub struct OriginCheck {
    inner: Rc<dyn HttpComponent>,
    allowed: Vec<String>,
    dispatcher: Rc<EventDispatcher>,
}

impl OriginCheck {
    /// Wrap `inner`, allowing only the default origins for now.
    pub fn new(inner: Rc<dyn HttpComponent>, dispatcher: Rc<EventDispatcher>) -> Self {
        Self {
            inner,
            allowed: DEFAULT_ORIGINS.iter().map(|origin| origin.to_string()).collect(),
            dispatcher,
        }
    }

    /// Append an allowed origin host. Only possible while the layer is still
    /// owned by the builder.
    pub fn allow_origin(&mut self, origin: impl Into<String>) {
        self.allowed.push(origin.into());
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed
    }

    /// Whether the raw `Origin` header value is allowed.
    pub fn is_allowed(&self, origin: &str) -> bool {
        let host = origin_host(origin);
        self.allowed.iter().any(|allowed| *allowed == host)
    }

    fn refuse(&self, origin: &str, peer: SocketAddr) -> HttpResponse {
        tracing::warn!(peer = %peer, origin = %origin, "Origin not allowed, closing connection");
        self.dispatcher
            .dispatch(&ServerEvent::ClientRejected { origin, peer });
        reject(StatusCode::FORBIDDEN, "Origin not allowed")
    }
}

impl HttpComponent for OriginCheck {
    fn name(&self) -> &'static str {
        "origin-check"
    }

    fn on_open(&self, handshake: Handshake) -> HttpResponse {
        let origin = handshake
            .request
            .headers()
            .get(ORIGIN)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        if self.is_allowed(origin) {
            return self.inner.on_open(handshake);
        }
        self.refuse(origin, handshake.peer)
    }
}

/// Host of an origin such as `http://localhost:8080`, or the value itself when
/// it has no recognisable host.
pub fn origin_host(origin: &str) -> String {
    origin
        .parse::<Uri>()
        .ok()
        .and_then(|uri| uri.host().map(str::to_owned))
        .unwrap_or_else(|| origin.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::testing::{handshake, RecordingHttp};
    use std::cell::RefCell;

    fn check(extra: &[&str]) -> (OriginCheck, Rc<RecordingHttp>, Rc<RefCell<Vec<String>>>) {
        let inner = Rc::new(RecordingHttp::default());
        let dispatcher = Rc::new(EventDispatcher::new());
        let rejected = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&rejected);
        dispatcher.subscribe(move |event| {
            if let ServerEvent::ClientRejected { origin, .. } = event {
                sink.borrow_mut().push(origin.to_string());
            }
        });

        let mut check = OriginCheck::new(inner.clone(), dispatcher);
        for origin in extra {
            check.allow_origin(*origin);
        }
        (check, inner, rejected)
    }

    #[test]
    fn host_extraction() {
        assert_eq!(origin_host("http://localhost"), "localhost");
        assert_eq!(origin_host("https://127.0.0.1:8443"), "127.0.0.1");
        assert_eq!(origin_host("http://evil.example/path"), "evil.example");
        assert_eq!(origin_host(""), "");
    }

    #[test]
    fn defaults_always_present() {
        let (check, _, _) = check(&["app.example", "app.example"]);
        assert_eq!(
            check.allowed_origins(),
            ["localhost", "127.0.0.1", "app.example", "app.example"]
        );
    }

    #[test]
    fn localhost_is_delegated() {
        let (check, inner, rejected) = check(&[]);

        let response = check.on_open(handshake(&[("origin", "http://localhost")]));

        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(inner.opened.borrow().len(), 1);
        assert!(rejected.borrow().is_empty());
    }

    #[test]
    fn unknown_origin_is_refused_and_reported() {
        let (check, inner, rejected) = check(&["app.example"]);

        let response = check.on_open(handshake(&[("origin", "http://evil.example")]));

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["connection"], "close");
        assert!(inner.opened.borrow().is_empty());
        assert_eq!(*rejected.borrow(), vec!["http://evil.example"]);
    }

    #[test]
    fn missing_origin_is_refused() {
        let (check, inner, rejected) = check(&[]);

        let response = check.on_open(handshake(&[]));

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(inner.opened.borrow().is_empty());
        assert_eq!(*rejected.borrow(), vec![""]);
    }

    #[test]
    fn match_is_case_sensitive() {
        let (check, _, _) = check(&["App.Example"]);

        assert!(check.is_allowed("https://App.Example"));
        assert!(!check.is_allowed("https://app.example"));
        assert!(!check.is_allowed("http://LOCALHOST"));
    }

    #[test]
    fn registered_origin_is_accepted() {
        let (check, inner, _) = check(&["app.example"]);

        let response = check.on_open(handshake(&[("origin", "https://app.example:3000")]));

        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(inner.opened.borrow().len(), 1);
    }
}
