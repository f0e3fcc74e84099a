//! Security headers and host allow-listing.

use http::StatusCode;
use tracing::warn;

use super::{BoxFuture, Middleware, Next};
use crate::context::Context;
use crate::error::Error;

/// Adds hardening headers to every response and optionally rejects requests
/// for unknown hosts.
///
/// Defaults:
///
/// | Header | Value |
/// |---|---|
/// | `x-content-type-options` | `nosniff` |
/// | `x-frame-options` | `DENY` |
/// | `referrer-policy` | `no-referrer` |
/// | `x-xss-protection` | `0` |
///
/// `strict-transport-security` and `content-security-policy` are opt-in.
/// Headers are written before the rest of the chain runs, so handlers can
/// still override any of them.
///
/// With at least one [`allow_host`](Security::allow_host) configured, a
/// request whose host (the `Host` header, or the HTTP/2 `:authority`; port
/// ignored) is not on the list is answered with `403 Forbidden` and never
/// reaches the router.
#[derive(Clone, Debug)]
pub struct Security {
    headers: Vec<(&'static str, String)>,
    allowed_hosts: Vec<String>,
}

impl Default for Security {
    fn default() -> Self {
        Self {
            headers: vec![
                ("x-content-type-options", "nosniff".to_owned()),
                ("x-frame-options", "DENY".to_owned()),
                ("referrer-policy", "no-referrer".to_owned()),
                ("x-xss-protection", "0".to_owned()),
            ],
            allowed_hosts: Vec::new(),
        }
    }
}

impl Security {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_options(self, value: &str) -> Self {
        self.header("x-frame-options", value)
    }

    pub fn referrer_policy(self, value: &str) -> Self {
        self.header("referrer-policy", value)
    }

    pub fn content_security_policy(self, value: &str) -> Self {
        self.header("content-security-policy", value)
    }

    /// `strict-transport-security: max-age=<secs>[; includeSubDomains]`.
    pub fn hsts(self, max_age_secs: u64, include_subdomains: bool) -> Self {
        let mut value = format!("max-age={max_age_secs}");
        if include_subdomains {
            value.push_str("; includeSubDomains");
        }
        self.header("strict-transport-security", &value)
    }

    /// Accept requests for this host. Comparison ignores case and port.
    pub fn allow_host(mut self, host: &str) -> Self {
        self.allowed_hosts.push(host.to_ascii_lowercase());
        self
    }

    fn header(mut self, name: &'static str, value: &str) -> Self {
        match self.headers.iter_mut().find(|(n, _)| *n == name) {
            Some((_, current)) => *current = value.to_owned(),
            None => self.headers.push((name, value.to_owned())),
        }
        self
    }

    fn host_allowed(&self, host: Option<&str>) -> bool {
        if self.allowed_hosts.is_empty() {
            return true;
        }
        let Some(host) = host.map(strip_port) else {
            return false;
        };
        self.allowed_hosts.iter().any(|allowed| allowed.eq_ignore_ascii_case(host))
    }
}

/// `example.com:8080` → `example.com`, `[::1]:80` → `[::1]`.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, _)) => name,
        None => host,
    }
}

impl Middleware for Security {
    fn name(&self) -> &'static str {
        "security"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            for (name, value) in &self.headers {
                ctx.response.set_header(name, value)?;
            }

            if !self.host_allowed(ctx.request.host()) {
                warn!(
                    host = ctx.request.host().unwrap_or_default(),
                    path = %ctx.request.path(),
                    "rejecting request for a host that is not allowed"
                );
                ctx.response.set_status_code(StatusCode::FORBIDDEN)?;
                return ctx.response.set_body(());
            }

            next.run(ctx).await
        })
    }
}
