//! Static file serving.

use std::path::{Path, PathBuf};

use http::StatusCode;
use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use tracing::debug;

use super::{BoxFuture, Middleware, Next};
use crate::context::Context;
use crate::error::Error;
use crate::method::Method;
use crate::response::ContentType;

/// Serves files below `root` for requests under a URL prefix.
///
/// A `GET` or `HEAD` whose path starts with the prefix is mapped onto the
/// filesystem. If a file exists there (or, for a directory, its index file)
/// the response is filled in right away and the router never runs. Everything
/// else, including paths that try to climb out of `root` with `..`, goes on
/// down the chain.
///
/// ```rust,no_run
/// use sprig::middleware::StaticFiles;
///
/// let assets = StaticFiles::new("/assets", "./public").cache_control("public, max-age=3600");
/// ```
#[derive(Clone, Debug)]
pub struct StaticFiles {
    prefix: String,
    root: PathBuf,
    index: Option<String>,
    cache_control: Option<String>,
}

impl StaticFiles {
    pub fn new(prefix: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_owned(),
            root: root.into(),
            index: Some("index.html".to_owned()),
            cache_control: None,
        }
    }

    /// File served for directory requests. Defaults to `index.html`.
    pub fn index(mut self, file: &str) -> Self {
        self.index = Some(file.to_owned());
        self
    }

    /// Never serve directories.
    pub fn no_index(mut self) -> Self {
        self.index = None;
        self
    }

    /// `cache-control` value sent with every served file.
    pub fn cache_control(mut self, value: &str) -> Self {
        self.cache_control = Some(value.to_owned());
        self
    }

    /// The part of `path` below the prefix, or `None` when it is outside.
    fn relative<'p>(&self, path: &'p str) -> Option<&'p str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') || self.prefix.is_empty() {
            Some(rest.trim_start_matches('/'))
        } else {
            // `/assetsfoo` is not under `/assets`.
            None
        }
    }

    /// Joins `relative` onto the root, refusing anything that could escape it.
    fn candidate(&self, relative: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for part in relative.split('/') {
            match part {
                "" | "." => continue,
                ".." => return None,
                p if p.contains('\\') || Path::new(p).is_absolute() => return None,
                p => path.push(p),
            }
        }
        Some(path)
    }

    async fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let path = self.candidate(relative)?;
        let meta = tokio::fs::metadata(&path).await.ok()?;
        if meta.is_file() {
            return Some(path);
        }
        if meta.is_dir() {
            let index = path.join(self.index.as_deref()?);
            let meta = tokio::fs::metadata(&index).await.ok()?;
            return meta.is_file().then_some(index);
        }
        None
    }
}

impl Middleware for StaticFiles {
    fn name(&self) -> &'static str {
        "static"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if !matches!(ctx.request.method(), Method::Get | Method::Head) {
                return next.run(ctx).await;
            }
            let Some(relative) = self.relative(ctx.request.path()).map(str::to_owned) else {
                return next.run(ctx).await;
            };
            let Some(file) = self.resolve(&relative).await else {
                debug!(path = %ctx.request.path(), "no static file, passing on");
                return next.run(ctx).await;
            };

            let contents = tokio::fs::read(&file).await?;
            let content_type = file
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(ContentType::OctetStream, ContentType::from_extension);

            debug!(file = %file.display(), len = contents.len(), "serving static file");
            ctx.response.set_status_code(StatusCode::OK)?;
            ctx.response.set_header(CONTENT_TYPE.as_str(), content_type.as_str())?;
            if let Some(value) = &self.cache_control {
                ctx.response.set_header(CACHE_CONTROL.as_str(), value)?;
            }
            ctx.response.set_body(contents)
        })
    }
}
