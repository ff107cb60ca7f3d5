mod http;
mod process;

pub use http::HttpExecutor;
pub use process::ProcessExecutor;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::Result;

/// A fully built translation request, ready to dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// GET `url` and return the body
    Http { url: String },
    /// Run `program` with `args` and return its standard output
    Process { program: String, args: Vec<String> },
}

/// Strategy that turns a [`Request`] into raw backend output
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the request to completion.
    ///
    /// Transport failures resolve to an empty string; only failures to start
    /// the request at all are errors.
    async fn dispatch(&self, request: &Request) -> Result<String>;
}

/// Routes each request to the strategy matching its kind
pub struct Dispatcher {
    http: HttpExecutor,
    process: ProcessExecutor,
}

impl Dispatcher {
    pub const fn new(http: HttpExecutor, process: ProcessExecutor) -> Self {
        Self { http, process }
    }

    /// Build both strategies from configuration
    pub fn from_config(config: &AppConfig) -> Result<Arc<Self>> {
        let http = HttpExecutor::new(&config.http, config.max_in_flight)?;
        let process = ProcessExecutor::new(config.max_in_flight);
        Ok(Arc::new(Self::new(http, process)))
    }
}

#[async_trait]
impl Executor for Dispatcher {
    async fn dispatch(&self, request: &Request) -> Result<String> {
        match request {
            Request::Http { url } => Ok(self.http.get(url).await),
            Request::Process { program, args } => self.process.run(program, args).await,
        }
    }
}
