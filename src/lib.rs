//! pion_web - embeddable HTTP/1.1 framework
//!
//! A concurrent HTTP server core that applications link against to
//! expose endpoints: a streaming wire-format codec, a connection
//! manager with keep-alive and pipelining, and a request dispatcher
//! with longest-prefix routing, redirects, and pluggable
//! authentication gates.
//!
//! # Quick Start
//!
//! ```no_run
//! use pion_web::{BoxFuture, Connection, Error, HttpServer, Message, RequestHandler, Scheduler, Writer};
//! use std::sync::Arc;
//!
//! struct Hello;
//!
//! impl RequestHandler for Hello {
//!     fn handle<'a>(
//!         &'a self,
//!         request: &'a Message,
//!         conn: &'a mut Connection,
//!     ) -> BoxFuture<'a, Result<(), Error>> {
//!         Box::pin(async move {
//!             let mut writer = Writer::new(conn, request);
//!             writer.response_mut().set_status(200);
//!             writer.write("Hello, world!");
//!             writer.send().await
//!         })
//!     }
//! }
//!
//! fn main() {
//!     let scheduler = Arc::new(Scheduler::single_service(4));
//!     let server = HttpServer::new(scheduler.clone(), "127.0.0.1:8080".parse().unwrap());
//!     server.add_resource("/", Arc::new(Hello));
//!     server.start().unwrap();
//!     server.join();
//!     scheduler.shutdown();
//! }
//! ```
//!
//! # Architecture
//!
//! - [`Scheduler`] owns the I/O reactors and worker threads; servers
//!   register as active users so shutdown drains cleanly.
//! - [`Connection`] owns one socket (plain or TLS), its read buffer,
//!   and the keep-alive / pipelined / close lifecycle.
//! - [`Parser`] turns bytes into [`Message`]s incrementally: request
//!   line, headers, and chunked / length-delimited / until-EOF bodies.
//! - [`Writer`] buffers handler output and emits one monolithic
//!   response or a sequence of HTTP chunks.
//! - [`HttpServer`] accepts connections and dispatches parsed requests
//!   to registered [`RequestHandler`]s by longest matching prefix,
//!   applying redirects and the optional [`AuthGate`] first.

pub(crate) mod http {
    pub(crate) mod auth;
    pub(crate) mod message;
    pub(crate) mod parser;
    pub mod query;
    pub(crate) mod types;
    pub(crate) mod writer;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod server_impl;
}
pub(crate) mod config;
pub(crate) mod errors;
pub mod limits;
pub(crate) mod scheduler;

pub use crate::{
    config::{load_service_config, ServiceRegistry},
    errors::{Error, Field, ParseError},
    http::{
        auth::{AuthGate, BasicAuthGate, CookieAuthGate},
        message::{Message, MultiMap},
        parser::{Parser, Parsing},
        query,
        types::status_message,
        writer::{WriteBuffer, Writer},
    },
    scheduler::Scheduler,
    server::{
        connection::{Connection, HttpStream, Lifecycle},
        server_impl::{
            send_forbidden, send_method_not_allowed, BoxFuture, HttpServer, RequestHandler,
            ServerErrorHandler, Service,
        },
    },
};
