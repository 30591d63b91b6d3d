//! HTTP server: acceptor, per-connection serve loop, and the
//! prefix-routed dispatcher with redirects and the authentication gate.

use crate::{
    errors::Error,
    http::{
        auth::AuthGate,
        message::Message,
        parser::{Parser, Parsing},
        types,
        writer::Writer,
    },
    limits::{ConnLimits, ParserLimits, ServerLimits},
    scheduler::Scheduler,
    server::connection::{Connection, HttpStream, Lifecycle},
};
use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    future::Future,
    io::{self, BufReader},
    net::SocketAddr,
    path::Path,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Condvar, Mutex,
    },
};
use bytes::Bytes;
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A registered resource handler.
///
/// Invoked after a request is fully parsed; expected to construct a
/// response through a [`Writer`] and send it. Returning without having
/// produced a response yields a `500` to the client.
pub trait RequestHandler: Send + Sync {
    fn handle<'a>(
        &'a self,
        request: &'a Message,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

/// A handler that additionally accepts configuration options, the
/// contract config-file-bound services satisfy.
pub trait Service: RequestHandler {
    fn set_option(&self, name: &str, _value: &str) -> Result<(), Error> {
        Err(Error::BadOption(name.to_string()))
    }
}

/// Handler for the `500` path; receives the error text.
pub trait ServerErrorHandler: Send + Sync {
    fn handle<'a>(
        &'a self,
        request: &'a Message,
        conn: &'a mut Connection,
        error_msg: &'a str,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

// DEFAULT HANDLERS

const BAD_REQUEST_HTML: &str = "<html><head>\n\
     <title>400 Bad Request</title>\n\
     </head><body>\n\
     <h1>Bad Request</h1>\n\
     <p>Your browser sent a request that this server could not understand.</p>\n\
     </body></html>\n";

const NOT_FOUND_HTML_START: &str = "<html><head>\n\
     <title>404 Not Found</title>\n\
     </head><body>\n\
     <h1>Not Found</h1>\n\
     <p>The requested URL ";
const NOT_FOUND_HTML_FINISH: &str = " was not found on this server.</p>\n\
     </body></html>\n";

const SERVER_ERROR_HTML_START: &str = "<html><head>\n\
     <title>500 Server Error</title>\n\
     </head><body>\n\
     <h1>Internal Server Error</h1>\n\
     <p>The server encountered an internal error: <strong>";
const SERVER_ERROR_HTML_FINISH: &str = "</strong></p>\n\
     </body></html>\n";

const FORBIDDEN_HTML_START: &str = "<html><head>\n\
     <title>403 Forbidden</title>\n\
     </head><body>\n\
     <h1>Forbidden</h1>\n\
     <p>User not authorized to access the requested URL ";
const FORBIDDEN_HTML_FINISH: &str = "</p>\n\
     </body></html>\n";

struct DefaultBadRequest;

impl RequestHandler for DefaultBadRequest {
    fn handle<'a>(
        &'a self,
        request: &'a Message,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let mut writer = Writer::new(conn, request);
            writer.response_mut().set_status(types::STATUS_BAD_REQUEST);
            writer
                .response_mut()
                .change_header(types::HEADER_CONTENT_TYPE, types::CONTENT_TYPE_HTML);
            writer.write_shared(Bytes::from_static(BAD_REQUEST_HTML.as_bytes()));
            writer.send().await
        })
    }
}

struct DefaultNotFound;

impl RequestHandler for DefaultNotFound {
    fn handle<'a>(
        &'a self,
        request: &'a Message,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let resource = types::xml_encode(request.resource());
            let mut writer = Writer::new(conn, request);
            writer.response_mut().set_status(types::STATUS_NOT_FOUND);
            writer
                .response_mut()
                .change_header(types::HEADER_CONTENT_TYPE, types::CONTENT_TYPE_HTML);
            writer.write_shared(Bytes::from_static(NOT_FOUND_HTML_START.as_bytes()));
            writer.write(resource);
            writer.write_shared(Bytes::from_static(NOT_FOUND_HTML_FINISH.as_bytes()));
            writer.send().await
        })
    }
}

struct DefaultServerError;

impl ServerErrorHandler for DefaultServerError {
    fn handle<'a>(
        &'a self,
        request: &'a Message,
        conn: &'a mut Connection,
        error_msg: &'a str,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let escaped = types::xml_encode(error_msg);
            let mut writer = Writer::new(conn, request);
            writer.response_mut().set_status(types::STATUS_SERVER_ERROR);
            writer
                .response_mut()
                .change_header(types::HEADER_CONTENT_TYPE, types::CONTENT_TYPE_HTML);
            writer.write_shared(Bytes::from_static(SERVER_ERROR_HTML_START.as_bytes()));
            writer.write(escaped);
            writer.write_shared(Bytes::from_static(SERVER_ERROR_HTML_FINISH.as_bytes()));
            writer.send().await
        })
    }
}

/// Sends the stock `403 Forbidden` page.
pub async fn send_forbidden(
    request: &Message,
    conn: &mut Connection,
    error_msg: &str,
) -> Result<(), Error> {
    let resource = types::xml_encode(error_msg);
    let mut writer = Writer::new(conn, request);
    writer.response_mut().set_status(types::STATUS_FORBIDDEN);
    writer
        .response_mut()
        .change_header(types::HEADER_CONTENT_TYPE, types::CONTENT_TYPE_HTML);
    writer.write_shared(Bytes::from_static(FORBIDDEN_HTML_START.as_bytes()));
    writer.write(resource);
    writer.write_shared(Bytes::from_static(FORBIDDEN_HTML_FINISH.as_bytes()));
    writer.send().await
}

/// Sends a `405 Method Not Allowed` carrying an `Allow:` header.
pub async fn send_method_not_allowed(
    request: &Message,
    conn: &mut Connection,
    allowed_methods: &str,
) -> Result<(), Error> {
    let mut writer = Writer::new(conn, request);
    writer
        .response_mut()
        .set_status(types::STATUS_METHOD_NOT_ALLOWED);
    writer
        .response_mut()
        .change_header(types::HEADER_ALLOW, allowed_methods);
    writer
        .response_mut()
        .change_header(types::HEADER_CONTENT_TYPE, types::CONTENT_TYPE_HTML);
    writer.write("<html><head>\n<title>405 Method Not Allowed</title>\n</head><body>\n");
    writer.write("<h1>Not Allowed</h1>\n<p>The requested method is not allowed on this server.</p>\n");
    writer.write("</body></html>\n");
    writer.send().await
}

// SERVER

struct ConnectionSet {
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
    drained: Condvar,
    next_id: AtomicU64,
}

impl ConnectionSet {
    fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            drained: Condvar::new(),
            next_id: AtomicU64::new(0),
        }
    }

    fn wait_drained(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        while !tasks.is_empty() {
            tasks = self.drained.wait(tasks).unwrap();
        }
    }

    fn abort_all(&self) {
        for task in self.tasks.lock().unwrap().values() {
            task.abort();
        }
    }
}

/// Removes the connection from the server's set when its task ends,
/// whether it finished or was aborted.
struct ConnGuard {
    id: u64,
    inner: Arc<Inner>,
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        let mut tasks = self.inner.connections.tasks.lock().unwrap();
        tasks.remove(&self.id);
        if tasks.is_empty() {
            self.inner.connections.drained.notify_all();
        }
    }
}

struct Inner {
    scheduler: Arc<Scheduler>,
    endpoint: SocketAddr,
    local_addr: Mutex<Option<SocketAddr>>,
    tls: Mutex<Option<TlsAcceptor>>,
    resources: Mutex<BTreeMap<String, Arc<dyn RequestHandler>>>,
    redirects: Mutex<HashMap<String, String>>,
    auth: Mutex<Option<Arc<dyn AuthGate>>>,
    bad_request: Mutex<Arc<dyn RequestHandler>>,
    not_found: Mutex<Arc<dyn RequestHandler>>,
    server_error: Mutex<Arc<dyn ServerErrorHandler>>,
    before_starting: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    conn_limits: ConnLimits,
    parser_limits: ParserLimits,
    server_limits: ServerLimits,
    running: AtomicBool,
    stopped: (Mutex<bool>, Condvar),
    accept_task: Mutex<Option<JoinHandle<()>>>,
    connections: ConnectionSet,
}

/// An embeddable HTTP/1.1 server bound to one TCP endpoint.
///
/// Cloning is cheap and shares the same server.
#[derive(Clone)]
pub struct HttpServer {
    inner: Arc<Inner>,
}

impl HttpServer {
    /// A server for `endpoint` with default limits.
    pub fn new(scheduler: Arc<Scheduler>, endpoint: SocketAddr) -> Self {
        Self::with_limits(
            scheduler,
            endpoint,
            ParserLimits::default(),
            ConnLimits::default(),
            ServerLimits::default(),
        )
    }

    pub fn with_limits(
        scheduler: Arc<Scheduler>,
        endpoint: SocketAddr,
        parser_limits: ParserLimits,
        conn_limits: ConnLimits,
        server_limits: ServerLimits,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                scheduler,
                endpoint,
                local_addr: Mutex::new(None),
                tls: Mutex::new(None),
                resources: Mutex::new(BTreeMap::new()),
                redirects: Mutex::new(HashMap::new()),
                auth: Mutex::new(None),
                bad_request: Mutex::new(Arc::new(DefaultBadRequest)),
                not_found: Mutex::new(Arc::new(DefaultNotFound)),
                server_error: Mutex::new(Arc::new(DefaultServerError)),
                before_starting: Mutex::new(None),
                conn_limits,
                parser_limits,
                server_limits,
                running: AtomicBool::new(false),
                stopped: (Mutex::new(true), Condvar::new()),
                accept_task: Mutex::new(None),
                connections: ConnectionSet::new(),
            }),
        }
    }

    /// Enables server-side TLS from a PEM file holding the certificate
    /// chain and private key.
    pub fn set_ssl_key_file(&self, pem_path: &Path) -> Result<(), Error> {
        let acceptor = tls_acceptor(pem_path)?;
        *self.inner.tls.lock().unwrap() = Some(acceptor);
        Ok(())
    }

    /// Registers a handler for a resource prefix.
    pub fn add_resource(&self, resource: &str, handler: Arc<dyn RequestHandler>) {
        let clean = types::strip_trailing_slash(resource).to_string();
        info!("added request handler for HTTP resource: {clean}");
        self.inner.resources.lock().unwrap().insert(clean, handler);
    }

    pub fn remove_resource(&self, resource: &str) {
        let clean = types::strip_trailing_slash(resource);
        info!("removed request handler for HTTP resource: {clean}");
        self.inner.resources.lock().unwrap().remove(clean);
    }

    /// Rewrites requests for one resource to another before dispatch.
    pub fn add_redirect(&self, requested_resource: &str, new_resource: &str) {
        let from = types::strip_trailing_slash(requested_resource).to_string();
        let to = types::strip_trailing_slash(new_resource).to_string();
        info!("added redirection for HTTP resource {from} to resource {to}");
        self.inner.redirects.lock().unwrap().insert(from, to);
    }

    /// Installs the authentication gate run before every dispatch.
    pub fn set_auth(&self, gate: Arc<dyn AuthGate>) {
        *self.inner.auth.lock().unwrap() = Some(gate);
    }

    pub fn set_bad_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        *self.inner.bad_request.lock().unwrap() = handler;
    }

    pub fn set_not_found_handler(&self, handler: Arc<dyn RequestHandler>) {
        *self.inner.not_found.lock().unwrap() = handler;
    }

    pub fn set_server_error_handler(&self, handler: Arc<dyn ServerErrorHandler>) {
        *self.inner.server_error.lock().unwrap() = handler;
    }

    /// Hook invoked after bind, before the acceptor starts.
    pub fn set_before_starting<F: FnOnce() + Send + 'static>(&self, hook: F) {
        *self.inner.before_starting.lock().unwrap() = Some(Box::new(hook));
    }

    /// Bound address once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Binds the endpoint and starts accepting connections.
    pub fn start(&self) -> Result<(), Error> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.inner.stopped.0.lock().unwrap() = false;
        self.inner.scheduler.add_active_user();

        let listener = match bind_listener(
            self.inner.endpoint,
            self.inner.server_limits.listen_backlog,
        )
        .and_then(|l| l.local_addr().map(|addr| (l, addr)))
        {
            Ok(bound) => bound,
            Err(err) => {
                self.inner.running.store(false, Ordering::SeqCst);
                self.inner.scheduler.remove_active_user();
                *self.inner.stopped.0.lock().unwrap() = true;
                return Err(Error::Io(err));
            }
        };
        let (listener, local) = listener;
        *self.inner.local_addr.lock().unwrap() = Some(local);

        if let Some(hook) = self.inner.before_starting.lock().unwrap().take() {
            hook();
        }
        info!("starting server on {local}");

        let reactor = self.inner.scheduler.acquire_io();
        let task = reactor.spawn(accept_loop(self.inner.clone(), listener));
        *self.inner.accept_task.lock().unwrap() = Some(task);
        Ok(())
    }

    /// Closes the acceptor and either waits for connections to drain or
    /// cancels them, then releases the scheduler.
    pub fn stop(&self, wait_until_drained: bool) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("shutting down server on {:?}", self.local_addr());

        if let Some(task) = self.inner.accept_task.lock().unwrap().take() {
            task.abort();
        }
        if !wait_until_drained {
            self.inner.connections.abort_all();
        }
        self.inner.connections.wait_drained();
        self.inner.scheduler.remove_active_user();

        let (lock, cvar) = &self.inner.stopped;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    /// Blocks the calling thread until the server has stopped.
    pub fn join(&self) {
        let (lock, cvar) = &self.inner.stopped;
        let mut stopped = lock.lock().unwrap();
        while !*stopped {
            stopped = cvar.wait(stopped).unwrap();
        }
    }
}

/// Opens, configures, and binds the acceptor socket.
fn bind_listener(endpoint: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    use socket2::{Domain, Protocol, Socket, Type};

    let socket = Socket::new(Domain::for_address(endpoint), Type::STREAM, Some(Protocol::TCP))?;
    #[cfg(not(windows))]
    socket.set_reuse_address(true)?;
    socket.bind(&endpoint.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Loads a PEM key/certificate file into a TLS acceptor.
fn tls_acceptor(pem_path: &Path) -> Result<TlsAcceptor, Error> {
    let mut reader = BufReader::new(File::open(pem_path).map_err(Error::Io)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::Io)?;

    let mut reader = BufReader::new(File::open(pem_path).map_err(Error::Io)?);
    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(Error::Io)?
        .ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no private key found in PEM file",
            ))
        })?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, err)))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

async fn accept_loop(inner: Arc<Inner>, listener: std::net::TcpListener) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to register acceptor: {err}");
            return;
        }
    };

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("accepted connection from {peer}");
                let id = inner.connections.next_id.fetch_add(1, Ordering::Relaxed);
                // a connection is pinned to one reactor for its lifetime
                let reactor = inner.scheduler.acquire_io();
                let task = reactor.spawn(serve_connection(inner.clone(), id, stream, peer));
                inner.connections.tasks.lock().unwrap().insert(id, task);
            }
            Err(err) => {
                debug!("accept failed: {err}");
            }
        }
    }
}

async fn serve_connection(inner: Arc<Inner>, id: u64, stream: TcpStream, peer: SocketAddr) {
    let _guard = ConnGuard {
        id,
        inner: inner.clone(),
    };

    let Ok(local) = stream.local_addr() else {
        return;
    };

    let tls = inner.tls.lock().unwrap().clone();
    let stream = match tls {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => HttpStream::Tls(Box::new(tls_stream)),
            Err(err) => {
                warn!("{} from {peer}", Error::TlsHandshake(err));
                return;
            }
        },
        None => HttpStream::Plain(stream),
    };

    let mut conn = Connection::new(stream, peer, local, &inner.conn_limits);
    while serve_one(&inner, &mut conn).await {}
}

/// Serves one request cycle; returns whether the connection is reusable.
async fn serve_one(inner: &Arc<Inner>, conn: &mut Connection) -> bool {
    conn.clear_responded();
    let mut parser = Parser::request(&inner.parser_limits);
    let mut request = Message::request();
    request.set_remote_ip(Some(conn.remote_addr().ip()));

    // pipelined bytes saved by the previous cycle come first
    let (mut start, mut end) = conn.load_read_position();
    conn.save_read_position(0, 0);
    let mut leftover = None;

    loop {
        if start < end {
            let outcome = parser.parse(&mut request, &conn.buffer()[start..end]);
            match outcome {
                Ok(Parsing::Complete) => {
                    let consumed = start + parser.bytes_consumed();
                    if consumed < end {
                        leftover = Some((consumed, end));
                    }
                    break;
                }
                Ok(Parsing::NeedMore) => {
                    start = end;
                }
                Err(err) => {
                    info!("invalid HTTP request ({err})");
                    conn.set_lifecycle(Lifecycle::Close);
                    let handler = inner.bad_request.lock().unwrap().clone();
                    if let Err(err) = handler.handle(&request, conn).await {
                        debug!("bad-request handler failed: {err}");
                    }
                    conn.finish().await;
                    return false;
                }
            }
        } else {
            match conn.read_some().await {
                Ok(0) => {
                    if parser.total_bytes_read() == 0 {
                        debug!("lost connection from {}", conn.remote_addr());
                    } else {
                        // premature EOF mid-message: emit nothing, release
                        debug!("connection closed mid-request from {}", conn.remote_addr());
                    }
                    conn.set_lifecycle(Lifecycle::Close);
                    conn.finish().await;
                    return false;
                }
                Ok(n) => {
                    start = 0;
                    end = n;
                }
                Err(err) => {
                    match err {
                        Error::Closed => debug!("lost connection from {}", conn.remote_addr()),
                        Error::Timeout => info!("read timeout from {}", conn.remote_addr()),
                        _ => info!("transport error from {}: {err}", conn.remote_addr()),
                    }
                    conn.set_lifecycle(Lifecycle::Close);
                    conn.finish().await;
                    return false;
                }
            }
        }
    }

    if let Some((mark_start, mark_end)) = leftover {
        conn.save_read_position(mark_start, mark_end);
    }

    let keep_alive = request.should_keep_alive();
    conn.set_lifecycle(match (keep_alive, leftover.is_some()) {
        (false, _) => Lifecycle::Close,
        (true, true) => Lifecycle::Pipelined,
        (true, false) => Lifecycle::KeepAlive,
    });

    dispatch(inner, &mut request, conn).await;
    conn.finish().await
}

async fn dispatch(inner: &Arc<Inner>, request: &mut Message, conn: &mut Connection) {
    debug!("received a valid HTTP request for {}", request.resource());

    let stripped = types::strip_trailing_slash(request.resource()).to_string();
    if stripped != request.resource() {
        request.change_resource(stripped.clone());
    }
    let mut resource = stripped;

    // apply redirect rewrites, bounded
    let mut redirect_count = 0u32;
    loop {
        let target = inner.redirects.lock().unwrap().get(&resource).cloned();
        let Some(target) = target else { break };
        redirect_count += 1;
        if redirect_count > inner.server_limits.max_redirects {
            error!(
                "maximum number of redirects exceeded for requested resource: {}",
                request.original_resource()
            );
            let message = Error::MaxRedirects(inner.server_limits.max_redirects).to_string();
            server_error(inner, request, conn, &message).await;
            return;
        }
        request.change_resource(target.clone());
        resource = target;
    }

    let gate = inner.auth.lock().unwrap().clone();
    if let Some(gate) = gate {
        match gate.handle_request(request, conn).await {
            Ok(true) => {}
            Ok(false) => {
                // the gate already produced its own response
                debug!("authentication required for HTTP resource: {resource}");
                return;
            }
            Err(err) => {
                error!("authentication gate failed: {err}");
                let message = err.to_string();
                server_error(inner, request, conn, &message).await;
                return;
            }
        }
    }

    let handler = find_request_handler(&inner.resources.lock().unwrap(), &resource);
    match handler {
        Some(handler) => {
            debug!("found request handler for HTTP resource: {resource}");
            match handler.handle(request, conn).await {
                Ok(()) if conn.has_responded() => {}
                Ok(()) => {
                    server_error(inner, request, conn, "handler did not produce a response").await;
                }
                Err(err) if err.is_transport() => {
                    debug!("lost connection during response: {err}");
                    conn.set_lifecycle(Lifecycle::Close);
                }
                Err(err) => {
                    error!("HTTP request handler: {err}");
                    let message = err.to_string();
                    server_error(inner, request, conn, &message).await;
                }
            }
        }
        None => {
            info!("no HTTP request handlers found for resource: {resource}");
            let handler = inner.not_found.lock().unwrap().clone();
            if let Err(err) = handler.handle(request, conn).await {
                debug!("not-found handler failed: {err}");
            }
        }
    }
}

async fn server_error(inner: &Arc<Inner>, request: &Message, conn: &mut Connection, message: &str) {
    conn.set_lifecycle(Lifecycle::Close);
    let handler = inner.server_error.lock().unwrap().clone();
    if let Err(err) = handler.handle(request, conn, message).await {
        debug!("server-error handler failed: {err}");
    }
}

/// Longest-prefix-with-boundary lookup: a registered prefix matches when
/// the resource continues with end-of-string or `/`; the empty prefix is
/// the catch-all fallback.
fn find_request_handler(
    resources: &BTreeMap<String, Arc<dyn RequestHandler>>,
    resource: &str,
) -> Option<Arc<dyn RequestHandler>> {
    for (prefix, handler) in resources
        .range::<str, _>((std::ops::Bound::Unbounded, std::ops::Bound::Included(resource)))
        .rev()
    {
        if prefix.is_empty() {
            return Some(handler.clone());
        }
        if resource.starts_with(prefix.as_str())
            && (resource.len() == prefix.len() || resource.as_bytes()[prefix.len()] == b'/')
        {
            return Some(handler.clone());
        }
    }
    None
}

#[cfg(test)]
mod lookup_tests {
    use super::*;

    struct Nop;
    impl RequestHandler for Nop {
        fn handle<'a>(
            &'a self,
            _request: &'a Message,
            _conn: &'a mut Connection,
        ) -> BoxFuture<'a, Result<(), Error>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn table(prefixes: &[&str]) -> (BTreeMap<String, Arc<dyn RequestHandler>>, Vec<Arc<dyn RequestHandler>>) {
        let mut map = BTreeMap::new();
        let mut handlers = Vec::new();
        for prefix in prefixes {
            let handler: Arc<dyn RequestHandler> = Arc::new(Nop);
            handlers.push(handler.clone());
            map.insert(prefix.to_string(), handler);
        }
        (map, handlers)
    }

    #[test]
    fn longest_prefix_with_boundary() {
        let (map, handlers) = table(&["", "/api", "/api/v1"]);

        #[rustfmt::skip]
        let cases = [
            ("/api/v1/x",  Some(2)),
            ("/api/v1",    Some(2)),
            ("/api/other", Some(1)),
            ("/api",       Some(1)),
            ("/apiary",    Some(0)),  // no boundary after "/api"
            ("/foo",       Some(0)),
            ("/",          Some(0)),
        ];

        for (resource, expected) in cases {
            let found = find_request_handler(&map, resource);
            match expected {
                Some(index) => {
                    let found = found.unwrap_or_else(|| panic!("no handler for {resource}"));
                    assert!(
                        Arc::ptr_eq(&found, &handlers[index]),
                        "wrong handler for {resource}"
                    );
                }
                None => assert!(found.is_none(), "unexpected handler for {resource}"),
            }
        }
    }

    #[test]
    fn no_fallback_means_miss() {
        let (map, handlers) = table(&["/api"]);

        assert!(find_request_handler(&map, "/foo").is_none());
        assert!(find_request_handler(&map, "/apiary").is_none());
        assert!(Arc::ptr_eq(
            &find_request_handler(&map, "/api/x").unwrap(),
            &handlers[0]
        ));
    }

    #[test]
    fn empty_table_never_matches() {
        let map = BTreeMap::new();
        assert!(find_request_handler(&map, "/anything").is_none());
    }
}
