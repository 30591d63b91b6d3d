//! Boot-time service configuration file.
//!
//! One command per line; blank lines and `#` comments are ignored:
//!
//! ```text
//! path /usr/local/share/services
//! service /api api-service
//! option /api timeout=30
//! auth cookie
//! restrict /api
//! user mike secret
//! ```
//!
//! Services are resolved by name against a per-server [`ServiceRegistry`]
//! passed in by the embedding application; there is no process-global
//! registry and no dynamic loading.

use crate::{
    errors::Error,
    http::auth::{AuthGate, BasicAuthGate, CookieAuthGate},
    http::message::Message,
    server::{
        connection::Connection,
        server_impl::{BoxFuture, HttpServer, RequestHandler, Service},
    },
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::info;

type ServiceFactory = Box<dyn Fn() -> Arc<dyn Service> + Send + Sync>;

/// Named service factories plus the resource search path.
pub struct ServiceRegistry {
    factories: HashMap<String, ServiceFactory>,
    search_path: Vec<PathBuf>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            search_path: Vec::new(),
        }
    }

    /// Registers a factory under a service name.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Service> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Instantiates a service by name.
    pub fn create(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.factories.get(name).map(|factory| factory())
    }

    /// Extends the directory list consulted when resolving resources.
    pub fn add_search_path(&mut self, dir: impl Into<PathBuf>) {
        self.search_path.push(dir.into());
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapter binding an `Arc<dyn Service>` into the server's handler table.
struct BoundService(Arc<dyn Service>);

impl RequestHandler for BoundService {
    fn handle<'a>(
        &'a self,
        request: &'a Message,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<(), Error>> {
        self.0.handle(request, conn)
    }
}

fn bad_config(line: usize, reason: impl Into<String>) -> Error {
    Error::BadConfig {
        line,
        reason: reason.into(),
    }
}

/// Parses `config_path` and applies it: binds services to resources,
/// forwards their options, and installs/configures an auth gate.
pub fn load_service_config(
    server: &HttpServer,
    registry: &mut ServiceRegistry,
    config_path: &Path,
) -> Result<(), Error> {
    let contents = fs::read_to_string(config_path).map_err(Error::Io)?;

    let mut bound: HashMap<String, Arc<dyn Service>> = HashMap::new();
    let mut gate: Option<Arc<dyn AuthGate>> = None;

    for (index, raw_line) in contents.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();

        match command.as_str() {
            "path" => {
                let dir = words
                    .next()
                    .ok_or_else(|| bad_config(line_no, "path requires a directory"))?;
                registry.add_search_path(dir);
            }

            "service" => {
                let prefix = words
                    .next()
                    .ok_or_else(|| bad_config(line_no, "service requires a resource"))?;
                let name = words
                    .next()
                    .ok_or_else(|| bad_config(line_no, "service requires a name"))?;
                let service = registry
                    .create(name)
                    .ok_or_else(|| bad_config(line_no, format!("unknown service: {name}")))?;
                bound.insert(prefix.to_string(), service.clone());
                server.add_resource(prefix, Arc::new(BoundService(service)));
                info!("loaded service for resource ({prefix}): {name}");
            }

            "option" => {
                let prefix = words
                    .next()
                    .ok_or_else(|| bad_config(line_no, "option requires a resource"))?;
                let assignment = words
                    .next()
                    .ok_or_else(|| bad_config(line_no, "option requires name=value"))?;
                let (name, value) = assignment
                    .split_once('=')
                    .ok_or_else(|| bad_config(line_no, "option requires name=value"))?;
                let service = bound
                    .get(prefix)
                    .ok_or_else(|| bad_config(line_no, format!("no service bound to {prefix}")))?;
                service.set_option(name, value)?;
                info!("set service option for resource ({prefix}): {name}={value}");
            }

            "auth" => {
                let kind = words
                    .next()
                    .ok_or_else(|| bad_config(line_no, "auth requires a kind"))?;
                let new_gate: Arc<dyn AuthGate> = match kind {
                    "basic" => Arc::new(BasicAuthGate::new()),
                    "cookie" => Arc::new(CookieAuthGate::new()),
                    other => {
                        return Err(bad_config(line_no, format!("unknown auth kind: {other}")))
                    }
                };
                server.set_auth(new_gate.clone());
                gate = Some(new_gate);
            }

            "restrict" => {
                let prefix = words
                    .next()
                    .ok_or_else(|| bad_config(line_no, "restrict requires a resource"))?;
                let gate = gate
                    .as_ref()
                    .ok_or_else(|| bad_config(line_no, "restrict requires auth first"))?;
                gate.add_restrict(prefix);
            }

            "user" => {
                let name = words
                    .next()
                    .ok_or_else(|| bad_config(line_no, "user requires a name"))?;
                let password = words
                    .next()
                    .ok_or_else(|| bad_config(line_no, "user requires a password"))?;
                let gate = gate
                    .as_ref()
                    .ok_or_else(|| bad_config(line_no, "user requires auth first"))?;
                gate.add_user(name, password)?;
            }

            other => {
                return Err(bad_config(line_no, format!("unknown command: {other}")));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::writer::Writer, scheduler::Scheduler};
    use std::io::Write as IoWrite;
    use std::sync::Mutex;

    struct StubService {
        options: Mutex<Vec<(String, String)>>,
    }

    impl StubService {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                options: Mutex::new(Vec::new()),
            })
        }
    }

    impl RequestHandler for StubService {
        fn handle<'a>(
            &'a self,
            request: &'a Message,
            conn: &'a mut Connection,
        ) -> BoxFuture<'a, Result<(), Error>> {
            Box::pin(async move {
                let mut writer = Writer::new(conn, request);
                writer.response_mut().set_status(200);
                writer.write("stub");
                writer.send().await
            })
        }
    }

    impl Service for StubService {
        fn set_option(&self, name: &str, value: &str) -> Result<(), Error> {
            if name == "bad" {
                return Err(Error::BadOption(name.to_string()));
            }
            self.options
                .lock()
                .unwrap()
                .push((name.to_string(), value.to_string()));
            Ok(())
        }
    }

    fn test_server() -> (HttpServer, Arc<Scheduler>) {
        let scheduler = Arc::new(Scheduler::single_service(1));
        let server = HttpServer::new(scheduler.clone(), "127.0.0.1:0".parse().unwrap());
        (server, scheduler)
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn full_config_applies() {
        let (server, _scheduler) = test_server();
        let mut registry = ServiceRegistry::new();
        let stub = StubService::new();
        let seen = stub.clone();
        registry.register("stub", move || -> Arc<dyn Service> { stub.clone() });

        let file = write_config(
            "# demo configuration\n\
             path /tmp/services\n\
             \n\
             service /api stub\n\
             option /api timeout=30\n\
             auth cookie\n\
             restrict /api\n\
             user mike secret\n",
        );

        load_service_config(&server, &mut registry, file.path()).unwrap();

        assert_eq!(registry.search_path(), [PathBuf::from("/tmp/services")]);
        assert_eq!(
            *seen.options.lock().unwrap(),
            [("timeout".to_string(), "30".to_string())]
        );
    }

    #[test]
    fn rejects_unknown_command() {
        let (server, _scheduler) = test_server();
        let mut registry = ServiceRegistry::new();
        let file = write_config("frobnicate /x\n");

        let err = load_service_config(&server, &mut registry, file.path()).unwrap_err();
        assert!(matches!(err, Error::BadConfig { line: 1, .. }), "{err}");
    }

    #[test]
    fn rejects_unknown_service() {
        let (server, _scheduler) = test_server();
        let mut registry = ServiceRegistry::new();
        let file = write_config("service /api missing\n");

        let err = load_service_config(&server, &mut registry, file.path()).unwrap_err();
        assert!(matches!(err, Error::BadConfig { line: 1, .. }), "{err}");
    }

    #[test]
    fn restrict_without_auth_fails() {
        let (server, _scheduler) = test_server();
        let mut registry = ServiceRegistry::new();
        let file = write_config("restrict /api\n");

        let err = load_service_config(&server, &mut registry, file.path()).unwrap_err();
        assert!(matches!(err, Error::BadConfig { line: 1, .. }), "{err}");
    }

    #[test]
    fn bad_service_option_propagates() {
        let (server, _scheduler) = test_server();
        let mut registry = ServiceRegistry::new();
        let stub = StubService::new();
        registry.register("stub", move || -> Arc<dyn Service> { stub.clone() });

        let file = write_config("service /api stub\noption /api bad=1\n");
        let err = load_service_config(&server, &mut registry, file.path()).unwrap_err();
        assert!(matches!(err, Error::BadOption(name) if name == "bad"), "bad option should propagate");
    }

    #[test]
    fn comments_and_blanks_are_ignored() {
        let (server, _scheduler) = test_server();
        let mut registry = ServiceRegistry::new();
        let file = write_config("\n\n# comment only\n   \n# another\n");

        load_service_config(&server, &mut registry, file.path()).unwrap();
    }
}
