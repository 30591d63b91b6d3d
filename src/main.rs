//! pion-web: standalone server binary around the pion_web library.
//!
//! Binds one endpoint, optionally loads a service config file, and
//! serves until interrupted. Exit code 0 on clean shutdown, 1 on
//! argument or bind errors.

use anyhow::{bail, Context};
use clap::Parser;
use pion_web::{
    load_service_config, send_method_not_allowed, BoxFuture, Connection, Error, HttpServer,
    Message, RequestHandler, Scheduler, Service, ServiceRegistry, Writer,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    process::ExitCode,
    sync::{Arc, Mutex},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pion-web",
    about = "Embeddable HTTP/1.1 server",
    arg_required_else_help = false
)]
struct Args {
    /// Port to listen on
    #[arg(short = 'p', long = "port", default_value_t = 8080)]
    port: u16,

    /// IP address to bind
    #[arg(short = 'i', long = "ip", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    ip: IpAddr,

    /// PEM file holding the TLS certificate chain and private key
    #[arg(long = "ssl", value_name = "PEM")]
    ssl: Option<PathBuf>,

    /// Service configuration file
    #[arg(short = 'c', long = "config", value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Directory added to the service search path (repeatable)
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    dirs: Vec<PathBuf>,

    /// Option passed to the bound service (repeatable)
    #[arg(short = 'o', long = "option", value_name = "NAME=VALUE")]
    options: Vec<String>,

    /// Resource prefix and service name to bind
    #[arg(value_names = ["RESOURCE", "HANDLER"], num_args = 0..=2)]
    binding: Vec<String>,
}

/// Answers GET requests with a fixed message.
struct HelloService {
    message: Mutex<String>,
}

impl HelloService {
    fn new() -> Arc<dyn Service> {
        Arc::new(Self {
            message: Mutex::new("Hello, world!".to_string()),
        })
    }
}

impl RequestHandler for HelloService {
    fn handle<'a>(
        &'a self,
        request: &'a Message,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if request.method() != "GET" && request.method() != "HEAD" {
                return send_method_not_allowed(request, conn, "GET, HEAD").await;
            }
            let message = self.message.lock().unwrap().clone();
            let mut writer = Writer::new(conn, request);
            writer.response_mut().set_status(200);
            writer
                .response_mut()
                .change_header("Content-Type", "text/plain");
            writer.write(message);
            writer.send().await
        })
    }
}

impl Service for HelloService {
    fn set_option(&self, name: &str, value: &str) -> Result<(), Error> {
        match name {
            "message" => {
                *self.message.lock().unwrap() = value.to_string();
                Ok(())
            }
            _ => Err(Error::BadOption(name.to_string())),
        }
    }
}

/// Echoes the request line, headers, and body back as plain text.
struct EchoService;

impl EchoService {
    fn new() -> Arc<dyn Service> {
        Arc::new(Self)
    }
}

impl RequestHandler for EchoService {
    fn handle<'a>(
        &'a self,
        request: &'a Message,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let mut report = format!("{} {}\n", request.method(), request.resource());
            for (name, value) in request.headers().iter() {
                report.push_str(&format!("{name}: {value}\n"));
            }
            let body = request.content().to_vec();

            let mut writer = Writer::new(conn, request);
            writer.response_mut().set_status(200);
            writer
                .response_mut()
                .change_header("Content-Type", "text/plain");
            writer.write(report);
            if !body.is_empty() {
                writer.write("\n");
                writer.write_bytes(&body);
            }
            writer.send().await
        })
    }
}

impl Service for EchoService {}

fn built_in_registry() -> ServiceRegistry {
    let mut registry = ServiceRegistry::new();
    registry.register("hello", HelloService::new);
    registry.register("echo", EchoService::new);
    registry
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut registry = built_in_registry();
    for dir in &args.dirs {
        registry.add_search_path(dir);
    }

    let scheduler = Arc::new(Scheduler::default());
    let endpoint = SocketAddr::new(args.ip, args.port);
    let server = HttpServer::new(scheduler.clone(), endpoint);

    if let Some(pem) = &args.ssl {
        server
            .set_ssl_key_file(pem)
            .with_context(|| format!("failed to load TLS key file {}", pem.display()))?;
    }

    if let Some(config) = &args.config {
        load_service_config(&server, &mut registry, config)
            .with_context(|| format!("failed to load config {}", config.display()))?;
    }

    match args.binding.as_slice() {
        [] if args.config.is_some() => {}
        [resource, handler] => {
            let service = registry
                .create(handler)
                .with_context(|| format!("unknown service: {handler}"))?;
            for option in &args.options {
                let (name, value) = option
                    .split_once('=')
                    .context("service options take the form NAME=VALUE")?;
                service.set_option(name, value)?;
            }
            struct Bound(Arc<dyn Service>);
            impl RequestHandler for Bound {
                fn handle<'a>(
                    &'a self,
                    request: &'a Message,
                    conn: &'a mut Connection,
                ) -> BoxFuture<'a, Result<(), Error>> {
                    self.0.handle(request, conn)
                }
            }
            server.add_resource(resource, Arc::new(Bound(service)));
        }
        _ => bail!("expected RESOURCE and HANDLER arguments (or -c CONFIG)"),
    }

    server.start().context("failed to start server")?;
    info!(
        "pion-web listening on {}",
        server.local_addr().map_or_else(String::new, |a| a.to_string())
    );

    let reactor = scheduler.acquire_io();
    reactor
        .block_on(tokio::signal::ctrl_c())
        .context("failed to wait for interrupt")?;

    info!("interrupt received, shutting down");
    server.stop(false);
    scheduler.shutdown();
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("pion-web: {err:#}");
            ExitCode::FAILURE
        }
    }
}
