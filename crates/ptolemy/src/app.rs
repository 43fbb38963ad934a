//! Service assembly.
//!
//! [`App`] gathers configuration, handlers and API documents, compiles
//! everything into one frozen registry and wires the dispatcher the same
//! way for tests and for production.

use std::path::PathBuf;
use std::sync::Arc;

use ptolemy_compiler::{ApiSpecification, CompiledApi, Compiler};
use ptolemy_config::PtolemyConfig;
use ptolemy_core::{CrashDesk, CrashReporter, HandlerTable, LogReporter, ModelRegistry};
use ptolemy_middleware::{AccessLog, BearerAuth, Chain, PostStage, PreStage, RequestIdStage};
use ptolemy_server::{
    ping_handlers, ping_specification, Dispatcher, PingHook, PingInfo, Server, ServerConfig,
    ShutdownSignal, PING_API,
};
use tracing::info;

use crate::discover::discover_apis;
use crate::error::AppResult;

enum Source {
    File(PathBuf),
    Inline { name: String, yaml: String },
}

/// Builder for a service.
///
/// ```rust,ignore
/// let handlers = HandlerTable::new().with("items.get_item", get_item);
/// App::new(config)
///     .service("shop", env!("CARGO_PKG_VERSION"))
///     .handlers(handlers)
///     .discover()
///     .serve()
///     .await?;
/// ```
pub struct App {
    config: PtolemyConfig,
    handlers: HandlerTable,
    sources: Vec<Source>,
    discover: bool,
    port: Option<u16>,
    service: String,
    version: String,
    environment: Option<String>,
    reporter: Arc<dyn CrashReporter>,
    auth: Option<BearerAuth>,
    pre: Vec<Arc<dyn PreStage>>,
    post: Vec<Arc<dyn PostStage>>,
    ping_hooks: Vec<PingHook>,
}

impl App {
    /// Starts from a loaded configuration.
    #[must_use]
    pub fn new(config: PtolemyConfig) -> Self {
        Self {
            config,
            handlers: HandlerTable::new(),
            sources: Vec::new(),
            discover: false,
            port: None,
            service: "ptolemy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: None,
            reporter: Arc::new(LogReporter),
            auth: None,
            pre: Vec::new(),
            post: Vec::new(),
            ping_hooks: Vec::new(),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &PtolemyConfig {
        &self.config
    }

    /// Adds handlers and decorators.
    #[must_use]
    pub fn handlers(mut self, handlers: HandlerTable) -> Self {
        self.handlers.merge(handlers);
        self
    }

    /// Adds a document held in memory.
    #[must_use]
    pub fn document(mut self, name: impl Into<String>, yaml: impl Into<String>) -> Self {
        self.sources.push(Source::Inline {
            name: name.into(),
            yaml: yaml.into(),
        });
        self
    }

    /// Adds a document file, named after its stem.
    #[must_use]
    pub fn document_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::File(path.into()));
        self
    }

    /// Also loads every document under `apis.path`.
    #[must_use]
    pub fn discover(mut self) -> Self {
        self.discover = true;
        self
    }

    /// Port given on the command line. Wins over every other source.
    #[must_use]
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// Name and version reported by `/version` and in crash reports.
    #[must_use]
    pub fn service(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.service = name.into();
        self.version = version.into();
        self
    }

    /// Environment name reported by `/version`.
    #[must_use]
    pub fn environment(mut self, env: impl Into<String>) -> Self {
        self.environment = Some(env.into());
        self
    }

    /// Where crash and slow-call reports go. Defaults to the log.
    #[must_use]
    pub fn crash_reporter(mut self, reporter: Arc<dyn CrashReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Requires bearer tokens.
    #[must_use]
    pub fn bearer_auth(mut self, auth: BearerAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Adds a pre stage after request id and auth.
    #[must_use]
    pub fn pre(mut self, stage: impl PreStage) -> Self {
        self.pre.push(Arc::new(stage));
        self
    }

    /// Adds a post stage before the access log.
    #[must_use]
    pub fn post(mut self, stage: impl PostStage) -> Self {
        self.post.push(Arc::new(stage));
        self
    }

    /// Runs `hook` on every `/ping`.
    #[must_use]
    pub fn ping_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.ping_hooks.push(Arc::new(hook));
        self
    }

    /// Compiles every document and wires the dispatcher.
    ///
    /// Any compile error is fatal: nothing is served.
    pub fn build(self) -> AppResult<Service> {
        self.config.validate()?;
        let addr = self.config.bind_addr(self.port)?;
        let service_name = self
            .config
            .reporting
            .service_name
            .clone()
            .unwrap_or_else(|| self.service.clone());

        let mut specs = Vec::new();
        if self.discover {
            for file in discover_apis(&self.config.apis.path, &self.config.apis.ignore)? {
                specs.push(ApiSpecification::load_named(file.name, &file.path)?);
            }
        }
        for source in &self.sources {
            let spec = match source {
                Source::File(path) => ApiSpecification::load(path)?,
                Source::Inline { name, yaml } => ApiSpecification::parse(name.clone(), yaml)?,
            };
            specs.push(spec);
        }

        let mut compiler = Compiler::new();
        if let Some(dir) = &self.config.apis.artifact_dir {
            compiler = compiler
                .with_artifacts(Some(dir.clone()))
                .with_force(self.config.apis.force);
        }

        let mut handlers = self.handlers;
        let mut ping = None;
        if self.config.apis.builtin {
            let mut info = PingInfo::new(service_name.clone(), self.version.clone());
            if let Some(env) = &self.environment {
                info = info.with_env(env.clone());
            }
            for hook in self.ping_hooks {
                info = info.with_hook(move || hook());
            }
            let info = Arc::new(info);
            handlers.merge(ping_handlers(Arc::clone(&info)));
            ping = Some(info);
        }

        let mut registry = ModelRegistry::new();
        let mut apis: Vec<CompiledApi> = Vec::with_capacity(specs.len() + 1);
        for spec in &specs {
            apis.push(compiler.compile(spec, &mut registry, &handlers)?);
        }
        if ping.is_some() {
            apis.push(Compiler::new().compile(&ping_specification()?, &mut registry, &handlers)?);
        }

        let names: Vec<String> = apis
            .iter()
            .map(|api| api.name.clone())
            .filter(|name| name != PING_API)
            .collect();
        if let Some(info) = &ping {
            info.set_apis(names.iter().cloned());
        }

        let mut chain = Chain::builder().pre(RequestIdStage::new());
        if let Some(auth) = self.auth {
            chain = chain.pre(auth);
        }
        for stage in self.pre {
            chain = chain.pre_arc(stage);
        }
        chain = chain.post(RequestIdStage::new());
        for stage in self.post {
            chain = chain.post_arc(stage);
        }
        let chain = chain.post(AccessLog).build();

        let crash = CrashDesk::new(self.reporter)
            .with_service(service_name.clone())
            .with_port(addr.port())
            .enabled(self.config.reporting.enabled);

        let dispatcher = Dispatcher::builder(registry.freeze())
            .apis(apis)
            .chain(chain)
            .codec(self.config.codec())
            .crash_desk(crash)
            .handler_timeout(self.config.request_timeout())
            .slow_call(self.config.slow_call())
            .build()?;

        let server_config = ServerConfig::builder()
            .http_addr(addr.to_string())
            .request_timeout(self.config.request_timeout())
            .body_timeout(self.config.body_timeout())
            .shutdown_timeout(self.config.shutdown_timeout())
            .max_body_bytes(self.config.server.max_body_bytes)
            .slow_call(self.config.slow_call())
            .build();

        info!(
            service = %service_name,
            apis = ?names,
            routes = dispatcher.routes().len(),
            addr = %addr,
            "service assembled"
        );

        Ok(Service {
            dispatcher,
            server_config,
            apis: names,
        })
    }

    /// Builds and serves until SIGINT or SIGTERM.
    pub async fn serve(self) -> AppResult<()> {
        self.build()?.into_server().run().await?;
        Ok(())
    }

    /// Builds and serves until `shutdown` fires.
    pub async fn serve_with_shutdown(self, shutdown: ShutdownSignal) -> AppResult<()> {
        self.build()?
            .into_server()
            .run_with_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("service", &self.service)
            .field("version", &self.version)
            .field("documents", &self.sources.len())
            .field("discover", &self.discover)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

/// A compiled, wired service, ready to serve.
#[derive(Debug)]
pub struct Service {
    dispatcher: Dispatcher,
    server_config: ServerConfig,
    apis: Vec<String>,
}

impl Service {
    /// Names of the compiled APIs, builtin excluded.
    #[must_use]
    pub fn apis(&self) -> &[String] {
        &self.apis
    }

    /// The dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Listener settings.
    #[must_use]
    pub const fn server_config(&self) -> &ServerConfig {
        &self.server_config
    }

    /// Takes the dispatcher, e.g. for an in-memory test client.
    #[must_use]
    pub fn into_dispatcher(self) -> Dispatcher {
        self.dispatcher
    }

    /// Binds the dispatcher to its listener settings.
    #[must_use]
    pub fn into_server(self) -> Server {
        Server::new(self.server_config, self.dispatcher)
    }
}
