//! The `ping` API every server carries.
//!
//! `GET /ping` answers `Ok {}` after running the registered ping hooks.
//! `GET /version` answers `Version {name, version, apis, env}`. Both come
//! from an embedded document compiled like any other API.

use std::sync::Arc;

use parking_lot::RwLock;
use ptolemy_compiler::{ApiSpecification, CompileResult};
use ptolemy_core::{HandlerResult, HandlerTable, Invocation, Value};
use tracing::{debug, info};

/// Name of the builtin API.
pub const PING_API: &str = "ping";

/// Source of the builtin API.
pub const PING_DOCUMENT: &str = include_str!("ping.yaml");

/// A callable run on every ping.
pub type PingHook = Arc<dyn Fn() + Send + Sync>;

/// What `/version` reports, and the hooks `/ping` runs.
pub struct PingInfo {
    name: String,
    version: String,
    env: String,
    apis: RwLock<Vec<String>>,
    hooks: Vec<PingHook>,
}

impl PingInfo {
    /// Describes a service.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            env: String::new(),
            apis: RwLock::new(Vec::new()),
            hooks: Vec::new(),
        }
    }

    /// Sets the deployment environment.
    #[must_use]
    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    /// Adds a hook run on each ping.
    #[must_use]
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Records the loaded API names. Called once every API is compiled.
    pub fn set_apis<I, S>(&self, apis: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.apis.write() = apis.into_iter().map(Into::into).collect();
    }

    /// Loaded API names.
    #[must_use]
    pub fn apis(&self) -> Vec<String> {
        self.apis.read().clone()
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Service version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl std::fmt::Debug for PingInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingInfo")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("env", &self.env)
            .field("apis", &*self.apis.read())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Parses the embedded document.
pub fn ping_specification() -> CompileResult<ApiSpecification> {
    ApiSpecification::parse(PING_API, PING_DOCUMENT)
}

/// Handlers of the builtin API.
#[must_use]
pub fn ping_handlers(info: Arc<PingInfo>) -> HandlerTable {
    let version_info = Arc::clone(&info);
    HandlerTable::new()
        .with("ping.do_ping", move |inv: Invocation| {
            let info = Arc::clone(&info);
            async move { do_ping(&info, &inv) }
        })
        .with("ping.do_version", move |inv: Invocation| {
            let info = Arc::clone(&version_info);
            async move { do_version(&info, &inv) }
        })
}

fn do_ping(info: &PingInfo, inv: &Invocation) -> HandlerResult {
    for (i, hook) in info.hooks.iter().enumerate() {
        debug!(hook = i, "running ping hook");
        hook();
    }
    debug!("replying ping: ok");
    Ok(inv.model("Ok")?.into())
}

fn do_version(info: &PingInfo, inv: &Invocation) -> HandlerResult {
    let apis = info.apis().into_iter().map(Value::from).collect();
    let version = inv
        .model("Version")?
        .with("name", info.name.as_str())?
        .with("version", info.version.as_str())?
        .with("apis", Value::List(apis))?
        .with("env", info.env.as_str())?;
    info!(name = %info.name, version = %info.version, "serving /version");
    Ok(version.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ptolemy_compiler::Compiler;
    use ptolemy_core::{Codec, ModelRegistry, Outcome, RequestContext};
    use serde_json::json;

    fn invocation(registry: &ModelRegistry) -> Invocation {
        let models = Arc::clone(registry.get(PING_API).unwrap());
        Invocation::new(RequestContext::mock(), models, Codec::default())
    }

    #[tokio::test]
    async fn test_ping_runs_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let info = Arc::new(PingInfo::new("shop", "1.2.3").with_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let handlers = ping_handlers(info);

        let mut registry = ModelRegistry::new();
        let api = Compiler::new()
            .compile(&ping_specification().unwrap(), &mut registry, &handlers)
            .unwrap();
        assert_eq!(api.bindings.len(), 2);

        let handler = handlers.handler("ping.do_ping").unwrap();
        let outcome = handler(invocation(&registry)).await.unwrap();
        assert!(matches!(outcome, Outcome::Model(ref m) if m.model_name() == "Ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_version_lists_apis() {
        let info = Arc::new(PingInfo::new("shop", "1.2.3").with_env("staging"));
        info.set_apis(["ping", "shop"]);
        let handlers = ping_handlers(Arc::clone(&info));

        let mut registry = ModelRegistry::new();
        Compiler::new()
            .compile(&ping_specification().unwrap(), &mut registry, &handlers)
            .unwrap();

        let handler = handlers.handler("ping.do_version").unwrap();
        match handler(invocation(&registry)).await.unwrap() {
            Outcome::Model(version) => assert_eq!(
                version.to_json(&Codec::default()),
                json!({"name": "shop", "version": "1.2.3", "apis": ["ping", "shop"], "env": "staging"})
            ),
            other => panic!("unexpected outcome {}", other.describe()),
        }
    }
}
