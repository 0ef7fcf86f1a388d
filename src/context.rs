use crate::{config::Config, registry::SessionRegistry, rpc::client::PeerClients};
use anyhow::Context as _;
use std::sync::Arc;

/// Everything a handler needs, built once at startup and passed
/// explicitly. Teardown happens in reverse construction order from
/// `main`.
pub struct Context {
    pub cfg: &'static Config,
    pub db: mysql::Pool,
    pub redis: redis::Client,
    pub registry: SessionRegistry,
    pub peers: PeerClients,
}

impl Context {
    /// Fails fast when the cache or the relational store is unreachable;
    /// the process must not come up half-connected.
    pub fn init(cfg: &'static Config) -> anyhow::Result<Arc<Self>> {
        let opts = mysql::Opts::from_url(&cfg.mysql.url).context("invalid mysql url")?;
        let db = mysql::Pool::new(opts)?;
        db.get_conn().context("mysql unreachable")?;
        let redis = redis::Client::open(cfg.redis.url.as_str())?;
        let mut conn = redis.get_connection().context("redis unreachable")?;
        redis::cmd("PING").query::<String>(&mut conn)?;
        let peers = PeerClients::build(&cfg.peers);
        Ok(Arc::new(Self {
            cfg,
            db,
            redis,
            registry: SessionRegistry::new(),
            peers,
        }))
    }

    pub fn node_name(&self) -> &str {
        &self.cfg.server.name
    }
}
