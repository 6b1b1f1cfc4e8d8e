//! Shared application state handed to every handler, constructed once at
//! startup: a `Clone` struct of `Arc`-wrapped collaborators built from
//! `config::Settings`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::auth::{AccountCache, CookieSettings, TokenSigner};
use crate::catalog::version::VersionResolver;
use crate::catalog::{self, Catalog};
use crate::config::Settings;
use crate::dns::DnsClient;
use crate::ssh::SshPool;
use crate::terminal::TerminalRegistry;

/// A lazily-populated table of per-fqdn mutexes so two concurrent
/// `/dns/configure` calls for the same domain serialize instead of racing
/// the DNS provider's transactional steps against each other.
#[derive(Clone, Default)]
pub struct DomainLocks {
    locks: Arc<StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl DomainLocks {
    pub fn lock_for(&self, fqdn: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(fqdn.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub dns: Arc<DnsClient>,
    pub catalog: Arc<Catalog>,
    pub resolver: Arc<VersionResolver>,
    pub ssh: Arc<SshPool>,
    pub accounts: AccountCache,
    pub tokens: Arc<TokenSigner>,
    pub terminal: TerminalRegistry,
    pub cookies: CookieSettings,
    pub domain_locks: DomainLocks,
    pub command_deadline: Duration,
}

impl AppState {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let dns = Arc::new(DnsClient::new(settings.server.dns_provider_base_url.clone()));
        let catalog = Arc::new(catalog::load_dir(Path::new(&settings.catalog.descriptor_dir))?);
        let resolver = Arc::new(VersionResolver::new(Duration::from_secs(
            settings.catalog.version_cache_ttl_secs,
        )));
        let ssh = Arc::new(SshPool::new(
            Duration::from_secs(settings.ssh.dial_timeout_secs),
            Duration::from_secs(settings.ssh.idle_timeout_secs),
        ));

        Ok(Self {
            dns,
            catalog,
            resolver,
            ssh,
            accounts: AccountCache::new(),
            tokens: Arc::new(TokenSigner::new()),
            terminal: TerminalRegistry::new(),
            cookies: CookieSettings {
                domain: settings.server.cookie_domain.clone(),
                secure: settings.server.cookie_secure,
            },
            domain_locks: DomainLocks::default(),
            command_deadline: Duration::from_secs(settings.ssh.command_deadline_secs),
        })
    }

    /// Builds a `KvStore` scoped to the calling operator's namespace. Cheap
    /// enough to call per-request: it just clones a few `Arc`s and strings.
    pub fn kv_for(&self, identity: &crate::auth::Identity) -> crate::kv::KvStore {
        crate::kv::KvStore::new(self.dns.clone(), identity.credential.clone(), identity.namespace_id.clone())
    }
}
