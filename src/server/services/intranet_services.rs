use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::{
    database::mapping::{DynMappingSource, MappingRule, MappingTable, Strategy},
    server::error::MappingError,
};

/// how long a failed address sits out before it is tried again
pub const RECOVERY_WINDOW: Duration = Duration::from_secs(5 * 60);

pub type SharedIntranetMapper = Arc<IntranetMapper>;

/// result of routing a url through the mapper, address and domain are what `mark_failed` wants
/// back if the connection to the mapped address goes bad
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedUrl {
    pub url: String,
    pub address: String,
    pub domain: String,
}

#[derive(Default)]
struct MapperState {
    table: MappingTable,
    // per-domain offset into the *available* candidates, see `pick`
    cursors: HashMap<String, usize>,
    // (domain, address) -> when it was marked failed
    failures: HashMap<(String, String), Instant>,
}

/// resolves logical hostnames to intranet addresses
///
/// everything lives behind one lock: reads of single rules take the shared side, anything that
/// touches cursors or failure records (load balanced resolution, marking, reload) takes the
/// exclusive side. nothing here ever does network io so the lock is never held across a request.
pub struct IntranetMapper {
    source: DynMappingSource,
    state: RwLock<MapperState>,
    recovery_window: Duration,
}

impl IntranetMapper {
    /// reads the source once, an error here means the proxy should not start
    pub fn load(source: DynMappingSource) -> Result<Self, MappingError> {
        Self::with_recovery_window(source, RECOVERY_WINDOW)
    }

    pub fn with_recovery_window(
        source: DynMappingSource,
        recovery_window: Duration,
    ) -> Result<Self, MappingError> {
        let mapper = Self {
            source,
            state: RwLock::new(MapperState::default()),
            recovery_window,
        };
        mapper.reload()?;
        Ok(mapper)
    }

    /// swaps in a freshly parsed table and resets every round robin cursor
    ///
    /// failure records survive reloads, including ones for addresses or domains that no longer
    /// exist. if the source can't be read the old table stays in place.
    pub fn reload(&self) -> Result<usize, MappingError> {
        let table = self.source.load()?;
        let count = table.len();

        {
            let mut state = self.state.write();
            state.table = table;
            state.cursors.clear();
        }

        info!(
            "loaded {} intranet mappings from {}",
            count,
            self.source.describe()
        );
        Ok(count)
    }

    pub fn resolve(&self, hostname: &str) -> Option<String> {
        let (ips, strategy) = match self.state.read().table.get(hostname)? {
            MappingRule::Single { ip } if ip.is_empty() => return None,
            MappingRule::Single { ip } => return Some(ip.clone()),
            MappingRule::LoadBalanced { ips, .. } if ips.is_empty() => return None,
            MappingRule::LoadBalanced { ips, strategy } => (ips.clone(), *strategy),
        };

        // a reload may land in between, the candidates picked from are the ones just read
        let chosen = self
            .state
            .write()
            .pick(hostname, &ips, strategy, self.recovery_window);
        debug!("resolved {} -> {} ({:?})", hostname, chosen, strategy);
        Some(chosen)
    }

    /// `resolve_url` without the bookkeeping, unmapped or malformed urls come back untouched
    pub fn rewrite_url(&self, raw_url: &str) -> String {
        self.resolve_url(raw_url)
            .map(|mapped| mapped.url)
            .unwrap_or_else(|| raw_url.to_string())
    }

    pub fn resolve_url(&self, raw_url: &str) -> Option<MappedUrl> {
        let mut parsed = url::Url::parse(raw_url).ok()?;
        let domain = parsed.host_str()?.to_string();
        let address = self.resolve(&domain)?;

        if let Err(e) = apply_address(&mut parsed, &address) {
            warn!("mapped address {} for {} is unusable: {}", address, domain, e);
            return None;
        }

        Some(MappedUrl {
            url: parsed.to_string(),
            address,
            domain,
        })
    }

    /// hostname to send as the Host header once the connection goes to a mapped address
    pub fn original_host(&self, raw_url: &str) -> String {
        url::Url::parse(raw_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default()
    }

    pub fn mark_failed(&self, address: &str, domain: &str) {
        self.state
            .write()
            .failures
            .insert((domain.to_string(), address.to_string()), Instant::now());
        warn!("marked {} as failed for domain {}", address, domain);
    }

    /// detached copy of the current table for the admin endpoint
    pub fn snapshot(&self) -> MappingTable {
        self.state.read().table.clone()
    }
}

impl MapperState {
    fn pick(
        &mut self,
        domain: &str,
        ips: &[String],
        strategy: Strategy,
        recovery_window: Duration,
    ) -> String {
        let now = Instant::now();
        let mut available: Vec<&str> = Vec::with_capacity(ips.len());

        for ip in ips {
            let key = (domain.to_string(), ip.clone());
            match self.failures.get(&key).copied() {
                Some(failed_at) if now.duration_since(failed_at) <= recovery_window => {}
                Some(_) => {
                    self.failures.remove(&key);
                    debug!("{} recovered for domain {}", ip, domain);
                    available.push(ip);
                }
                None => available.push(ip),
            }
        }

        // everything is down, forget the failures and try the whole list again
        if available.is_empty() {
            warn!(
                "all {} candidates for {} are marked failed, clearing failures",
                ips.len(),
                domain
            );
            self.failures.retain(|(d, _), _| d != domain);
            available = ips.iter().map(String::as_str).collect();
        }

        let chosen = match strategy {
            // modulo the available set, so the cursor drifts when the failed subset changes
            Strategy::RoundRobin => {
                let cursor = self.cursors.entry(domain.to_string()).or_insert(0);
                let idx = *cursor % available.len();
                *cursor = (idx + 1) % available.len();
                available[idx]
            }
            Strategy::Random => available[rand::rng().random_range(0..available.len())],
            Strategy::FirstAvailable => available[0],
        };

        chosen.to_string()
    }
}

/// puts the mapped address into the url, an address with its own port replaces the url's port
fn apply_address(url: &mut url::Url, address: &str) -> Result<(), url::ParseError> {
    match split_port(address) {
        Some((host, port)) => {
            url.set_host(Some(host))?;
            url.set_port(Some(port))
                .map_err(|_| url::ParseError::InvalidPort)
        }
        None => url.set_host(Some(address)),
    }
}

fn split_port(address: &str) -> Option<(&str, u16)> {
    if address.starts_with('[') {
        let end = address.find(']')?;
        let port = address[end + 1..].strip_prefix(':')?.parse().ok()?;
        return Some((&address[..=end], port));
    }

    let (host, port) = address.rsplit_once(':')?;
    // bare ipv6 without brackets
    if host.contains(':') {
        return None;
    }
    Some((host, port.parse().ok()?))
}
