//! Pre-flight reachability gate
//!
//! Before a session starts, every configured target is probed in parallel.
//! The gate passes if any probe answers, or if no targets are configured.
//! It is a fast-fail check only; the sync itself never depends on it.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, warn};
use vault_fs::NormalizedPath;

use crate::error::{Error, Result};

const TCP_PREFIX: &str = "tcp://";

/// One reachability check.
pub trait ReachabilityProbe: Send + Sync {
    /// Human-readable target, used in logs and errors
    fn target(&self) -> &str;

    fn probe(&self) -> bool;
}

/// Succeeds when a TCP connection to `host:port` can be opened.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: Duration::from_secs(3),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl ReachabilityProbe for TcpProbe {
    fn target(&self) -> &str {
        &self.address
    }

    fn probe(&self) -> bool {
        let addrs = match self.address.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!(address = %self.address, error = %e, "cannot resolve");
                return false;
            }
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }
}

/// Succeeds when a local or mounted path exists.
#[derive(Debug, Clone)]
pub struct PathProbe {
    target: String,
    path: NormalizedPath,
}

impl PathProbe {
    pub fn new(path: impl Into<String>) -> Self {
        let target = path.into();
        Self {
            path: NormalizedPath::new(&target),
            target,
        }
    }
}

impl ReachabilityProbe for PathProbe {
    fn target(&self) -> &str {
        &self.target
    }

    fn probe(&self) -> bool {
        self.path.exists()
    }
}

/// Build a probe from a configured target: `tcp://host:port` opens a
/// connection, anything else is checked as a path.
pub fn probe_for(target: &str) -> Box<dyn ReachabilityProbe> {
    match target.strip_prefix(TCP_PREFIX) {
        Some(address) => Box::new(TcpProbe::new(address)),
        None => Box::new(PathProbe::new(target)),
    }
}

/// Run every probe concurrently. Passes when `probes` is empty or at least
/// one probe succeeds.
pub fn check_reachable(probes: &[Box<dyn ReachabilityProbe>]) -> Result<()> {
    if probes.is_empty() {
        return Ok(());
    }

    // collect first so every probe runs, not just up to the first success
    let outcomes: Vec<bool> = probes.par_iter().map(|probe| probe.probe()).collect();
    if outcomes.iter().any(|ok| *ok) {
        debug!(targets = probes.len(), "reachability check passed");
        return Ok(());
    }

    let targets: Vec<String> = probes.iter().map(|p| p.target().to_string()).collect();
    warn!(?targets, "no target reachable");
    Err(Error::Unreachable { targets })
}
