//! Client pool: one top, R region and R×R zone endpoints

use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{Dialer, HierarchyError, Result};

/// Endpoint URLs for the whole hierarchy, shape-checked at construction
#[derive(Clone, Debug)]
pub struct Endpoints {
    top: String,
    regions: Vec<String>,
    zones: Vec<Vec<String>>,
}

impl Endpoints {
    pub fn new(top: String, regions: Vec<String>, zones: Vec<Vec<String>>) -> Result<Self> {
        let r = regions.len();
        if r == 0 {
            return Err(HierarchyError::Shape("at least one region endpoint is required".into()));
        }
        if zones.len() != r {
            return Err(HierarchyError::Shape(format!(
                "{r} region endpoints but {} zone rows",
                zones.len()
            )));
        }
        if let Some((i, row)) = zones.iter().enumerate().find(|(_, row)| row.len() != r) {
            return Err(HierarchyError::Shape(format!(
                "zone row {i} has {} endpoints, expected {r}",
                row.len()
            )));
        }
        Ok(Self { top, regions, zones })
    }

    /// Branching factor R
    pub fn branching(&self) -> usize {
        self.regions.len()
    }

    /// 1 + R + R²
    pub fn total(&self) -> usize {
        let r = self.branching();
        1 + r + r * r
    }

    pub fn top(&self) -> &str {
        &self.top
    }

    pub fn region(&self, i: usize) -> Option<&str> {
        self.regions.get(i).map(String::as_str)
    }

    pub fn zone(&self, i: usize, j: usize) -> Option<&str> {
        self.zones.get(i).and_then(|row| row.get(j)).map(String::as_str)
    }
}

/// Sweep backoff. `max_sweeps = None` retries until connected or cancelled.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_sweeps: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(30),
            max_sweeps: None,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failed`-th consecutive incomplete sweep (0-based):
    /// initial * 2^failed, capped at max, plus up to 10% jitter
    pub fn backoff(&self, failed: usize) -> Duration {
        let factor = 1u32 << failed.min(16);
        let base = self.initial_backoff.saturating_mul(factor).min(self.max_backoff);
        let jitter_ms = (base.as_millis() / 10) as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Observable connection progress
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Connectivity {
    pub top: bool,
    pub regions: Vec<bool>,
    pub zones: Vec<Vec<bool>>,
    pub sweeps: usize,
}

impl Connectivity {
    pub fn connected(&self) -> usize {
        let flags = std::iter::once(&self.top)
            .chain(self.regions.iter())
            .chain(self.zones.iter().flatten());
        flags.filter(|c| **c).count()
    }

    pub fn total(&self) -> usize {
        1 + self.regions.len() + self.zones.iter().map(Vec::len).sum::<usize>()
    }

    /// True only when every endpoint is connected
    pub fn is_fully_connected(&self) -> bool {
        !self.regions.is_empty() && self.connected() == self.total()
    }
}

struct NodeClient<C> {
    url: String,
    client: Option<C>,
}

impl<C> NodeClient<C> {
    fn pending(url: &str) -> Self {
        Self { url: url.to_string(), client: None }
    }

    fn ready(client: C, url: String) -> Self {
        Self { url, client: Some(client) }
    }

    fn connected(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Result<&C> {
        self.client
            .as_ref()
            .ok_or_else(|| HierarchyError::NotConnected(self.url.clone()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Top,
    Region(usize),
    Zone(usize, usize),
}

impl Slot {
    fn tier(self) -> &'static str {
        match self {
            Slot::Top => "top",
            Slot::Region(_) => "region",
            Slot::Zone(..) => "zone",
        }
    }
}

pub struct ClientPool<C> {
    top: NodeClient<C>,
    regions: Vec<NodeClient<C>>,
    zones: Vec<Vec<NodeClient<C>>>,
}

impl<C> ClientPool<C> {
    fn unconnected(endpoints: &Endpoints) -> Self {
        Self {
            top: NodeClient::pending(&endpoints.top),
            regions: endpoints.regions.iter().map(|u| NodeClient::pending(u)).collect(),
            zones: endpoints
                .zones
                .iter()
                .map(|row| row.iter().map(|u| NodeClient::pending(u)).collect())
                .collect(),
        }
    }

    /// Pool over already-open clients, e.g. in-memory chains
    pub fn from_clients(
        top: C,
        regions: Vec<C>,
        zones: Vec<Vec<C>>,
        url_of: impl Fn(&C) -> String,
    ) -> Result<Self> {
        Endpoints::new(
            url_of(&top),
            regions.iter().map(&url_of).collect(),
            zones.iter().map(|row| row.iter().map(&url_of).collect()).collect(),
        )?;
        let node = |c: C| {
            let url = url_of(&c);
            NodeClient::ready(c, url)
        };
        Ok(Self {
            top: node(top),
            regions: regions.into_iter().map(node).collect(),
            zones: zones
                .into_iter()
                .map(|row| row.into_iter().map(node).collect())
                .collect(),
        })
    }

    pub fn branching(&self) -> usize {
        self.regions.len()
    }

    pub fn top(&self) -> Result<&C> {
        self.top.client()
    }

    pub fn region(&self, i: usize) -> Result<&C> {
        self.regions
            .get(i)
            .ok_or_else(|| HierarchyError::Shape(format!("no region {i}")))?
            .client()
    }

    pub fn zone(&self, i: usize, j: usize) -> Result<&C> {
        self.zones
            .get(i)
            .and_then(|row| row.get(j))
            .ok_or_else(|| HierarchyError::Shape(format!("no zone {i}/{j}")))?
            .client()
    }

    pub fn all_connected(&self) -> bool {
        self.connectivity(0).is_fully_connected()
    }

    pub fn connectivity(&self, sweeps: usize) -> Connectivity {
        Connectivity {
            top: self.top.connected(),
            regions: self.regions.iter().map(NodeClient::connected).collect(),
            zones: self
                .zones
                .iter()
                .map(|row| row.iter().map(NodeClient::connected).collect())
                .collect(),
            sweeps,
        }
    }

    /// Unconnected endpoints in sweep order: top, then each region followed by its zones
    fn pending(&self) -> Vec<(Slot, String)> {
        let mut out = Vec::new();
        if !self.top.connected() {
            out.push((Slot::Top, self.top.url.clone()));
        }
        for (i, region) in self.regions.iter().enumerate() {
            if !region.connected() {
                out.push((Slot::Region(i), region.url.clone()));
            }
            for (j, zone) in self.zones[i].iter().enumerate() {
                if !zone.connected() {
                    out.push((Slot::Zone(i, j), zone.url.clone()));
                }
            }
        }
        out
    }

    fn node_mut(&mut self, slot: Slot) -> &mut NodeClient<C> {
        match slot {
            Slot::Top => &mut self.top,
            Slot::Region(i) => &mut self.regions[i],
            Slot::Zone(i, j) => &mut self.zones[i][j],
        }
    }
}

/// Dials every endpoint of the hierarchy until all are connected
pub struct Connector<D: Dialer> {
    dialer: D,
    retry: RetryPolicy,
    progress: watch::Sender<Connectivity>,
}

impl<D: Dialer> Connector<D> {
    pub fn new(dialer: D, retry: RetryPolicy) -> Self {
        let (progress, _) = watch::channel(Connectivity::default());
        Self { dialer, retry, progress }
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.progress.subscribe()
    }

    /// Sweep all endpoints, dialing only the ones not yet connected.
    ///
    /// A connected endpoint is never dialed again. Failed dials are logged and
    /// retried on the next sweep after a backoff.
    pub async fn establish(
        &self,
        endpoints: &Endpoints,
        cancel: &CancellationToken,
    ) -> Result<ClientPool<D::Client>> {
        let mut pool = ClientPool::unconnected(endpoints);
        let mut sweeps = 0usize;
        let mut last_err: Option<HierarchyError> = None;

        loop {
            let pending = pool.pending();
            if pending.is_empty() {
                break;
            }
            if let Some(max) = self.retry.max_sweeps {
                if sweeps >= max {
                    return Err(last_err.unwrap_or_else(|| {
                        HierarchyError::NotConnected(pending[0].1.clone())
                    }));
                }
            }
            sweeps += 1;

            let attempts = pending.iter().map(|(slot, url)| async move {
                (*slot, url, self.dialer.dial(url).await)
            });
            let results = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HierarchyError::Cancelled),
                r = join_all(attempts) => r,
            };

            for (slot, url, res) in results {
                match res {
                    Ok(client) => {
                        info!(tier = slot.tier(), url = %url, "connected to node");
                        pool.node_mut(slot).client = Some(client);
                    }
                    Err(e) => {
                        warn!(tier = slot.tier(), url = %url, error = %e, "unable to connect to node");
                        last_err = Some(e);
                    }
                }
            }

            let state = pool.connectivity(sweeps);
            info!(
                sweep = sweeps,
                connected = state.connected(),
                total = state.total(),
                "connection sweep finished"
            );
            self.progress.send_replace(state);

            if pool.all_connected() {
                break;
            }

            let wait = self.retry.backoff(sweeps - 1);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HierarchyError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        self.progress.send_replace(pool.connectivity(sweeps));
        Ok(pool)
    }
}
