//! The discovery engine: polls the inventory on a fixed interval, maps every
//! record to a target group and tombstones the sources which disappeared
//! since the previous successful poll.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tripwire::Tripwire;

use crate::inventory::{FetchError, Inventory, InventoryRecord};
use crate::metrics::DiscoveryMetrics;
use crate::target::{Mapper, TargetGroup};

pub struct Discoverer<I> {
    inventory: I,
    mapper: Mapper,
    interval: Duration,
    pages: usize,

    /// Sources published as live by the last successful poll.
    known: BTreeSet<String>,

    metrics: DiscoveryMetrics,
}

impl<I: Inventory> Discoverer<I> {
    /// `pages` caps the number of page requests per poll and must be at
    /// least 1.
    pub fn new(
        inventory: I,
        mapper: Mapper,
        interval: Duration,
        pages: usize,
        metrics: DiscoveryMetrics,
    ) -> Self {
        Discoverer {
            inventory,
            mapper,
            interval,
            pages: pages.max(1),
            known: BTreeSet::new(),
            metrics,
        }
    }

    pub fn known_sources(&self) -> &BTreeSet<String> {
        &self.known
    }

    pub fn metrics(&self) -> &DiscoveryMetrics {
        &self.metrics
    }

    /// Fetch the inventory and return the live groups followed by tombstones
    /// for every previously known source which is gone now.
    ///
    /// On error nothing is mutated, the previous poll stays authoritative.
    pub async fn poll(&mut self) -> Result<Vec<TargetGroup>, FetchError> {
        let started = Instant::now();
        let result = self.fetch_all().await;
        self.metrics
            .request_duration
            .record(started.elapsed().as_secs_f64());
        let records = result?;

        debug!(message = "get workspaces", count = records.len());

        let mut positions = BTreeMap::new();
        let mut groups = Vec::<TargetGroup>::with_capacity(records.len());
        for record in records {
            let group = self.mapper.map(record);

            match positions.get(&group.source) {
                Some(&index) => {
                    // pages shifted under us, the later record is fresher
                    debug!(message = "duplicate workspace", source = %group.source);
                    groups[index] = group;
                }
                None => {
                    if !self.known.contains(&group.source) {
                        debug!(message = "workspace added", source = %group.source);
                    }

                    positions.insert(group.source.clone(), groups.len());
                    groups.push(group);
                }
            }
        }

        self.metrics.discovered_targets.set(groups.len() as f64);

        let current = positions.into_keys().collect::<BTreeSet<_>>();
        for source in self.known.difference(&current) {
            debug!(message = "workspace deleted", %source);
            groups.push(TargetGroup::tombstone(source.as_str()));
        }

        self.known = current;

        Ok(groups)
    }

    async fn fetch_all(&self) -> Result<Vec<InventoryRecord>, FetchError> {
        let mut records = Vec::new();
        let mut cursor = None::<String>;
        let mut fetched = 0;

        loop {
            let page = self.inventory.fetch_page(cursor.as_deref()).await?;
            fetched += 1;

            let more = page.has_more();
            records.extend(page.records);

            if !more {
                break;
            }

            if fetched >= self.pages {
                debug!(
                    message = "page limit reached, inventory is truncated",
                    pages = fetched
                );
                break;
            }

            cursor = page.next_token;
        }

        Ok(records)
    }

    /// Poll on every tick and send the result to `output` until `shutdown`
    /// fires. The first poll happens one interval after start, callers are
    /// expected to run the initial `poll` themselves.
    ///
    /// Shutdown is only observed between polls, an in-flight poll and its
    /// send always complete first.
    pub async fn run(mut self, mut shutdown: Tripwire, output: mpsc::Sender<Vec<TargetGroup>>) {
        let Some(start) = Instant::now().checked_add(self.interval) else {
            error!(message = "refresh interval out of range", interval = ?self.interval);
            return;
        };
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            match self.poll().await {
                Ok(groups) => {
                    if output.send(groups).await.is_err() {
                        warn!(message = "output closed, stop discovering");
                        break;
                    }
                }
                Err(err) => {
                    self.metrics.request_failures.inc();
                    error!(message = "error fetching targets", %err);
                }
            }
        }

        info!(message = "discovery stopped");
    }
}
