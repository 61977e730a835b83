//! Concurrent per-jail ban aggregation.
//!
//! Fetching the banned IPs of every jail is the read-heavy path of the
//! control plane. Jails are fetched concurrently with a bounded number of
//! requests in flight, all under one shared deadline. A jail whose fetch
//! fails or runs past the deadline is left out; the caller gets whatever
//! finished, sorted by jail name.

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, TimeZone};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::connector::JailInfo;
use crate::error::Result;

/// Default number of jails fetched at the same time
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default deadline for a whole aggregation pass
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(15);

/// Bounds for one aggregation pass.
#[derive(Debug, Clone, Copy)]
pub struct AggregateOptions {
    /// Maximum fetches in flight
    pub concurrency: usize,
    /// Deadline shared by every fetch, measured from the start of the pass
    pub deadline: Duration,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

/// Live ban state of one jail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JailBans {
    pub banned_ips: Vec<String>,
    pub new_in_last_hour: usize,
}

impl JailBans {
    fn into_info(self, jail_name: String) -> JailInfo {
        JailInfo {
            jail_name,
            enabled: true,
            total_banned: self.banned_ips.len(),
            new_in_last_hour: self.new_in_last_hour,
            banned_ips: self.banned_ips,
        }
    }
}

/// Fetch every jail's bans through `fetch` and merge the results.
///
/// Failed and timed-out jails are dropped (and logged); the output is
/// sorted by jail name, independent of completion order.
pub async fn collect_jail_infos<F, Fut>(
    jails: Vec<String>,
    options: AggregateOptions,
    fetch: F,
) -> Vec<JailInfo>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<JailBans>>,
{
    let deadline = Instant::now() + options.deadline;
    let concurrency = options.concurrency.max(1);
    let fetch = &fetch;

    let mut infos: Vec<JailInfo> = stream::iter(jails)
        .map(|jail| async move {
            let result = tokio::time::timeout_at(deadline, fetch(jail.clone())).await;
            (jail, result)
        })
        .buffer_unordered(concurrency)
        .filter_map(|(jail, result)| async move {
            match result {
                Ok(Ok(bans)) => {
                    debug!("Fetched {} bans for jail {}", bans.banned_ips.len(), jail);
                    Some(bans.into_info(jail))
                }
                Ok(Err(e)) => {
                    warn!("Dropping jail {} from summary: {}", jail, e);
                    None
                }
                Err(_) => {
                    warn!("Dropping jail {} from summary: deadline exceeded", jail);
                    None
                }
            }
        })
        .collect()
        .await;

    infos.sort_by(|a, b| a.jail_name.cmp(&b.jail_name));
    infos
}

/// Parse the output of `fail2ban-client get <jail> banip --with-time`.
///
/// Lines look like `1.2.3.4 \t2024-05-01 10:00:00 + 600 = 2024-05-01 10:10:00`.
/// Output without timestamps (a plain space-separated list, as printed by
/// older fail2ban versions) is accepted; such bans never count as new.
pub fn parse_bans_with_time(output: &str, now: DateTime<Local>) -> JailBans {
    let cutoff = now - ChronoDuration::hours(1);
    let mut bans = JailBans::default();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let Some(first) = parts.next() else { continue };

        let rest: Vec<&str> = parts.collect();
        let looks_timed = rest.len() >= 2 && rest[0].contains('-') && rest[1].contains(':');
        if !looks_timed {
            // Plain list: every token is an address
            bans.banned_ips.push(first.to_string());
            bans.banned_ips.extend(rest.iter().map(|s| s.to_string()));
            continue;
        }

        bans.banned_ips.push(first.to_string());
        let stamp = format!("{} {}", rest[0], rest[1]);
        if let Some(start) = parse_local_time(&stamp) {
            if start > cutoff && start <= now {
                bans.new_in_last_hour += 1;
            }
        }
    }
    bans
}

fn parse_local_time(stamp: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").ok()?;
    Local.from_local_datetime(&naive).earliest()
}
