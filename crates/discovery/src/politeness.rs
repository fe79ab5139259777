use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Per-origin request spacing. Every fetch first acquires its host's slot;
/// concurrent fetches to the same origin serialize at `min_delay` apart
/// while different origins proceed independently.
pub struct Politeness {
    last_seen: DashMap<String, Instant>,
    min_delay: Duration,
}

impl Politeness {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            last_seen: DashMap::new(),
            min_delay,
        }
    }

    /// The effective delay: at least the configured floor, raised by a
    /// robots crawl-delay when one is present.
    pub fn with_crawl_delay(floor: Duration, crawl_delay_seconds: Option<u64>) -> Self {
        let delay = crawl_delay_seconds
            .map(Duration::from_secs)
            .filter(|d| *d > floor)
            .unwrap_or(floor);
        Self::new(delay)
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub async fn acquire(&self, host: &str) {
        loop {
            let wait = match self.last_seen.entry(host.to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(Instant::now());
                    return;
                }
                Entry::Occupied(mut slot) => {
                    let elapsed = slot.get().elapsed();
                    if elapsed >= self.min_delay {
                        slot.insert(Instant::now());
                        return;
                    }
                    self.min_delay - elapsed
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spaces_requests_to_one_host() {
        let politeness = Politeness::new(Duration::from_millis(50));
        let start = Instant::now();
        politeness.acquire("example.com").await;
        politeness.acquire("example.com").await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn different_hosts_do_not_block_each_other() {
        let politeness = Politeness::new(Duration::from_millis(200));
        let start = Instant::now();
        politeness.acquire("a.example.com").await;
        politeness.acquire("b.example.com").await;
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn crawl_delay_raises_the_floor() {
        let p = Politeness::with_crawl_delay(Duration::from_millis(100), Some(2));
        assert_eq!(p.min_delay(), Duration::from_secs(2));

        let p = Politeness::with_crawl_delay(Duration::from_millis(100), None);
        assert_eq!(p.min_delay(), Duration::from_millis(100));
    }
}
