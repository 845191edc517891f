use tokio::sync::broadcast;

/// Fire-and-forget cache invalidation signal.
///
/// After any mutating gateway call the pipeline publishes module-scoped tags
/// (e.g. "guides", "guide stats", "guide categories") so downstream caches
/// can refresh. Delivery is outside the transactional boundary: a dropped
/// signal is tolerated, a failed mutation never publishes.
#[derive(Clone)]
pub struct CacheInvalidator {
    sender: broadcast::Sender<Vec<String>>,
}

impl CacheInvalidator {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish invalidation tags. Succeeds regardless of subscriber count.
    pub fn invalidate<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        if tags.is_empty() {
            return;
        }
        tracing::debug!(?tags, "cache invalidation");
        // No receivers is fine; the signal is best-effort
        let _ = self.sender.send(tags);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<String>> {
        self.sender.subscribe()
    }
}

impl Default for CacheInvalidator {
    fn default() -> Self {
        Self::new(64)
    }
}
