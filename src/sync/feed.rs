use tracing::{info, warn};

use crate::store::{ChangeKind, EventStore, FeedSubscription, StoreError};

#[derive(Debug)]
enum FeedState {
    Idle,
    Active(FeedSubscription),
    Failed,
    Closed,
}

/// Holds the screen's single change-feed subscription.
///
/// Subscribes at most once. A failed or closed feed is not retried here;
/// focus-triggered fetches keep the replica eventually consistent.
#[derive(Debug)]
pub struct FeedSubscriber {
    resource: String,
    state: FeedState,
}

impl FeedSubscriber {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            state: FeedState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, FeedState::Active(_))
    }

    pub async fn subscribe<S: EventStore>(&mut self, store: &S) -> Result<(), StoreError> {
        if !matches!(self.state, FeedState::Idle) {
            return Ok(());
        }
        match store.subscribe_to_event_changes(&self.resource).await {
            Ok(subscription) => {
                info!(resource = %self.resource, "Subscribed to change feed");
                self.state = FeedState::Active(subscription);
                Ok(())
            }
            Err(e) => {
                warn!(resource = %self.resource, error = %e, "Change feed unavailable, relying on focus refresh");
                self.state = FeedState::Failed;
                Err(e)
            }
        }
    }

    /// Waits for the next notification. Pends forever when no feed is active.
    pub async fn next(&mut self) -> ChangeKind {
        loop {
            let FeedState::Active(subscription) = &mut self.state else {
                return std::future::pending().await;
            };
            match subscription.recv().await {
                Some(kind) => return kind,
                None => {
                    warn!(resource = %self.resource, "Change feed ended");
                    self.state = FeedState::Closed;
                }
            }
        }
    }

    /// Releases the subscription. Later calls to `subscribe` are ignored.
    pub fn unsubscribe(&mut self) {
        if let FeedState::Active(_) = std::mem::replace(&mut self.state, FeedState::Closed) {
            info!(resource = %self.resource, "Unsubscribed from change feed");
        }
    }
}
