/// In-process change feed
///
/// A broadcast bus for row-change notifications. Write paths publish a
/// [`ChangeEvent`] after their transaction commits; each connected client
/// holds a [`ChangeFeedReceiver`] and forwards events it is allowed to see.
///
/// # Delivery semantics
///
/// - Events are notifications, not state: they carry identifiers only, and
///   consumers re-read through policy-checked read paths. A client can
///   never learn more from the feed than it could from a query.
/// - Visibility is scoped per event via [`ChangeEvent::team_scope`]: the
///   subscription layer drops events for teams the subscriber cannot see,
///   using the same membership predicate as reads.
/// - The channel is bounded. A consumer that falls behind observes
///   `RecvError::Lagged` and must treat its local state as stale (the API
///   layer emits a `resync` signal); events are never redelivered out of
///   order.
///
/// # Example
///
/// ```
/// use crewboard_shared::events::feed::{ChangeEvent, ChangeFeed, ChangeOp, EntityKind};
/// use uuid::Uuid;
///
/// # async fn example() {
/// let feed = ChangeFeed::new(256);
/// let mut rx = feed.subscribe();
///
/// let team_id = Uuid::new_v4();
/// feed.publish(ChangeEvent::new(
///     EntityKind::Task,
///     ChangeOp::Created,
///     Uuid::new_v4(),
///     Some(team_id),
///     Uuid::new_v4(),
/// ));
///
/// let event = rx.recv().await.unwrap();
/// assert_eq!(event.team_scope(), Some(team_id));
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Receiver half of the change feed
pub type ChangeFeedReceiver = broadcast::Receiver<ChangeEvent>;

/// Entity kinds that emit change events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Profile,
    Team,
    Membership,
    Task,
}

impl EntityKind {
    /// Entity kind as a wire string
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Profile => "profile",
            EntityKind::Team => "team",
            EntityKind::Membership => "membership",
            EntityKind::Task => "task",
        }
    }
}

/// What happened to the row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Created,
    Updated,
    Deleted,
}

impl ChangeOp {
    /// Operation as a wire string
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOp::Created => "created",
            ChangeOp::Updated => "updated",
            ChangeOp::Deleted => "deleted",
        }
    }
}

/// A single row-change notification
///
/// Carries identifiers and the moment of change, never row contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Which table changed
    pub entity: EntityKind,

    /// Create, update, or delete
    pub op: ChangeOp,

    /// Primary key of the changed row (user_id for memberships' target)
    pub row_id: Uuid,

    /// Team the row belongs to; None for rows outside any team (profiles)
    pub team_id: Option<Uuid>,

    /// Account that performed the change
    pub actor_id: Uuid,

    /// When the change was published
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Creates an event stamped with the current time
    pub fn new(
        entity: EntityKind,
        op: ChangeOp,
        row_id: Uuid,
        team_id: Option<Uuid>,
        actor_id: Uuid,
    ) -> Self {
        Self {
            entity,
            op,
            row_id,
            team_id,
            actor_id,
            occurred_at: Utc::now(),
        }
    }

    /// The team whose visibility rules govern this event
    ///
    /// None means the event is private to the actor (profile changes): it
    /// must only be delivered to the actor's own subscription.
    pub fn team_scope(&self) -> Option<Uuid> {
        self.team_id
    }
}

/// Broadcast bus for change events
///
/// Cheap to clone; all clones publish into the same channel. Publishing
/// never blocks and never fails: with no subscribers the event is simply
/// dropped.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Creates a feed with the given per-subscriber buffer capacity
    ///
    /// A subscriber that lets more than `capacity` events queue up is
    /// lagged and must resync.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all current subscribers
    pub fn publish(&self, event: ChangeEvent) {
        // receiver_count == 0 is the only error case and is not a fault
        let delivered = self.sender.send(event.clone()).unwrap_or(0);

        tracing::debug!(
            entity = event.entity.as_str(),
            op = event.op.as_str(),
            row_id = %event.row_id,
            team_id = ?event.team_id,
            subscribers = delivered,
            "Published change event"
        );
    }

    /// Opens a new subscription starting at the current tail
    ///
    /// Events published before the call are not observed.
    pub fn subscribe(&self) -> ChangeFeedReceiver {
        self.sender.subscribe()
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    fn task_event(team_id: Uuid) -> ChangeEvent {
        ChangeEvent::new(
            EntityKind::Task,
            ChangeOp::Created,
            Uuid::new_v4(),
            Some(team_id),
            Uuid::new_v4(),
        )
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let feed = ChangeFeed::new(16);
        let mut rx1 = feed.subscribe();
        let mut rx2 = feed.subscribe();

        let team_id = Uuid::new_v4();
        feed.publish(task_event(team_id));

        assert_eq!(rx1.recv().await.unwrap().team_id, Some(team_id));
        assert_eq!(rx2.recv().await.unwrap().team_id, Some(team_id));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_a_noop() {
        let feed = ChangeFeed::new(16);
        feed.publish(task_event(Uuid::new_v4()));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_starts_at_tail() {
        let feed = ChangeFeed::new(16);

        feed.publish(task_event(Uuid::new_v4()));

        let mut rx = feed.subscribe();
        let later = Uuid::new_v4();
        feed.publish(task_event(later));

        // Only the event published after subscribing is observed.
        assert_eq!(rx.recv().await.unwrap().team_id, Some(later));
        assert!(matches!(rx.try_recv(), Err(_)));
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let feed = ChangeFeed::new(16);
        let mut rx = feed.subscribe();

        let teams: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for &team_id in &teams {
            feed.publish(task_event(team_id));
        }

        for &team_id in &teams {
            assert_eq!(rx.recv().await.unwrap().team_id, Some(team_id));
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_observes_lag() {
        let feed = ChangeFeed::new(2);
        let mut rx = feed.subscribe();

        for _ in 0..5 {
            feed.publish(task_event(Uuid::new_v4()));
        }

        // The buffer overflowed, so the receiver must learn it missed
        // events instead of silently skipping them.
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_profile_events_have_no_team_scope() {
        let actor = Uuid::new_v4();
        let event = ChangeEvent::new(EntityKind::Profile, ChangeOp::Updated, actor, None, actor);
        assert_eq!(event.team_scope(), None);
    }

    #[test]
    fn test_wire_strings() {
        assert_eq!(EntityKind::Task.as_str(), "task");
        assert_eq!(EntityKind::Membership.as_str(), "membership");
        assert_eq!(ChangeOp::Deleted.as_str(), "deleted");
    }
}
