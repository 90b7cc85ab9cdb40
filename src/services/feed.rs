//! Live booking list for the admin dashboard.
//!
//! Every booking write publishes the salon id on `AppState::booking_tx`. A
//! subscription re-reads its view on each signal and hands the callback a
//! [`ChangeSet`] against the previous snapshot. The first change set a
//! subscriber sees is flagged `initial`, so existing bookings are never
//! announced as new arrivals.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::db::queries;
use crate::models::Booking;
use crate::services::scheduling::local_midnight;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingView {
    #[default]
    Today,
    Future,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    pub initial: bool,
    pub added: Vec<Booking>,
    pub modified: Vec<Booking>,
    pub removed: Vec<String>,
    /// Set when bookings arrived after the initial snapshot; the dashboard
    /// plays its alert sound on this.
    pub new_arrivals: bool,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SnapshotTracker {
    seen: Option<HashMap<String, Booking>>,
}

impl SnapshotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, snapshot: Vec<Booking>) -> ChangeSet {
        let next: HashMap<String, Booking> =
            snapshot.iter().map(|b| (b.id.clone(), b.clone())).collect();

        let Some(previous) = self.seen.replace(next) else {
            return ChangeSet {
                initial: true,
                added: snapshot,
                ..ChangeSet::default()
            };
        };

        let mut changes = ChangeSet::default();
        for booking in snapshot {
            match previous.get(&booking.id) {
                None => changes.added.push(booking),
                Some(old) if *old != booking => changes.modified.push(booking),
                Some(_) => {}
            }
        }
        if let Some(current) = &self.seen {
            let mut removed: Vec<String> = previous
                .keys()
                .filter(|id| !current.contains_key(*id))
                .cloned()
                .collect();
            removed.sort();
            changes.removed = removed;
        }
        changes.new_arrivals = !changes.added.is_empty();
        changes
    }
}

/// Non-terminal bookings in `view`, ordered by start time.
pub fn load_view(
    state: &AppState,
    salon_id: &str,
    view: BookingView,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<Booking>> {
    let db = state.db();
    let Some(salon) = queries::get_salon(&db, salon_id)? else {
        anyhow::bail!("salon {salon_id} not found");
    };
    let tz = salon.tz();
    let today = now.with_timezone(&tz).date_naive();
    let tomorrow = today + Duration::days(1);
    let start_of_today = local_midnight(tz, today);
    let start_of_tomorrow = local_midnight(tz, tomorrow);

    match view {
        BookingView::Today => queries::get_active_bookings(
            &db,
            salon_id,
            &start_of_today,
            Some(&start_of_tomorrow),
        ),
        BookingView::Future => queries::get_active_bookings(&db, salon_id, &start_of_tomorrow, None),
    }
}

/// Spawns a subscription for one salon's view. `on_change` runs once with the
/// initial snapshot and then for every non-empty diff; returning `false` ends
/// the subscription.
pub fn subscribe<F>(
    state: Arc<AppState>,
    salon_id: String,
    view: BookingView,
    on_change: F,
) -> JoinHandle<()>
where
    F: FnMut(&ChangeSet) -> bool + Send + 'static,
{
    subscribe_until(state, salon_id, view, std::future::pending(), on_change)
}

/// Like [`subscribe`], but also ends as soon as `cancelled` resolves, without
/// waiting for the next change.
pub fn subscribe_until<F, C>(
    state: Arc<AppState>,
    salon_id: String,
    view: BookingView,
    cancelled: C,
    mut on_change: F,
) -> JoinHandle<()>
where
    F: FnMut(&ChangeSet) -> bool + Send + 'static,
    C: Future<Output = ()> + Send + 'static,
{
    // Subscribe before the first read so no write slips between them.
    let mut rx = state.booking_tx.subscribe();

    tokio::spawn(async move {
        tokio::pin!(cancelled);
        let mut tracker = SnapshotTracker::new();

        match load_view(&state, &salon_id, view, Utc::now()) {
            Ok(snapshot) => {
                if !on_change(&tracker.apply(snapshot)) {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, salon = %salon_id, "failed to load booking feed");
                return;
            }
        }

        loop {
            let signal = tokio::select! {
                _ = &mut cancelled => break,
                signal = rx.recv() => signal,
            };
            match signal {
                Ok(changed) if changed != salon_id => continue,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }

            let snapshot = match load_view(&state, &salon_id, view, Utc::now()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, salon = %salon_id, "failed to refresh booking feed");
                    continue;
                }
            };
            let changes = tracker.apply(snapshot);
            if changes.is_empty() {
                continue;
            }
            if !on_change(&changes) {
                break;
            }
        }

        tracing::debug!(salon = %salon_id, "booking feed subscription ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db;
    use crate::db::seed::default_salon;
    use crate::models::BookingStatus;
    use crate::services::bookings::{self, BookingForm};
    use crate::services::mailer::{Email, Mailer};
    use async_trait::async_trait;
    use std::time::Duration as StdDuration;
    use tokio::sync::mpsc;

    fn booking(id: &str, status: BookingStatus) -> Booking {
        let t = DateTime::from_timestamp(1_750_000_000, 0).unwrap();
        Booking {
            id: id.to_string(),
            salon_id: "mida".to_string(),
            service_name: "Cut".to_string(),
            staff_member: "Any".to_string(),
            start_time: t,
            status,
            customer_name: "Alice".to_string(),
            customer_email: "alice@example.com".to_string(),
            customer_phone: "0712345678".to_string(),
            is_manual: false,
            price: 350.0,
            reminder_sent: false,
            completed_at: None,
            created_at: t,
            updated_at: t,
        }
    }

    #[test]
    fn test_first_snapshot_is_initial_without_alert() {
        let mut tracker = SnapshotTracker::new();
        let changes = tracker.apply(vec![booking("a", BookingStatus::Pending)]);
        assert!(changes.initial);
        assert_eq!(changes.added.len(), 1);
        assert!(!changes.new_arrivals);
    }

    #[test]
    fn test_diff_added_modified_removed() {
        let mut tracker = SnapshotTracker::new();
        tracker.apply(vec![
            booking("a", BookingStatus::Pending),
            booking("b", BookingStatus::Pending),
        ]);

        let changes = tracker.apply(vec![
            booking("a", BookingStatus::Confirmed),
            booking("c", BookingStatus::Pending),
        ]);
        assert!(!changes.initial);
        assert_eq!(changes.added.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(changes.modified.len(), 1);
        assert_eq!(changes.modified[0].status, BookingStatus::Confirmed);
        assert_eq!(changes.removed, vec!["b".to_string()]);
        assert!(changes.new_arrivals);
    }

    #[test]
    fn test_unchanged_snapshot_is_empty() {
        let mut tracker = SnapshotTracker::new();
        tracker.apply(vec![booking("a", BookingStatus::Pending)]);
        let changes = tracker.apply(vec![booking("a", BookingStatus::Pending)]);
        assert!(changes.is_empty());
        assert!(!changes.new_arrivals);
    }

    #[test]
    fn test_empty_initial_snapshot() {
        let mut tracker = SnapshotTracker::new();
        let changes = tracker.apply(vec![]);
        assert!(changes.initial);
        assert!(changes.is_empty());
        let changes = tracker.apply(vec![booking("a", BookingStatus::Pending)]);
        assert!(!changes.initial);
        assert!(changes.new_arrivals);
    }

    struct NullMailer;

    #[async_trait]
    impl Mailer for NullMailer {
        async fn send(&self, _email: &Email) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_state() -> Arc<AppState> {
        let conn = db::init_db(":memory:").unwrap();
        for id in ["mida", "other"] {
            let mut salon = default_salon(id, "1234");
            salon.timezone = "UTC".to_string();
            queries::save_salon(&conn, &salon).unwrap();
        }
        Arc::new(AppState::new(conn, AppConfig::from_env(), Box::new(NullMailer)))
    }

    fn form(start: &str) -> BookingForm {
        BookingForm {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            phone: "0712345678".to_string(),
            service: "Cut".to_string(),
            staff: None,
            start_time: Some(start.parse().unwrap()),
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<ChangeSet>) -> ChangeSet {
        tokio::time::timeout(StdDuration::from_secs(5), rx.recv())
            .await
            .expect("no change set within 5s")
            .expect("subscription ended")
    }

    fn forward(tx: mpsc::UnboundedSender<ChangeSet>) -> impl FnMut(&ChangeSet) -> bool + Send + 'static {
        move |changes| tx.send(changes.clone()).is_ok()
    }

    #[tokio::test]
    async fn test_subscription_reports_arrivals_and_cancellations() {
        let state = test_state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = subscribe(Arc::clone(&state), "mida".to_string(), BookingView::Future, forward(tx));

        let initial = next(&mut rx).await;
        assert!(initial.initial);
        assert!(initial.added.is_empty());

        let booking = bookings::create_manual_booking(&state, "mida", &form("2030-06-18T08:00:00Z")).unwrap();
        let changes = next(&mut rx).await;
        assert!(!changes.initial);
        assert!(changes.new_arrivals);
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.added[0].id, booking.id);

        // another tenant's write never reaches this subscriber
        bookings::create_manual_booking(&state, "other", &form("2030-06-18T08:00:00Z")).unwrap();
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        bookings::change_status(&state, "mida", &booking.id, BookingStatus::Cancelled, true, Utc::now())
            .unwrap();
        let changes = next(&mut rx).await;
        assert_eq!(changes.removed, vec![booking.id.clone()]);
        assert!(changes.added.is_empty());
        assert!(!changes.new_arrivals);

        handle.abort();
    }

    #[tokio::test]
    async fn test_subscription_ends_when_callback_declines() {
        let state = test_state();
        let handle = subscribe(Arc::clone(&state), "mida".to_string(), BookingView::Today, |_| false);
        tokio::time::timeout(StdDuration::from_secs(5), handle)
            .await
            .expect("subscription still running")
            .unwrap();
    }

    #[tokio::test]
    async fn test_subscription_ends_when_cancelled_without_writes() {
        let state = test_state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let closer = tx.clone();
        let handle = subscribe_until(
            Arc::clone(&state),
            "mida".to_string(),
            BookingView::Today,
            async move { closer.closed().await },
            forward(tx),
        );

        next(&mut rx).await;
        drop(rx);
        tokio::time::timeout(StdDuration::from_secs(5), handle)
            .await
            .expect("subscription outlived its receiver")
            .unwrap();
    }
}
