use crate::common::{VerifyError, Result};
use crate::service::client::ApiClient;
use crate::service::protocol::{
    Ack, DecisionAction, DecisionRequest, Notification, NotificationList, ReadStatus, UnreadCount,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct CenterState {
    notifications: Vec<Notification>,
    unread: u64,
    /// Ticket of the most recent list fetch; loading until it completes.
    latest_list_fetch: Option<u64>,
    /// Last ticket handed out; every fetch and local mutation takes one.
    next_ticket: u64,
    list_applied: u64,
    unread_applied: u64,
    in_flight: HashSet<String>,
}

impl CenterState {
    fn ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Records a local mutation so that fetches issued before it are stale.
    fn mark_local_update(&mut self) {
        let ticket = self.ticket();
        self.list_applied = ticket;
        self.unread_applied = ticket;
    }
}

/// Notification list, unread badge count and per-notification actions.
///
/// Clones share state, so several operations may be outstanding at once.
/// Completions are applied in ticket order: a fetch that finishes after a
/// newer update of the same resource is discarded.
#[derive(Clone)]
pub struct NotificationCenter {
    client: ApiClient,
    state: Arc<Mutex<CenterState>>,
}

/// Releases the in-flight mark for a notification when dropped.
struct InFlight {
    state: Arc<Mutex<CenterState>>,
    id: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            .remove(&self.id);
    }
}

impl NotificationCenter {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(CenterState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, CenterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state().notifications.clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.state().unread
    }

    pub fn is_loading(&self) -> bool {
        self.state().latest_list_fetch.is_some()
    }

    /// True while an approve/reject for `id` is outstanding.
    pub fn is_action_pending(&self, id: &str) -> bool {
        self.state().in_flight.contains(id)
    }

    /// Fetches all notifications in server order.
    ///
    /// Returns `false` when the result was discarded as stale.
    pub async fn refresh_list(&self) -> Result<bool> {
        let ticket = {
            let mut state = self.state();
            let ticket = state.ticket();
            state.latest_list_fetch = Some(ticket);
            ticket
        };

        let result = self.client.get_json::<NotificationList>("/notifications").await;

        let mut state = self.state();
        if state.latest_list_fetch == Some(ticket) {
            state.latest_list_fetch = None;
        }
        let list = match result {
            Ok(list) => list.notifications,
            Err(e) => {
                tracing::error!("Error fetching notifications: {}", e);
                return Err(e);
            }
        };

        if ticket <= state.list_applied {
            tracing::debug!("Discarding stale notification list (ticket {})", ticket);
            return Ok(false);
        }
        state.list_applied = ticket;
        if ticket > state.unread_applied {
            state.unread = list.iter().filter(|n| n.is_unread()).count() as u64;
            state.unread_applied = ticket;
        }
        state.notifications = list;
        Ok(true)
    }

    /// Fetches the unread count on its own; it may briefly disagree with
    /// the list.
    pub async fn refresh_unread_count(&self) -> Result<bool> {
        let ticket = self.state().ticket();
        let count = match self.client.get_json::<UnreadCount>("/notifications/unread-count").await {
            Ok(count) => count.count,
            Err(e) => {
                tracing::error!("Error fetching unread count: {}", e);
                return Err(e);
            }
        };

        let mut state = self.state();
        if ticket <= state.unread_applied {
            tracing::debug!("Discarding stale unread count (ticket {})", ticket);
            return Ok(false);
        }
        state.unread = count;
        state.unread_applied = ticket;
        Ok(true)
    }

    /// Refreshes list and count concurrently.
    pub async fn refresh(&self) -> Result<()> {
        let (list, count) = tokio::join!(self.refresh_list(), self.refresh_unread_count());
        list?;
        count?;
        Ok(())
    }

    /// Zeroes the unread count right away, then tells the server and reloads
    /// the list. If the server call fails the list is reloaded anyway so the
    /// count is reconciled from it, and the error is returned.
    pub async fn mark_all_read(&self) -> Result<()> {
        {
            let mut state = self.state();
            state.unread = 0;
            for notification in &mut state.notifications {
                notification.status = ReadStatus::Read;
            }
            state.mark_local_update();
        }

        let result = self.client.put_empty("/notifications/mark-all-read").await;
        if let Err(e) = &result {
            tracing::error!("Error marking all as read: {}", e);
            if e.is_session_expired() {
                return result;
            }
        }

        if let Err(e) = self.refresh_list().await {
            tracing::warn!("Failed to reload notifications after mark-all-read: {}", e);
        }
        result
    }

    /// Approves or rejects the flagged picture behind notification `id`.
    ///
    /// On success the notification is removed and the unread count drops by
    /// one (never below zero). On failure nothing changes.
    pub async fn act(&self, id: &str, action: DecisionAction) -> Result<()> {
        let _guard = {
            let mut state = self.state();
            let notification = state
                .notifications
                .iter()
                .find(|n| n.id == id)
                .ok_or_else(|| VerifyError::UnknownNotification(id.to_string()))?;
            if !notification.is_actionable() {
                return Err(VerifyError::InvalidState(format!(
                    "notification {} has no pending decision",
                    id
                )));
            }
            if !state.in_flight.insert(id.to_string()) {
                return Err(VerifyError::ActionInFlight(id.to_string()));
            }
            InFlight {
                state: Arc::clone(&self.state),
                id: id.to_string(),
            }
        };

        let fallback = format!("Failed to {} profile picture", action.as_str());
        let request = DecisionRequest {
            notification_id: id.to_string(),
            action,
        };
        let ack: Ack = match self
            .client
            .post_json("/notifications/profile-picture-decision", &request)
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                tracing::error!("Error handling notification action: {}", e);
                return Err(match e {
                    VerifyError::Server { status, message } => VerifyError::Server {
                        status,
                        message: Some(message.unwrap_or(fallback)),
                    },
                    other => other,
                });
            }
        };

        if !ack.success {
            return Err(VerifyError::Server {
                status: 200,
                message: Some(ack.server_message().unwrap_or(fallback)),
            });
        }

        tracing::info!("Applied '{}' decision for notification {}", action.as_str(), id);
        let mut state = self.state();
        state.notifications.retain(|n| n.id != id);
        state.unread = state.unread.saturating_sub(1);
        state.mark_local_update();
        Ok(())
    }

    /// Deletes a notification.
    pub async fn dismiss(&self, id: &str) -> Result<()> {
        self.client.delete(&format!("/notifications/{}", id)).await?;

        let mut state = self.state();
        let was_unread = state
            .notifications
            .iter()
            .any(|n| n.id == id && n.is_unread());
        state.notifications.retain(|n| n.id != id);
        if was_unread {
            state.unread = state.unread.saturating_sub(1);
        }
        state.mark_local_update();
        Ok(())
    }

    /// Refreshes every `interval` until `shutdown` resolves. Fetch errors are
    /// logged and polling continues; an expired session stops it.
    pub async fn poll<F>(&self, interval: Duration, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::debug!("Notification polling stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match self.refresh().await {
                        Ok(()) => {}
                        Err(VerifyError::SessionExpired) => return Err(VerifyError::SessionExpired),
                        Err(e) => tracing::warn!("Notification poll failed: {}", e),
                    }
                }
            }
        }
    }
}
