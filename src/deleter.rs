//! Message deleter: caches messages marked for deletion and deletes them
//! in per-chat batches.
//!
//! A chat's batch is flushed when a new message arrives and the queue is
//! too long or too old, and on every run of the auto-deleter. The
//! auto-deleter reschedules itself after each run, stretching or shrinking
//! its interval with a multiplier in `[1, 6]` depending on how much it
//! found to delete.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DeleterOptions;
use crate::error::GatewayError;
use crate::gateway::{ChatMessage, MessageRecord, MessagingGateway, is_user_chat};

/// Bounds of the auto-deleter interval multiplier.
pub const MIN_MULTIPLIER: u32 = 1;
pub const MAX_MULTIPLIER: u32 = 6;

/// Wait before checking whether a flushed one-to-one chat is empty.
const CHAT_CLEANUP_DELAY: Duration = Duration::from_secs(1);

/// Compute the next multiplier after a run that flushed `flushed` messages.
///
/// Heavy runs shorten the next wait, light runs lengthen it.
pub fn next_multiplier(current: u32, flushed: usize, max_queue_length: usize) -> u32 {
    let m = i64::from(current);
    let next = if m > 1 && flushed > max_queue_length << 1 {
        m - 2
    } else if m > 1 && flushed > max_queue_length {
        m - 1
    } else if m < 2 && flushed < max_queue_length >> 1 {
        m + 1
    } else if m < 6 && flushed < max_queue_length >> 2 {
        m + 2
    } else {
        m
    };
    next.clamp(i64::from(MIN_MULTIPLIER), i64::from(MAX_MULTIPLIER)) as u32
}

#[derive(Default)]
struct DeleteQueue {
    records: Vec<MessageRecord>,
    /// Removed from the map; writers must fetch a fresh queue.
    retired: bool,
}

type SharedQueue = Arc<tokio::sync::Mutex<DeleteQueue>>;

struct AutoDeleter {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Batches "delete for me" requests per chat.
pub struct MessageDeleter {
    gateway: Arc<dyn MessagingGateway>,
    options: DeleterOptions,
    queues: Mutex<HashMap<String, SharedQueue>>,
    multiplier: AtomicU32,
    auto: Mutex<Option<AutoDeleter>>,
    cleanup_delay: Duration,
}

impl MessageDeleter {
    /// Create a deleter. Starts the auto-deleter when
    /// `options.perform_auto_deletion` is set, which requires a Tokio runtime.
    pub fn new(gateway: Arc<dyn MessagingGateway>, options: DeleterOptions) -> Arc<Self> {
        Self::with_cleanup_delay(gateway, options, CHAT_CLEANUP_DELAY)
    }

    /// Like [`new`](Self::new) with a custom delay before empty-chat cleanup.
    pub fn with_cleanup_delay(
        gateway: Arc<dyn MessagingGateway>,
        options: DeleterOptions,
        cleanup_delay: Duration,
    ) -> Arc<Self> {
        let auto_start = options.perform_auto_deletion;
        let deleter = Arc::new(Self {
            gateway,
            options,
            queues: Mutex::new(HashMap::new()),
            multiplier: AtomicU32::new(MIN_MULTIPLIER),
            auto: Mutex::new(None),
            cleanup_delay,
        });
        if auto_start {
            deleter.start_auto_deleter();
        }
        deleter
    }

    pub fn options(&self) -> &DeleterOptions {
        &self.options
    }

    /// Current interval multiplier.
    pub fn multiplier(&self) -> u32 {
        self.multiplier.load(Ordering::SeqCst)
    }

    /// Wait before the next scheduled run, given the current multiplier.
    pub fn next_interval(&self) -> Duration {
        self.options.collection_interval * self.multiplier()
    }

    /// Whether the queue should be flushed before appending a message
    /// stamped `new_timestamp`.
    pub fn can_clear_delete_queue(&self, queue: &[MessageRecord], new_timestamp: i64) -> bool {
        if queue.len() > self.options.max_queue_length {
            return true;
        }
        let delay = i64::try_from(self.options.message_delay.as_secs()).unwrap_or(i64::MAX);
        queue
            .last()
            .is_some_and(|last| new_timestamp.saturating_sub(last.timestamp) > delay)
    }

    /// Mark `message` for deletion for the bot only.
    ///
    /// The message is queued under its chat; an overdue queue is flushed
    /// first. Returns the message's position in the queue.
    pub async fn delete_for_me(&self, message: &ChatMessage) -> usize {
        let chat = message.chat_id();
        loop {
            let queue = self.queue_for(chat);
            let mut queue = queue.lock().await;
            if queue.retired {
                continue;
            }

            if !queue.records.is_empty()
                && self.can_clear_delete_queue(&queue.records, message.timestamp)
            {
                if let Err(e) = self.flush(chat, &mut queue).await {
                    warn!(chat = %chat, error = %e, "Batch delete failed, keeping queue");
                }
            }

            queue.records.push(MessageRecord::from(message));
            let position = queue.records.len();
            info!(chat = %chat, kind = %message.kind, position, "Queued message for deletion");
            return position;
        }
    }

    /// Flush every non-empty queue. Returns the number of messages deleted.
    ///
    /// Chats whose batch was small stop being tracked; for one-to-one chats
    /// an empty-chat check runs shortly after.
    pub async fn execute(&self) -> usize {
        let snapshot: Vec<(String, SharedQueue)> = self
            .lock_queues()
            .iter()
            .map(|(chat, queue)| (chat.clone(), Arc::clone(queue)))
            .collect();

        let mut total = 0;
        for (chat, shared) in snapshot {
            let mut queue = shared.lock().await;
            if queue.retired || queue.records.is_empty() {
                continue;
            }

            let old_len = queue.records.len();
            match self.flush(&chat, &mut queue).await {
                Ok(count) => total += count,
                Err(e) => {
                    warn!(chat = %chat, error = %e, "Batch delete failed, will retry next run");
                    continue;
                }
            }

            if old_len < self.options.max_queue_length >> 2 {
                queue.retired = true;
                {
                    let mut queues = self.lock_queues();
                    if queues.get(&chat).is_some_and(|q| Arc::ptr_eq(q, &shared)) {
                        queues.remove(&chat);
                    }
                }
                debug!(chat = %chat, "Stopped tracking chat");
                if is_user_chat(&chat) {
                    self.schedule_chat_cleanup(chat);
                }
            }
        }
        total
    }

    /// Messages queued for `chat`.
    pub async fn pending(&self, chat: &str) -> usize {
        let queue = self.lock_queues().get(chat).cloned();
        match queue {
            Some(queue) => queue.lock().await.records.len(),
            None => 0,
        }
    }

    /// Chats with a delete queue.
    pub fn tracked_chats(&self) -> Vec<String> {
        let mut chats: Vec<String> = self.lock_queues().keys().cloned().collect();
        chats.sort();
        chats
    }

    /// Start the recurring auto-deleter. Returns `false` if already running.
    pub fn start_auto_deleter(self: &Arc<Self>) -> bool {
        let mut auto = self.auto.lock().unwrap_or_else(PoisonError::into_inner);
        if auto.as_ref().is_some_and(|a| !a.handle.is_finished()) {
            return false;
        }
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(auto_delete_loop(
            Arc::downgrade(self),
            self.options.collection_interval,
            stop_rx,
        ));
        *auto = Some(AutoDeleter { stop, handle });
        info!(
            interval_secs = self.options.collection_interval.as_secs(),
            "Auto-deleter started"
        );
        true
    }

    /// Cancel the pending auto-deleter run. A run already in progress
    /// finishes. Returns `false` if it was not running.
    pub fn stop_auto_deleter(&self) -> bool {
        let auto = self
            .auto
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match auto {
            Some(auto) => {
                let _ = auto.stop.send(true);
                info!("Auto-deleter stopped");
                true
            }
            None => false,
        }
    }

    /// Whether the auto-deleter is scheduled.
    pub fn is_auto_deleting(&self) -> bool {
        self.auto
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|a| !a.handle.is_finished())
    }

    /// One auto-deleter run: flush everything, adjust the multiplier, and
    /// return the wait before the next run.
    ///
    /// A panic inside the run is logged and the schedule continues.
    pub async fn run_cycle(self: &Arc<Self>) -> Duration {
        info!("Executing auto-deleter");
        let this = Arc::clone(self);
        let flushed = match tokio::spawn(async move { this.execute().await }).await {
            Ok(flushed) => flushed,
            Err(e) => {
                error!(error = %e, "Auto-deleter run failed");
                return self.next_interval();
            }
        };

        if flushed == 0 {
            info!("Nothing to delete");
        } else {
            info!(flushed, "Deleted queued messages");
        }

        let current = self.multiplier();
        let next = next_multiplier(current, flushed, self.options.max_queue_length);
        self.multiplier.store(next, Ordering::SeqCst);

        let wait = self.next_interval();
        info!(multiplier = next, next_secs = wait.as_secs(), "Next auto-deletion scheduled");
        wait
    }

    fn lock_queues(&self) -> MutexGuard<'_, HashMap<String, SharedQueue>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue_for(&self, chat: &str) -> SharedQueue {
        Arc::clone(self.lock_queues().entry(chat.to_string()).or_default())
    }

    /// Delete the queued batch through the gateway and clear it.
    async fn flush(&self, chat: &str, queue: &mut DeleteQueue) -> Result<usize, GatewayError> {
        self.gateway.delete_messages(chat, &queue.records).await?;
        let count = queue.records.len();
        queue.records.clear();
        debug!(chat = %chat, count, "Flushed delete queue");
        Ok(count)
    }

    fn schedule_chat_cleanup(&self, chat: String) {
        let gateway = Arc::clone(&self.gateway);
        let delay = self.cleanup_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match gateway.chat_message_count(&chat).await {
                Ok(0) => match gateway.delete_chat(&chat).await {
                    Ok(()) => info!(chat = %chat, "Deleted empty chat"),
                    Err(e) => warn!(chat = %chat, error = %e, "Failed to delete empty chat"),
                },
                Ok(_) => {}
                Err(e) => warn!(chat = %chat, error = %e, "Failed to inspect chat"),
            }
        });
    }
}

async fn auto_delete_loop(
    deleter: Weak<MessageDeleter>,
    first_wait: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut wait = first_wait;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = stop.changed() => return,
        }
        let Some(deleter) = deleter.upgrade() else {
            return;
        };
        wait = deleter.run_cycle().await;
    }
}
