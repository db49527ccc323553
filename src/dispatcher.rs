use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, BotReply, DialogueBackend, WebhookRequest};
use crate::locale::Locale;
use crate::progress::{ProfileProgress, ProfileSchema, SlotMap, reduce};
use crate::session::{BotEntry, Message, Session};

pub enum DispatchCommand<'a> {
    /// Free text typed by the user.
    Text { text: &'a str },
    /// Whatever is sitting in the input buffer.
    SubmitInput,
    /// A quick-reply button; the payload is both what the user sees and what
    /// the backend receives.
    QuickReply { payload: &'a str },
}

impl DispatchCommand<'_> {
    fn kind(&self) -> &'static str {
        match self {
            DispatchCommand::Text { .. } | DispatchCommand::SubmitInput => "text",
            DispatchCommand::QuickReply { .. } => "quick_reply",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Blank input; nothing appended, no backend call.
    Ignored,
    Delivered { replies: usize },
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSnapshot {
    pub messages: Vec<Message>,
    pub pending_input: String,
    pub connection_degraded: bool,
    pub awaiting_reply: bool,
    pub progress: ProfileProgress,
    pub revision: u64,
}

struct ChatState {
    session: Session,
    progress: ProfileProgress,
    sender_id: String,
}

impl ChatState {
    fn start(locale: Locale, schema: &ProfileSchema, sender_id: Option<&str>) -> Self {
        Self {
            session: Session::new(locale),
            progress: ProfileProgress::empty(schema),
            sender_id: sender_id.map_or_else(|| Uuid::new_v4().to_string(), str::to_string),
        }
    }
}

/// Counts one outstanding backend call; released on drop so a dispatch
/// cancelled mid-flight (client hung up) does not leave it raised.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sole writer of the session and progress state and the only component
/// that talks to the dialogue backend.
///
/// Dispatches run one at a time in arrival order: `gate` is held across the
/// whole user-append, backend round trip, bot-append sequence. The state lock
/// is only taken for the short mutations so snapshots stay available while a
/// request is outstanding.
pub struct Dispatcher {
    backend: Arc<dyn DialogueBackend>,
    schema: Arc<ProfileSchema>,
    locale: Locale,
    pinned_sender: Option<String>,
    gate: Mutex<()>,
    in_flight: AtomicUsize,
    state: RwLock<ChatState>,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn DialogueBackend>,
        schema: ProfileSchema,
        locale: Locale,
        sender_id: Option<String>,
    ) -> Self {
        let state = ChatState::start(locale, &schema, sender_id.as_deref());
        Self {
            backend,
            schema: Arc::new(schema),
            locale,
            pinned_sender: sender_id,
            gate: Mutex::new(()),
            in_flight: AtomicUsize::new(0),
            state: RwLock::new(state),
        }
    }

    pub async fn send_text(&self, text: &str) -> DispatchOutcome {
        self.execute(DispatchCommand::Text { text }).await
    }

    pub async fn send_quick_reply(&self, payload: &str) -> DispatchOutcome {
        self.execute(DispatchCommand::QuickReply { payload }).await
    }

    pub async fn submit_input(&self) -> DispatchOutcome {
        self.execute(DispatchCommand::SubmitInput).await
    }

    pub async fn set_pending_input(&self, text: &str) {
        self.state.write().await.session.set_pending_input(text);
    }

    pub async fn sender_id(&self) -> String {
        self.state.read().await.sender_id.clone()
    }

    pub async fn snapshot(&self) -> ChatSnapshot {
        let st = self.state.read().await;
        ChatSnapshot {
            messages: st.session.messages().to_vec(),
            pending_input: st.session.pending_input().to_string(),
            connection_degraded: st.session.connection_degraded(),
            awaiting_reply: self.in_flight.load(Ordering::SeqCst) > 0,
            progress: st.progress.clone(),
            revision: st.session.revision(),
        }
    }

    /// Starts over with a fresh greeting and empty progress. Waits for any
    /// dispatch in progress to finish first.
    pub async fn reset(&self) {
        let _turn = self.gate.lock().await;
        let mut st = self.state.write().await;
        *st = ChatState::start(self.locale, &self.schema, self.pinned_sender.as_deref());
        info!(sender = %st.sender_id, "session restarted");
    }

    pub async fn execute(&self, cmd: DispatchCommand<'_>) -> DispatchOutcome {
        if let DispatchCommand::Text { text } | DispatchCommand::QuickReply { payload: text } = &cmd {
            if text.trim().is_empty() {
                return DispatchOutcome::Ignored;
            }
        }

        let _turn = self.gate.lock().await;
        let kind = cmd.kind();
        let first_only = matches!(cmd, DispatchCommand::QuickReply { .. });

        let (req, user_msg) = {
            let mut st = self.state.write().await;
            let appended = match cmd {
                DispatchCommand::Text { text } | DispatchCommand::QuickReply { payload: text } => {
                    let msg = st.session.append_user_message(text);
                    if msg.is_some() {
                        st.session.clear_pending_input();
                    }
                    msg
                }
                DispatchCommand::SubmitInput => st.session.submit_input(),
            };
            let Some(msg) = appended else {
                return DispatchOutcome::Ignored;
            };
            let req = WebhookRequest { sender: st.sender_id.clone(), message: msg.text.clone() };
            (req, msg)
        };

        metrics::counter!("profile_chat_dispatch_total", "kind" => kind).increment(1);
        debug!(kind, id = %user_msg.id, "dispatching to dialogue backend");

        let outstanding = InFlight::enter(&self.in_flight);
        let result = self.backend.exchange(&req).await;

        let mut st = self.state.write().await;
        drop(outstanding);
        match result {
            Ok(replies) => {
                if let Some(slots) = merged_slots(&replies) {
                    st.progress = reduce(&self.schema, &slots);
                    metrics::gauge!("profile_chat_overall_progress").set(st.progress.overall_progress);
                }
                // a button press only surfaces the first reply item
                let shown = if first_only { 1 } else { replies.len() };
                let entries: Vec<BotEntry> = replies.into_iter().take(shown).map(to_entry).collect();
                let count = entries.len();
                st.session.append_bot_messages(entries);
                info!(kind, replies = count, progress = st.progress.overall_progress, "backend replied");
                DispatchOutcome::Delivered { replies: count }
            }
            Err(err) => {
                metrics::counter!("profile_chat_backend_failures_total").increment(1);
                warn!(kind, error = %err, "dialogue backend call failed");
                degrade(&mut st, self.locale, &err);
                DispatchOutcome::Failed
            }
        }
    }
}

fn degrade(st: &mut ChatState, locale: Locale, err: &BackendError) {
    if !st.session.connection_degraded() {
        debug!(error = ?err, "first backend failure, connection marked degraded");
    }
    st.session.mark_degraded();
    st.session.append_system_error_message(locale.connection_error());
}

fn to_entry(reply: BotReply) -> BotEntry {
    BotEntry { text: reply.text.unwrap_or_default(), buttons: reply.buttons }
}

/// Slot maps from every reply item, later items overriding earlier ones.
fn merged_slots(replies: &[BotReply]) -> Option<SlotMap> {
    replies.iter().filter_map(BotReply::slot_map).reduce(|mut acc, next| {
        acc.extend(next);
        acc
    })
}
