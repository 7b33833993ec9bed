//! Chat session: the send, apply and dismiss handlers.
//!
//! Owns everything that lives for one conversation: history, record
//! snapshots, the pending action slot, and the model rotation. All handlers
//! take `&mut self`, so a send and an apply can never interleave on one
//! session. Every failure is reported to the notifier before it is returned.

use std::sync::Arc;

use thiserror::Error;

use crate::config::AssistantConfig;
use crate::llm::{ChatModel, ChatRequest, LlmError, ModelRotation};
use crate::models::ChatMessage;
use crate::notify::Notifier;
use crate::pipeline::actions::{
    build_system_prompt, derive_fallback_action, parse_action, strip_action_blocks,
    ActionApplier, ActionError, ActionSource, ApplyOutcome, Clock, ConfirmationStaging,
    DateTimeResolver, PendingAction, Snapshots, SystemClock,
};
use crate::store::Stores;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Rate limited on every configured model: {0}")]
    RateLimited(LlmError),

    #[error("Assistant unavailable: {0}")]
    Unavailable(LlmError),

    #[error(transparent)]
    Action(#[from] ActionError),
}

impl ChatError {
    /// Text shown to the user.
    pub fn user_message(&self, config: &AssistantConfig) -> String {
        match self {
            Self::EmptyMessage => "Please type a message first.".to_string(),
            Self::RateLimited(_) => config.rate_limited_message.clone(),
            Self::Unavailable(_) => config.unavailable_message.clone(),
            Self::Action(e) => e.user_message(&config.apply_failed_message),
        }
    }
}

/// What the user sees after sending a message.
#[derive(Debug, Clone)]
pub struct ChatReply {
    /// Assistant reply with any action block removed.
    pub text: String,
    pub model: String,
    /// Action staged by this turn, if any.
    pub staged: Option<PendingAction>,
}

pub struct ChatSession {
    user_id: String,
    config: AssistantConfig,
    model: Arc<dyn ChatModel>,
    stores: Stores,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    rotation: ModelRotation,
    history: Vec<ChatMessage>,
    snapshots: Snapshots,
    staging: ConfirmationStaging,
}

impl ChatSession {
    pub fn new(
        user_id: impl Into<String>,
        config: AssistantConfig,
        model: Arc<dyn ChatModel>,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let rotation = ModelRotation::new(config.models.clone());
        Self {
            user_id: user_id.into(),
            config,
            model,
            stores,
            notifier,
            clock: Arc::new(SystemClock),
            rotation,
            history: Vec::new(),
            snapshots: Snapshots::default(),
            staging: ConfirmationStaging::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.staging.pending()
    }

    pub fn snapshots(&self) -> &Snapshots {
        &self.snapshots
    }

    pub fn current_model(&self) -> Option<&str> {
        self.rotation.current().ok()
    }

    /// Fetch every record kind up front so the first prompt carries context.
    pub async fn load_records(&mut self) {
        self.snapshots.refresh_all(&self.stores, &self.user_id).await;
    }

    // ═══════════════════════════════════════════
    // Send
    // ═══════════════════════════════════════════

    /// Send a user message, record the exchange, and stage any proposed
    /// action. The action comes from the reply's action block, or failing
    /// that from the message itself.
    pub async fn send_message(&mut self, text: &str) -> Result<ChatReply, ChatError> {
        let result = self.exchange(text).await;
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    async fn exchange(&mut self, text: &str) -> Result<ChatReply, ChatError> {
        let message = text.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let dates = DateTimeResolver::from_clock(self.clock.as_ref());
        let now = dates.now_utc();
        let system = build_system_prompt(&self.snapshots, now);
        let (reply, model) = self.generate(&system, message).await?;

        let proposed = match parse_action(&reply) {
            Some(payload) => Some((payload, ActionSource::Assistant)),
            None if self.config.fallback_enabled => {
                derive_fallback_action(message, &dates).map(|p| (p, ActionSource::Fallback))
            }
            None => None,
        };
        let staged = proposed.map(|(payload, source)| {
            self.staging.stage(payload, source, now).clone()
        });

        self.history.push(ChatMessage::user(message));
        self.history.push(ChatMessage::model(reply.as_str()));

        Ok(ChatReply {
            text: strip_action_blocks(&reply),
            model,
            staged,
        })
    }

    /// Call the model, moving to the next one on a rate limit. Each configured
    /// model is tried at most once per message.
    async fn generate(&mut self, system: &str, message: &str) -> Result<(String, String), ChatError> {
        let start = self.history.len().saturating_sub(self.config.history_window);
        let history = &self.history[start..];

        let mut last_error = LlmError::NoModels;
        for _ in 0..self.rotation.len().max(1) {
            let model = self
                .rotation
                .current()
                .map_err(ChatError::Unavailable)?
                .to_string();
            let request = ChatRequest {
                model: &model,
                system,
                history,
                message,
            };
            match self.model.generate(request).await {
                Ok(reply) => {
                    tracing::debug!(model = %model, chars = reply.len(), "Model replied");
                    return Ok((reply, model));
                }
                Err(e) if self.config.is_rate_limited(&e.to_string()) => {
                    tracing::warn!(model = %model, error = %e, "Model rate limited, rotating");
                    self.rotation.advance();
                    last_error = e;
                }
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "Model request failed");
                    return Err(ChatError::Unavailable(e));
                }
            }
        }
        Err(ChatError::RateLimited(last_error))
    }

    // ═══════════════════════════════════════════
    // Confirm / dismiss
    // ═══════════════════════════════════════════

    /// Apply the pending action. On failure it stays pending, marked failed,
    /// so the user can retry or dismiss. Dropping the returned future before
    /// it resolves also leaves the action failed rather than stuck.
    pub async fn apply_pending(&mut self) -> Result<ApplyOutcome, ChatError> {
        let (payload, in_flight) = match self.staging.start_apply() {
            Ok(started) => started,
            Err(e) => {
                let e = ChatError::from(e);
                self.notifier.error(&e.user_message(&self.config));
                return Err(e);
            }
        };

        let dates = DateTimeResolver::from_clock(self.clock.as_ref());
        let applier = ActionApplier::new(&self.stores, &self.user_id, self.config.ambiguity_policy);
        match applier.apply_payload(&payload, &dates, &mut self.snapshots).await {
            Ok(outcome) => {
                in_flight.complete();
                self.notifier.success(&outcome.message());
                Ok(outcome)
            }
            Err(e) => {
                let message = e.user_message(&self.config.apply_failed_message);
                tracing::warn!(
                    entity = %payload.entity,
                    intent = %payload.intent,
                    error = %e,
                    "Pending action failed"
                );
                in_flight.fail(message.as_str());
                self.notifier.error(&message);
                Err(e.into())
            }
        }
    }

    /// Discard the pending action. Never writes.
    pub fn dismiss_pending(&mut self) -> Result<PendingAction, ChatError> {
        match self.staging.dismiss() {
            Ok(dismissed) => {
                tracing::info!(pending = %dismissed.id, "Pending action dismissed");
                Ok(dismissed)
            }
            Err(e) => {
                let e = ChatError::from(e);
                self.report(&e);
                Err(e)
            }
        }
    }

    fn report(&self, error: &ChatError) {
        self.notifier.error(&error.user_message(&self.config));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AppointmentReminder, EntityKind, HealthLog, Intent, MedicationReminder,
    };
    use crate::notify::{Notification, RecordingNotifier};
    use crate::pipeline::actions::{FixedClock, PendingStatus, INTERRUPTED_MESSAGE};
    use crate::store::{MemoryStore, RecordStore, StoreError};
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;

    const MEDICATION_REPLY: &str = "Sure, I can set that reminder.\n\
```symptomsync-action\n\
{\"entity\":\"medication\",\"intent\":\"create\",\"data\":{\"medication_name\":\"Aspirin\",\"dosage\":\"100mg\",\"reminder_time\":\"2025-01-05T08:30:00.000Z\"}}\n\
```";

    struct Harness {
        appointments: Arc<MemoryStore<AppointmentReminder>>,
        medications: Arc<MemoryStore<MedicationReminder>>,
        health_logs: Arc<MemoryStore<HealthLog>>,
        model: Arc<crate::llm::MockChatModel>,
        notifier: Arc<RecordingNotifier>,
        session: ChatSession,
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
    }

    fn harness_with(model: crate::llm::MockChatModel, config: AssistantConfig) -> Harness {
        let appointments = Arc::new(MemoryStore::new());
        let medications = Arc::new(MemoryStore::new());
        let health_logs = Arc::new(MemoryStore::new());
        let model = Arc::new(model);
        let notifier = Arc::new(RecordingNotifier::new());
        let stores = Stores::new(appointments.clone(), medications.clone(), health_logs.clone());
        let session = ChatSession::new("u1", config, model.clone(), stores, notifier.clone())
            .with_clock(Arc::new(FixedClock::utc(now())));
        Harness {
            appointments,
            medications,
            health_logs,
            model,
            notifier,
            session,
        }
    }

    fn harness(model: crate::llm::MockChatModel) -> Harness {
        harness_with(model, AssistantConfig::default())
    }

    fn mock(reply: &str) -> crate::llm::MockChatModel {
        crate::llm::MockChatModel::new(reply)
    }

    #[tokio::test]
    async fn medication_create_end_to_end() {
        let mut h = harness(mock(MEDICATION_REPLY));

        let reply = h.session.send_message("remind me to take aspirin").await.unwrap();
        assert_eq!(reply.text, "Sure, I can set that reminder.");
        let staged = reply.staged.unwrap();
        assert_eq!(staged.source, ActionSource::Assistant);
        assert_eq!(staged.payload.entity, EntityKind::Medication);
        assert_eq!(h.medications.calls().writes(), 0);

        let outcome = h.session.apply_pending().await.unwrap();
        assert_eq!(outcome.intent, Intent::Create);

        let calls = h.medications.calls();
        assert_eq!(calls.create, 1);
        assert_eq!(calls.writes(), 1);
        assert_eq!(calls.list_all, 1);
        assert_eq!(h.session.snapshots().medications.records().len(), 1);
        assert!(h.session.pending().is_none());
        assert_eq!(
            h.notifier.sent(),
            vec![Notification::Success("Medication reminder created".into())]
        );
    }

    #[tokio::test]
    async fn headache_fallback_end_to_end() {
        let mut h = harness(mock("Sorry to hear that. Rest and stay hydrated."));

        let reply = h
            .session
            .send_message("I have a headache, severity 7, today 3pm")
            .await
            .unwrap();
        let staged = reply.staged.unwrap();
        assert_eq!(staged.source, ActionSource::Fallback);
        assert_eq!(staged.payload.entity, EntityKind::HealthLog);

        h.session.apply_pending().await.unwrap();

        let logs = h.health_logs.records().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].symptom_type.as_deref(), Some("headache"));
        assert_eq!(logs[0].severity, Some(7));
        assert_eq!(logs[0].start_date, Utc.with_ymd_and_hms(2025, 1, 1, 15, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn assistant_block_wins_over_fallback() {
        let mut h = harness(mock(MEDICATION_REPLY));
        let reply = h.session.send_message("log headache 7").await.unwrap();
        assert_eq!(reply.staged.unwrap().source, ActionSource::Assistant);
    }

    #[tokio::test]
    async fn fallback_can_be_disabled() {
        let config = AssistantConfig {
            fallback_enabled: false,
            ..AssistantConfig::default()
        };
        let mut h = harness_with(mock("Noted."), config);
        let reply = h.session.send_message("log headache, 7").await.unwrap();
        assert!(reply.staged.is_none());
        assert!(h.session.pending().is_none());
    }

    #[tokio::test]
    async fn failed_write_keeps_pending_action() {
        let mut h = harness(mock(MEDICATION_REPLY));
        h.medications.fail_writes_with("database is locked").await;

        h.session.send_message("remind me").await.unwrap();
        let err = h.session.apply_pending().await.unwrap_err();
        assert!(matches!(err, ChatError::Action(ActionError::Store(_))));

        let pending = h.session.pending().unwrap();
        assert_eq!(
            pending.status,
            PendingStatus::Failed {
                message: "database is locked".into()
            }
        );
        assert_eq!(h.notifier.errors(), vec!["database is locked".to_string()]);

        h.medications.clear_failures().await;
        h.session.apply_pending().await.unwrap();
        assert_eq!(h.medications.records().await.len(), 1);
        assert!(h.session.pending().is_none());
    }

    /// Store whose writes never complete.
    struct StalledStore;

    #[async_trait::async_trait]
    impl RecordStore<MedicationReminder> for StalledStore {
        async fn list_all(&self, _user_id: &str) -> Result<Vec<MedicationReminder>, StoreError> {
            Ok(Vec::new())
        }

        async fn create(
            &self,
            _draft: crate::models::MedicationDraft,
        ) -> Result<MedicationReminder, StoreError> {
            std::future::pending().await
        }

        async fn update(
            &self,
            _id: &str,
            _patch: crate::models::MedicationPatch,
        ) -> Result<MedicationReminder, StoreError> {
            std::future::pending().await
        }

        async fn delete(&self, _id: &str) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancelled_apply_stays_recoverable() {
        let stores = Stores::new(
            Arc::new(MemoryStore::<AppointmentReminder>::new()),
            Arc::new(StalledStore),
            Arc::new(MemoryStore::<HealthLog>::new()),
        );
        let notifier = Arc::new(RecordingNotifier::new());
        let mut session = ChatSession::new(
            "u1",
            AssistantConfig::default(),
            Arc::new(mock(MEDICATION_REPLY)),
            stores,
            notifier,
        )
        .with_clock(Arc::new(FixedClock::utc(now())));
        session.send_message("remind me").await.unwrap();

        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), session.apply_pending()).await;
        assert!(timed_out.is_err());
        assert_eq!(
            session.pending().unwrap().status,
            PendingStatus::Failed {
                message: INTERRUPTED_MESSAGE.into()
            }
        );

        // A retry gets as far as the store again instead of being refused.
        let retried =
            tokio::time::timeout(Duration::from_millis(50), session.apply_pending()).await;
        assert!(retried.is_err());

        let dismissed = session.dismiss_pending().unwrap();
        assert_eq!(dismissed.payload.entity, EntityKind::Medication);
        assert!(session.pending().is_none());
    }

    #[tokio::test]
    async fn dismiss_never_writes() {
        let mut h = harness(mock(MEDICATION_REPLY));
        h.session.send_message("remind me").await.unwrap();

        let dismissed = h.session.dismiss_pending().unwrap();
        assert_eq!(dismissed.payload.entity, EntityKind::Medication);
        assert!(h.session.pending().is_none());
        assert_eq!(h.medications.calls(), Default::default());
        assert_eq!(h.appointments.calls(), Default::default());
        assert_eq!(h.health_logs.calls(), Default::default());
    }

    #[tokio::test]
    async fn nothing_pending_is_reported() {
        let mut h = harness(mock("Hello!"));
        let err = h.session.apply_pending().await.unwrap_err();
        assert!(matches!(err, ChatError::Action(ActionError::NothingPending)));
        assert!(h.session.dismiss_pending().is_err());
        assert_eq!(h.notifier.errors().len(), 2);
    }

    #[tokio::test]
    async fn validation_failure_stays_reviewable() {
        let reply = "```symptomsync-action\n{\"entity\":\"appointment\",\"intent\":\"create\",\"data\":{\"appointment_name\":\"Dentist\"}}\n```";
        let mut h = harness(mock(reply));
        h.session.send_message("book the dentist").await.unwrap();

        let err = h.session.apply_pending().await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::Action(ActionError::MissingField { field: "date", .. })
        ));
        assert_eq!(h.appointments.calls().writes(), 0);
        assert!(matches!(
            h.session.pending().unwrap().status,
            PendingStatus::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn rate_limit_rotates_to_next_model() {
        let config = AssistantConfig {
            models: vec!["primary".into(), "backup".into()],
            ..AssistantConfig::default()
        };
        let model = mock("Hi there").then_fail("429 RESOURCE_EXHAUSTED");
        let mut h = harness_with(model, config);

        let reply = h.session.send_message("hello").await.unwrap();
        assert_eq!(reply.model, "backup");
        let calls = h.model.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].model, "primary");
        assert_eq!(calls[1].model, "backup");
        assert_eq!(h.session.current_model(), Some("backup"));
    }

    #[tokio::test]
    async fn exhausted_rotation_reports_rate_limit() {
        let config = AssistantConfig {
            models: vec!["primary".into(), "backup".into()],
            ..AssistantConfig::default()
        };
        let model = mock("never").then_fail("quota exceeded").then_fail("Quota exceeded");
        let mut h = harness_with(model, config.clone());

        let err = h.session.send_message("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::RateLimited(_)));
        assert_eq!(h.model.calls().len(), 2);
        assert_eq!(h.notifier.errors(), vec![config.rate_limited_message]);
        assert!(h.session.history().is_empty());
    }

    #[tokio::test]
    async fn other_model_errors_are_not_retried() {
        let model = mock("never").then_fail("connection refused");
        let mut h = harness(model);

        let err = h.session.send_message("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Unavailable(_)));
        assert_eq!(h.model.calls().len(), 1);
        assert_eq!(
            h.notifier.errors(),
            vec![AssistantConfig::default().unavailable_message]
        );
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_model_call() {
        let mut h = harness(mock("unused"));
        let err = h.session.send_message("   ").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
        assert!(h.model.calls().is_empty());
    }

    #[tokio::test]
    async fn history_and_records_reach_the_model() {
        let mut h = harness(mock("Okay."));
        h.medications
            .create(crate::models::MedicationDraft {
                user_profile_id: "u1".into(),
                medication_name: "Metformin".into(),
                dosage: Some("500mg".into()),
                reminder_time: now(),
                recurrence: None,
            })
            .await
            .unwrap();
        h.session.load_records().await;

        h.session.send_message("first").await.unwrap();
        h.session.send_message("second").await.unwrap();

        let calls = h.model.calls();
        assert!(calls[0].system.contains("\"Metformin\""));
        assert!(calls[0].history.is_empty());
        assert_eq!(
            calls[1].history,
            vec![ChatMessage::user("first"), ChatMessage::model("Okay.")]
        );
        assert_eq!(calls[1].message, "second");
        assert_eq!(h.session.history().len(), 4);
    }

    #[tokio::test]
    async fn history_window_limits_context() {
        let config = AssistantConfig {
            history_window: 2,
            ..AssistantConfig::default()
        };
        let mut h = harness_with(mock("Okay."), config);
        for text in ["one", "two", "three"] {
            h.session.send_message(text).await.unwrap();
        }
        let calls = h.model.calls();
        assert_eq!(
            calls[2].history,
            vec![ChatMessage::user("two"), ChatMessage::model("Okay.")]
        );
    }

    #[tokio::test]
    async fn new_action_replaces_pending_one() {
        let second = "```symptomsync-action\n{\"entity\":\"health_log\",\"intent\":\"create\",\"data\":{\"symptom_type\":\"nausea\"}}\n```";
        let model = mock(second).then_reply(MEDICATION_REPLY);
        let mut h = harness(model);

        h.session.send_message("remind me").await.unwrap();
        h.session.send_message("actually log nausea").await.unwrap();

        let pending = h.session.pending().unwrap();
        assert_eq!(pending.payload.entity, EntityKind::HealthLog);
        h.session.apply_pending().await.unwrap();
        assert_eq!(h.medications.calls().writes(), 0);
        assert_eq!(h.health_logs.calls().create, 1);
    }
}
