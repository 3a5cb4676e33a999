//! Service facade exposing every expert-routing operation.
//!
//! Components are built once from configuration and wired together here;
//! callers (the CLI, tests) only talk to [`ExpertService`].

use crate::assignment::AssignmentStateMachine;
use crate::consensus::{ConsensusEngine, ConsensusOutcome};
use crate::directory::ExpertDirectory;
use crate::dispatch::BackgroundDispatcher;
use crate::embeddings::{create_provider, EmbeddingGateway, EmbeddingProvider};
use crate::intake::{clean_title, RequestIntake, UNTITLED};
use crate::level::LevelInfo;
use crate::matching::MatchingEngine;
use crate::prompts::{render_request, PromptSet};
use crate::quality::QualityAssessor;
use crate::rag::{format_expert_context, BackfillStats, RagCorpusIndex};
use crate::store::Store;
use crate::tags::normalize_tags;
use crate::types::{
    Assignment, AssignmentStatus, AssignmentView, Chat, Dataset, ExpertProfile, ExpertRequest,
    Message, MessageRole, QualityAssessment, RagEntry, RequestCounts, RequestStatus,
};
use chrono::Utc;
use hivemind_core::config::{ExpertsConfig, RagConfig};
use hivemind_core::{AppConfig, AppError, AppResult};
use hivemind_llm::{roles, LlmRequest, ModelBinding, ModelRegistry};
use hivemind_prompt::PromptDefinition;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Input of `create_expert_request`.
#[derive(Debug, Clone, Default)]
pub struct NewExpertRequest {
    pub user_id: String,
    /// Existing chat to attach to; a new chat is created when absent or unknown
    pub chat_id: Option<String>,
    pub question: String,
    pub tags: Vec<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRequest {
    pub request: ExpertRequest,
    pub assignments: Vec<Assignment>,
}

/// Input of `ask_ai`. Messages are recorded only when `user_id` is set.
#[derive(Debug, Clone, Default)]
pub struct AskAi {
    pub user_id: Option<String>,
    pub chat_id: Option<String>,
    pub question: String,
}

/// A rendered chat-model request with the context it was built from.
#[derive(Debug, Clone)]
pub struct PreparedAnswer {
    pub request: LlmRequest,
    pub context: Vec<RagEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnswer {
    pub chat_id: Option<String>,
    pub answer: String,
    pub context: Vec<RagEntry>,
}

#[derive(Debug, Clone)]
pub struct ExpertService {
    store: Arc<Store>,
    directory: ExpertDirectory,
    matching: MatchingEngine,
    state_machine: AssignmentStateMachine,
    consensus: ConsensusEngine,
    corpus: RagCorpusIndex,
    quality: QualityAssessor,
    intake: RequestIntake,
    chat_model: ModelBinding,
    ask_prompt: PromptDefinition,
    rag: RagConfig,
    dispatcher: BackgroundDispatcher,
}

impl ExpertService {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        models: &ModelRegistry,
        prompts: PromptSet,
        config: &ExpertsConfig,
    ) -> Self {
        let embeddings = EmbeddingGateway::new(embedder);
        let dispatcher = BackgroundDispatcher::new();

        let directory = ExpertDirectory::new(store.clone(), embeddings.clone());
        let matching = MatchingEngine::new(store.clone(), embeddings.clone(), &config.matching);
        let corpus = RagCorpusIndex::new(store.clone(), embeddings);
        let quality = QualityAssessor::new(
            models.resolve(roles::QUALITY).clone(),
            prompts.quality,
            &config.quality,
        );
        let consensus = ConsensusEngine::new(
            store.clone(),
            corpus.clone(),
            models.resolve(roles::AGREEMENT).clone(),
            models.resolve(roles::SYNTHESIS).clone(),
            prompts.agreement,
            prompts.synthesis,
        );
        let state_machine = AssignmentStateMachine::new(
            store.clone(),
            consensus.clone(),
            corpus.clone(),
            quality.clone(),
            config.quality.recheck_on_submit,
            dispatcher.clone(),
        );
        let intake = RequestIntake::new(
            models.resolve(roles::TITLE).clone(),
            models.resolve(roles::TAG).clone(),
            prompts.title,
            prompts.tags,
        );

        Self {
            store,
            directory,
            matching,
            state_machine,
            consensus,
            corpus,
            quality,
            intake,
            chat_model: models.resolve(roles::CHAT).clone(),
            ask_prompt: prompts.ask,
            rag: config.rag.clone(),
            dispatcher,
        }
    }

    /// Open the configured database, providers and prompts.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let store = Arc::new(Store::open(&config.database_path())?);
        let embedding = &config.experts.embedding;
        let embedder = create_provider(
            embedding,
            config.resolve_api_key(&embedding.provider).as_deref(),
        )?;
        let models = ModelRegistry::from_config(config)?;
        let prompts = PromptSet::resolve(&config.workspace)?;

        tracing::debug!(
            database = ?config.database_path(),
            embedding_provider = %embedding.provider,
            "Expert service ready"
        );
        Ok(Self::new(store, embedder, &models, prompts, &config.experts))
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn chat_model(&self) -> &ModelBinding {
        &self.chat_model
    }

    // ---- requests ------------------------------------------------------

    /// Create a community request and assign experts to it.
    ///
    /// The question is recorded as a user message in the chat. Missing tags
    /// and title are generated. The asking user is never assigned.
    #[tracing::instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn create_expert_request(&self, input: NewExpertRequest) -> AppResult<CreatedRequest> {
        let question = input.question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("Question cannot be empty".to_string()));
        }
        self.directory.get(&input.user_id)?;

        let tags = normalize_tags(&input.tags);
        let tags = if tags.is_empty() {
            self.intake.extract_tags(question).await
        } else {
            tags
        };
        let title = match input.title.as_deref().and_then(clean_title) {
            Some(title) => title,
            None => self.intake.generate_title(question).await,
        };

        let chat = self.open_chat(&input.user_id, input.chat_id.as_deref(), &title)?;
        self.store
            .append_message(&chat.id, MessageRole::User, question)?;

        let now = Utc::now();
        let request = ExpertRequest {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat.id.clone(),
            title,
            question: question.to_string(),
            expertise_tags: tags,
            status: RequestStatus::Pending,
            assigned_experts_count: 0,
            completed_experts_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_request(&request)?;

        let candidates = self.directory.candidates_excluding(&input.user_id)?;
        let assignments = self.matching.assign(&request, &candidates).await?;

        let request = self.load_request(&request.id)?;
        tracing::info!(
            request_id = %request.id,
            tags = ?request.expertise_tags,
            assigned = assignments.len(),
            "Created expert request"
        );
        Ok(CreatedRequest {
            request,
            assignments,
        })
    }

    pub fn get_request(&self, request_id: &str) -> AppResult<ExpertRequest> {
        self.load_request(request_id)
    }

    /// Requests of a chat, newest first. Only the chat's owner may list them.
    pub fn requests_for_chat(&self, user_id: &str, chat_id: &str) -> AppResult<Vec<ExpertRequest>> {
        self.owned_chat(user_id, chat_id)?;
        self.store.list_requests_by_chat(chat_id)
    }

    pub fn request_counts(&self, request_ids: &[String]) -> AppResult<Vec<RequestCounts>> {
        self.store.request_counts(request_ids)
    }

    /// Run a consensus evaluation now instead of waiting for a submission.
    pub async fn evaluate_request(&self, request_id: &str) -> AppResult<ConsensusOutcome> {
        self.consensus.evaluate(request_id).await
    }

    // ---- assignments ---------------------------------------------------

    /// Transition an assignment; `status` is parsed case-insensitively.
    pub async fn transition_assignment(
        &self,
        assignment_id: &str,
        status: &str,
        response: Option<&str>,
        credits_awarded: Option<i64>,
    ) -> AppResult<Assignment> {
        let status = AssignmentStatus::parse(status)?;
        self.state_machine
            .transition(assignment_id, status, response, credits_awarded)
            .await
    }

    pub fn assignments_for_expert(&self, expert_id: &str) -> AppResult<Vec<AssignmentView>> {
        self.directory.get(expert_id)?;
        self.store.list_assignments_by_expert(expert_id)
    }

    pub fn assignments_for_request(
        &self,
        request_id: &str,
        status: Option<AssignmentStatus>,
    ) -> AppResult<Vec<Assignment>> {
        self.load_request(request_id)?;
        self.store.list_assignments(request_id, status)
    }

    pub fn rate_assignment(&self, assignment_id: &str, rating: u8) -> AppResult<Assignment> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::Validation(format!(
                "Rating must be between 1 and 5, got {}",
                rating
            )));
        }
        self.store.rate_assignment(assignment_id, rating)
    }

    pub async fn assess_quality(&self, question: &str, response: &str) -> AppResult<QualityAssessment> {
        self.quality.assess(question, response).await
    }

    // ---- corpus --------------------------------------------------------

    /// Accepted answers relevant to `query`. Defaults come from `rag` config.
    pub async fn retrieve_context(
        &self,
        query: &str,
        limit: Option<usize>,
        threshold: Option<f32>,
    ) -> AppResult<Vec<RagEntry>> {
        self.corpus
            .retrieve(
                query,
                limit.unwrap_or(self.rag.limit),
                threshold.unwrap_or(self.rag.similarity_threshold),
            )
            .await
    }

    pub async fn backfill_corpus(&self) -> AppResult<BackfillStats> {
        self.corpus.backfill().await
    }

    pub fn dataset(&self) -> AppResult<Dataset> {
        self.store.dataset()
    }

    // ---- AI answers ----------------------------------------------------

    /// Render the chat-model request for `question` with expert context.
    ///
    /// Retrieval is optional enrichment: if it fails the request is built
    /// without context.
    pub async fn prepare_ai_request(&self, question: &str) -> AppResult<PreparedAnswer> {
        if question.trim().is_empty() {
            return Err(AppError::Validation("Question cannot be empty".to_string()));
        }

        let context = match self.retrieve_context(question, None, None).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Expert context retrieval failed, answering without it");
                Vec::new()
            }
        };

        let request = render_request(
            &self.chat_model,
            &self.ask_prompt,
            json!({ "question": question }),
            format_expert_context(&context),
        )?;
        Ok(PreparedAnswer { request, context })
    }

    /// Answer with the chat model, recording the exchange when a user is given.
    pub async fn ask_ai(&self, input: AskAi) -> AppResult<AiAnswer> {
        let chat = match input.user_id.as_deref() {
            Some(user_id) => {
                Some(self.open_user_chat(user_id, input.chat_id.as_deref(), &input.question)?)
            }
            None => None,
        };

        let prepared = self.prepare_ai_request(&input.question).await?;
        let response = self.chat_model.client.complete(&prepared.request).await?;

        if let Some(chat) = &chat {
            self.record_exchange(&chat.id, &input.question, &response.content)?;
        }

        Ok(AiAnswer {
            chat_id: chat.map(|c| c.id),
            answer: response.content,
            context: prepared.context,
        })
    }

    /// The user's chat for an AI exchange, titled after `question` when new.
    pub fn open_user_chat(
        &self,
        user_id: &str,
        chat_id: Option<&str>,
        question: &str,
    ) -> AppResult<Chat> {
        self.directory.get(user_id)?;
        let title = clean_title(question).unwrap_or_else(|| UNTITLED.to_string());
        self.open_chat(user_id, chat_id, &title)
    }

    /// Store a question and its answer in a chat.
    pub fn record_exchange(&self, chat_id: &str, question: &str, answer: &str) -> AppResult<()> {
        self.store.append_message(chat_id, MessageRole::User, question)?;
        self.store.append_message(chat_id, MessageRole::Assistant, answer)?;
        Ok(())
    }

    // ---- experts -------------------------------------------------------

    pub async fn register_expert(
        &self,
        email: &str,
        expertise: Option<&str>,
        tags: &[String],
    ) -> AppResult<ExpertProfile> {
        self.directory.register(email, expertise, tags).await
    }

    pub async fn update_expert_profile(
        &self,
        expert_id: &str,
        expertise: Option<&str>,
        tags: &[String],
    ) -> AppResult<ExpertProfile> {
        self.directory.update_profile(expert_id, expertise, tags).await
    }

    pub async fn refresh_expert_embeddings(&self) -> AppResult<usize> {
        self.directory.refresh_embeddings().await
    }

    pub fn list_experts(&self) -> AppResult<Vec<ExpertProfile>> {
        self.directory.list()
    }

    pub fn get_expert(&self, expert_id: &str) -> AppResult<ExpertProfile> {
        self.directory.get(expert_id)
    }

    pub fn expert_level(&self, expert_id: &str) -> AppResult<LevelInfo> {
        Ok(LevelInfo::for_xp(self.directory.get(expert_id)?.xp))
    }

    // ---- chats ---------------------------------------------------------

    pub fn chat_messages(&self, user_id: &str, chat_id: &str) -> AppResult<Vec<Message>> {
        self.owned_chat(user_id, chat_id)?;
        self.store.list_messages(chat_id)
    }

    /// Wait for background work (consensus runs, embeddings) to finish.
    pub async fn drain_background(&self) {
        self.dispatcher.drain().await;
    }

    fn load_request(&self, request_id: &str) -> AppResult<ExpertRequest> {
        self.store
            .get_request(request_id)?
            .ok_or_else(|| AppError::NotFound(format!("Expert request not found: {}", request_id)))
    }

    fn owned_chat(&self, user_id: &str, chat_id: &str) -> AppResult<Chat> {
        let chat = self
            .store
            .get_chat(chat_id)?
            .ok_or_else(|| AppError::NotFound(format!("Chat not found: {}", chat_id)))?;
        if chat.user_id != user_id {
            return Err(AppError::Unauthorized(format!(
                "Chat {} belongs to another user",
                chat_id
            )));
        }
        Ok(chat)
    }

    /// The user's chat `chat_id`, created when it does not exist yet.
    fn open_chat(&self, user_id: &str, chat_id: Option<&str>, title: &str) -> AppResult<Chat> {
        if let Some(id) = chat_id {
            if let Some(chat) = self.store.get_chat(id)? {
                if chat.user_id != user_id {
                    return Err(AppError::Unauthorized(format!(
                        "Chat {} belongs to another user",
                        id
                    )));
                }
                return Ok(chat);
            }
        }

        let chat = Chat {
            id: chat_id
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_chat(&chat)?;
        tracing::debug!(chat_id = %chat.id, "Created chat");
        Ok(chat)
    }
}
