//! Ask command handler.
//!
//! Answers a question with the chat model, grounded in accepted expert
//! answers, or routes it to the expert community with `--community`.

use super::{print_json, split_tags};
use clap::Args;
use futures::StreamExt;
use hivemind_core::{AppError, AppResult};
use hivemind_experts::{AskAi, ExpertService, NewExpertRequest, RagEntry};
use std::io::Write;
use std::path::PathBuf;

/// Ask a question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Acting user; required with --community, optional otherwise
    #[arg(short, long, env = "HIVEMIND_USER")]
    pub user: Option<String>,

    /// Chat to record the exchange in
    #[arg(long)]
    pub chat: Option<String>,

    /// Route the question to human experts instead of the AI
    #[arg(long)]
    pub community: bool,

    /// Expertise tags for a community request (comma separated)
    #[arg(long, requires = "community")]
    pub tags: Vec<String>,

    /// Title for a community request
    #[arg(long, requires = "community")]
    pub title: Option<String>,

    /// Stream the answer as it is generated
    #[arg(long, conflicts_with = "community")]
    pub stream: bool,

    /// Maximum tokens in the answer
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, service: &ExpertService) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self.read_question()?;

        if self.community {
            self.ask_community(service, question).await
        } else if self.stream {
            self.ask_streaming(service, &question).await
        } else {
            self.ask_ai(service, question).await
        }
    }

    async fn ask_community(&self, service: &ExpertService, question: String) -> AppResult<()> {
        let user_id = self.user.clone().ok_or_else(|| {
            AppError::Validation("--community requires --user or HIVEMIND_USER".to_string())
        })?;

        let created = service
            .create_expert_request(NewExpertRequest {
                user_id,
                chat_id: self.chat.clone(),
                question,
                tags: split_tags(&self.tags),
                title: self.title.clone(),
            })
            .await?;

        if self.json {
            return print_json(&created);
        }

        let request = &created.request;
        println!("Request {} ({})", request.id, request.status);
        println!("Title: {}", request.title);
        println!("Tags: {}", request.expertise_tags.join(", "));
        if created.assignments.is_empty() {
            println!("No experts available yet; the request is pending.");
        } else {
            println!("Assigned to {} expert(s):", created.assignments.len());
            for assignment in &created.assignments {
                println!("- {} (assignment {})", assignment.expert_id, assignment.id);
            }
        }
        Ok(())
    }

    async fn ask_ai(&self, service: &ExpertService, question: String) -> AppResult<()> {
        let answer = service
            .ask_ai(AskAi {
                user_id: self.user.clone(),
                chat_id: self.chat.clone(),
                question,
            })
            .await?;

        if self.json {
            return print_json(&answer);
        }

        println!("{}", answer.answer);
        print_sources(&answer.context);
        Ok(())
    }

    async fn ask_streaming(&self, service: &ExpertService, question: &str) -> AppResult<()> {
        let chat = match self.user.as_deref() {
            Some(user_id) => Some(service.open_user_chat(user_id, self.chat.as_deref(), question)?),
            None => None,
        };

        let prepared = service.prepare_ai_request(question).await?;
        let mut request = prepared.request.with_streaming();
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        tracing::info!("Starting streaming request to LLM");
        let mut stream = service.chat_model().client.stream(&request).await?;
        let mut full_content = String::new();

        while let Some(result) = stream.next().await {
            let chunk = result?;
            if !chunk.content.is_empty() {
                full_content.push_str(&chunk.content);
                if !self.json {
                    print!("{}", chunk.content);
                    std::io::stdout().flush().ok();
                }
            }
            if chunk.done {
                if let Some(usage) = chunk.usage {
                    tracing::debug!(
                        "Token usage - Prompt: {}, Completion: {}, Total: {}",
                        usage.prompt_tokens,
                        usage.completion_tokens,
                        usage.total_tokens
                    );
                }
                break;
            }
        }

        if let Some(chat) = &chat {
            service.record_exchange(&chat.id, question, &full_content)?;
        }

        if self.json {
            print_json(&serde_json::json!({
                "chatId": chat.map(|c| c.id),
                "answer": full_content,
                "context": prepared.context,
            }))
        } else {
            println!();
            print_sources(&prepared.context);
            Ok(())
        }
    }

    fn read_question(&self) -> AppResult<String> {
        let question = match (&self.question, &self.file) {
            (Some(question), _) => question.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => {
                return Err(AppError::Validation("No question provided".to_string()));
            }
        };
        if question.trim().is_empty() {
            return Err(AppError::Validation("Question cannot be empty".to_string()));
        }
        Ok(question)
    }
}

fn print_sources(context: &[RagEntry]) {
    if context.is_empty() {
        return;
    }
    println!();
    println!("Expert sources:");
    for entry in context {
        println!("- {} ({:.2})", entry.question, entry.similarity);
    }
}
