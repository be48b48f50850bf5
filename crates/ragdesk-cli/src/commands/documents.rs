//! Documents command - manage RAG documents

use std::path::PathBuf;

use ragdesk_api::{Document, DocumentStatus, Review};

use crate::commands::Command;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::{format_size, truncate, OutputStyle};

#[derive(Debug, Clone)]
pub enum DocumentsAction {
    List { collection: Option<String> },
    Upload { path: PathBuf, collection: Option<String> },
    Review { id: String, review: Review },
    Delete { id: String },
}

pub struct DocumentsCommand {
    ctx: AppContext,
    action: DocumentsAction,
}

impl DocumentsCommand {
    pub fn new(ctx: AppContext, action: DocumentsAction) -> Self {
        Self { ctx, action }
    }

    async fn find(&self, id: &str) -> CliResult<Document> {
        self.ctx
            .client
            .list_documents(None)
            .await?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| CliError::invalid(format!("no document with id {}", id)))
    }
}

#[async_trait::async_trait]
impl Command for DocumentsCommand {
    async fn execute(&self) -> CliResult<()> {
        self.ctx.require_login()?;
        let client = &self.ctx.client;
        let style = &self.ctx.style;

        match &self.action {
            DocumentsAction::List { collection } => {
                let documents = client.list_documents(collection.as_deref()).await?;
                for line in render_documents(style, &documents) {
                    println!("{}", line);
                }
            }
            DocumentsAction::Upload { path, collection } => {
                if !path.is_file() {
                    return Err(CliError::invalid(format!("not a file: {}", path.display())));
                }
                let document = client
                    .upload_document_file(path, collection.as_deref())
                    .await?;
                println!(
                    "{}",
                    style.success(&format!(
                        "Uploaded {} as document {} ({})",
                        document.filename, document.id, document.status
                    ))
                );
            }
            DocumentsAction::Review { id, review } => {
                let document = self.find(id).await?;
                client.review_document(&document, *review).await?;
                let verb = match review {
                    Review::Approve => "Approved",
                    Review::Reject => "Rejected",
                };
                println!("{}", style.success(&format!("{} {}", verb, document.filename)));
            }
            DocumentsAction::Delete { id } => {
                client.delete_document(id).await?;
                println!("{}", style.success(&format!("Deleted document {}", id)));
            }
        }
        Ok(())
    }
}

fn status_label(style: &OutputStyle, status: DocumentStatus) -> String {
    let label = status.to_string();
    match status {
        DocumentStatus::NeedsReview => style.warning(&label),
        DocumentStatus::Error => style.error(&label),
        _ => label,
    }
}

pub fn render_documents(style: &OutputStyle, documents: &[Document]) -> Vec<String> {
    if documents.is_empty() {
        return vec![style.info("No documents")];
    }
    let mut lines = vec![style.header(&format!("Documents ({})", documents.len()))];
    lines.extend(documents.iter().map(|doc| {
        format!(
            "  {:<8} {:<32} {:>9} {:>5} chunks  {}",
            doc.id,
            truncate(&doc.filename, 32),
            format_size(doc.size),
            doc.chunk_count,
            status_label(style, doc.status)
        )
    }));
    let waiting = documents.iter().filter(|d| d.status.can_review()).count();
    if waiting > 0 {
        lines.push(style.tip(&format!(
            "{} document(s) await review: ragdesk docs approve <id>",
            waiting
        )));
    }
    lines
}
