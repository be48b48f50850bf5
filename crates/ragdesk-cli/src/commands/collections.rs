//! Collections command - manage RAG collections

use ragdesk_api::Collection;

use crate::commands::Command;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::OutputStyle;

#[derive(Debug, Clone)]
pub enum CollectionsAction {
    List,
    Create { name: String, description: Option<String> },
    Delete { id: String },
}

pub struct CollectionsCommand {
    ctx: AppContext,
    action: CollectionsAction,
}

impl CollectionsCommand {
    pub fn new(ctx: AppContext, action: CollectionsAction) -> Self {
        Self { ctx, action }
    }
}

#[async_trait::async_trait]
impl Command for CollectionsCommand {
    async fn execute(&self) -> CliResult<()> {
        self.ctx.require_login()?;
        let client = &self.ctx.client;
        let style = &self.ctx.style;

        match &self.action {
            CollectionsAction::List => {
                let collections = client.list_collections().await?;
                for line in render_collections(style, &collections) {
                    println!("{}", line);
                }
            }
            CollectionsAction::Create { name, description } => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(CliError::invalid("collection name cannot be empty"));
                }
                let collection = client
                    .create_collection(name, description.as_deref())
                    .await?;
                println!(
                    "{}",
                    style.success(&format!("Created collection {} ({})", collection.name, collection.id))
                );
            }
            CollectionsAction::Delete { id } => {
                client.delete_collection(id).await?;
                println!("{}", style.success(&format!("Deleted collection {}", id)));
            }
        }
        Ok(())
    }
}

pub fn render_collections(style: &OutputStyle, collections: &[Collection]) -> Vec<String> {
    if collections.is_empty() {
        return vec![style.info("No collections")];
    }
    let mut lines = vec![style.header(&format!("Collections ({})", collections.len()))];
    for collection in collections {
        lines.push(format!(
            "  {:<8} {} ({} documents)",
            collection.id, collection.name, collection.document_count
        ));
        if let Some(description) = collection.description.as_deref().filter(|d| !d.is_empty()) {
            lines.push(style.dimmed(&format!("           {}", description)));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_collections() {
        let collections = vec![
            Collection {
                id: "7".to_string(),
                name: "Handbook".to_string(),
                description: Some("HR policies".to_string()),
                document_count: 3,
            },
            Collection {
                id: "8".to_string(),
                name: "Specs".to_string(),
                description: None,
                document_count: 0,
            },
        ];
        let lines = render_collections(&OutputStyle::plain(), &collections);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "  7        Handbook (3 documents)");
        assert!(lines[2].ends_with("HR policies"));
        assert_eq!(lines[3], "  8        Specs (0 documents)");
    }
}
