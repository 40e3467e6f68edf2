use crate::crawler::CrawlerStage;
use crate::task::{StageHandler, TaskContext, TaskOutput};
use crate::{Result, TrellisError};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Emits the URLs configured under `params.urls`, one emission per URL
///
/// The canonical init-stage handler: it ignores the incoming payload and
/// turns static configuration into the first wave of pipeline work.
pub struct SeedHandler;

#[async_trait]
impl StageHandler for SeedHandler {
    async fn handle(
        &self,
        _context: &TaskContext,
        stage: &CrawlerStage,
        _payload: Value,
    ) -> Result<TaskOutput> {
        let urls = stage
            .params
            .get("urls")
            .and_then(|v| v.as_array())
            .ok_or_else(|| TrellisError::Handler {
                handler: "seed".to_string(),
                message: format!("stage '{}' has no 'urls' list in params", stage.name),
            })?;

        let mut output = TaskOutput::new();
        for url in urls {
            let url = url.as_str().ok_or_else(|| TrellisError::Handler {
                handler: "seed".to_string(),
                message: format!("non-string entry in 'urls' of stage '{}'", stage.name),
            })?;
            // Reject malformed URLs before they enter the queue
            url::Url::parse(url)?;
            output.emit("pass", json!({ "url": url }));
        }

        tracing::debug!(
            stage = %stage.namespaced_name(),
            count = output.emissions.len(),
            "Seeded URLs"
        );
        Ok(output)
    }
}
