//! Editor job: structured JSON analysis per sector.
//!
//! The model is asked for a JSON document with an `items` array. Output cut
//! short by token limits is detected from the parse error and the request is
//! dispatched once more. Each item gets its source link back-filled from the
//! snapshot before the document is saved.

use crate::api::{GenerateContent, GenerationRequest};
use crate::dispatch::DispatchOutcome;
use crate::models::Sector;
use crate::outputs::ArtifactKind;
use crate::pipeline::{failed_outcome, PipelineRunner, SectorStatus, SkipReason};
use crate::prompts::editor_prompt;
use crate::snapshot::{load_snapshot, tagged_digest, TaggedDigest};
use crate::utils::{looks_truncated, timestamp_minutes, truncate_for_log};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::{instrument, warn};

/// Link used when no snapshot headline matches an item title.
const NO_LINK: &str = "#";

impl<C> PipelineRunner<C>
where
    C: GenerateContent,
{
    #[instrument(level = "info", skip_all, fields(sector = %sector.key))]
    pub(crate) async fn editor_sector(&self, sector: &Sector, as_of: NaiveDate) -> SectorStatus {
        let Some(platforms) = load_snapshot(&sector.input_path).await else {
            return SectorStatus::Skipped(SkipReason::NoData);
        };
        let digest = tagged_digest(&platforms, self.config.editor_line_cap);
        if digest.lines.is_empty() {
            return SectorStatus::Skipped(SkipReason::NoData);
        }

        let request = GenerationRequest::json(
            &self.config.models.analysis,
            editor_prompt(sector, &digest.text(), as_of),
        )
        .with_relaxed_safety();

        let mut document = None;
        // second pass only when the first answer was cut off
        for pass in 1..=2 {
            let report = match self.dispatch_for(sector, &request).await {
                Ok(report) => report,
                Err(status) => return status,
            };
            let content = match report.outcome {
                DispatchOutcome::Done(content) => content,
                outcome => return failed_outcome(outcome),
            };

            match serde_json::from_str::<Value>(&content) {
                Ok(value) => {
                    document = Some(value);
                    break;
                }
                Err(e) if looks_truncated(&e) && pass == 1 => {
                    warn!(error = %e, "Analysis JSON truncated; asking once more");
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        response_preview = %truncate_for_log(&content, 300),
                        "Model returned non-conforming JSON"
                    );
                    return SectorStatus::Failed(format!("invalid analysis JSON: {e}"));
                }
            }
        }

        let Some(Value::Object(mut analysis)) = document else {
            return SectorStatus::Failed("analysis is not a JSON object".to_string());
        };
        backfill_links(&mut analysis, &digest);
        analysis.insert("date".to_string(), Value::String(timestamp_minutes()));

        let rendered = match serde_json::to_string_pretty(&analysis) {
            Ok(json) => json,
            Err(e) => return SectorStatus::Failed(e.to_string()),
        };
        self.persist(ArtifactKind::Analysis, sector, &rendered, as_of).await
    }
}

/// Give every `items[*]` entry a `url` taken from the matching snapshot headline.
fn backfill_links(analysis: &mut Map<String, Value>, digest: &TaggedDigest) {
    let Some(Value::Array(items)) = analysis.get_mut("items") else {
        return;
    };
    for item in items.iter_mut().filter_map(Value::as_object_mut) {
        let url = item
            .get("title")
            .and_then(Value::as_str)
            .and_then(|title| digest.find_url(title))
            .filter(|url| !url.is_empty())
            .unwrap_or(NO_LINK)
            .to_string();
        item.insert("url".to_string(), Value::String(url));
    }
}
