//! Comments job: a simulated reader comment section per sector.
//!
//! Personas whose description mentions a high-expertise keyword are routed
//! to the "smart" model, the rest to the "cheap" one. Each model batch is
//! one request; results are merged, shuffled and capped.

use crate::api::{GenerateContent, GenerationRequest};
use crate::dispatch::DispatchOutcome;
use crate::models::{CommentsPage, PersonaComment, Sector};
use crate::outputs::ArtifactKind;
use crate::pipeline::{PipelineRunner, SectorStatus, SkipReason};
use crate::prompts::comments_prompt;
use crate::snapshot::{headline_digest, load_snapshot};
use crate::utils::{timestamp_minutes, truncate_for_log};
use chrono::NaiveDate;
use rand::seq::SliceRandom;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// Keywords that route a persona to the smart model.
const HIGH_EXPERTISE_KEYWORDS: [&str; 12] = [
    "doctor", "analyst", "blogger", "teacher", "founder", "lawyer", "official",
    "billionaire", "CEO", "merchant", "scholar", "unemployed",
];

/// Commenters, each a role with a mood in parentheses.
const PERSONAS: [&str; 30] = [
    "Cross-border e-commerce merchant (anxious about tariffs and exchange rates)",
    "World's richest billionaire (humble-bragging, macro view)",
    "Listed company CEO (big promises, sense of crisis)",
    "Recently unemployed office worker (lost, self-mocking, hunting for chances)",
    "High school student (exhausted by exams, meme-fluent)",
    "Math teacher (rigorous, loves deduction)",
    "Literature teacher (sentimental, quotes classics)",
    "Gray-market hustler (spots shortcuts and information gaps others miss)",
    "Taxi driver (seasoned, cynical)",
    "University freshman (naive, hopeful)",
    "Wet-market auntie (practical, watches prices)",
    "Big-tech senior engineer (anxious, fluent in jargon)",
    "Retired party official (stern, grand narratives)",
    "Hospital doctor (calm, tired)",
    "Stay-at-home mom (careful, worried)",
    "Urban-village landlord (relaxed, smug)",
    "Financial analyst (rational, data-driven)",
    "Underground rock musician (rebellious, sarcastic)",
    "Corner shop owner (gossipy, sees through everything)",
    "AI startup founder (zealous, radical)",
    "Food delivery rider (rushed, knows real life best)",
    "Returnee from overseas study (mixes in English, compares countries)",
    "Construction foreman (blunt, generous)",
    "Grad-school exam candidate (tense, confused)",
    "Day-trading retail investor (wild swings, slightly unhinged)",
    "Gen-Z new hire (direct, indifferent)",
    "Tech blogger (professional, nitpicky)",
    "Corporate lawyer (precise, cautious)",
    "Gym coach (relentlessly upbeat)",
    "AI doomer (fearful, apocalyptic)",
];

/// Split personas into `(model, personas)` batches: smart first, then cheap.
/// Empty batches are dropped.
pub fn assign_batches<'a>(smart: &'a str, cheap: &'a str) -> Vec<(&'a str, Vec<&'static str>)> {
    let (expert, casual): (Vec<&'static str>, Vec<&'static str>) = PERSONAS
        .iter()
        .copied()
        .partition(|p| HIGH_EXPERTISE_KEYWORDS.iter().any(|kw| p.contains(kw)));

    [(smart, expert), (cheap, casual)]
        .into_iter()
        .filter(|(_, personas)| !personas.is_empty())
        .collect()
}

/// Parse a model reply into comments, dropping entries without content.
pub fn parse_comments(raw: &str) -> Result<Vec<PersonaComment>, serde_json::Error> {
    let comments: Vec<PersonaComment> = serde_json::from_str(raw)?;
    Ok(comments
        .into_iter()
        .filter(|c| !c.content.trim().is_empty())
        .collect())
}

impl<C> PipelineRunner<C>
where
    C: GenerateContent,
{
    #[instrument(level = "info", skip_all, fields(sector = %sector.key))]
    pub(crate) async fn comments_sector(&self, sector: &Sector, as_of: NaiveDate) -> SectorStatus {
        let Some(platforms) = load_snapshot(&sector.input_path).await else {
            return SectorStatus::Skipped(SkipReason::NoData);
        };
        let headlines = headline_digest(&platforms, self.config.comments_title_limit);
        if headlines.is_empty() {
            return SectorStatus::Skipped(SkipReason::NoData);
        }

        let models = &self.config.models;
        let mut all_comments = Vec::new();
        for (i, (model, personas)) in assign_batches(&models.smart, &models.cheap).into_iter().enumerate() {
            if i > 0 && !self.config.batch_delay().is_zero() {
                sleep(self.config.batch_delay()).await;
            }

            let request = GenerationRequest::json(model, comments_prompt(sector, &headlines, &personas))
                .with_temperature(models.comments_temperature);
            let report = match self.dispatch_for(sector, &request).await {
                Ok(report) => report,
                Err(status) => return status,
            };

            match report.outcome {
                DispatchOutcome::Done(content) => match parse_comments(&content) {
                    Ok(comments) => {
                        info!(model, personas = personas.len(), comments = comments.len(), "Batch commented");
                        all_comments.extend(comments);
                    }
                    Err(e) => warn!(
                        model,
                        error = %e,
                        response_preview = %truncate_for_log(&content, 300),
                        "Batch returned non-conforming JSON; skipping batch"
                    ),
                },
                DispatchOutcome::Exhausted => warn!(model, "Batch skipped: credentials exhausted"),
                DispatchOutcome::Failed(e) => warn!(model, error = %e, "Batch failed; skipping batch"),
            }
        }

        if all_comments.is_empty() {
            return SectorStatus::Skipped(SkipReason::NothingGenerated);
        }
        all_comments.shuffle(&mut rand::rng());
        all_comments.truncate(self.config.comments_keep);

        let page = CommentsPage {
            date: timestamp_minutes(),
            category: sector.key.clone(),
            comments: all_comments,
        };
        let rendered = match serde_json::to_string_pretty(&page) {
            Ok(json) => json,
            Err(e) => return SectorStatus::Failed(e.to_string()),
        };
        self.persist(ArtifactKind::Comments, sector, &rendered, as_of).await
    }
}
