//! Prompt builders for the three jobs.
//!
//! Prompts are plain text; the remote service is asked for Markdown
//! (boardroom) or strict JSON (editor, comments).

use crate::models::Sector;
use chrono::NaiveDate;

const JSON_ONLY: &str = "Return strictly pure JSON only. No Markdown, no code fences.";

/// Boardroom debate over a sector's headlines, ending in a strategy verdict.
pub fn boardroom_prompt(sector: &Sector, headlines: &[String], date: NaiveDate) -> String {
    format!(
        "Date: {date}\n\
         Sector: {name}\n\n\
         You chair a board of advisers: a macro strategist, a risk officer, an \
         industry operator and a contrarian investor. Read today's headlines, \
         let each adviser argue their position in turn, then close with the \
         chair's verdict: the three most important developments, who wins and \
         who loses, and concrete actions for the next week.\n\n\
         Write the whole report in Markdown.\n\n\
         Headlines:\n{lines}\n",
        name = sector.display_name,
        lines = headlines.join("\n"),
    )
}

/// Structured editor briefing; the expected JSON schema depends on the sector.
pub fn editor_prompt(sector: &Sector, digest: &str, date: NaiveDate) -> String {
    let (role, schema) = match sector.key.as_str() {
        "finance" => (
            "Senior financial editor. Produce a market briefing of at least 15 distinct items \
             covering policy, equities by sector, industries, international finance and commodities. \
             Keep concrete numbers. economy_summary is a 300-500 word review under headed, numbered points.",
            r#"{ "economy_summary": "...", "items": [ { "title": "...", "sentiment": "Bullish/Bearish/Mixed", "impact": "...", "summary": "..." } ] }"#,
        ),
        "tech" => (
            "Technology correspondent. Produce 12-18 distinct items across AI models, chips, \
             hardware, platform companies and frontier research. Explain the mechanism or business \
             impact and give a concrete prediction for each.",
            r#"{ "summary": "...", "items": [ { "title": "...", "summary": "...", "prediction": "...", "special_note": "AI/Chips/None" } ] }"#,
        ),
        "global" => (
            "International affairs analyst. Produce 15-20 items on conflicts, diplomacy, energy \
             and trade, each with its likely economic and market consequences.",
            r#"{ "economy_summary": "...", "items": [ { "title": "...", "sentiment": "...", "impact": "...", "summary": "..." } ] }"#,
        ),
        _ => (
            "Trend spotter. Extract 10-20 trending stories, drop advertising and duplicates, \
             and add a sharp, witty comment to each.",
            r#"{ "summary": "...", "items": [ { "title": "...", "comment": "..." } ] }"#,
        ),
    };

    format!(
        "Date: {date}\nSector: {name}\nData:\n{digest}\n\n\
         Role: {role}\n\
         Keep each item's title identical to the source headline it summarizes.\n\n\
         Output JSON: {schema}\n{JSON_ONLY}\n",
        name = sector.display_name,
    )
}

/// Ask for one comment per persona on a sector's headlines.
pub fn comments_prompt(sector: &Sector, headlines: &[String], personas: &[&str]) -> String {
    format!(
        "You simulate the comment section of a news site. Today's {name} headlines:\n\
         {lines}\n\n\
         Write one comment for each of these personas, fully in character:\n\
         {personas}\n\n\
         Style rules:\n\
         1. Most comments are short (30-60 words); 3-5 personas write a long rant or analysis \
         (100-150 words); a few write only a couple of words.\n\
         2. Some personas use emoji heavily, serious ones never do.\n\
         3. Vary the format like a real, messy comment section.\n\n\
         Output a JSON array: \
         [ {{ \"role\": \"persona\", \"name\": \"screen name\", \"content\": \"...\", \"emotion\": \"tag\" }} ]\n\
         {JSON_ONLY}\n",
        name = sector.display_name,
        lines = headlines.join("\n"),
        personas = personas.join(", "),
    )
}
