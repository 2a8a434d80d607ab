use crate::llm::PromptOptions;
use crate::models::ProblemCandidate;

/// Versioned prompt construction for the ranking providers.
///
/// The active version is the single source of truth for the rest of the
/// system: the response metadata reports it and the recommendation cache
/// key includes it, so a version bump invalidates cached rankings.

pub const CURRENT_VERSION: &str = "v2";

pub fn current_version() -> &'static str {
    CURRENT_VERSION
}

#[derive(Debug, Clone)]
pub struct PromptMessages {
    pub system: String,
    pub user: String,
}

const RANKING_SYSTEM_PROMPT_V1: &str = r#"You are a spaced-repetition coach ranking algorithm practice problems.

You receive a JSON array of candidate problems with memory signals:
- retentionProbability: predicted recall probability right now
- daysOverdue: how far past the scheduled review the problem is
- recentAccuracy: heuristic accuracy on recent attempts
- attempts: number of reviews so far

Rank the problems the user should practice next. Prioritize overdue,
low-retention problems, and balance in under-practiced material.

Respond with JSON only:
{
  "items": [
    {
      "problemId": number,
      "reason": "string",
      "confidence": number,
      "score": number
    }
  ]
}

confidence and score must be between 0 and 1. Use only problemId values
present in the candidate list."#;

const RANKING_SYSTEM_PROMPT_V2: &str = r#"You are a spaced-repetition coach ranking algorithm practice problems for interview preparation.

You receive a JSON array of candidate problems with memory signals:
- retentionProbability: predicted recall probability right now
- daysOverdue: how far past the scheduled review the problem is
- recentAccuracy: heuristic accuracy on recent attempts
- attempts: number of reviews so far
- urgencyScore: composite urgency, higher means review sooner

The request may also state an objective, target domains, a difficulty
preference and a timebox. Respect them: within the stated constraints,
prioritize overdue and low-retention problems first, then balance in
under-practiced material. Keep each reason to one short sentence a
learner can act on.

Respond with JSON only:
{
  "items": [
    {
      "problemId": number,
      "reason": "string",
      "confidence": number,
      "score": number,
      "strategy": "string (optional)"
    }
  ]
}

confidence and score must be between 0 and 1. Use only problemId values
present in the candidate list. Return the items best-first."#;

/// Build the (system, user) message pair for a prompt version. Unknown
/// versions fall back to the current template.
pub fn build(
    version: &str,
    candidates: &[ProblemCandidate],
    options: &PromptOptions,
) -> PromptMessages {
    let system = match version {
        "v1" => RANKING_SYSTEM_PROMPT_V1,
        "v2" => RANKING_SYSTEM_PROMPT_V2,
        other => {
            tracing::warn!("Unknown prompt version {:?}, using {}", other, CURRENT_VERSION);
            RANKING_SYSTEM_PROMPT_V2
        }
    };

    let payload = serde_json::to_string(candidates).unwrap_or_else(|_| "[]".to_string());

    let mut user = format!(
        "Candidate problems:\n{}\n\nReturn at most {} items.",
        payload, options.limit
    );
    if version != "v1" {
        if let Some(objective) = &options.objective {
            user.push_str(&format!("\nObjective: {}.", objective));
        }
        if !options.target_domains.is_empty() {
            user.push_str(&format!(
                "\nFocus domains: {}.",
                options.target_domains.join(", ")
            ));
        }
        if let Some(difficulty) = &options.difficulty_preference {
            user.push_str(&format!("\nPreferred difficulty: {}.", difficulty));
        }
        if let Some(timebox) = options.timebox_minutes {
            user.push_str(&format!("\nAvailable time: {} minutes.", timebox));
        }
    }
    user.push_str("\n\nRespond with JSON only.");

    PromptMessages {
        system: system.to_string(),
        user,
    }
}
