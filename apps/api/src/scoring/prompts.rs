use crate::llm_client::prompts::persona_block;
use crate::models::candidate::CandidateProfile;

pub const RANK_SYSTEM: &str = "You are a master technical recruiter. \
    You respond with a raw JSON list of integers only.";

pub fn rank_prompt(role: &str, persona: Option<&str>, batch: &[CandidateProfile]) -> String {
    let lines: Vec<String> = batch
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "{}. {}: {}",
                i + 1,
                c.name,
                c.headline.as_deref().unwrap_or("(no headline)")
            )
        })
        .collect();

    format!(
        r#"You are a master recruiter specialized in technical hiring for "{role}".{persona}
Score these {count} candidates from 0-100 based on their LinkedIn headline.

CRITERIA:
1. Keywords: direct match for technologies mentioned.
2. Seniority: is the candidate a Lead, Senior, or specialized Expert?
3. Persona match: how well do they fit the ideal persona requirements above?

Return ONLY a raw JSON list of numbers in the same order.
Example: [85, 40, 92]

Candidates:
{candidates}"#,
        persona = persona_block("IDEAL PERSONA REQUIREMENTS", persona),
        count = batch.len(),
        candidates = lines.join("\n"),
    )
}

pub fn assess_prompt(candidate: &CandidateProfile, role: &str, persona: Option<&str>) -> String {
    format!(
        r#"You are an expert technical recruiter. Analyze this candidate for the role: {role}
{persona}
CANDIDATE DATA:
Name: {name}
Headline: {headline}
Location: {location}
About: {about}
Experience: {experience}
Education: {education}

TASK:
1. Compare the candidate's experience against the requirements.
2. Look for specific evidence (years of experience, tech stacks, leadership roles).
3. Be strict. If they lack a must-have, score them low.

Respond with this JSON object:
{{
  "candidate_id": "{id}",
  "candidate_name": "{name}",
  "overall_score": 0-100,
  "tier": 1 (perfect match), 2 (good match) or 3 (mismatch),
  "recommended_action": "Shortlist", "Review", "Hold" or "Reject",
  "role_fit_analysis": {{
    "score": 0-100,
    "strengths": ["specific skills or experience found"],
    "gaps": ["missing requirements"],
    "evidence": "a plain string quoting profile items that justify the score",
    "explanation": "a plain string explaining the score"
  }},
  "reasoning_summary": "a 2-sentence summary for the hiring manager",
  "risk_flags": ["e.g. Job hopping", "Career gap", "Junior role", "Irrelevant industry"]
}}

All text fields must be plain strings, not objects."#,
        persona = persona_block("MUST-HAVE REQUIREMENTS", persona),
        id = candidate.id,
        name = candidate.name,
        headline = or_unknown(&candidate.headline),
        location = or_unknown(&candidate.location),
        about = or_unknown(&candidate.about),
        experience = or_unknown(&candidate.experience_text),
        education = or_unknown(&candidate.education_text),
    )
}

pub fn outreach_prompt(role: &str, strength: &str) -> String {
    format!(
        "Write a professional, warm 2-sentence LinkedIn outreach message for a {role} role. \
         Mention their specific strength: {strength}. Keep it under 300 characters. \
         Reply with the message text only."
    )
}

pub fn fallback_message(role: &str) -> String {
    format!("Hi, I saw your profile for the {role} role and would love to chat!")
}

fn or_unknown(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("Not available")
}
