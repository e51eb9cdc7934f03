// All LLM prompt constants for the generation stages.
// Templates use `{placeholder}` markers filled with `str::replace` before sending.
// Cross-cutting fragments live in llm_client::prompts.

/// System prompt for JD parsing.
pub const JD_PARSE_SYSTEM: &str = "Extract a structured summary from a job description.";

/// JD parsing prompt template. Replace `{jd_text}` before sending.
pub const JD_PARSE_PROMPT_TEMPLATE: &str = r#"Parse the following job description and return a JSON object with these exact fields:
{
  "company": "",
  "role": "",
  "skills": [],
  "responsibilities": [],
  "must_haves": [],
  "nice_to_haves": [],
  "hr": "",
  "address": "",
  "zip": "",
  "city": ""
}

"hr" is the salutation plus last name of the hiring manager (e.g. "Ms. Meier") if available, otherwise "Hiring Manager".
"address" is the street address of the company if available, otherwise "xxxxxxx x".
"zip" is the zip code of the company if available, otherwise "1000".
"city" is the city of the company if available, otherwise "Zurich".

Job Description:
{jd_text}

{footer}"#;

/// System prompt for the work-experience selector.
pub const WORK_SELECT_SYSTEM: &str = "You are a resume selector. Rank and SELECT the best items \
    for this JD. Prefer concrete metrics. Do NOT invent facts.";

/// Work-experience prompt. Replace: {jd_summary}, {entry_name}, {bullets_json},
/// {grounding_instruction}, {tailoring}, {cap}, {footer}
pub const WORK_SELECT_PROMPT_TEMPLATE: &str = r#"You are writing a resume for a given job description. Given the job description summary and the bullet points of one work experience entry, select and rewrite the best bullet points.

Job Description Summary:
{jd_summary}

Work experience entry "{entry_name}" bullet points:
{bullets_json}

Rank and rewrite (shorten, tailor) the bullet points for this job description.
The FIRST bullet point must describe the company.
{grounding_instruction}

{tailoring}

Selection budget (cap): max {cap} items.

Return a JSON object with this exact structure:
{
  "selected": [{"id": "...", "text": "..."}],
  "missing_topics": ["..."]
}

Select only from the provided bullet points and keep their ids. Do NOT exceed the cap.
{footer}"#;

/// System prompt for the skills selector.
pub const SKILLS_SELECT_SYSTEM: &str = "You are a resume writer. Decide whether skills need to \
    be added to match the JD.";

/// Skills prompt. Replace: {jd_summary}, {skills_json}, {tailoring}, {footer}
pub const SKILLS_SELECT_PROMPT_TEMPLATE: &str = r#"You are writing a resume for a given job description. Given the job description summary and the skills document, produce the skills section.

Job Description Summary:
{jd_summary}

Skills document:
{skills_json}

Keep ALL existing categories and ALL existing items.
Adding role-relevant items inside the existing categories is allowed and encouraged.
Do NOT create new categories. Format the text for LaTeX.

{tailoring}

Return a JSON object with this exact structure:
{
  "selected": [{"category": "...", "text": "..."}]
}

{footer}"#;

/// System prompt for the bank selector (selection-with-reason).
pub const BANK_SELECT_SYSTEM: &str = "You are a resume selector. SELECT the best bank items per \
    section for this JD and justify each choice. Prefer concrete metrics. Do NOT invent facts.";

/// Bank selection prompt. Replace: {jd_summary}, {items_json}, {caps},
/// {grounding_instruction}, {tailoring}, {footer}
pub const BANK_SELECT_PROMPT_TEMPLATE: &str = r#"Given the following job description summary and fact bank, select the best items per section.

Job Description Summary:
{jd_summary}

Bank items:
{items_json}

Selection budgets (caps per section):
{caps}

{grounding_instruction}

{tailoring}

Return a JSON object with this exact structure:
{
  "selected": {"Projects": [{"id": "...", "reason": "..."}], "Achievements": [{"id": "...", "reason": "..."}]},
  "missing_topics": ["JD topics no bank item covers"]
}

Select only ids from the bank items above. Do NOT exceed the caps.
{footer}"#;

/// System prompt for the critic.
pub const CRITIC_SYSTEM: &str = "You are a resume critic. Evaluate whether the assembled resume \
    content adequately addresses the job description requirements.";

/// Critic prompt. Replace: {jd_summary}, {assembled}, {footer}
pub const CRITIC_PROMPT_TEMPLATE: &str = r#"Job Description Summary:
{jd_summary}

Assembled Content:
{assembled}

Evaluate whether the assembled content addresses the JD requirements. List any JD topics not covered by the assembled content.

If acceptable, return: {"gate_passed": true, "missing_topics": []}
Otherwise, return: {"gate_passed": false, "missing_topics": ["topic1", "topic2"]}

{footer}"#;

/// System prompt for the cover-letter writer.
pub const COVER_LETTER_SYSTEM: &str = "You are an expert cover letter writer. Write a compelling \
    one-page cover letter using the AIDA method: \
    Attention (grab the reader with a strong opening hook), \
    Interest (show understanding of the role and company), \
    Desire (showcase relevant skills and value), \
    Action (end with a clear call to action).";

/// Cover-letter prompt. Replace: {jd_summary}, {name}, {background}, {narratives},
/// {concerns}, {footer}
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"Write a professional cover letter (about 600 words) for the following job application using the AIDA method.

Four paragraphs:
1. The company and the role (Attention).
2. The applicant (Interest).
3. What sets the applicant apart for this role (Desire).
4. The call to action (Action).

Return a JSON object with this exact structure:
{
  "paragraph_1": "...",
  "paragraph_2": "...",
  "paragraph_3": "...",
  "paragraph_4": "..."
}

Job Description Summary:
{jd_summary}

Applicant Profile:
Name: {name}
Background: {background}

Personal narratives (weave these in naturally):
{narratives}

Potential concerns a recruiter may have (address them, always phrased positively):
{concerns}

Requirements:
1. Follow the AIDA structure.
2. Incorporate the personal narratives naturally.
3. Tailor the content to the role and its responsibilities.
4. Show enthusiasm and professionalism.
5. Focus on the future, not the past.
6. Use storytelling where possible.
7. Address the concerns without any negativity.
8. Start with the content. Do NOT write a salutation and do NOT end with a closer.

{footer}"#;
