// Tailoring pipeline stages: JD parsing, ranking, assembly, critique, cover letter.
// All model calls go through llm_client::GenerativePort, never a provider SDK.

pub mod assembler;
pub mod cover_letter;
pub mod critic;
pub mod jd_parser;
pub mod pipeline;
pub mod prompts;
pub mod ranker;
pub mod tailoring;
