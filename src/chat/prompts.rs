//! Prompt store and prompt templates.
//!
//! Preset system prompts are selectable by `store_name` instead of free
//! text. The classifier prompt drives the search-check decision; the
//! injection templates wrap retrieved web text or document bodies around
//! the user's last message.

use chrono::Utc;

use crate::error::ValidationError;

/// Named preset system prompts.
const PRESET_PROMPTS: &[(&str, &str)] = &[
    (
        "Write For Me",
        "You are a professional writing assistant. Produce well-structured, \
         engaging text tailored to the user's requested tone, audience and length.",
    ),
    (
        "Code Copilot",
        "You are an expert software engineer. Answer with working, idiomatic \
         code first, then a short explanation of the key decisions.",
    ),
    (
        "Translator",
        "You are a precise translator. Preserve register and nuance; when a \
         term is ambiguous, give the most common rendering and note alternatives.",
    ),
];

/// Training-data cutoff advertised in the base system prompt.
const KNOWLEDGE_CUTOFF: &str = "2023-10";

/// Names of the known preset prompts.
pub fn store_names() -> Vec<&'static str> {
    PRESET_PROMPTS.iter().map(|(name, _)| *name).collect()
}

pub fn is_known_store(name: &str) -> bool {
    PRESET_PROMPTS.iter().any(|(n, _)| *n == name)
}

/// Resolve a preset prompt by store name.
pub fn store_prompt(name: &str) -> Result<String, ValidationError> {
    PRESET_PROMPTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, prompt)| (*prompt).to_string())
        .ok_or_else(|| ValidationError::InvalidStoreName(name.to_string()))
}

/// Frame a system prompt: assistant identity + cutoff + current date, the caller's
/// (or preset) instructions, citation rules for injected web data, and the
/// document-grounding rules when in document mode.
pub fn system_prompt(instructions: &str, document_mode: bool) -> String {
    let mut prompt = format!(
        "You are a Assistant chatbot.\nKnowledge cutoff: {KNOWLEDGE_CUTOFF}\n\
         Current date: {}\n\n# System Prompt\n\n{instructions}\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S"),
    );
    prompt.push_str(
        "\n# Tool\n\n## URL\n\n\
         If the user input contains [Internet_Data], render citations as [INFORMATION](URL).\n\
         For long citations render *[(HOSTNAME)](URL)*, with HOSTNAME the hostname of the url.\n\
         Otherwise do not render links.\n\
         Data in [Internet_Data] is considered your knowledge; don't let users know you are \
         using the data in it.\n",
    );
    if document_mode {
        prompt.push_str(
            "\n## Document\n\n\
             When a document is provided at <Document_Data>...<\\End_Document_Data>, treat the \
             information as your own and prioritize it above all else in responses.\n\
             Never reveal or suggest that the data came from an external source or was provided \
             by the user.\n\
             If the answer lies outside the provided data, state that you do not know.\n",
        );
    }
    prompt
}

/// System prompt for the search-check classifier. The contract: strict JSON
/// out, dates only in `time` (dd/mm/yyyy, day or month may be empty),
/// `num_link` defaulting to 3, `language` an ISO 639-1 code.
pub fn search_check_prompt() -> String {
    format!(
        "You are a helpful assistant chatbot.\n\
         Current date: {} with (dd/mm/yyyy h:m:s) format\n\n\
         # System Prompt\n\n\
         You are a checker query for Web Browser tool from user query input. Web browser mode \
         will enable in the following circumstances:\n\
         - User is asking about current events or something that requires real-time information \
         (weather, sports scores, etc.)\n\
         - User is asking about some term you are totally unfamiliar with (it might be new)\n\
         - User explicitly asks you to browse or provide links to references\n\n\
         The format json output include:\n\
         - web_browser_mode (bool): true when web browser mode enable\n\
         - request (dict): is {{}} when web_browser_mode is false. When web_browser_mode is \
         true, it's required:\n\
             + language (str): language of the user query input, as an ISO 639-1 code.\n\
             + query (str): user query input, optimized for Google Search. Time cannot appear \
         in the query.\n\
             + time (str): the time mentioned in the query input with dd/mm/yyyy format (day \
         and month can be empty). Time is '' if the query does not mention time.\n\
             + num_link (int): the number of reference links requested by the user, default 3.\n\n\
         Note: keep the language of the user query input.\n",
        Utc::now().format("%d/%m/%Y %H:%M:%S"),
    )
}

/// Wrap the user's query with retrieved web text as a delimited context
/// block. This is the search-phase rewrite of the last user message.
/// URLs whose scrape yielded no text (failed fetch, or dropped for being
/// too short) are left out of the block entirely.
pub fn web_context_prompt(user_query: &str, urls: &[String], texts: &[String]) -> String {
    let mut prompt = String::from(
        "Using data was searched on the internet to answer of user query:\n<Internet_Data>\n",
    );
    for (i, url) in urls.iter().enumerate() {
        let text = texts.get(i).map(String::as_str).unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        prompt.push_str(&format!("- URL_{}: {url}\n{text}\n", i + 1));
    }
    prompt.push_str(&format!(
        "<\\End_Internet_Data>\n\nUser query input: {user_query}\n"
    ));
    prompt
}

/// Splice a pre-loaded document body into the user's last message. Same
/// mutation rule as the search rewrite, different source of injected text.
pub fn document_context_prompt(user_query: &str, document: &str) -> String {
    format!(
        "Document data provided:\n\n<Document_Data>\n{document}\n<\\End_Document_Data>\n\n\n\
         Please answer user query input question: {user_query}\n"
    )
}
