//! Prompt templates for application generation and revision.
//!
//! These prompts enforce a strict output contract: the model must answer
//! with a single fenced code block opening on the expected document marker
//! so the extraction step can discard any conversational wrapper text.
//!
//! ## Prompt Types
//!
//! - **Build prompts**: fresh application + README from a brief
//! - **Revision prompts**: amend existing code/README in place while
//!   preserving round-1 behavior

use crate::models::Attachment;

/// How much of a data URI to surface in a prompt. Full URIs can run to
/// megabytes; the reference plus a truncated prefix is enough for the
/// model to wire the attachment in.
const ATTACHMENT_PREVIEW_CHARS: usize = 100;

fn attachments_section(title: &str, attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return String::new();
    }
    let mut section = format!("\n\n## {}\n", title);
    for att in attachments {
        let preview: String = att.url.chars().take(ATTACHMENT_PREVIEW_CHARS).collect();
        section.push_str(&format!("- **{}**: {}...\n", att.name, preview));
    }
    section
}

fn checks_section(header: &str, checks: &[String]) -> String {
    if checks.is_empty() {
        return String::new();
    }
    let mut section = format!("\n\n## {}\n", header);
    for (i, check) in checks.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, check));
    }
    section
}

/// Build the prompt for a fresh single-file application.
pub fn build_app_prompt(brief: &str, checks: &[String], attachments: &[Attachment]) -> String {
    format!(
        "You are an expert web developer. Build a complete, self-contained \
         single-file HTML application.\n\n\
         ## TASK BRIEF\n{brief}\
         {checks}\
         {attachments}\n\n\
         ## REQUIREMENTS\n\n\
         1. **Single File**: All HTML, CSS, and JavaScript in one document\n\
         2. **Self-Contained**: CDN links are allowed; no local assets\n\
         3. **Complete**: Every feature in the brief must work\n\
         4. **Checks**: Every evaluation check listed above must pass\n\
         5. **Attachments**: Integrate the referenced attachments where the brief calls for them\n\n\
         ## OUTPUT FORMAT\n\n\
         Provide ONLY the complete HTML code. Do not include explanations.\n\
         Start directly with:\n\
         ```html\n\
         <!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         ...\n\
         ```\n\n\
         Now generate the complete HTML code.",
        brief = brief,
        checks = checks_section("EVALUATION CHECKS\nThe code must pass:", checks),
        attachments = attachments_section("ATTACHMENTS", attachments),
    )
}

/// Build the prompt for the README accompanying a fresh application.
pub fn build_readme_prompt(brief: &str, checks: &[String]) -> String {
    format!(
        "Write a README.md for a single-file web application.\n\n\
         ## APPLICATION BRIEF\n{brief}\
         {checks}\n\n\
         ## REQUIRED SECTIONS\n\n\
         1. Project title and one-paragraph summary\n\
         2. Features\n\
         3. Usage instructions\n\
         4. Technical notes (libraries, CDN dependencies)\n\n\
         ## OUTPUT FORMAT\n\n\
         Provide ONLY the complete markdown content. Start directly with:\n\
         ```markdown\n\
         # Project Title\n\
         ...\n\
         ```\n\n\
         Generate the README.md now.",
        brief = brief,
        checks = checks_section("FEATURES TO DOCUMENT", checks),
    )
}

/// Build the prompt for revising an existing application in place.
///
/// The existing document is included verbatim and the instructions forbid
/// discarding working functionality; this is an amendment, not a rewrite.
pub fn revise_app_prompt(
    existing_html: &str,
    new_brief: &str,
    new_checks: &[String],
    new_attachments: &[Attachment],
) -> String {
    format!(
        "You are an expert web developer tasked with updating an existing application.\n\n\
         ## EXISTING CODE (Round 1)\n\
         ```html\n{existing}\n```\n\n\
         ## NEW REQUIREMENTS (Round 2)\n{brief}\
         {attachments}\
         {checks}\n\n\
         ## REVISION INSTRUCTIONS\n\n\
         1. **Preserve Existing Functionality**: Keep all features from Round 1 working\n\
         2. **Add New Features**: Implement the new requirements from the brief\n\
         3. **Update Inline**: Modify the existing HTML structure rather than rewriting from scratch\n\
         4. **Keep Single File**: Maintain the single-file HTML structure\n\n\
         ## WHAT TO PRESERVE\n\n\
         - Existing UI elements and their IDs/classes\n\
         - Original functionality and behavior\n\
         - Existing CDN links\n\
         - Overall application structure\n\n\
         ## OUTPUT FORMAT\n\n\
         Provide ONLY the complete UPDATED HTML code. Do not include explanations.\n\
         Start directly with:\n\
         ```html\n\
         <!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         ...\n\
         ```\n\n\
         The updated code must be a complete, working application that includes BOTH \
         the original features AND the new requirements.\n\n\
         Now generate the complete updated HTML code.",
        existing = existing_html,
        brief = new_brief,
        attachments = attachments_section("NEW ATTACHMENTS", new_attachments),
        checks = checks_section(
            "NEW EVALUATION CHECKS\nThe updated code must pass:",
            new_checks
        ),
    )
}

/// Build the prompt for updating the README alongside a code revision.
pub fn revise_readme_prompt(existing_readme: &str, new_brief: &str, new_checks: &[String]) -> String {
    format!(
        "Update the existing README.md to reflect new features added in Round 2.\n\n\
         ## EXISTING README\n\
         ```markdown\n{existing}\n```\n\n\
         ## NEW FEATURES (Round 2)\n{brief}\
         {checks}\n\n\
         ## UPDATE INSTRUCTIONS\n\n\
         1. **Preserve Existing Content**: Keep all Round 1 information\n\
         2. **Add New Features**: Update the Features section with Round 2 additions\n\
         3. **Maintain Structure**: Keep the same section organization\n\n\
         ## OUTPUT FORMAT\n\n\
         Provide ONLY the complete UPDATED markdown content. Start directly with:\n\
         ```markdown\n\
         # Project Title\n\
         ...\n\
         ```\n\n\
         Generate the updated README.md now.",
        existing = existing_readme,
        brief = new_brief,
        checks = checks_section("New Features Added", new_checks),
    )
}
