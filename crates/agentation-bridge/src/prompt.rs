//! Prompt rendering.

use std::fmt::Write;

use agentation_protocols::{Annotation, SubmitFeedbackPayload};

const INSTRUCTIONS: &str = "Please analyze the above feedback and help implement the requested changes. \
If code changes are needed, provide specific suggestions or implementations. \
If clarification is needed, ask specific questions.\n";

/// Render a submission as a Markdown prompt.
///
/// Layout: page header, one numbered section per annotation with its
/// feedback verbatim, an optional additional-context section and a fixed
/// instruction block. Pure and deterministic.
pub fn build_feedback_prompt(payload: &SubmitFeedbackPayload) -> String {
    let mut prompt = String::new();

    prompt.push_str("# UI Feedback Request\n\n");
    let _ = writeln!(prompt, "**Page:** {}", payload.page_title);
    let _ = writeln!(prompt, "**URL:** {}\n", payload.page_url);
    prompt.push_str("---\n\n");
    prompt.push_str("## Annotations\n\n");

    for (index, annotation) in payload.annotations.iter().enumerate() {
        write_annotation(&mut prompt, index + 1, annotation);
    }

    if let Some(context) = payload.context() {
        let _ = write!(prompt, "## Additional Context\n\n{}\n\n", context);
    }

    prompt.push_str("## Instructions\n\n");
    prompt.push_str(INSTRUCTIONS);
    prompt
}

fn write_annotation(prompt: &mut String, number: usize, annotation: &Annotation) {
    match annotation {
        Annotation::Group(group) => {
            let _ = write!(
                prompt,
                "### {}. Group Annotation ({} elements)\n\n",
                number,
                group.selectors.len()
            );
            prompt.push_str("**Elements:**\n");
            for (i, selector) in group.selectors.iter().enumerate() {
                let description = group
                    .descriptions
                    .get(i)
                    .map(String::as_str)
                    .filter(|d| !d.is_empty())
                    .unwrap_or("Element");
                let _ = writeln!(prompt, "- {}: `{}`", description, selector);
            }
        }
        Annotation::Single(single) => {
            let description = non_empty(&single.description).unwrap_or("Element");
            let selector = non_empty(&single.selector).unwrap_or("unknown");
            let _ = write!(prompt, "### {}. {}\n\n", number, description);
            let _ = write!(prompt, "**Selector:** `{}`\n\n", selector);
        }
    }

    let _ = write!(prompt, "\n**Feedback:**\n{}\n\n", annotation.feedback());

    let terms = annotation.design_terms();
    if !terms.is_empty() {
        prompt.push_str("**Design Terms:**\n");
        for term in terms {
            let _ = writeln!(prompt, "- {}", term);
        }
        prompt.push('\n');
    }
    prompt.push_str("---\n\n");
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
