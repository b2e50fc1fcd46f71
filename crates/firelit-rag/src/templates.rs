//! Prompt templates
//!
//! Templates use `{name}` placeholders. Rendering is a single pass over the
//! template, so braces inside substituted values are never expanded again.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use crate::error::{Error, Result};

static PLACEHOLDER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
});

pub const MESSAGE_VAR: &str = "message";
pub const SNIPPETS_VAR: &str = "vectorized_data";

/// Grounded market-analysis prompt. `{message}` is the prospect's request and
/// `{vectorized_data}` the retrieved store summaries.
pub const MARKET_ANALYSIS_TEMPLATE: &str = "\
You need to derive business insights based on the summary information in the page_contents_array. You should answer referring to this best_practice or in the same format.
You will follow ALL of the rules below:

1/ Response should be based on my page_contents_array database.
2/ Please compare with two cases of the same industry in a different region.
3/ Please present business insights based on comparision analysis.

Below is a message I received from the prospect:
{message}

Here is a list of summarization based on page_contents_array:
{vectorized_data}

Please write the best response that I should send to this prospect:
";

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    input_variables: BTreeSet<String>,
}

impl PromptTemplate {
    /// Parse `template`, collecting its placeholders as the required inputs.
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let input_variables = PLACEHOLDER_RE
            .captures_iter(&template)
            .map(|c| c[1].to_string())
            .collect();
        Self {
            template,
            input_variables,
        }
    }

    pub fn input_variables(&self) -> impl Iterator<Item = &str> {
        self.input_variables.iter().map(String::as_str)
    }

    pub fn format(&self, values: &HashMap<&str, String>) -> Result<String> {
        if let Some(missing) = self
            .input_variables
            .iter()
            .find(|v| !values.contains_key(v.as_str()))
        {
            return Err(Error::Configuration(format!(
                "missing prompt variable '{}'",
                missing
            )));
        }

        Ok(PLACEHOLDER_RE
            .replace_all(&self.template, |caps: &regex::Captures| {
                values[&caps[1]].clone()
            })
            .into_owned())
    }
}

/// Render snippets as a numbered evidence block. Empty input gives an empty block.
pub fn format_snippets(snippets: &[String]) -> String {
    snippets
        .iter()
        .enumerate()
        .map(|(i, s)| format!("[{}]\n{}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the grounded analysis prompt. Pure: same inputs, same bytes.
pub fn compose(user_message: &str, snippets: &[String]) -> String {
    let template = PromptTemplate::new(MARKET_ANALYSIS_TEMPLATE);
    let values = HashMap::from([
        (MESSAGE_VAR, user_message.to_string()),
        (SNIPPETS_VAR, format_snippets(snippets)),
    ]);
    template
        .format(&values)
        .expect("analysis template placeholders are all supplied")
}
