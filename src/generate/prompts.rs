//! Prompt templates

use super::TestCase;

/// Shown in place of the context when retrieval found nothing.
const NO_CONTEXT: &str = "(no documentation available)";

/// Shown in place of page markup when none was supplied.
const NO_MARKUP: &str = "(no page markup provided; infer selectors from the context)";

pub fn test_cases_prompt(feature: &str, context: &str, sources: &[String]) -> String {
    let context = if context.trim().is_empty() { NO_CONTEXT } else { context };
    let sources = if sources.is_empty() {
        "(none)".to_string()
    } else {
        sources.join(", ")
    };

    format!(
        r#"You are an expert QA Automation Engineer.
Your task is to generate comprehensive test cases for the following feature: "{feature}".

Strictly base your test cases on the provided context. Do not invent features,
rules or values that the context does not mention. If the context does not
describe the feature, return an empty JSON array.

Context:
{context}

Source documents: {sources}

Return the response ONLY as a JSON array of objects with the following keys:
- test_id (e.g., TC-001)
- feature (the feature being tested)
- scenario (the test scenario)
- expected_result (the expected outcome)
- grounded_in (the source document the rule comes from, exactly as listed above, or null)

JSON Output:
"#
    )
}

pub fn script_prompt(test_case: &TestCase, page_markup: Option<&str>, context: &str) -> String {
    let markup = page_markup.filter(|m| !m.trim().is_empty()).unwrap_or(NO_MARKUP);
    let context = if context.trim().is_empty() { NO_CONTEXT } else { context };

    format!(
        r#"You are an expert Selenium Automation Engineer.
Generate a robust, executable Python Selenium script for the following test case.

Test Case: {scenario}
Expected Result: {expected}

HTML Structure (Target Page):
{markup}

Additional Context/Rules:
{context}

Requirements:
1. Use `selenium` webdriver (assume Chrome).
2. Use explicit waits (`WebDriverWait`) for stability.
3. Use precise selectors based on the provided HTML (IDs, classes, names).
4. Include assertions that verify the Expected Result.
5. Handle potential errors (try/except) and always quit the driver.
6. Ensure the script is complete and runnable.
7. Return ONLY the Python code. No markdown formatting, no explanations.

Python Code:
"#,
        scenario = test_case.scenario,
        expected = test_case.expected_result,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case() -> TestCase {
        TestCase {
            test_id: "TC-001".into(),
            feature: "Discount Code".into(),
            scenario: "Apply SAVE15 at checkout".into(),
            expected_result: "Total drops by 15%".into(),
            grounded_in: Some("pricing.md".into()),
        }
    }

    #[test]
    fn test_cases_prompt_embeds_feature_context_and_sources() {
        let prompt = test_cases_prompt(
            "Discount Code",
            "Apply code SAVE15 for 15% off",
            &["pricing.md".to_string(), "faq.txt".to_string()],
        );
        assert!(prompt.contains(r#"feature: "Discount Code""#));
        assert!(prompt.contains("Apply code SAVE15 for 15% off"));
        assert!(prompt.contains("Source documents: pricing.md, faq.txt"));
        assert!(prompt.contains("grounded_in"));
    }

    #[test]
    fn empty_context_is_called_out() {
        let prompt = test_cases_prompt("Login", "  ", &[]);
        assert!(prompt.contains(NO_CONTEXT));
        assert!(prompt.contains("Source documents: (none)"));
    }

    #[test]
    fn script_prompt_embeds_case_and_markup() {
        let prompt = script_prompt(&case(), Some("<input id=\"code\">"), "SAVE15 gives 15% off");
        assert!(prompt.contains("Test Case: Apply SAVE15 at checkout"));
        assert!(prompt.contains("Expected Result: Total drops by 15%"));
        assert!(prompt.contains("<input id=\"code\">"));
        assert!(prompt.contains("SAVE15 gives 15% off"));
        assert!(prompt.contains("WebDriverWait"));
    }

    #[test]
    fn script_prompt_without_markup() {
        let prompt = script_prompt(&case(), None, "");
        assert!(prompt.contains(NO_MARKUP));
        assert!(prompt.contains(NO_CONTEXT));
    }
}
