//! Prompt text for each model call the pipeline and the evaluator make.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever prompt content changes so
//! logged runs can be traced back to the wording that produced them.

/// Prompt version. Bump on any content change.
pub const PROMPT_VERSION: &str = "1.3.0";

/// System prompt shared by the generation stages.
pub const QA_ENGINEER_SYSTEM: &str = "\
You are a senior QA engineer. You read product requirement documents and turn \
them into precise, executable functional test cases.";

/// System prompt for the evaluation call.
pub const EVALUATOR_SYSTEM: &str = "\
You are a software testing expert who assesses the quality and effectiveness of \
test cases. Judge objectively against the given criteria and pay particular \
attention to duplicated test cases.";

/// Ask for a document title given the opening of the document.
pub fn title_prompt(prefix: &str) -> String {
    format!(
        "Read the beginning of the requirement document below and reply with its \
        title only, on a single line, without quotes or commentary.\n\n{prefix}"
    )
}

/// Ask for test points grouped by module.
///
/// Images in the document are inline markdown, so the model is told to read
/// them together with the text.
pub fn extraction_prompt(source_text: &str) -> String {
    format!(
        "Read the product requirement document below. Images are embedded as \
        markdown; use them together with the text. Extract detailed test points \
        across the functional, usability and error-handling dimensions, grouped by \
        module, in exactly this bullet layout:\n\
        - <Module name>:\n  \
        - <Test point 1>\n  \
        - <Test point 2>\n\n\
        Document:\n{source_text}"
    )
}

/// Test dimensions every optimized point is tagged with.
pub const TEST_DIMENSIONS: [&str; 7] = [
    "functional",
    "error-handling",
    "boundary",
    "compatibility",
    "security",
    "usability",
    "performance",
];

/// Ask the model to fill gaps in an outline and tag each point's dimension.
pub fn optimization_prompt(outline: &str) -> String {
    format!(
        "You are a testing expert. Review and improve the test points below. \
        Images in the source document are embedded as markdown.\n\
        Goals:\n\
        1. Fill in missing test points.\n\
        2. Make sure the points cover functionality, usability, compatibility, \
        security and performance.\n\
        3. Keep every point under its module and tag it with its test dimension \
        ({dimensions}).\n\
        Keep the module-grouped bullet layout, one test point per line.\n\n\
        Test points:\n{outline}",
        dimensions = TEST_DIMENSIONS.join("/")
    )
}

/// Ask for exactly one JSON test case covering one requirement point.
pub fn case_prompt(point: &str) -> String {
    format!(
        "Write one functional test case for the requirement point below. It may \
        cover at most 5 closely related scenarios. Respond with a single JSON object \
        and nothing else:\n\
        {{\"title\": \"...\", \"precondition\": \"...\", \
        \"steps\": [\"1. ...\", \"2. ...\"], \
        \"expected_results\": [\"1. ...\", \"2. ...\"]}}\n\n\
        Requirement point: {point}"
    )
}

/// Weighted evaluation dimensions: `(key, label, weight)`.
pub const DIMENSIONS: [(&str, &str, f64); 5] = [
    ("functional_coverage", "Functional coverage", 0.30),
    ("defect_detection", "Defect detection", 0.25),
    ("engineering_efficiency", "Engineering efficiency", 0.20),
    ("semantic_quality", "Semantic quality", 0.15),
    ("security_economy", "Security and economy", 0.10),
];

/// Build the comparison prompt for the evaluator.
pub fn evaluation_prompt(
    ai_cases_json: &str,
    golden_cases_json: &str,
    ai_duplicates: &[String],
    golden_duplicates: &[String],
) -> String {
    let dimensions = DIMENSIONS
        .iter()
        .enumerate()
        .map(|(i, (key, label, weight))| {
            format!("{}. **{label}** (`{key}`, weight {:.0}%)", i + 1, weight * 100.0)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "# Task\n\
        Compare the quality of the AI-generated test cases against the golden \
        reference test cases.\n\n\
        # Dimensions and weights\n{dimensions}\n\n\
        # Duplication analysis\n\
        ## AI-generated cases\n{ai_dup}\n\n\
        ## Golden cases\n{golden_dup}\n\n\
        If the AI duplicate rate is clearly higher than the golden one, recommend \
        reducing duplicated cases.\n\n\
        # Scoring\n\
        overall = 0.3*functional_coverage + 0.25*defect_detection + \
        0.2*engineering_efficiency + 0.15*semantic_quality + 0.1*security_economy\n\n\
        # AI-generated test cases\n```json\n{ai_cases_json}\n```\n\n\
        # Golden test cases\n```json\n{golden_cases_json}\n```\n\n\
        # Output\n\
        Respond with JSON only, in this shape (scores between 1 and 5, one decimal):\n\
        ```json\n\
        {{\n  \"evaluation_summary\": {{\"overall_score\": \"\", \"final_suggestion\": \"\"}},\n  \
        \"detailed_report\": {{\n    \
        \"format_compliance\": {{\"score\": \"\", \"reason\": \"\"}},\n    \
        \"content_accuracy\": {{\"score\": \"\", \"reason\": \"\"}},\n    \
        \"test_coverage\": {{\"score\": \"\", \"reason\": \"\", \"analysis\": {{\
        \"covered_features\": [], \"missed_features_or_scenarios\": [], \
        \"scenario_types_found\": []}}}},\n    \
        \"functional_coverage\": {{\"score\": \"\", \"reason\": \"\"}},\n    \
        \"defect_detection\": {{\"score\": \"\", \"reason\": \"\"}},\n    \
        \"engineering_efficiency\": {{\"score\": \"\", \"reason\": \"\"}},\n    \
        \"semantic_quality\": {{\"score\": \"\", \"reason\": \"\"}},\n    \
        \"security_economy\": {{\"score\": \"\", \"reason\": \"\"}}\n  }}\n}}\n```",
        ai_dup = ai_duplicates.join("\n"),
        golden_dup = golden_duplicates.join("\n"),
    )
}
