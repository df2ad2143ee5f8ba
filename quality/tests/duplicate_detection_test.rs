use case_quality::{
    dedup_exact, detect, ids_are_contiguous, normalize_case_document, similarity_ratio, TestCase,
};

fn case_with_steps(id: &str, title: &str, steps: String) -> TestCase {
    TestCase {
        case_id: id.into(),
        title: title.into(),
        preconditions: String::new(),
        steps: vec![steps],
        expected_results: vec![format!("{title} done")],
    }
}

fn repeat(c: char, n: usize) -> String {
    std::iter::repeat(c).take(n).collect()
}

#[test]
fn steps_at_081_similarity_cluster() {
    let base = repeat('a', 100);
    let near = format!("{}{}", repeat('a', 81), repeat('b', 19));
    assert!((similarity_ratio(&base, &near) - 0.81).abs() < 1e-4);

    let cases = vec![
        case_with_steps("001", "first", base),
        case_with_steps("002", "second", near),
    ];
    let report = detect(&cases);
    assert_eq!(report.steps_duplicates.len(), 1);
    assert_eq!(report.steps_duplicates[0].case_ids, vec!["001", "002"]);
    assert_eq!(report.steps_duplicates[0].titles, vec!["first", "second"]);
    assert_eq!(report.duplicate_count, 1);
    assert_eq!(report.duplicate_rate, 50.0);
}

#[test]
fn steps_at_079_similarity_stay_apart() {
    let base = repeat('a', 100);
    let far = format!("{}{}", repeat('a', 79), repeat('b', 21));
    assert!((similarity_ratio(&base, &far) - 0.79).abs() < 1e-4);

    let cases = vec![
        case_with_steps("001", "first", base),
        case_with_steps("002", "second", far),
    ];
    let report = detect(&cases);
    assert!(report.steps_duplicates.is_empty());
    assert_eq!(report.duplicate_count, 0);
}

#[test]
fn multi_step_cases_differing_in_each_step_stay_apart() {
    let steps = |action: &str| -> Vec<String> {
        (1..=8).map(|i| format!("{i}. {action}")).collect()
    };
    let login = steps("打开登录页面并输入用户名和密码然后点击登录按钮检查结果");
    let register = steps("打开注册页面并输入手机号和密码然后点击登录按钮检查结果");
    let ratio = similarity_ratio(&login.join("\n"), &register.join("\n"));
    assert!((ratio - 0.6154).abs() < 1e-4, "ratio = {ratio}");

    let cases: Vec<TestCase> = [("001", "login", login), ("002", "register", register)]
        .into_iter()
        .map(|(id, title, steps)| TestCase {
            case_id: id.into(),
            title: title.into(),
            preconditions: String::new(),
            steps,
            expected_results: vec![format!("{title} done")],
        })
        .collect();
    let report = detect(&cases);
    assert!(report.steps_duplicates.is_empty());
    assert_eq!(report.duplicate_count, 0);
}

#[test]
fn three_cases_with_one_shared_title() {
    let cases = vec![
        case_with_steps("001", "A", repeat('x', 40)),
        case_with_steps("002", "A", repeat('y', 40)),
        case_with_steps("003", "C", repeat('z', 40)),
    ];
    let report = detect(&cases);
    assert_eq!(report.title_duplicates.len(), 1);
    assert_eq!(report.title_duplicates[0].title, "A");
    assert_eq!(report.title_duplicates[0].count, 2);
    assert_eq!(report.duplicate_count, 1);
    assert_eq!(report.duplicate_rate, 33.33);
}

#[test]
fn clustering_compares_against_representative_only() {
    // b is close to a, c is close to b but not to a: c starts its own group.
    let a = repeat('a', 100);
    let b = format!("{}{}", repeat('a', 85), repeat('b', 15));
    let c = format!("{}{}", repeat('a', 70), repeat('b', 30));
    assert!(similarity_ratio(&b, &c) > 0.8);
    assert!(similarity_ratio(&a, &c) <= 0.8);

    let cases = vec![
        case_with_steps("001", "a", a),
        case_with_steps("002", "b", b),
        case_with_steps("003", "c", c),
    ];
    let report = detect(&cases);
    assert_eq!(report.steps_duplicates.len(), 1);
    assert_eq!(report.steps_duplicates[0].case_ids, vec!["001", "002"]);
}

#[test]
fn golden_records_without_ids_fall_back_to_generated_ids() {
    let raw = r#"{"test_cases": {"functional": [
        {"title": "same", "steps": ["open", "submit the form"], "expected_results": ["ok"]},
        {"title": "same", "steps": ["open", "submit the form"], "expected_results": ["ok"]}
    ]}}"#;
    let records = normalize_case_document(raw).unwrap();
    let report = detect(&records);
    assert_eq!(report.duplicate_count, 2);
    assert_eq!(report.steps_duplicates[0].case_ids, vec!["TC-001", "TC-002"]);
    assert_eq!(report.expected_results_group_count, 1);
}

#[test]
fn dedup_then_detect_leaves_no_exact_repeats() {
    let dup = case_with_steps("001", "save", "click save".into());
    let outcome = dedup_exact(vec![
        dup.clone(),
        case_with_steps("002", "load", "click load".into()),
        dup.with_case_id("003"),
    ]);
    assert_eq!(outcome.removed, 1);
    assert!(ids_are_contiguous(&outcome.cases));
    assert!(detect(&outcome.cases).title_duplicates.is_empty());
}
