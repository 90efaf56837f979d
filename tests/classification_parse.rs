use mailbot::ai::parse_classification;
use mailbot::types::{Category, Urgency};

#[test]
fn parses_fenced_json_response() {
    let raw = "```json\n{\"category\":\"complaint\",\"urgency\":\"high\",\"topic\":\"broken item\",\"confidence\":0.92}\n```";

    let outcome = parse_classification(raw);
    assert!(!outcome.is_degraded());

    let c = outcome.into_inner();
    assert_eq!(c.category, Category::Complaint);
    assert_eq!(c.urgency, Urgency::High);
    assert_eq!(c.topic, "broken item");
    assert!((c.confidence - 0.92).abs() < 1e-9);
}

#[test]
fn output_stays_inside_the_closed_vocabulary() {
    let adversarial = [
        r#"{"category": "phishing", "urgency": "EXTREME", "topic": "x", "confidence": -3.5}"#,
        r#"{"category": 42, "urgency": null, "confidence": "high"}"#,
        r#"{"cat": "inquiry"}"#,
        "```\nnot even json\n```",
        "",
        "{]{]{]",
        r#"{"category": "spam", "urgency": "low", "topic": "ads", "confidence": 99}"#,
    ];

    for raw in adversarial {
        let c = parse_classification(raw).into_inner();
        assert!(matches!(
            c.category,
            Category::Inquiry
                | Category::Complaint
                | Category::Order
                | Category::Support
                | Category::Spam
                | Category::Other
        ));
        assert!(matches!(
            c.urgency,
            Urgency::High | Urgency::Medium | Urgency::Low
        ));
        assert!(
            (0.0..=1.0).contains(&c.confidence),
            "confidence {} out of range for input {raw:?}",
            c.confidence
        );
    }
}

#[test]
fn truncates_overlong_topics() {
    let long_topic = "a".repeat(500);
    let raw = format!(
        r#"{{"category":"inquiry","urgency":"low","topic":"{long_topic}","confidence":0.5}}"#
    );

    let c = parse_classification(&raw).into_inner();
    assert_eq!(c.topic.len(), 100);
}

#[test]
fn missing_fields_fall_back_per_field() {
    let c = parse_classification(r#"{"category":"order"}"#).into_inner();
    assert_eq!(c.category, Category::Order);
    assert_eq!(c.urgency, Urgency::Medium);
    assert_eq!(c.topic, "");
    assert!((c.confidence - 0.5).abs() < 1e-9);
}
