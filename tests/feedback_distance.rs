use mailbot::feedback::{edit_distance, similarity_ratio};

#[test]
fn identical_strings_are_distance_zero() {
    for s in ["", "x", "Tak for din besked!", "line one\nline two\n"] {
        assert_eq!(edit_distance(s, s), 0, "non-zero distance for {s:?}");
    }
}

#[test]
fn disjoint_strings_score_the_longer_length() {
    assert_eq!(edit_distance("aaaa", "bbbbbb"), 6);
    assert_eq!(edit_distance("", "hello"), 5);
    assert_eq!(edit_distance("hello", ""), 5);
}

#[test]
fn small_edits_produce_small_distances() {
    let original = "Dear customer, thank you for reaching out. We will look into it.";
    let edited = "Dear customer, thank you for reaching out! We will look into it.";

    let d = edit_distance(original, edited);
    assert!(d >= 1, "distance {d} too small");
    assert!(d <= 3, "distance {d} too large for a one-char edit");
}

#[test]
fn ratio_is_symmetric_for_equal_length_perturbations() {
    // Pairs built by perturbing a few positions of the same base string.
    let pairs = [
        ("abcdefghij", "abcdeXghij"),
        ("abcdefghij", "Xbcdefghij"),
        ("abcdefghij", "abcdefghiX"),
        ("the quick brown fox", "the quack brawn fox"),
    ];

    for (left, right) in pairs {
        let a: Vec<char> = left.chars().collect();
        let b: Vec<char> = right.chars().collect();
        let forward = similarity_ratio(&a, &b);
        let backward = similarity_ratio(&b, &a);
        assert!(
            (forward - backward).abs() < 1e-9,
            "asymmetric ratio for {left:?} / {right:?}: {forward} vs {backward}"
        );
        assert_eq!(edit_distance(left, right), edit_distance(right, left));
    }
}

#[test]
fn distance_follows_the_ratio_formula() {
    let original = "abcdef";
    let edited = "abcxyz";

    let a: Vec<char> = original.chars().collect();
    let b: Vec<char> = edited.chars().collect();
    let ratio = similarity_ratio(&a, &b);

    let expected = ((1.0 - ratio) * 6.0).round() as i64;
    assert_eq!(edit_distance(original, edited), expected);
}
