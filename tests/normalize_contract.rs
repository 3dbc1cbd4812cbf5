// tests/normalize_contract.rs
use sms_spam_filtering::{URL_TOKEN, normalize};

#[test]
fn same_input_same_output() {
    let raw = "FREE entry!! Reply WIN to hxxp://claim.example now";
    let first = normalize(Some(raw));
    for _ in 0..10 {
        assert_eq!(normalize(Some(raw)), first);
    }
}

#[test]
fn obfuscated_scheme_becomes_sentinel() {
    let cleaned = normalize(Some("hxxp://bad.example"));
    assert!(cleaned.contains(URL_TOKEN), "{cleaned}");
    assert!(!cleaned.contains("bad.example"));
    assert!(!cleaned.contains("http"));
}

#[test]
fn stop_words_are_removed() {
    let cleaned = normalize(Some("the quick fox"));
    let tokens: Vec<&str> = cleaned.split(' ').collect();
    assert!(!tokens.contains(&"the"));
    assert!(tokens.contains(&"quick"));
    assert!(tokens.contains(&"fox"));
}

#[test]
fn missing_input_is_empty() {
    assert_eq!(normalize(None), "");
}

#[test]
fn see_you_tomorrow() {
    assert_eq!(normalize(Some("See you tomorrow.")), "see tomorrow.");
}

#[test]
fn spam_template_keeps_sentinel_and_content_words() {
    let cleaned = normalize(Some(
        "Congratulations! You've won a prize. Click hxxp://free.redeem",
    ));
    let tokens: Vec<&str> = cleaned.split(' ').collect();
    for kept in ["congratulations", "prize.", "click", URL_TOKEN] {
        assert!(tokens.contains(&kept), "{cleaned}");
    }
    assert!(!tokens.contains(&"you"));
    assert_eq!(tokens.last(), Some(&URL_TOKEN));
}

#[test]
fn collapses_whitespace() {
    assert_eq!(normalize(Some("  cash \t\n prize  ")), "cash prize");
}
