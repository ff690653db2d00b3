use super::*;
use chrono::NaiveDate;

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 5)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .expect("valid timestamp")
}

fn sample() -> Vec<Exchange> {
    vec![
        Exchange {
            timestamp: at(9, 15),
            question: "When do you open?".to_string(),
            answer: "At nine.".to_string(),
        },
        Exchange {
            timestamp: at(9, 16),
            question: "And on weekends?".to_string(),
            answer: "Saturday: ten to four.\nSunday: closed.\n\nHolidays vary.".to_string(),
        },
    ]
}

#[test]
fn text_layout_matches_legacy_files() {
    let encoded = encode(&sample()[..1], HistoryFormat::Text).expect("encode");
    assert_eq!(
        encoded,
        "[2024-03-05 09:15:00]\nQ: When do you open?\nA: At nine.\n\n---\n\n"
    );
}

#[test]
fn text_round_trips_multiline_answers() {
    let exchanges = sample();
    let encoded = encode(&exchanges, HistoryFormat::Text).expect("encode");
    let decoded = decode(&encoded, HistoryFormat::Text).expect("decode");
    assert_eq!(decoded, exchanges);
}

#[test]
fn json_round_trips_multiline_answers() {
    let exchanges = sample();
    let encoded = encode(&exchanges, HistoryFormat::Json).expect("encode");
    assert!(encoded.contains("\"timestamp\": \"2024-03-05 09:16:00\""));

    let decoded = decode(&encoded, HistoryFormat::Json).expect("decode");
    assert_eq!(decoded, exchanges);
}

#[test]
fn text_parser_skips_short_units_and_tolerates_missing_prefixes() {
    let content = "[2024-03-05 09:15:00]\nonly two lines\n---\n\
                   [2024-03-05 10:00:00]\nNo prefix here\nnot an answer\nA: first\nsecond\n---\n\n";

    let decoded = decode(content, HistoryFormat::Text).expect("decode");

    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].timestamp, at(10, 0));
    assert_eq!(decoded[0].question, "No prefix here");
    assert_eq!(decoded[0].answer, "first\nsecond");
}

#[test]
fn blank_content_is_empty_history() {
    for format in [HistoryFormat::Json, HistoryFormat::Text] {
        assert!(decode("  \n\n", format).expect("decode").is_empty());
    }
}

#[test]
fn corrupt_json_is_an_error() {
    assert!(decode("[{\"question\": 1}]", HistoryFormat::Json).is_err());
}

#[test]
fn text_entry_with_bad_timestamp_is_skipped_alone() {
    let content = "[2024-03-05 09:15:00]\nQ: When do you open?\nA: At nine.\n\n---\n\n\
                   [yesterday]\nQ: a\nA: b\n\n---\n\n\
                   [2024-03-05 09:16:00]\nQ: And on weekends?\nA: Ten to four.\n\n---\n\n";

    let decoded = decode(content, HistoryFormat::Text).expect("decode");

    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].question, "When do you open?");
    assert_eq!(decoded[1].timestamp, at(9, 16));
    assert_eq!(decoded[1].answer, "Ten to four.");
}
