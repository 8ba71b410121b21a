#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Output cleaning: chrome removal, echo removal, prompt boundaries and
//! idempotency.

use parley_agent::cleaner::OutputCleaner;
use parley_core::{CleanerConfig, ParticipantConfig};

fn cleaner() -> OutputCleaner {
    let mut participant = ParticipantConfig::new("parley:0.0");
    participant.ready_indicators = vec!["> ".to_string()];
    participant.loading_indicators = vec!["esc to interrupt".to_string()];
    OutputCleaner::for_participant(&CleanerConfig::default(), &participant)
}

#[test]
fn trailing_prompt_is_cut() {
    let out = cleaner().clean("Answer: 42\n> next prompt\n", None, true);
    assert_eq!(out, "Answer: 42");
}

#[test]
fn trailing_prompt_is_kept_when_not_requested() {
    let out = cleaner().clean("Answer: 42\n> next prompt\n", None, false);
    assert_eq!(out, "Answer: 42\n> next prompt");
}

#[test]
fn no_boundary_means_no_cut() {
    let out = cleaner().clean("first\nsecond\n", None, true);
    assert_eq!(out, "first\nsecond");
}

#[test]
fn indentation_survives() {
    let raw = "Here is the function:\n\ndef f(x):\n    return x\n\n>\n";
    let out = cleaner().clean(raw, None, true);
    assert_eq!(out, "Here is the function:\n\ndef f(x):\n    return x");
}

#[test]
fn chrome_lines_are_removed() {
    let raw = [
        "✻ Pondering… (esc to interrupt)",
        "⏺ The answer is 42.",
        "  It follows from the premises.",
        "⠙ ",
        "╭────────────────╮",
        "╰────────────────╯",
        ">",
    ]
    .join("\n");
    let out = cleaner().clean(&raw, None, true);
    assert_eq!(out, "The answer is 42.\n  It follows from the premises.");
}

#[test]
fn echoed_input_is_removed_only_at_the_top() {
    let input = "compare the two plans\nbe brief";
    let raw = "> compare the two plans\nbe brief\n\nPlan A is cheaper.\nbe brief\n>";
    let out = cleaner().clean(raw, Some(input), true);
    assert_eq!(out, "Plan A is cheaper.\nbe brief");
}

#[test]
fn long_blank_runs_collapse_but_short_ones_stay() {
    let raw = "a\n\n\n\n\nb\n\nc\n\n\nd";
    let out = cleaner().clean(raw, None, false);
    assert_eq!(out, "a\n\nb\n\nc\n\n\nd");
}

#[test]
fn indicator_inside_the_body_is_not_a_boundary() {
    let raw = "Consider this quote:\n> to be or not to be\nIt is famous.\n> ";
    let out = cleaner().clean(raw, None, true);
    assert_eq!(out, "Consider this quote:\n> to be or not to be\nIt is famous.");
}

#[test]
fn quote_ending_a_response_reads_as_a_prompt() {
    // Known false positive: a trailing quoted line has the prompt signature.
    let raw = "He said:\n> see you tomorrow\n\n> ";
    let out = cleaner().clean(raw, None, true);
    assert_eq!(out, "He said:");
}

#[test]
fn cleaning_is_idempotent() {
    let samples = [
        "Answer: 42\n> next prompt\n",
        "⏺ ⏺\n\n\n\n  indented\n\n\n\n>",
        "> hi\nhi\n\n\nhello\n>\n\n> ",
        "✻ Thinking\n⏺ ● nested marker\n│ box │\n──────\n",
        "\n\n   \n",
        "text with trailing spaces   \n\n\n\n\nmore\t\n>",
        "> \n> \n",
    ];
    let c = cleaner();
    for raw in samples {
        for input in [None, Some("hi")] {
            for strip in [true, false] {
                let once = c.clean(raw, input, strip);
                let twice = c.clean(&once, input, strip);
                assert_eq!(twice, once, "not idempotent for {raw:?}");
            }
        }
    }
}

#[test]
fn unclassifiable_text_passes_through_trimmed() {
    let raw = "\n\n  plain output  \nsecond line\n\n";
    assert_eq!(cleaner().clean(raw, None, true), "  plain output\nsecond line");
}
