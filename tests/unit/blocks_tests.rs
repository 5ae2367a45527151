use question_relay::slack::blocks;
use question_relay::transport::Button;
use slack_morphism::prelude::SlackBlock;

fn buttons() -> Vec<Button> {
    vec![
        Button {
            label: "Yes".into(),
            value: r#"{"i":"abc","d":"y"}"#.into(),
        },
        Button {
            label: "No".into(),
            value: r#"{"i":"abc","d":"n"}"#.into(),
        },
    ]
}

#[test]
fn notification_has_no_actions() {
    let blocks = blocks::question_blocks("hello", &[]);
    assert_eq!(blocks.len(), 1);
    assert!(matches!(blocks[0], SlackBlock::Section(_)));
}

#[test]
fn question_carries_one_button_per_option() {
    let blocks = blocks::question_blocks("Proceed?", &buttons());
    assert_eq!(blocks.len(), 2);
    assert!(matches!(blocks[1], SlackBlock::Actions(_)));

    let json = serde_json::to_string(&blocks).expect("serialise blocks");
    assert!(json.contains("question_answer_0"), "{json}");
    assert!(json.contains("question_answer_1"), "{json}");
    assert!(json.contains("Proceed?"));
    assert!(json.contains("Yes") && json.contains("No"));
}

#[test]
fn without_actions_strips_buttons_only() {
    let blocks = blocks::without_actions(blocks::question_blocks("Proceed?", &buttons()));
    assert_eq!(blocks.len(), 1);
    assert!(matches!(blocks[0], SlackBlock::Section(_)));
}

#[test]
fn answer_action_ids_are_recognised() {
    assert!(blocks::is_answer_action(&blocks::answer_action_id(3)));
    assert!(blocks::is_answer_action("question_answer"));
    assert!(!blocks::is_answer_action("question_answered"));
    assert!(!blocks::is_answer_action("approve_accept"));
}
