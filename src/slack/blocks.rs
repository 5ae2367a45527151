//! Slack Block Kit message builders for questions and announcements.

use slack_morphism::prelude::{
    SlackActionBlockElement, SlackActionsBlock, SlackBlock, SlackBlockButtonElement, SlackBlockId,
    SlackBlockPlainTextOnly, SlackBlockText, SlackSectionBlock,
};

use crate::transport::{Button, ANSWER_ACTION_ID};

/// Build a plain text section block.
#[must_use]
pub fn text_section(text: &str) -> SlackBlock {
    SlackBlock::Section(SlackSectionBlock::new().with_text(SlackBlockText::MarkDown(text.into())))
}

/// Build an actions block with the given `(action_id, label, value)` buttons.
#[must_use]
pub fn action_buttons(block_id: &str, buttons: &[(String, String, String)]) -> SlackBlock {
    let elements: Vec<SlackActionBlockElement> = buttons
        .iter()
        .map(|(action_id, text, value)| {
            SlackActionBlockElement::Button(
                SlackBlockButtonElement::new(SlackBlockPlainTextOnly::from(text.as_str()))
                    .with_action_id(action_id.clone().into())
                    .with_value(value.clone()),
            )
        })
        .collect();
    SlackBlock::Actions(
        SlackActionsBlock::new(elements).with_block_id(SlackBlockId(block_id.into())),
    )
}

/// Action id of the answer button at `index`.
///
/// Slack requires action ids to be unique within a block, so each
/// button carries its position as a suffix.
#[must_use]
pub fn answer_action_id(index: usize) -> String {
    format!("{ANSWER_ACTION_ID}_{index}")
}

/// Whether `action_id` was produced by [`answer_action_id`].
#[must_use]
pub fn is_answer_action(action_id: &str) -> bool {
    action_id
        .strip_prefix(ANSWER_ACTION_ID)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('_'))
}

/// Message body for a question: the text followed by one button per
/// option. A message without buttons is a plain notification.
#[must_use]
pub fn question_blocks(text: &str, buttons: &[Button]) -> Vec<SlackBlock> {
    let mut blocks = vec![text_section(text)];
    if !buttons.is_empty() {
        let elements: Vec<(String, String, String)> = buttons
            .iter()
            .enumerate()
            .map(|(index, button)| {
                (
                    answer_action_id(index),
                    button.label.clone(),
                    button.value.clone(),
                )
            })
            .collect();
        blocks.push(action_buttons(ANSWER_ACTION_ID, &elements));
    }
    blocks
}

/// Copy of `blocks` with every actions block removed.
#[must_use]
pub fn without_actions(blocks: Vec<SlackBlock>) -> Vec<SlackBlock> {
    blocks
        .into_iter()
        .filter(|block| !matches!(block, SlackBlock::Actions(_)))
        .collect()
}
