//! Answer button presses from Slack users.

use question_relay::models::question::QuestionOption;
use question_relay::models::user::User;
use question_relay::question::fanout;
use question_relay::slack::events::handle_answer;
use question_relay::transport::AnswerCallback;
use question_relay::AppError;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{recording_state, ALICE, BOB};

async fn ask(
    state: &question_relay::state::AppState,
    messenger: &super::test_helpers::RecordingMessenger,
) -> String {
    fanout::ask(
        &state.questions,
        messenger,
        "1",
        &[ALICE.to_owned(), BOB.to_owned()],
        "Restore which snapshot?",
        &[QuestionOption::new("555", "monday"), QuestionOption::new("999", "")],
        CancellationToken::new(),
    )
    .await
    .expect("ask")
}

fn payload(random_id: &str, data: &str) -> String {
    AnswerCallback {
        random_id: random_id.to_owned(),
        data: data.to_owned(),
    }
    .encode()
    .expect("encode")
}

#[tokio::test]
async fn press_commits_answer_and_announces_it() {
    let (state, messenger) = recording_state().await;
    let id = ask(&state, &messenger).await;

    let record = handle_answer(&state, ALICE, Some("alice"), &payload(&id, "555"))
        .await
        .expect("answer");
    assert_eq!(record.answer.as_ref().expect("answer").answerer_id, ALICE);

    assert_eq!(messenger.removed().len(), 2);
    let replies = messenger.replies();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].1, "Answered by alice:\n\nmonday");

    let user = state.users().get_by_id(ALICE).await.expect("query").expect("user");
    assert_eq!(user.display_name, "alice");
}

#[tokio::test]
async fn unnamed_answerer_is_mentioned() {
    let (state, messenger) = recording_state().await;
    let id = ask(&state, &messenger).await;

    handle_answer(&state, BOB, None, &payload(&id, "999"))
        .await
        .expect("answer");
    assert_eq!(messenger.replies()[0].1, format!("Answered by <@{BOB}>:\n\n999"));
}

#[tokio::test]
async fn second_press_is_already_answered_and_not_announced() {
    let (state, messenger) = recording_state().await;
    let id = ask(&state, &messenger).await;

    handle_answer(&state, ALICE, None, &payload(&id, "555"))
        .await
        .expect("first");
    let err = handle_answer(&state, BOB, None, &payload(&id, "999"))
        .await
        .expect_err("second");
    assert!(matches!(err, AppError::AlreadyAnswered(_)), "got {err:?}");
    assert_eq!(messenger.replies().len(), 2, "only the first answer is announced");
}

#[tokio::test]
async fn unknown_and_inactive_users_cannot_answer() {
    let (state, messenger) = recording_state().await;
    let id = ask(&state, &messenger).await;

    let err = handle_answer(&state, "USTRANGER", None, &payload(&id, "555"))
        .await
        .expect_err("stranger");
    assert!(matches!(err, AppError::Unauthorized(_)), "got {err:?}");

    let mut inactive = User::new(BOB, false);
    inactive.active = false;
    state.users().upsert(&inactive).await.expect("deactivate");
    let err = handle_answer(&state, BOB, None, &payload(&id, "555"))
        .await
        .expect_err("inactive");
    assert!(matches!(err, AppError::Unauthorized(_)), "got {err:?}");

    let record = state.questions.read(&id).await.expect("read");
    assert!(record.answer.is_none());
    assert!(messenger.replies().is_empty());
}

#[tokio::test]
async fn malformed_payload_and_bad_option_are_rejected() {
    let (state, messenger) = recording_state().await;
    let id = ask(&state, &messenger).await;

    let err = handle_answer(&state, ALICE, None, "not json")
        .await
        .expect_err("malformed");
    assert!(matches!(err, AppError::InvalidInput(_)), "got {err:?}");

    let err = handle_answer(&state, ALICE, None, &payload(&id, "777"))
        .await
        .expect_err("bad option");
    assert!(matches!(err, AppError::InvalidAnswer(_)), "got {err:?}");
}
