//! Answer validation and first-valid-answer-wins commit.

use std::sync::Arc;

use futures_util::StreamExt;
use question_relay::question::{QuestionService, QuestionSettings};
use question_relay::store::memory::MemoryStore;
use question_relay::store::{EphemeralStore, Wakeup};
use question_relay::AppError;
use tokio_util::sync::CancellationToken;

use super::scripted_store::ScriptedStore;

async fn closed_question(questions: &QuestionService) -> String {
    let tx = questions
        .begin("tokenA", CancellationToken::new())
        .await
        .expect("begin");
    tx.add_option("yes", "Yes please");
    tx.add_option("no", "");
    tx.close().await.expect("close");
    tx.random_id().to_owned()
}

fn service() -> (Arc<MemoryStore>, QuestionService) {
    let store = Arc::new(MemoryStore::new());
    let questions = QuestionService::new(
        Arc::clone(&store) as Arc<dyn EphemeralStore>,
        QuestionSettings::default(),
    );
    (store, questions)
}

#[tokio::test]
async fn valid_answer_is_committed_and_readable() {
    let (_, questions) = service();
    let id = closed_question(&questions).await;

    let record = questions.answer(&id, "U555", "yes").await.expect("answer");
    let answer = record.answer.as_ref().expect("answer set");
    assert_eq!(answer.answerer_id, "U555");
    assert_eq!(answer.answer_data, "yes");
    assert_eq!(record.answer_label(), Some("Yes please"));

    let reread = questions.read(&id).await.expect("read");
    assert!(reread.is_answered());
    assert_eq!(reread, record);
}

#[tokio::test]
async fn answer_outside_options_is_rejected() {
    let (_, questions) = service();
    let id = closed_question(&questions).await;

    let err = questions
        .answer(&id, "U555", "maybe")
        .await
        .expect_err("not an option");
    assert!(matches!(err, AppError::InvalidAnswer(_)), "got {err:?}");

    let record = questions.read(&id).await.expect("read");
    assert!(record.answer.is_none());
}

#[tokio::test]
async fn answer_on_unready_question_is_rejected() {
    let (_, questions) = service();
    let tx = questions
        .begin("tokenA", CancellationToken::new())
        .await
        .expect("begin");
    tx.add_option("yes", "");

    let err = questions
        .answer(tx.random_id(), "U555", "yes")
        .await
        .expect_err("not ready");
    assert!(matches!(err, AppError::NotReady(_)), "got {err:?}");
}

#[tokio::test]
async fn second_answer_is_rejected_and_first_is_kept() {
    let (_, questions) = service();
    let id = closed_question(&questions).await;

    questions.answer(&id, "U555", "yes").await.expect("first");
    let err = questions
        .answer(&id, "U999", "no")
        .await
        .expect_err("second answer");
    assert!(matches!(err, AppError::AlreadyAnswered(_)), "got {err:?}");

    let record = questions.read(&id).await.expect("read");
    let answer = record.answer.expect("answer kept");
    assert_eq!(answer.answerer_id, "U555");
    assert_eq!(answer.answer_data, "yes");
}

#[tokio::test]
async fn concurrent_answers_have_exactly_one_winner() {
    let (_, questions) = service();
    let id = closed_question(&questions).await;

    let mut tasks = Vec::new();
    for n in 0..8 {
        let questions = questions.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            let data = if n % 2 == 0 { "yes" } else { "no" };
            questions.answer(&id, &format!("U{n}"), data).await
        }));
    }

    let mut winners = 0;
    for task in tasks {
        match task.await.expect("task") {
            Ok(_) => winners += 1,
            Err(AppError::AlreadyAnswered(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn answer_on_unknown_question_is_not_found() {
    let (_, questions) = service();
    let err = questions
        .answer("does-not-exist", "U1", "yes")
        .await
        .expect_err("unknown");
    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn successful_answer_publishes_the_id() {
    let (store, questions) = service();
    let id = closed_question(&questions).await;
    let mut wakeups = store
        .subscribe(&questions.settings().answer_channel)
        .await
        .expect("subscribe");

    questions.answer(&id, "U1", "no").await.expect("answer");

    let wakeup = tokio::time::timeout(std::time::Duration::from_secs(1), wakeups.next())
        .await
        .expect("published in time");
    assert_eq!(wakeup, Some(Wakeup::Topic(id)));
}

#[tokio::test]
async fn rejected_answer_publishes_nothing() {
    let (store, questions) = service();
    let id = closed_question(&questions).await;
    let mut wakeups = store
        .subscribe(&questions.settings().answer_channel)
        .await
        .expect("subscribe");

    let _ = questions.answer(&id, "U1", "maybe").await;

    let next = tokio::time::timeout(std::time::Duration::from_millis(100), wakeups.next()).await;
    assert!(next.is_err(), "no wakeup expected, got {next:?}");
}

#[tokio::test]
async fn repeated_lost_races_still_commit() {
    let store = Arc::new(ScriptedStore::new());
    let questions = QuestionService::new(
        Arc::clone(&store) as Arc<dyn EphemeralStore>,
        QuestionSettings::default(),
    );
    let id = closed_question(&questions).await;
    store.push_lost_races(10);

    let record = questions.answer(&id, "U1", "yes").await.expect("answer");

    assert_eq!(record.answer.expect("answer").answerer_id, "U1");
    assert_eq!(store.cas_calls(), 11);
}
