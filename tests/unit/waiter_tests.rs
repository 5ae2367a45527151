//! Long-poll wait outcomes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use question_relay::models::question::QuestionAnswer;
use question_relay::question::{codec, QuestionService, QuestionSettings, WaitOutcome};
use question_relay::store::memory::MemoryStore;
use question_relay::store::EphemeralStore;
use question_relay::AppError;
use tokio_util::sync::CancellationToken;

fn service() -> QuestionService {
    service_with_store().1
}

fn service_with_store() -> (Arc<MemoryStore>, QuestionService) {
    let store = Arc::new(MemoryStore::new());
    let questions = QuestionService::new(
        Arc::clone(&store) as Arc<dyn EphemeralStore>,
        QuestionSettings::default(),
    );
    (store, questions)
}

fn spawn_waiter(
    questions: &QuestionService,
    id: &str,
    timeout: Duration,
) -> tokio::task::JoinHandle<question_relay::Result<WaitOutcome>> {
    let questions = questions.clone();
    let id = id.to_owned();
    tokio::spawn(async move {
        questions
            .wait_for_answer(&id, timeout, CancellationToken::new())
            .await
    })
}

async fn closed_question(questions: &QuestionService) -> String {
    let tx = questions
        .begin("tokenA", CancellationToken::new())
        .await
        .expect("begin");
    tx.add_option("yes", "");
    tx.add_option("no", "");
    tx.close().await.expect("close");
    tx.random_id().to_owned()
}

#[tokio::test]
async fn waiter_started_before_answer_observes_it() {
    let questions = service();
    let id = closed_question(&questions).await;

    let waiter = {
        let questions = questions.clone();
        let id = id.clone();
        tokio::spawn(async move {
            questions
                .wait_for_answer(&id, Duration::from_secs(5), CancellationToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    questions.answer(&id, "U555", "yes").await.expect("answer");

    let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter finished in time")
        .expect("task")
        .expect("wait");
    let WaitOutcome::Answered(record) = outcome else {
        panic!("expected Answered, got {outcome:?}");
    };
    assert_eq!(record.answer.expect("answer").answerer_id, "U555");
}

#[tokio::test]
async fn waiter_started_after_answer_returns_immediately() {
    let questions = service();
    let id = closed_question(&questions).await;
    questions.answer(&id, "U1", "no").await.expect("answer");

    let started = Instant::now();
    let outcome = questions
        .wait_for_answer(&id, Duration::from_secs(5), CancellationToken::new())
        .await
        .expect("wait");
    assert!(matches!(outcome, WaitOutcome::Answered(_)));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn unanswered_question_times_out_no_earlier_than_timeout() {
    let questions = service();
    let id = closed_question(&questions).await;

    let timeout = Duration::from_millis(150);
    let started = Instant::now();
    let outcome = questions
        .wait_for_answer(&id, timeout, CancellationToken::new())
        .await
        .expect("wait");
    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert!(started.elapsed() >= timeout);
}

#[tokio::test]
async fn cancellation_is_distinct_from_timeout() {
    let questions = service();
    let id = closed_question(&questions).await;
    let cancel = CancellationToken::new();

    let waiter = {
        let questions = questions.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            questions
                .wait_for_answer(&id, Duration::from_secs(30), cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("cancel honoured")
        .expect("task")
        .expect("wait");
    assert_eq!(outcome, WaitOutcome::Cancelled);
}

#[tokio::test]
async fn answers_to_other_questions_do_not_wake_the_waiter() {
    let questions = service();
    let watched = closed_question(&questions).await;
    let other = closed_question(&questions).await;

    let waiter = {
        let questions = questions.clone();
        tokio::spawn(async move {
            questions
                .wait_for_answer(&watched, Duration::from_millis(200), CancellationToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    questions.answer(&other, "U1", "yes").await.expect("answer");

    let outcome = waiter.await.expect("task").expect("wait");
    assert_eq!(outcome, WaitOutcome::TimedOut);
}

#[tokio::test]
async fn waiting_on_unknown_question_is_not_found() {
    let err = service()
        .wait_for_answer("nope", Duration::from_millis(50), CancellationToken::new())
        .await
        .expect_err("unknown");
    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn one_answer_releases_every_waiter() {
    let questions = service();
    let id = closed_question(&questions).await;

    let waiters: Vec<_> = (0..5)
        .map(|_| spawn_waiter(&questions, &id, Duration::from_secs(5)))
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    questions.answer(&id, "U7", "no").await.expect("answer");

    for waiter in waiters {
        let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter finished in time")
            .expect("task")
            .expect("wait");
        let WaitOutcome::Answered(record) = outcome else {
            panic!("expected Answered, got {outcome:?}");
        };
        assert_eq!(record.answer.expect("answer").answer_data, "no");
    }
}

#[tokio::test]
async fn wakeup_without_answer_keeps_waiting() {
    let (store, questions) = service_with_store();
    let id = closed_question(&questions).await;
    let channel = questions.settings().answer_channel.clone();

    let waiter = spawn_waiter(&questions, &id, Duration::from_secs(5));
    tokio::time::sleep(Duration::from_millis(30)).await;

    store.publish(&channel, &id).await.expect("publish");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished(), "waiter returned on an unanswered record");

    questions.answer(&id, "U1", "yes").await.expect("answer");
    let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter finished in time")
        .expect("task")
        .expect("wait");
    assert!(matches!(outcome, WaitOutcome::Answered(_)), "got {outcome:?}");
}

#[tokio::test]
async fn lagged_subscriber_rereads_the_record() {
    let (store, questions) = service_with_store();
    let id = closed_question(&questions).await;
    let settings = questions.settings().clone();

    let waiter = spawn_waiter(&questions, &id, Duration::from_secs(5));
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Commit the answer without its wakeup, then overflow the subscriber's
    // buffer with unrelated ids before it gets to run.
    let mut record = questions.read(&id).await.expect("read");
    record.answer = Some(QuestionAnswer {
        answerer_id: "U9".into(),
        answer_data: "yes".into(),
        answered_at: Utc::now(),
    });
    store
        .set(
            &codec::record_key(&settings.key_prefix, &id),
            codec::encode(&record).expect("encode"),
            settings.answered_ttl,
        )
        .await
        .expect("set");
    for n in 0..1100 {
        store
            .publish(&settings.answer_channel, &format!("other-{n}"))
            .await
            .expect("publish");
    }

    let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter finished in time")
        .expect("task")
        .expect("wait");
    let WaitOutcome::Answered(record) = outcome else {
        panic!("expected Answered, got {outcome:?}");
    };
    assert_eq!(record.answer.expect("answer").answerer_id, "U9");
}
