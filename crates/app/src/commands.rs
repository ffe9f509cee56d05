use anyhow::Context;
use exam_core::model::{
    AnswerId, CategoryId, LicenseType, LicenseTypeId, QuestionId, TemplateId, TestAttemptId,
    TestConfiguration, TestKind, TestTemplate, UserId,
};
use serde_json::{Value, json};
use services::{AppServices, Clock, HistoryFilter, StartTest};
use storage::repository::Storage;

pub async fn dashboard(
    services: &AppServices,
    user: UserId,
    license: Option<LicenseTypeId>,
) -> anyhow::Result<Value> {
    let dashboard = services.dashboard().load(user, license).await?;
    Ok(serde_json::to_value(dashboard)?)
}

pub async fn history(
    services: &AppServices,
    user: UserId,
    filter: HistoryFilter,
    page: u32,
) -> anyhow::Result<Value> {
    let history = services.history();
    let page = history.list(user, filter, page).await?;
    let stats = history.stats(user).await?;
    Ok(json!({ "stats": stats, "page": page }))
}

pub async fn show(
    services: &AppServices,
    user: UserId,
    attempt: TestAttemptId,
) -> anyhow::Result<Value> {
    let detail = services
        .history()
        .detail(user, attempt)
        .await
        .with_context(|| format!("attempt {attempt}"))?;
    Ok(serde_json::to_value(detail)?)
}

pub async fn abandon(
    services: &AppServices,
    user: UserId,
    attempt: TestAttemptId,
) -> anyhow::Result<Value> {
    let abandoned = services
        .test_sessions()
        .abandon(user, attempt)
        .await
        .with_context(|| format!("attempt {attempt}"))?;
    Ok(json!({ "abandoned": abandoned }))
}

// ─── SEED ──────────────────────────────────────────────────────────────────

const SEED_QUESTIONS_B: u64 = 40;
const SEED_QUESTIONS_BE: u64 = 5;
const SEED_QUESTIONS_A: u64 = 15;
const SEED_CATEGORIES: u64 = 4;

fn seed_license_types() -> [LicenseType; 3] {
    let b = LicenseTypeId::new(1);
    [
        LicenseType {
            id: b,
            code: "B".into(),
            name: "Passenger cars".into(),
            parent_id: None,
            is_parent: true,
        },
        LicenseType {
            id: LicenseTypeId::new(2),
            code: "BE".into(),
            name: "Cars with trailer".into(),
            parent_id: Some(b),
            is_parent: false,
        },
        LicenseType {
            id: LicenseTypeId::new(3),
            code: "A".into(),
            name: "Motorcycles".into(),
            parent_id: None,
            is_parent: true,
        },
    ]
}

/// Fill the database with a small question bank and some finished tests.
///
/// The bank is upserted, so running the seed twice keeps one bank but adds
/// a second round of attempts.
pub async fn seed(storage: &Storage, user: UserId, clock: Clock) -> anyhow::Result<Value> {
    let [b, be, a] = seed_license_types();
    for license in [&b, &be, &a] {
        storage
            .license_types
            .upsert_license_type(license)
            .await
            .with_context(|| format!("license type {}", license.code))?;
    }

    let ranges = [
        (b.id, 1..=SEED_QUESTIONS_B),
        (be.id, SEED_QUESTIONS_B + 1..=SEED_QUESTIONS_B + SEED_QUESTIONS_BE),
        (
            a.id,
            SEED_QUESTIONS_B + SEED_QUESTIONS_BE + 1
                ..=SEED_QUESTIONS_B + SEED_QUESTIONS_BE + SEED_QUESTIONS_A,
        ),
    ];
    let mut question_count = 0_u64;
    for (license_id, ids) in ranges {
        for id in ids {
            storage
                .questions
                .upsert_question(
                    QuestionId::new(id),
                    Some(CategoryId::new(1 + id % SEED_CATEGORIES)),
                    true,
                    &[license_id],
                )
                .await?;
            question_count += 1;
        }
    }

    let services = AppServices::from_storage(storage, clock);
    let sessions = services.test_sessions();
    let configuration = TestConfiguration::new(20, 60, 10);

    // Two mistakes are allowed, so only the second test fails.
    let mut finished = Vec::new();
    for wrong in [1_usize, 4, 0] {
        let attempt = sessions
            .start(
                user,
                StartTest {
                    kind: TestKind::Quick,
                    license_type_id: Some(b.id),
                    configuration,
                    question_ids: Vec::new(),
                },
            )
            .await?;
        let questions: Vec<QuestionId> =
            attempt.questions().iter().map(|q| q.question_id).collect();
        for (index, question_id) in questions.into_iter().enumerate() {
            let is_correct = index >= wrong;
            sessions
                .answer(
                    user,
                    attempt.id(),
                    question_id,
                    AnswerId::new(question_id.value() * 10),
                    is_correct,
                )
                .await?;
        }
        let attempt = sessions.finish(user, attempt.id(), Some(300)).await?;
        finished.push(json!({ "id": attempt.id(), "status": attempt.status() }));
    }

    let mut template = TestTemplate::new(
        TemplateId::new(1),
        user,
        "Motorcycle warm-up",
        Some(a.id),
        10,
        45,
        2,
        Vec::new(),
        clock.now(),
    )?;
    template.exclude_question(QuestionId::new(SEED_QUESTIONS_B + SEED_QUESTIONS_BE + 1));
    let open = sessions.start_from_template(user, &template).await?;
    if let Some(first) = open.questions().first() {
        sessions
            .answer(user, open.id(), first.question_id, AnswerId::new(1), true)
            .await?;
    }

    tracing::info!(%user, questions = question_count, "seed complete");
    Ok(json!({
        "user_id": user,
        "license_types": 3,
        "questions": question_count,
        "finished_tests": finished,
        "active_test": open.id(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use exam_core::model::AttemptStatus;
    use exam_core::time::fixed_now;

    #[tokio::test]
    async fn seed_populates_dashboard_and_history() {
        let url = "sqlite:file:memdb_app_seed?mode=memory&cache=shared";
        let storage = Storage::sqlite(url).await.unwrap();
        let clock = Clock::fixed(fixed_now());
        let user = UserId::new(1);

        let report = seed(&storage, user, clock).await.unwrap();
        assert_eq!(report["questions"], json!(60));

        let services = AppServices::from_storage(&storage, clock);
        let dashboard = services.dashboard().load(user, Some(LicenseTypeId::new(1))).await.unwrap();
        assert_eq!(dashboard.stats.total_tests, 3);
        assert_eq!(dashboard.stats.passed, 2);
        assert_eq!(dashboard.stats.failed, 1);
        let active = dashboard.active_test.unwrap();
        assert_eq!(active.test_type, TestKind::Template);
        assert_eq!(active.answered_count, 1);
        assert_eq!(dashboard.pass_chance.unwrap().total_questions, 45);

        let listing = history(&services, user, HistoryFilter::default(), 1).await.unwrap();
        assert_eq!(listing["stats"]["total"], json!(3));

        let abandoned = abandon(&services, user, active.id).await.unwrap();
        assert_eq!(abandoned, json!({ "abandoned": true }));
        let again = abandon(&services, user, active.id).await.unwrap();
        assert_eq!(again, json!({ "abandoned": false }));

        let detail = services.history().detail(user, active.id).await.unwrap();
        assert_eq!(detail.status, AttemptStatus::Abandoned);
    }

    #[tokio::test]
    async fn show_reports_foreign_attempts_as_errors() {
        let services = AppServices::in_memory(Clock::fixed(fixed_now()));
        let err = show(&services, UserId::new(1), TestAttemptId::new(99))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("attempt 99"));
    }
}
