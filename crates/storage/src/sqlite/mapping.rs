use std::collections::BTreeMap;

use exam_core::model::{
    AnswerId, AnsweredQuestion, AttemptStatus, LicenseType, LicenseTypeId, PersistedAttempt,
    QuestionId, QuestionProgress, TemplateId, TestAttempt, TestAttemptId, TestConfiguration,
    TestKind, UserId,
};
use serde::de::DeserializeOwned;
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn license_type_id_from_i64(v: i64) -> Result<LicenseTypeId, StorageError> {
    Ok(LicenseTypeId::new(i64_to_u64("license_type_id", v)?))
}

pub(crate) fn attempt_id_from_i64(v: i64) -> Result<TestAttemptId, StorageError> {
    Ok(TestAttemptId::new(i64_to_u64("attempt_id", v)?))
}

/// Convert a list of ids to their `SQLite` representation.
pub(crate) fn ids_i64<I: Copy>(
    field: &'static str,
    ids: &[I],
    value: impl Fn(I) -> u64,
) -> Result<Vec<i64>, StorageError> {
    ids.iter().map(|id| id_i64(field, value(*id))).collect()
}

/// `?1, ?2, …` placeholders starting after `offset` bound parameters.
pub(crate) fn placeholders(count: usize, offset: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i + offset))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

fn from_json<T: DeserializeOwned>(field: &'static str, raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("invalid {field} json: {e}")))
}

pub(crate) fn map_attempt_row(row: &sqlx::sqlite::SqliteRow) -> Result<TestAttempt, StorageError> {
    let kind: String = row.try_get("test_type").map_err(ser)?;
    let status: String = row.try_get("status").map_err(ser)?;

    let configuration: TestConfiguration = from_json(
        "configuration",
        &row.try_get::<String, _>("configuration").map_err(ser)?,
    )?;
    let questions: Vec<AnsweredQuestion> =
        from_json("questions", &row.try_get::<String, _>("questions").map_err(ser)?)?;
    let answers_given: BTreeMap<QuestionId, AnswerId> = from_json(
        "answers_given",
        &row.try_get::<String, _>("answers_given").map_err(ser)?,
    )?;
    let skipped_question_ids: Vec<QuestionId> = from_json(
        "skipped_question_ids",
        &row.try_get::<String, _>("skipped_question_ids").map_err(ser)?,
    )?;

    let persisted = PersistedAttempt {
        id: attempt_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        user_id: user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        license_type_id: row
            .try_get::<Option<i64>, _>("license_type_id")
            .map_err(ser)?
            .map(license_type_id_from_i64)
            .transpose()?,
        template_id: row
            .try_get::<Option<i64>, _>("template_id")
            .map_err(ser)?
            .map(|v| i64_to_u64("template_id", v).map(TemplateId::new))
            .transpose()?,
        kind: kind.parse::<TestKind>().map_err(ser)?,
        configuration,
        questions,
        correct_count: u32_from_i64(
            "correct_count",
            row.try_get::<i64, _>("correct_count").map_err(ser)?,
        )?,
        wrong_count: u32_from_i64(
            "wrong_count",
            row.try_get::<i64, _>("wrong_count").map_err(ser)?,
        )?,
        total_questions: u32_from_i64(
            "total_questions",
            row.try_get::<i64, _>("total_questions").map_err(ser)?,
        )?,
        score_percentage: row.try_get("score_percentage").map_err(ser)?,
        status: status.parse::<AttemptStatus>().map_err(ser)?,
        started_at: row.try_get("started_at").map_err(ser)?,
        finished_at: row.try_get("finished_at").map_err(ser)?,
        time_taken_seconds: row.try_get("time_taken_seconds").map_err(ser)?,
        current_question_index: u32_from_i64(
            "current_question_index",
            row.try_get::<i64, _>("current_question_index").map_err(ser)?,
        )?,
        answers_given,
        skipped_question_ids,
        paused_at: row.try_get("paused_at").map_err(ser)?,
        remaining_time_seconds: row.try_get("remaining_time_seconds").map_err(ser)?,
    };

    TestAttempt::from_persisted(persisted).map_err(ser)
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<QuestionProgress, StorageError> {
    Ok(QuestionProgress {
        user_id: user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        question_id: question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
        times_correct: u32_from_i64(
            "times_correct",
            row.try_get::<i64, _>("times_correct").map_err(ser)?,
        )?,
        times_wrong: u32_from_i64(
            "times_wrong",
            row.try_get::<i64, _>("times_wrong").map_err(ser)?,
        )?,
        is_bookmarked: row.try_get("is_bookmarked").map_err(ser)?,
        is_learned: row.try_get("is_learned").map_err(ser)?,
        first_answered_at: row.try_get("first_answered_at").map_err(ser)?,
        last_answered_at: row.try_get("last_answered_at").map_err(ser)?,
    })
}

pub(crate) fn map_license_type_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<LicenseType, StorageError> {
    Ok(LicenseType {
        id: license_type_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        code: row.try_get("code").map_err(ser)?,
        name: row.try_get("name").map_err(ser)?,
        parent_id: row
            .try_get::<Option<i64>, _>("parent_id")
            .map_err(ser)?
            .map(license_type_id_from_i64)
            .transpose()?,
        is_parent: row.try_get("is_parent").map_err(ser)?,
    })
}
