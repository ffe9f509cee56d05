use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates license types, the question bank links, test attempts, per-question
/// progress, user statistics and their indexes.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS license_types (
                    id INTEGER PRIMARY KEY,
                    code TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    parent_id INTEGER,
                    is_parent INTEGER NOT NULL DEFAULT 0 CHECK (is_parent IN (0, 1)),
                    FOREIGN KEY (parent_id) REFERENCES license_types(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY,
                    category_id INTEGER,
                    is_active INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1))
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS question_license_type (
                    question_id INTEGER NOT NULL,
                    license_type_id INTEGER NOT NULL,
                    PRIMARY KEY (question_id, license_type_id),
                    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE,
                    FOREIGN KEY (license_type_id) REFERENCES license_types(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS test_attempts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    license_type_id INTEGER,
                    template_id INTEGER,
                    test_type TEXT NOT NULL CHECK (
                        test_type IN ('quick', 'thematic', 'custom', 'template', 'bookmarked')
                    ),
                    configuration TEXT NOT NULL DEFAULT '{}',
                    questions TEXT NOT NULL DEFAULT '[]',
                    correct_count INTEGER NOT NULL DEFAULT 0 CHECK (correct_count >= 0),
                    wrong_count INTEGER NOT NULL DEFAULT 0 CHECK (wrong_count >= 0),
                    total_questions INTEGER NOT NULL CHECK (total_questions >= 0),
                    score_percentage REAL NOT NULL DEFAULT 0,
                    status TEXT NOT NULL CHECK (
                        status IN ('in_progress', 'paused', 'completed', 'passed', 'failed', 'abandoned')
                    ),
                    started_at TEXT NOT NULL,
                    finished_at TEXT,
                    time_taken_seconds INTEGER,
                    current_question_index INTEGER NOT NULL DEFAULT 0 CHECK (current_question_index >= 0),
                    answers_given TEXT NOT NULL DEFAULT '{}',
                    skipped_question_ids TEXT NOT NULL DEFAULT '[]',
                    paused_at TEXT,
                    remaining_time_seconds INTEGER,
                    FOREIGN KEY (license_type_id) REFERENCES license_types(id) ON DELETE SET NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS question_progress (
                    user_id INTEGER NOT NULL,
                    question_id INTEGER NOT NULL,
                    times_correct INTEGER NOT NULL DEFAULT 0 CHECK (times_correct >= 0),
                    times_wrong INTEGER NOT NULL DEFAULT 0 CHECK (times_wrong >= 0),
                    is_bookmarked INTEGER NOT NULL DEFAULT 0,
                    is_learned INTEGER NOT NULL DEFAULT 0,
                    first_answered_at TEXT,
                    last_answered_at TEXT,
                    PRIMARY KEY (user_id, question_id),
                    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS user_statistics (
                    user_id INTEGER PRIMARY KEY,
                    total_tests_taken INTEGER NOT NULL DEFAULT 0,
                    total_tests_passed INTEGER NOT NULL DEFAULT 0,
                    total_tests_failed INTEGER NOT NULL DEFAULT 0,
                    total_questions_answered INTEGER NOT NULL DEFAULT 0,
                    total_correct_answers INTEGER NOT NULL DEFAULT 0,
                    current_streak_days INTEGER NOT NULL DEFAULT 0,
                    best_streak_days INTEGER NOT NULL DEFAULT 0,
                    last_activity_date TEXT,
                    total_study_time_seconds INTEGER NOT NULL DEFAULT 0
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_test_attempts_user_status_finished
                    ON test_attempts (user_id, status, finished_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_question_license_type_license
                    ON question_license_type (license_type_id, question_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_questions_category
                    ON questions (category_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
