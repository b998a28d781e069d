//! Database schema constants.
//!
//! Catalog tables (`courses`, `content_items`, `learning_plans`, `tests`,
//! `questions`, `user_groups`) are written by the authoring flow; the engine only
//! reads them. Progress, attempt, completion, enrollment and prerequisite
//! tables are owned here.
//!
//! Completion and enrollment uniqueness relies on partial unique indexes
//! because SQLite treats NULLs as distinct inside plain UNIQUE constraints.

pub const CREATE_COURSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS courses (
    id                  TEXT PRIMARY KEY,
    title               TEXT NOT NULL DEFAULT '',
    sequential_required INTEGER NOT NULL DEFAULT 0,
    allow_skipping      INTEGER NOT NULL DEFAULT 0,
    certificate_enabled INTEGER NOT NULL DEFAULT 0,
    badge_enabled       INTEGER NOT NULL DEFAULT 0
)
"#;

pub const CREATE_CONTENT_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS content_items (
    id                   TEXT PRIMARY KEY,
    course_id            TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    title                TEXT NOT NULL DEFAULT '',
    content_type         TEXT NOT NULL,
    item_order           INTEGER NOT NULL,
    required             INTEGER NOT NULL DEFAULT 1,
    completion_threshold REAL NOT NULL DEFAULT 0.8
)
"#;

pub const CREATE_LEARNING_PLANS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS learning_plans (
    id                  TEXT PRIMARY KEY,
    title               TEXT NOT NULL DEFAULT '',
    certificate_enabled INTEGER NOT NULL DEFAULT 0,
    badge_enabled       INTEGER NOT NULL DEFAULT 0
)
"#;

pub const CREATE_LEARNING_PLAN_COURSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS learning_plan_courses (
    learning_plan_id TEXT NOT NULL REFERENCES learning_plans(id) ON DELETE CASCADE,
    course_id        TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    position         INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (learning_plan_id, course_id)
)
"#;

pub const CREATE_TESTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tests (
    id                   TEXT PRIMARY KEY,
    content_item_id      TEXT NOT NULL UNIQUE REFERENCES content_items(id) ON DELETE CASCADE,
    passing_score        REAL NOT NULL,
    max_attempts         INTEGER,
    time_limit           INTEGER,
    show_correct_answers INTEGER NOT NULL DEFAULT 0
)
"#;

pub const CREATE_QUESTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS questions (
    id                 TEXT PRIMARY KEY,
    test_id            TEXT NOT NULL REFERENCES tests(id) ON DELETE CASCADE,
    question_type      TEXT NOT NULL,
    prompt             TEXT NOT NULL DEFAULT '',
    points             INTEGER NOT NULL CHECK (points > 0),
    position           INTEGER NOT NULL DEFAULT 0,
    options            TEXT NOT NULL DEFAULT '[]',
    correct_boolean    INTEGER,
    acceptable_answers TEXT NOT NULL DEFAULT '[]'
)
"#;

pub const CREATE_GROUPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS user_groups (
    id        TEXT PRIMARY KEY,
    name      TEXT NOT NULL,
    is_public INTEGER NOT NULL DEFAULT 0
)
"#;

pub const CREATE_GROUP_MEMBERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS group_members (
    group_id TEXT NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
    user_id  TEXT NOT NULL,
    PRIMARY KEY (group_id, user_id)
)
"#;

pub const CREATE_COURSE_GROUP_ACCESS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS course_group_access (
    course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    group_id  TEXT NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
    PRIMARY KEY (course_id, group_id)
)
"#;

pub const CREATE_VIDEO_PROGRESS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS video_progress (
    user_id         TEXT NOT NULL,
    content_item_id TEXT NOT NULL,
    watch_time      REAL NOT NULL,
    total_duration  REAL NOT NULL,
    last_position   REAL NOT NULL,
    times_watched   INTEGER NOT NULL DEFAULT 0,
    completed       INTEGER NOT NULL DEFAULT 0,
    completed_at    TEXT,
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (user_id, content_item_id)
)
"#;

pub const CREATE_CONTENT_PROGRESS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS content_progress (
    user_id         TEXT NOT NULL,
    content_item_id TEXT NOT NULL,
    progress        REAL NOT NULL,
    pages_viewed    INTEGER,
    last_page       INTEGER,
    total_pages     INTEGER,
    completed       INTEGER NOT NULL DEFAULT 0,
    completed_at    TEXT,
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (user_id, content_item_id)
)
"#;

pub const CREATE_TEST_ATTEMPTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS test_attempts (
    id             TEXT PRIMARY KEY,
    test_id        TEXT NOT NULL,
    user_id        TEXT NOT NULL,
    attempt_number INTEGER NOT NULL,
    score          REAL NOT NULL,
    points_earned  INTEGER NOT NULL,
    total_points   INTEGER NOT NULL,
    passed         INTEGER NOT NULL,
    time_spent     INTEGER NOT NULL DEFAULT 0,
    submitted_at   TEXT NOT NULL,
    UNIQUE (test_id, user_id, attempt_number)
)
"#;

pub const CREATE_TEST_ANSWERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS test_answers (
    attempt_id       TEXT NOT NULL REFERENCES test_attempts(id) ON DELETE CASCADE,
    question_id      TEXT NOT NULL,
    answer_text      TEXT,
    selected_options TEXT,
    is_correct       INTEGER NOT NULL,
    points_earned    INTEGER NOT NULL,
    PRIMARY KEY (attempt_id, question_id)
)
"#;

pub const CREATE_COMPLETIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS completions (
    id                       TEXT PRIMARY KEY,
    user_id                  TEXT NOT NULL,
    course_id                TEXT,
    content_item_id          TEXT,
    learning_plan_id         TEXT,
    completed_at             TEXT NOT NULL,
    certificate_url          TEXT,
    certificate_generated_at TEXT,
    badge_awarded            INTEGER NOT NULL DEFAULT 0,
    badge_awarded_at         TEXT,
    CHECK (course_id IS NOT NULL OR learning_plan_id IS NOT NULL)
)
"#;

pub const CREATE_ENROLLMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS enrollments (
    id               TEXT PRIMARY KEY,
    user_id          TEXT NOT NULL,
    course_id        TEXT,
    learning_plan_id TEXT,
    status           TEXT NOT NULL,
    enrolled_at      TEXT NOT NULL,
    completed_at     TEXT,
    CHECK ((course_id IS NULL) <> (learning_plan_id IS NULL))
)
"#;

pub const CREATE_PREREQUISITES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS content_item_prerequisites (
    content_item_id TEXT NOT NULL,
    prerequisite_id TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (content_item_id, prerequisite_id),
    CHECK (content_item_id <> prerequisite_id)
)
"#;

/// Monotonic per-course stamp covering everything a course graph is built
/// from. Bumped by triggers, so writers outside this process are seen too.
pub const ADD_COURSE_REVISION: &str = r#"
ALTER TABLE courses ADD COLUMN revision INTEGER NOT NULL DEFAULT 0
"#;

pub const CREATE_COURSE_REVISION_TRIGGERS: &[&str] = &[
    r#"
CREATE TRIGGER IF NOT EXISTS trg_courses_policy_revision
AFTER UPDATE OF sequential_required, allow_skipping ON courses
BEGIN
    UPDATE courses SET revision = revision + 1 WHERE id = NEW.id;
END
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS trg_content_items_insert_revision
AFTER INSERT ON content_items
BEGIN
    UPDATE courses SET revision = revision + 1 WHERE id = NEW.course_id;
END
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS trg_content_items_update_revision
AFTER UPDATE OF course_id, item_order, required ON content_items
BEGIN
    UPDATE courses SET revision = revision + 1 WHERE id IN (OLD.course_id, NEW.course_id);
END
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS trg_content_items_delete_revision
AFTER DELETE ON content_items
BEGIN
    UPDATE courses SET revision = revision + 1 WHERE id = OLD.course_id;
END
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS trg_prerequisites_insert_revision
AFTER INSERT ON content_item_prerequisites
BEGIN
    UPDATE courses SET revision = revision + 1
    WHERE id = (SELECT course_id FROM content_items WHERE id = NEW.content_item_id);
END
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS trg_prerequisites_delete_revision
AFTER DELETE ON content_item_prerequisites
BEGIN
    UPDATE courses SET revision = revision + 1
    WHERE id = (SELECT course_id FROM content_items WHERE id = OLD.content_item_id);
END
"#,
];

pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_content_items_course ON content_items(course_id, item_order);
CREATE INDEX IF NOT EXISTS idx_plan_courses_course ON learning_plan_courses(course_id);
CREATE INDEX IF NOT EXISTS idx_questions_test ON questions(test_id, position);
CREATE INDEX IF NOT EXISTS idx_group_members_user ON group_members(user_id);
CREATE INDEX IF NOT EXISTS idx_attempts_user_test ON test_attempts(user_id, test_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_completions_content
    ON completions(user_id, course_id, content_item_id)
    WHERE content_item_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS ux_completions_course
    ON completions(user_id, course_id)
    WHERE content_item_id IS NULL AND course_id IS NOT NULL AND learning_plan_id IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS ux_completions_plan
    ON completions(user_id, learning_plan_id)
    WHERE learning_plan_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS ux_enrollments_course
    ON enrollments(user_id, course_id)
    WHERE course_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS ux_enrollments_plan
    ON enrollments(user_id, learning_plan_id)
    WHERE learning_plan_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_prerequisites_target ON content_item_prerequisites(prerequisite_id);
"#;

/// A named group of statements applied in one transaction.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

/// Migrations in application order. Names are recorded once applied, so
/// existing entries must never be renamed or reordered.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_catalog",
        statements: &[
            CREATE_COURSES_TABLE,
            CREATE_CONTENT_ITEMS_TABLE,
            CREATE_LEARNING_PLANS_TABLE,
            CREATE_LEARNING_PLAN_COURSES_TABLE,
            CREATE_TESTS_TABLE,
            CREATE_QUESTIONS_TABLE,
            CREATE_GROUPS_TABLE,
            CREATE_GROUP_MEMBERS_TABLE,
            CREATE_COURSE_GROUP_ACCESS_TABLE,
        ],
    },
    Migration {
        name: "0002_progress",
        statements: &[CREATE_VIDEO_PROGRESS_TABLE, CREATE_CONTENT_PROGRESS_TABLE],
    },
    Migration {
        name: "0003_attempts",
        statements: &[CREATE_TEST_ATTEMPTS_TABLE, CREATE_TEST_ANSWERS_TABLE],
    },
    Migration {
        name: "0004_completions",
        statements: &[
            CREATE_COMPLETIONS_TABLE,
            CREATE_ENROLLMENTS_TABLE,
            CREATE_PREREQUISITES_TABLE,
        ],
    },
    Migration {
        name: "0005_indexes",
        statements: &[CREATE_INDEXES],
    },
    Migration {
        name: "0006_course_revision",
        statements: &[ADD_COURSE_REVISION],
    },
    Migration {
        name: "0007_course_revision_triggers",
        statements: CREATE_COURSE_REVISION_TRIGGERS,
    },
];

/// Every schema statement in dependency order.
pub fn all_schema_statements() -> Vec<&'static str> {
    MIGRATIONS
        .iter()
        .flat_map(|m| m.statements.iter().copied())
        .collect()
}

/// Tables in reverse creation order.
pub const ALL_TABLES: &[&str] = &[
    "content_item_prerequisites",
    "enrollments",
    "completions",
    "test_answers",
    "test_attempts",
    "content_progress",
    "video_progress",
    "course_group_access",
    "group_members",
    "user_groups",
    "questions",
    "tests",
    "learning_plan_courses",
    "learning_plans",
    "content_items",
    "courses",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_idempotent() {
        for statement in all_schema_statements() {
            if statement.trim_start().starts_with("ALTER TABLE") {
                continue;
            }
            assert!(statement.contains("IF NOT EXISTS"));
        }
    }

    #[test]
    fn test_migration_names_are_unique_and_ordered() {
        let names: Vec<&str> = MIGRATIONS.iter().map(|m| m.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_every_table_is_listed() {
        let statements = all_schema_statements().join("\n");
        for table in ALL_TABLES {
            assert!(
                statements.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table)),
                "missing table {}",
                table
            );
        }
    }
}
