//! SQL migration definitions for the ArticleForge job database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: jobs, sections",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One generation job per brief
CREATE TABLE IF NOT EXISTS jobs (
    id                    TEXT PRIMARY KEY,
    brief_id              TEXT NOT NULL UNIQUE,
    status                TEXT NOT NULL,
    current_pass          INTEGER NOT NULL,
    pass_status_json      TEXT NOT NULL,
    total_sections        INTEGER NOT NULL,
    completed_sections    INTEGER NOT NULL,
    current_section_key   TEXT,
    draft_content         TEXT NOT NULL DEFAULT '',
    final_score           INTEGER,
    violation_report_json TEXT,
    last_error            TEXT,
    retry_count           INTEGER NOT NULL DEFAULT 0,
    created_at            TEXT NOT NULL,
    started_at            TEXT,
    completed_at          TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

-- Sections with per-pass content slots
CREATE TABLE IF NOT EXISTS sections (
    id                   TEXT PRIMARY KEY,
    job_id               TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    section_key          TEXT NOT NULL,
    heading              TEXT NOT NULL,
    sort_order           REAL NOT NULL,
    level                INTEGER NOT NULL,
    contents_json        TEXT NOT NULL,
    per_rule_scores_json TEXT NOT NULL DEFAULT '{}',
    status               TEXT NOT NULL,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL,
    UNIQUE(job_id, section_key)
);

CREATE INDEX IF NOT EXISTS idx_sections_job_id ON sections(job_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Pass output cache",
            sql: r#"
CREATE TABLE IF NOT EXISTS pass_cache (
    job_id     TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    pass       TEXT NOT NULL,
    input_hash TEXT NOT NULL,
    route      TEXT NOT NULL,
    output     TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (job_id, pass, input_hash, route)
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
        Migration {
            version: 3,
            description: "Run leases",
            sql: r#"
-- At most one active run per job across processes
CREATE TABLE IF NOT EXISTS run_leases (
    job_id       TEXT PRIMARY KEY REFERENCES jobs(id) ON DELETE CASCADE,
    owner        TEXT NOT NULL,
    heartbeat_at TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (3);
"#,
        },
    ]
}
