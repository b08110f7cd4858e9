/// Inline SQL migrations for the context-hub schema.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is small and self-contained. Each entry runs once,
/// tracked by version in the `_migrations` table.
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: tenancy tables
    r#"
CREATE TABLE IF NOT EXISTS projects (
    id          UUID PRIMARY KEY,
    name        TEXT NOT NULL DEFAULT '',
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS users (
    id          UUID PRIMARY KEY,
    project_id  UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    identifier  TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (project_id, identifier)
);
"#,
    // Migration 2: sessions
    r#"
CREATE TABLE IF NOT EXISTS sessions (
    id                    UUID PRIMARY KEY,
    project_id            UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    user_id               UUID REFERENCES users(id) ON DELETE CASCADE,
    disable_task_tracking BOOLEAN NOT NULL DEFAULT FALSE,
    configs               JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at            TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at            TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_sessions_project_created
    ON sessions (project_id, created_at, id);

CREATE INDEX IF NOT EXISTS idx_sessions_configs
    ON sessions USING GIN (configs jsonb_path_ops);
"#,
    // Migration 3: tasks, then messages (messages reference tasks)
    r#"
CREATE TABLE IF NOT EXISTS session_tasks (
    id          UUID PRIMARY KEY,
    project_id  UUID NOT NULL,
    session_id  UUID NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    task_order  INTEGER NOT NULL DEFAULT 0,
    data        JSONB NOT NULL DEFAULT '{}'::jsonb,
    status      TEXT NOT NULL DEFAULT '',
    is_planning BOOLEAN NOT NULL DEFAULT FALSE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_session_tasks_session_order
    ON session_tasks (session_id, task_order);

CREATE TABLE IF NOT EXISTS messages (
    id                          UUID PRIMARY KEY,
    session_id                  UUID NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    role                        TEXT NOT NULL DEFAULT '',
    parent_id                   UUID,
    parts_asset_meta            JSONB NOT NULL DEFAULT '{}'::jsonb,
    meta                        JSONB NOT NULL DEFAULT '{}'::jsonb,
    session_task_process_status TEXT NOT NULL DEFAULT 'pending'
        CHECK (session_task_process_status IN ('pending', 'running', 'success', 'failed')),
    task_id                     UUID REFERENCES session_tasks(id) ON DELETE SET NULL,
    created_at                  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_messages_session_created
    ON messages (session_id, created_at, id);
"#,
    // Migration 4: asset records with their reference counters
    r#"
CREATE TABLE IF NOT EXISTS asset_refs (
    project_id UUID NOT NULL,
    sha256     TEXT NOT NULL,
    bucket     TEXT NOT NULL DEFAULT '',
    s3_key     TEXT NOT NULL DEFAULT '',
    etag       TEXT NOT NULL DEFAULT '',
    mime       TEXT NOT NULL DEFAULT '',
    size_bytes BIGINT NOT NULL DEFAULT 0,
    ref_count  BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (project_id, sha256)
);
"#,
];
