//! Table definitions
//!
//! All statements are idempotent and run on every startup.
//!
//! The two partial unique indexes on `jobs` carry the at-most-one-active-job
//! rule: an insert of a second `queued`/`running` job for the same track (or
//! the same project, for project-level jobs) fails inside the enqueue
//! transaction instead of relying on a read-then-write check.

/// Projects own tracks and project-level jobs
pub const CREATE_PROJECTS: &str = r#"
    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
"#;

pub const CREATE_TRACKS: &str = r#"
    CREATE TABLE IF NOT EXISTS tracks (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        filename TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        duration REAL,
        mime_type TEXT NOT NULL,
        audio_url TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'uploaded'
            CHECK (status IN ('uploaded', 'analyzing', 'analyzed', 'reviewing', 'reviewed', 'error')),
        version_number INTEGER NOT NULL DEFAULT 1,
        parent_track_id TEXT REFERENCES tracks(id) ON DELETE SET NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

pub const CREATE_JOBS: &str = r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        track_id TEXT REFERENCES tracks(id) ON DELETE CASCADE,
        job_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'queued'
            CHECK (status IN ('queued', 'running', 'complete', 'error')),
        progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
        progress_message TEXT NOT NULL DEFAULT '',
        error_message TEXT,
        options TEXT NOT NULL DEFAULT '{}',
        resume_status TEXT,
        retried_from TEXT REFERENCES jobs(id) ON DELETE SET NULL,
        created_at TEXT NOT NULL,
        started_at TEXT,
        finished_at TEXT
    )
"#;

pub const CREATE_TRACK_ANALYSES: &str = r#"
    CREATE TABLE IF NOT EXISTS track_analyses (
        id TEXT PRIMARY KEY,
        track_id TEXT NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
        job_id TEXT,
        features TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
"#;

pub const CREATE_REVIEWS: &str = r#"
    CREATE TABLE IF NOT EXISTS reviews (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        track_id TEXT REFERENCES tracks(id) ON DELETE CASCADE,
        job_id TEXT,
        review_type TEXT NOT NULL CHECK (review_type IN ('track', 'album', 'comparison')),
        compared_track_id TEXT REFERENCES tracks(id) ON DELETE SET NULL,
        scores TEXT NOT NULL,
        review_markdown TEXT NOT NULL,
        quick_take TEXT NOT NULL DEFAULT '',
        review_version INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )
"#;

pub const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_tracks_project ON tracks(project_id, created_at)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_one_active_per_track ON jobs(track_id) \
     WHERE track_id IS NOT NULL AND status IN ('queued', 'running')",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_one_active_per_project ON jobs(project_id) \
     WHERE track_id IS NULL AND status IN ('queued', 'running')",
    "CREATE INDEX IF NOT EXISTS idx_jobs_project ON jobs(project_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_track ON jobs(track_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)",
    "CREATE INDEX IF NOT EXISTS idx_analyses_track ON track_analyses(track_id, created_at)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_reviews_track_version \
     ON reviews(track_id, review_type, review_version) WHERE track_id IS NOT NULL",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_reviews_project_version \
     ON reviews(project_id, review_type, review_version) WHERE track_id IS NULL",
];

/// Tables in creation order (parents before children)
pub const TABLES: &[&str] = &[
    CREATE_PROJECTS,
    CREATE_TRACKS,
    CREATE_JOBS,
    CREATE_TRACK_ANALYSES,
    CREATE_REVIEWS,
];
