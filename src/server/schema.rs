//! SQLite schema for the hunt store.

pub const CURRENT_VERSION: i32 = 2;

pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS races (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    start_location TEXT NOT NULL,
    time_limit_minutes INTEGER NOT NULL DEFAULT 60,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS zones (
    id TEXT PRIMARY KEY,
    race_id TEXT NOT NULL REFERENCES races(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    location TEXT NOT NULL DEFAULT '',
    position INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS questions (
    id TEXT PRIMARY KEY,
    zone_id TEXT NOT NULL REFERENCES zones(id) ON DELETE CASCADE,
    text TEXT NOT NULL,
    answer TEXT NOT NULL,
    points INTEGER NOT NULL DEFAULT 10,
    requires_photo INTEGER NOT NULL DEFAULT 0,
    position INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS teams (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    code TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS team_members (
    id TEXT PRIMARY KEY,
    team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    joined_at TEXT NOT NULL,
    UNIQUE(team_id, name)
);

CREATE TABLE IF NOT EXISTS lobbies (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    code TEXT NOT NULL UNIQUE,
    race_id TEXT REFERENCES races(id) ON DELETE SET NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    hunt_started INTEGER NOT NULL DEFAULT 0,
    start_time TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lobby_teams (
    lobby_id TEXT NOT NULL REFERENCES lobbies(id) ON DELETE CASCADE,
    team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    PRIMARY KEY (lobby_id, team_id)
);

CREATE TABLE IF NOT EXISTS team_race_progress (
    team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    race_id TEXT NOT NULL REFERENCES races(id) ON DELETE CASCADE,
    score INTEGER NOT NULL DEFAULT 0,
    current_question_index INTEGER NOT NULL DEFAULT 0,
    questions_answered INTEGER NOT NULL DEFAULT 0,
    photo_questions_json TEXT NOT NULL DEFAULT '[]',
    last_update TEXT NOT NULL,
    PRIMARY KEY (team_id, race_id)
);

CREATE TABLE IF NOT EXISTS team_answers (
    team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    question_id TEXT NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
    attempts INTEGER NOT NULL DEFAULT 0,
    answered_correctly INTEGER NOT NULL DEFAULT 0,
    points_awarded INTEGER NOT NULL DEFAULT 0,
    photo_uploaded INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (team_id, question_id)
);

CREATE INDEX IF NOT EXISTS idx_zones_race ON zones(race_id, position);
CREATE INDEX IF NOT EXISTS idx_questions_zone ON questions(zone_id, position);
CREATE INDEX IF NOT EXISTS idx_lobby_teams_team ON lobby_teams(team_id);
CREATE INDEX IF NOT EXISTS idx_progress_race ON team_race_progress(race_id);
"#;

/// Version 2: team names are unique on a key folded in Rust, since NOCASE
/// only folds ASCII. `name_key` is backfilled before the index is built.
pub const ADD_TEAM_NAME_KEY: &str = r#"
ALTER TABLE teams ADD COLUMN name_key TEXT NOT NULL DEFAULT '';
"#;

pub const TEAM_NAME_KEY_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_teams_name_key ON teams(name_key);
"#;
