//! v001 -- Initial schema creation.
//!
//! Creates `authorities`, `issues` and `issue_images`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Authorities (role per username, owned by the access collaborator)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS authorities (
    username  TEXT PRIMARY KEY NOT NULL,
    authority TEXT NOT NULL                   -- ROLE_RESIDENT / ROLE_HOST
);

-- ----------------------------------------------------------------
-- Issues
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS issues (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    content     TEXT NOT NULL CHECK (length(trim(content)) > 0),
    report_date TEXT NOT NULL,                -- YYYY-MM-DD
    confirmed   INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    closed_date TEXT,                         -- YYYY-MM-DD, set iff closed
    reporter    TEXT NOT NULL,                -- username

    CHECK (closed_date IS NULL OR confirmed = 1)
);

CREATE INDEX IF NOT EXISTS idx_issues_reporter
    ON issues(reporter, confirmed, report_date);

CREATE INDEX IF NOT EXISTS idx_issues_closed_date
    ON issues(closed_date DESC);

-- ----------------------------------------------------------------
-- Issue images (media references returned by the uploader)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS issue_images (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id  INTEGER NOT NULL,               -- FK -> issues(id)
    position  INTEGER NOT NULL,
    media_ref TEXT NOT NULL,

    FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_issue_images_issue
    ON issue_images(issue_id, position);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
