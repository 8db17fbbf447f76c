//! Persistence and lifecycle updates for [`Issue`] records.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use habitat_shared::constants::DATE_FORMAT;
use habitat_shared::{Bucket, IssueId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Issue, IssueImage, NewIssue, TransitionOutcome};

const ISSUE_COLUMNS: &str = "id, content, report_date, confirmed, closed_date, reporter";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert an issue together with all of its images.
    ///
    /// The issue row and every image row are written in one transaction, so
    /// a failure leaves nothing behind.
    pub fn insert_issue(&mut self, new: &NewIssue) -> Result<Issue> {
        let tx = self.conn_mut().transaction()?;

        tx.execute(
            "INSERT INTO issues (content, report_date, confirmed, closed_date, reporter)
             VALUES (?1, ?2, 0, NULL, ?3)",
            params![
                new.content,
                format_date(new.report_date),
                new.reporter,
            ],
        )?;
        let id = IssueId(tx.last_insert_rowid());

        {
            let mut stmt = tx.prepare(
                "INSERT INTO issue_images (issue_id, position, media_ref)
                 VALUES (?1, ?2, ?3)",
            )?;
            for (position, image) in new.images.iter().enumerate() {
                stmt.execute(params![id.0, position as i64, image.media_ref])?;
            }
        }

        tx.commit()?;

        tracing::debug!(issue_id = %id, images = new.images.len(), "inserted issue");

        Ok(Issue {
            id,
            content: new.content.clone(),
            report_date: new.report_date,
            confirmed: false,
            closed_date: None,
            reporter: new.reporter.clone(),
            images: new.images.clone(),
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single issue, or `None` if no such id exists.
    pub fn find_issue(&self, id: IssueId) -> Result<Option<Issue>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1"),
                params![id.0],
                read_issue_row,
            )
            .optional()?;

        match row {
            Some(raw) => {
                let mut issue = raw.into_issue()?;
                issue.images = load_images(self.conn(), issue.id)?;
                Ok(Some(issue))
            }
            None => Ok(None),
        }
    }

    /// Fetch a single issue by id.
    pub fn get_issue(&self, id: IssueId) -> Result<Issue> {
        self.find_issue(id)?.ok_or(StoreError::NotFound)
    }

    /// List the issues of one bucket, already in that bucket's order.
    ///
    /// With `reporter` set only that resident's issues are returned. Ties on
    /// the sort date are broken by ascending id.
    pub fn list_bucket(&self, bucket: Bucket, reporter: Option<&str>) -> Result<Vec<Issue>> {
        let (filter, order) = match bucket {
            Bucket::NotConfirmed => ("confirmed = 0", "report_date ASC, id ASC"),
            Bucket::ConfirmedOpen => (
                "confirmed = 1 AND closed_date IS NULL",
                "report_date ASC, id ASC",
            ),
            Bucket::Closed => ("closed_date IS NOT NULL", "closed_date DESC, id ASC"),
        };

        let raws = match reporter {
            Some(username) => {
                let sql = format!(
                    "SELECT {ISSUE_COLUMNS} FROM issues
                     WHERE reporter = ?1 AND {filter}
                     ORDER BY {order}"
                );
                let mut stmt = self.conn().prepare_cached(&sql)?;
                let rows = stmt.query_map(params![username], read_issue_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let sql = format!(
                    "SELECT {ISSUE_COLUMNS} FROM issues
                     WHERE {filter}
                     ORDER BY {order}"
                );
                let mut stmt = self.conn().prepare_cached(&sql)?;
                let rows = stmt.query_map([], read_issue_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };

        let mut issues = Vec::with_capacity(raws.len());
        for raw in raws {
            let mut issue = raw.into_issue()?;
            issue.images = load_images(self.conn(), issue.id)?;
            issues.push(issue);
        }
        Ok(issues)
    }

    /// Number of stored issues.
    pub fn count_issues(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ------------------------------------------------------------------
    // Lifecycle updates
    // ------------------------------------------------------------------

    /// Mark an issue confirmed.
    ///
    /// The state check and the update run in one `IMMEDIATE` transaction and
    /// the update itself is guarded on `confirmed = 0`, so two racing
    /// confirms cannot both succeed.
    pub fn confirm_issue(&mut self, id: IssueId) -> Result<TransitionOutcome> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some((confirmed, _closed)) = lifecycle_state(&tx, id)? else {
            return Ok(TransitionOutcome::Missing);
        };
        if confirmed {
            return Ok(TransitionOutcome::AlreadyConfirmed);
        }

        let changed = tx.execute(
            "UPDATE issues SET confirmed = 1 WHERE id = ?1 AND confirmed = 0",
            params![id.0],
        )?;
        if changed != 1 {
            return Ok(TransitionOutcome::AlreadyConfirmed);
        }

        tx.commit()?;
        Ok(TransitionOutcome::Applied)
    }

    /// Mark a confirmed issue closed on `closed_on`.
    ///
    /// An already closed issue is reported before an unconfirmed one.
    pub fn close_issue(&mut self, id: IssueId, closed_on: NaiveDate) -> Result<TransitionOutcome> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some((confirmed, closed)) = lifecycle_state(&tx, id)? else {
            return Ok(TransitionOutcome::Missing);
        };
        if closed {
            return Ok(TransitionOutcome::AlreadyClosed);
        }
        if !confirmed {
            return Ok(TransitionOutcome::NotConfirmed);
        }

        let changed = tx.execute(
            "UPDATE issues SET closed_date = ?2
             WHERE id = ?1 AND confirmed = 1 AND closed_date IS NULL",
            params![id.0, format_date(closed_on)],
        )?;
        if changed != 1 {
            return Ok(TransitionOutcome::AlreadyClosed);
        }

        tx.commit()?;
        Ok(TransitionOutcome::Applied)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Row as read from SQLite, dates still in text form.
struct RawIssue {
    id: i64,
    content: String,
    report_date: String,
    confirmed: bool,
    closed_date: Option<String>,
    reporter: String,
}

impl RawIssue {
    fn into_issue(self) -> Result<Issue> {
        Ok(Issue {
            id: IssueId(self.id),
            content: self.content,
            report_date: parse_date(&self.report_date)?,
            confirmed: self.confirmed,
            closed_date: self.closed_date.as_deref().map(parse_date).transpose()?,
            reporter: self.reporter,
            images: Vec::new(),
        })
    }
}

fn read_issue_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawIssue> {
    Ok(RawIssue {
        id: row.get(0)?,
        content: row.get(1)?,
        report_date: row.get(2)?,
        confirmed: row.get(3)?,
        closed_date: row.get(4)?,
        reporter: row.get(5)?,
    })
}

fn load_images(conn: &Connection, id: IssueId) -> Result<Vec<IssueImage>> {
    let mut stmt = conn.prepare_cached(
        "SELECT media_ref FROM issue_images
         WHERE issue_id = ?1
         ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![id.0], |row| row.get::<_, String>(0))?;

    let mut images = Vec::new();
    for row in rows {
        images.push(IssueImage::new(row?));
    }
    Ok(images)
}

/// `(confirmed, closed)` for an issue, `None` when it does not exist.
fn lifecycle_state(conn: &Connection, id: IssueId) -> Result<Option<(bool, bool)>> {
    let state = conn
        .query_row(
            "SELECT confirmed, closed_date IS NOT NULL FROM issues WHERE id = ?1",
            params![id.0],
            |row| Ok((row.get::<_, bool>(0)?, row.get::<_, bool>(1)?)),
        )
        .optional()?;
    Ok(state)
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, DATE_FORMAT)?)
}
