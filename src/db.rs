use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::scan::ScanOutcome;

pub const DEFAULT_DB_PATH: &str = "data/monitor.sqlite";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS scans (
            id            INTEGER PRIMARY KEY,
            started_at    TEXT NOT NULL,
            city          TEXT NOT NULL,
            outcome       TEXT NOT NULL CHECK(outcome IN ('found','empty','fetch_failed')),
            pages_scanned INTEGER NOT NULL DEFAULT 0,
            match_count   INTEGER NOT NULL DEFAULT 0,
            notified      BOOLEAN NOT NULL DEFAULT 0,
            error         TEXT,
            duration_ms   INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_scans_started ON scans(started_at);

        CREATE TABLE IF NOT EXISTS hits (
            id            INTEGER PRIMARY KEY,
            scan_id       INTEGER NOT NULL REFERENCES scans(id),
            page_number   INTEGER NOT NULL,
            title         TEXT NOT NULL,
            link          TEXT,
            context       TEXT NOT NULL,
            postal_code   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_hits_scan ON hits(scan_id);
        ",
    )?;
    Ok(())
}

// ── Recording ──

pub struct ScanRecord<'a> {
    pub started_at: String,
    pub city: &'a str,
    pub outcome: &'a ScanOutcome,
    pub notified: bool,
    pub duration_ms: i64,
}

/// Store one finished scan and its hits; returns the scan id.
pub fn record_scan(conn: &Connection, record: &ScanRecord) -> Result<i64> {
    let error = match record.outcome {
        ScanOutcome::FetchFailed(reason) => Some(reason.as_str()),
        _ => None,
    };
    let matches = record.outcome.matches();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO scans (started_at, city, outcome, pages_scanned, match_count, notified, error, duration_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            record.started_at,
            record.city,
            record.outcome.label(),
            record.outcome.pages_scanned(),
            matches.len(),
            record.notified,
            error,
            record.duration_ms,
        ],
    )?;
    let scan_id = tx.last_insert_rowid();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO hits (scan_id, page_number, title, link, context, postal_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for m in matches {
            let o = &m.occurrence;
            stmt.execute(rusqlite::params![
                scan_id, m.page_number, o.title, o.link, o.context, o.postal_code,
            ])?;
        }
    }
    tx.commit()?;
    Ok(scan_id)
}

// ── History ──

pub struct HistoryRow {
    pub id: i64,
    pub started_at: String,
    pub city: String,
    pub outcome: String,
    pub pages_scanned: u32,
    pub match_count: u32,
    pub notified: bool,
    pub error: Option<String>,
    pub duration_ms: i64,
}

/// Most recent scans first.
pub fn fetch_history(conn: &Connection, limit: usize) -> Result<Vec<HistoryRow>> {
    let sql = format!(
        "SELECT id, started_at, city, outcome, pages_scanned, match_count, notified, error, duration_ms
         FROM scans
         ORDER BY id DESC
         LIMIT {}",
        limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(HistoryRow {
                id: row.get(0)?,
                started_at: row.get(1)?,
                city: row.get(2)?,
                outcome: row.get(3)?,
                pages_scanned: row.get(4)?,
                match_count: row.get(5)?,
                notified: row.get(6)?,
                error: row.get(7)?,
                duration_ms: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub found: usize,
    pub empty: usize,
    pub fetch_failed: usize,
    pub hits: usize,
    pub notified: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count_outcome = |outcome: &str| -> Result<usize> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM scans WHERE outcome = ?1",
            [outcome],
            |r| r.get(0),
        )?)
    };
    let total: usize = conn.query_row("SELECT COUNT(*) FROM scans", [], |r| r.get(0))?;
    let hits: usize = conn.query_row("SELECT COUNT(*) FROM hits", [], |r| r.get(0))?;
    let notified: usize =
        conn.query_row("SELECT COUNT(*) FROM scans WHERE notified = 1", [], |r| r.get(0))?;
    Ok(Stats {
        total,
        found: count_outcome("found")?,
        empty: count_outcome("empty")?,
        fetch_failed: count_outcome("fetch_failed")?,
        hits,
        notified,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Occurrence, ValidatedMatch};

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn found() -> ScanOutcome {
        ScanOutcome::Found {
            matches: vec![ValidatedMatch {
                occurrence: Occurrence {
                    title: "Résidence du Lac".into(),
                    link: Some("https://trouverunlogement.lescrous.fr/tools/42/accommodations/1021".into()),
                    context: "Résidence du Lac — Paris 75015, disponible".into(),
                    postal_code: "75015".into(),
                },
                page_number: 1,
            }],
            pages_scanned: 2,
        }
    }

    fn record(conn: &Connection, outcome: &ScanOutcome, notified: bool) -> i64 {
        record_scan(
            conn,
            &ScanRecord {
                started_at: "2026-10-18 09:30:00".into(),
                city: "paris",
                outcome,
                notified,
                duration_ms: 1200,
            },
        )
        .unwrap()
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = memory();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn records_and_counts() {
        let conn = memory();
        record(&conn, &found(), true);
        record(&conn, &ScanOutcome::NoMatches { pages_scanned: 3 }, false);
        record(&conn, &ScanOutcome::FetchFailed("HTTP 503".into()), false);

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.total, 3);
        assert_eq!(s.found, 1);
        assert_eq!(s.empty, 1);
        assert_eq!(s.fetch_failed, 1);
        assert_eq!(s.hits, 1);
        assert_eq!(s.notified, 1);
    }

    #[test]
    fn history_newest_first() {
        let conn = memory();
        let first = record(&conn, &found(), true);
        let second = record(&conn, &ScanOutcome::FetchFailed("HTTP 503".into()), false);

        let rows = fetch_history(&conn, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, second);
        assert_eq!(rows[0].outcome, "fetch_failed");
        assert_eq!(rows[0].error.as_deref(), Some("HTTP 503"));
        assert_eq!(rows[1].id, first);
        assert_eq!(rows[1].match_count, 1);
        assert_eq!(rows[1].pages_scanned, 2);
        assert!(rows[1].notified);

        assert_eq!(fetch_history(&conn, 1).unwrap().len(), 1);
    }
}
