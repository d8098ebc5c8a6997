//! Report and media records.

use chrono::Utc;
use rusqlite::{params, Row};

use super::{parsed_col, time_col, ts, StorageError, Store};
use crate::model::{Media, NewMedia, NewReport, Report};

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<Report> {
    Ok(Report {
        id: row.get(0)?,
        test_run_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        report_type: parsed_col(row, 4)?,
        file_format: parsed_col(row, 5)?,
        file_path: row.get(6)?,
        created_by: row.get(7)?,
        created_at: time_col(row, 8)?,
    })
}

fn media_from_row(row: &Row<'_>) -> rusqlite::Result<Media> {
    Ok(Media {
        id: row.get(0)?,
        test_run_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        media_type: row.get(4)?,
        content_type: row.get(5)?,
        file_path: row.get(6)?,
        created_by: row.get(7)?,
        created_at: time_col(row, 8)?,
    })
}

impl Store {
    pub fn insert_report(&self, new: &NewReport) -> Result<Report, StorageError> {
        let conn = self.pool().get()?;
        conn.execute(
            "INSERT INTO reports (test_run_id, name, description, report_type, file_format,
                file_path, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.test_run_id,
                new.name,
                new.description,
                new.report_type.as_str(),
                new.file_format.as_str(),
                new.file_path,
                new.created_by,
                ts(&Utc::now()),
            ],
        )?;
        let id = conn.last_insert_rowid();
        let report = conn.query_row(
            "SELECT id, test_run_id, name, description, report_type, file_format, file_path,
                    created_by, created_at
             FROM reports WHERE id = ?1",
            params![id],
            report_from_row,
        )?;
        Ok(report)
    }

    pub fn list_reports(&self, run_id: i64) -> Result<Vec<Report>, StorageError> {
        let conn = self.pool().get()?;
        let mut stmt = conn.prepare(
            "SELECT id, test_run_id, name, description, report_type, file_format, file_path,
                    created_by, created_at
             FROM reports WHERE test_run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![run_id], report_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn insert_media(&self, new: &NewMedia) -> Result<Media, StorageError> {
        let conn = self.pool().get()?;
        conn.execute(
            "INSERT INTO media (test_run_id, name, description, media_type, content_type,
                file_path, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.test_run_id,
                new.name,
                new.description,
                new.media_type,
                new.content_type,
                new.file_path,
                new.created_by,
                ts(&Utc::now()),
            ],
        )?;
        let id = conn.last_insert_rowid();
        let media = conn.query_row(
            "SELECT id, test_run_id, name, description, media_type, content_type, file_path,
                    created_by, created_at
             FROM media WHERE id = ?1",
            params![id],
            media_from_row,
        )?;
        Ok(media)
    }

    pub fn list_media(&self, run_id: i64) -> Result<Vec<Media>, StorageError> {
        let conn = self.pool().get()?;
        let mut stmt = conn.prepare(
            "SELECT id, test_run_id, name, description, media_type, content_type, file_path,
                    created_by, created_at
             FROM media WHERE test_run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![run_id], media_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Every blob path referenced by a report or media record.
    pub fn referenced_paths(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.pool().get()?;
        let mut stmt = conn.prepare(
            "SELECT file_path FROM reports UNION SELECT file_path FROM media ORDER BY 1",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<String>, _>>().map_err(Into::into)
    }
}
