//! SQLite implementation of the storage traits.
//!
//! [`SqliteStore`] keeps editions, link edges, and expanded-links records in
//! a WAL-mode database. The connection sits behind a mutex so the store is
//! `Sync`; every multi-statement write runs in a transaction. Editions and
//! expanded links are stored as JSON TEXT columns via serde_json.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};

use linkgraph_core::{
    ContentId, Edition, EditionState, ExpandedLinks, ExpandedLinksKey, ExpandedLinksRecord,
    LinkEdge, LinkScope, LinkType, LinkTypeFilter, Locale,
};

use crate::error::StorageError;
use crate::traits::{sort_edges, ContentRepository, ExpandedLinksStore, LinkGraphReader};
use crate::types::UpdateOutcome;

const LINK_COLUMNS: &str = "source, link_type, target, position, edition_locale, edition_draft";

/// SQLite-backed storage.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::poisoned("sqlite connection"))
    }

    fn parse_content_id(raw: &str) -> Result<ContentId, StorageError> {
        raw.parse().map_err(|_| StorageError::IntegrityError {
            reason: format!("invalid content id '{}'", raw),
        })
    }

    fn to_db_version(version: u64) -> Result<i64, StorageError> {
        i64::try_from(version).map_err(|_| StorageError::IntegrityError {
            reason: format!("version {} does not fit in an INTEGER column", version),
        })
    }

    fn from_db_version(version: i64) -> Result<u64, StorageError> {
        u64::try_from(version).map_err(|_| StorageError::IntegrityError {
            reason: format!("negative stored version {}", version),
        })
    }

    /// Splits a scope into its `(edition_locale, edition_draft)` columns.
    fn scope_columns(scope: &LinkScope) -> (Option<String>, Option<bool>) {
        match scope {
            LinkScope::LinkSet => (None, None),
            LinkScope::Edition { locale, draft } => (Some(locale.to_string()), Some(*draft)),
        }
    }

    fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<RawEdge> {
        Ok(RawEdge {
            source: row.get(0)?,
            link_type: row.get(1)?,
            target: row.get(2)?,
            position: row.get(3)?,
            edition_locale: row.get(4)?,
            edition_draft: row.get(5)?,
        })
    }

    /// Runs an edge query for one node, restricted to `filter`. `sql` binds
    /// the node as `?1` and is extended with the link-type condition.
    fn query_edges(
        conn: &Connection,
        sql: &str,
        node: ContentId,
        filter: &LinkTypeFilter,
    ) -> Result<Vec<LinkEdge>, StorageError> {
        let mut values = vec![node.to_string()];
        let sql = match filter {
            LinkTypeFilter::Any => sql.to_string(),
            LinkTypeFilter::Only(types) => {
                let placeholders: Vec<String> =
                    (0..types.len()).map(|i| format!("?{}", i + 2)).collect();
                values.extend(types.iter().map(LinkType::to_string));
                format!("{} AND link_type IN ({})", sql, placeholders.join(", "))
            }
        };
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params_from_iter(values.iter()), Self::edge_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawEdge::into_edge).collect()
    }

    /// Whether the visible edition of `(content_id, locale)` is a draft.
    /// `None` when no edition is visible.
    fn visible_is_draft(
        conn: &Connection,
        content_id: ContentId,
        locale: &str,
        with_drafts: bool,
    ) -> Result<Option<bool>, StorageError> {
        let slot: Option<String> = conn
            .query_row(
                "SELECT slot FROM editions
                 WHERE content_id = ?1 AND locale = ?2 AND (slot = 'live' OR ?3)
                 ORDER BY CASE slot WHEN 'draft' THEN 0 ELSE 1 END
                 LIMIT 1",
                params![content_id.to_string(), locale, with_drafts],
                |row| row.get(0),
            )
            .optional()?;
        Ok(slot.map(|slot| slot == "draft"))
    }

    fn edition_edge_visible(
        conn: &Connection,
        edge: &LinkEdge,
        with_drafts: bool,
    ) -> Result<bool, StorageError> {
        match &edge.scope {
            LinkScope::LinkSet => Ok(true),
            LinkScope::Edition { locale, draft } => Ok(Self::visible_is_draft(
                conn,
                edge.source,
                locale.as_str(),
                with_drafts,
            )? == Some(*draft)),
        }
    }

    fn insert_edge(conn: &Connection, edge: &LinkEdge) -> Result<(), StorageError> {
        let (edition_locale, edition_draft) = Self::scope_columns(&edge.scope);
        conn.execute(
            &format!("INSERT INTO links ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)", LINK_COLUMNS),
            params![
                edge.source.to_string(),
                edge.link_type.as_str(),
                edge.target.to_string(),
                edge.position,
                edition_locale,
                edition_draft,
            ],
        )?;
        Ok(())
    }
}

/// A `links` row before id parsing.
struct RawEdge {
    source: String,
    link_type: String,
    target: String,
    position: i32,
    edition_locale: Option<String>,
    edition_draft: Option<bool>,
}

impl RawEdge {
    fn into_edge(self) -> Result<LinkEdge, StorageError> {
        let scope = match (self.edition_locale, self.edition_draft) {
            (None, None) => LinkScope::LinkSet,
            (Some(locale), Some(draft)) => LinkScope::Edition {
                locale: Locale::new(locale),
                draft,
            },
            _ => {
                return Err(StorageError::IntegrityError {
                    reason: "link row with partial edition scope".into(),
                })
            }
        };
        Ok(LinkEdge {
            source: SqliteStore::parse_content_id(&self.source)?,
            link_type: LinkType::new(self.link_type),
            target: SqliteStore::parse_content_id(&self.target)?,
            position: self.position,
            scope,
        })
    }
}

impl LinkGraphReader for SqliteStore {
    fn links_from(
        &self,
        source: ContentId,
        filter: &LinkTypeFilter,
    ) -> Result<Vec<LinkEdge>, StorageError> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM links WHERE source = ?1 AND edition_locale IS NULL",
            LINK_COLUMNS
        );
        let mut edges = Self::query_edges(&conn, &sql, source, filter)?;
        sort_edges(&mut edges);
        Ok(edges)
    }

    fn links_to(
        &self,
        target: ContentId,
        filter: &LinkTypeFilter,
    ) -> Result<Vec<LinkEdge>, StorageError> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM links WHERE target = ?1 AND edition_locale IS NULL",
            LINK_COLUMNS
        );
        let mut edges = Self::query_edges(&conn, &sql, target, filter)?;
        sort_edges(&mut edges);
        Ok(edges)
    }

    fn edition_links_from(
        &self,
        source: ContentId,
        locale: &Locale,
        with_drafts: bool,
        filter: &LinkTypeFilter,
    ) -> Result<Vec<LinkEdge>, StorageError> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let Some(draft) = Self::visible_is_draft(&conn, source, locale.as_str(), with_drafts)?
        else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {} FROM links WHERE source = ?1 AND edition_locale IS NOT NULL",
            LINK_COLUMNS
        );
        let scope = LinkScope::Edition {
            locale: locale.clone(),
            draft,
        };
        let mut edges: Vec<LinkEdge> = Self::query_edges(&conn, &sql, source, filter)?
            .into_iter()
            .filter(|edge| edge.scope == scope)
            .collect();
        sort_edges(&mut edges);
        Ok(edges)
    }

    fn edition_links_to(
        &self,
        target: ContentId,
        with_drafts: bool,
        filter: &LinkTypeFilter,
    ) -> Result<Vec<LinkEdge>, StorageError> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM links WHERE target = ?1 AND edition_locale IS NOT NULL",
            LINK_COLUMNS
        );
        let mut edges = Vec::new();
        for edge in Self::query_edges(&conn, &sql, target, filter)? {
            if Self::edition_edge_visible(&conn, &edge, with_drafts)? {
                edges.push(edge);
            }
        }
        sort_edges(&mut edges);
        Ok(edges)
    }

    fn visible_edition(
        &self,
        content_id: ContentId,
        locale: &Locale,
        with_drafts: bool,
    ) -> Result<Option<Edition>, StorageError> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT edition_json FROM editions
                 WHERE content_id = ?1 AND locale = ?2 AND (slot = 'live' OR ?3)
                 ORDER BY CASE slot WHEN 'draft' THEN 0 ELSE 1 END
                 LIMIT 1",
                params![content_id.to_string(), locale.as_str(), with_drafts],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn visible_locales(
        &self,
        content_id: ContentId,
        with_drafts: bool,
    ) -> Result<Vec<Locale>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT locale FROM editions
             WHERE content_id = ?1 AND (slot = 'live' OR ?2)
             ORDER BY locale",
        )?;
        let locales = stmt
            .query_map(params![content_id.to_string(), with_drafts], |row| {
                row.get::<_, String>(0)
            })?
            .map(|locale| locale.map(Locale::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(locales)
    }
}

impl ContentRepository for SqliteStore {
    fn put_edition(&self, edition: Edition) -> Result<(), StorageError> {
        if edition.state == EditionState::Superseded {
            return Ok(());
        }
        let json = serde_json::to_string(&edition)?;
        let version = Self::to_db_version(edition.user_facing_version)?;
        let content_id = edition.content_id.to_string();
        let slot = if edition.state.is_draft() { "draft" } else { "live" };

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if slot == "live" {
            tx.execute(
                "DELETE FROM editions
                 WHERE content_id = ?1 AND locale = ?2 AND slot = 'draft'
                   AND user_facing_version <= ?3",
                params![content_id, edition.locale.as_str(), version],
            )?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO editions
                (content_id, locale, slot, state, document_type, user_facing_version, edition_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                content_id,
                edition.locale.as_str(),
                slot,
                edition.state.as_str(),
                edition.document_type,
                version,
                json,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn remove_content(&self, content_id: ContentId) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM editions WHERE content_id = ?1",
            params![content_id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM links WHERE source = ?1",
            params![content_id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn add_link(&self, edge: LinkEdge) -> Result<(), StorageError> {
        let conn = self.conn()?;
        Self::insert_edge(&conn, &edge)
    }

    fn replace_links(
        &self,
        source: ContentId,
        link_type: &LinkType,
        scope: &LinkScope,
        targets: &[ContentId],
    ) -> Result<Vec<ContentId>, StorageError> {
        let (edition_locale, edition_draft) = Self::scope_columns(scope);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let previous: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT target FROM links
                 WHERE source = ?1 AND link_type = ?2
                   AND edition_locale IS ?3 AND edition_draft IS ?4",
            )?;
            let rows = stmt.query_map(
                params![
                    source.to_string(),
                    link_type.as_str(),
                    edition_locale,
                    edition_draft
                ],
                |row| row.get(0),
            )?;
            let targets = rows.collect::<Result<Vec<_>, _>>()?;
            targets
        };

        tx.execute(
            "DELETE FROM links
             WHERE source = ?1 AND link_type = ?2
               AND edition_locale IS ?3 AND edition_draft IS ?4",
            params![
                source.to_string(),
                link_type.as_str(),
                edition_locale,
                edition_draft
            ],
        )?;
        for (position, target) in targets.iter().enumerate() {
            let edge = LinkEdge::new(source, link_type.clone(), *target)
                .at_position(position as i32)
                .scoped(scope.clone());
            Self::insert_edge(&tx, &edge)?;
        }
        tx.commit()?;

        let mut orphans = BTreeSet::new();
        for raw in previous {
            let target = Self::parse_content_id(&raw)?;
            if !targets.contains(&target) {
                orphans.insert(target);
            }
        }
        Ok(orphans.into_iter().collect())
    }
}

impl ExpandedLinksStore for SqliteStore {
    fn locked_update(
        &self,
        key: &ExpandedLinksKey,
        payload_version: u64,
        expanded_links: &ExpandedLinks,
    ) -> Result<UpdateOutcome, StorageError> {
        let version = Self::to_db_version(payload_version)?;
        let json = serde_json::to_string(expanded_links)?;
        let content_id = key.content_id.to_string();

        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock up front, so the read-compare-write
        // below cannot interleave with another connection's update.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored: Option<i64> = tx
            .query_row(
                "SELECT payload_version FROM expanded_links
                 WHERE content_id = ?1 AND locale = ?2 AND with_drafts = ?3",
                params![content_id, key.locale.as_str(), key.with_drafts],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match stored {
            None => {
                tx.execute(
                    "INSERT INTO expanded_links
                        (content_id, locale, with_drafts, payload_version, expanded_links)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![content_id, key.locale.as_str(), key.with_drafts, version, json],
                )?;
                UpdateOutcome::Created
            }
            Some(stored) if stored <= version => {
                tx.execute(
                    "UPDATE expanded_links SET payload_version = ?4, expanded_links = ?5
                     WHERE content_id = ?1 AND locale = ?2 AND with_drafts = ?3",
                    params![content_id, key.locale.as_str(), key.with_drafts, version, json],
                )?;
                UpdateOutcome::Applied {
                    previous_version: Self::from_db_version(stored)?,
                }
            }
            Some(stored) => UpdateOutcome::Skipped {
                stored_version: Self::from_db_version(stored)?,
            },
        };
        tx.commit()?;
        Ok(outcome)
    }

    fn find_expanded_links(
        &self,
        key: &ExpandedLinksKey,
    ) -> Result<Option<ExpandedLinksRecord>, StorageError> {
        let conn = self.conn()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT payload_version, expanded_links FROM expanded_links
                 WHERE content_id = ?1 AND locale = ?2 AND with_drafts = ?3",
                params![key.content_id.to_string(), key.locale.as_str(), key.with_drafts],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((version, json)) => Ok(Some(ExpandedLinksRecord {
                key: key.clone(),
                payload_version: Self::from_db_version(version)?,
                expanded_links: serde_json::from_str(&json)?,
            })),
            None => Ok(None),
        }
    }
}
