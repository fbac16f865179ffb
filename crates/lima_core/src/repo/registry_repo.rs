//! Holder and operator repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Code lookups are case-insensitive, matching the unique indexes.
//! - Operator links vanish with their address on purge (`ON DELETE CASCADE`).
//! - Listings are ordered by code.

use crate::model::address::AddressId;
use crate::model::registry::{
    Holder, HolderId, NewHolder, NewOperator, Operator, OperatorId, OperatorLink,
};
use crate::repo::{normalize_limit, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const HOLDER_SELECT_SQL: &str = "SELECT id, code, name, noc_phone, created_at FROM holders";
const OPERATOR_SELECT_SQL: &str = "SELECT id, code, name, created_at FROM operators";

/// Repository interface for the holder and operator registries.
pub trait RegistryRepository {
    fn insert_holder(&self, holder: &NewHolder, now: i64) -> RepoResult<Holder>;
    fn get_holder(&self, id: HolderId) -> RepoResult<Option<Holder>>;
    fn get_holder_by_code(&self, code: &str) -> RepoResult<Option<Holder>>;
    fn list_holders(&self, limit: Option<u32>) -> RepoResult<Vec<Holder>>;

    fn insert_operator(&self, operator: &NewOperator, now: i64) -> RepoResult<Operator>;
    fn get_operator_by_code(&self, code: &str) -> RepoResult<Option<Operator>>;
    fn list_operators(&self, limit: Option<u32>) -> RepoResult<Vec<Operator>>;

    /// Fails with `Constraint` when the address already links to the operator.
    fn link(
        &self,
        address_id: AddressId,
        operator_id: OperatorId,
        operator_code: &str,
        now: i64,
    ) -> RepoResult<()>;
    /// Returns whether a link existed.
    fn unlink(&self, address_id: AddressId, operator_id: OperatorId) -> RepoResult<bool>;
    /// Ordered by operator code.
    fn links_for_address(&self, address_id: AddressId) -> RepoResult<Vec<OperatorLink>>;
}

/// SQLite-backed registry repository.
pub struct SqliteRegistryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRegistryRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl RegistryRepository for SqliteRegistryRepository<'_> {
    fn insert_holder(&self, holder: &NewHolder, now: i64) -> RepoResult<Holder> {
        self.conn.execute(
            "INSERT INTO holders (code, name, noc_phone, created_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                holder.code.as_str(),
                holder.name.as_str(),
                holder.noc_phone.as_str(),
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_holder(id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("inserted holder {id} missing on read-back"))
        })
    }

    fn get_holder(&self, id: HolderId) -> RepoResult<Option<Holder>> {
        let holder = self
            .conn
            .query_row(
                &format!("{HOLDER_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_holder_row,
            )
            .optional()?;
        Ok(holder)
    }

    fn get_holder_by_code(&self, code: &str) -> RepoResult<Option<Holder>> {
        let holder = self
            .conn
            .query_row(
                &format!("{HOLDER_SELECT_SQL} WHERE code = ?1 COLLATE NOCASE;"),
                [code],
                parse_holder_row,
            )
            .optional()?;
        Ok(holder)
    }

    fn list_holders(&self, limit: Option<u32>) -> RepoResult<Vec<Holder>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{HOLDER_SELECT_SQL} ORDER BY code COLLATE NOCASE ASC LIMIT ?1;"))?;
        let holders = stmt
            .query_map([normalize_limit(limit)], parse_holder_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(holders)
    }

    fn insert_operator(&self, operator: &NewOperator, now: i64) -> RepoResult<Operator> {
        self.conn.execute(
            "INSERT INTO operators (code, name, created_at) VALUES (?1, ?2, ?3);",
            params![operator.code.as_str(), operator.name.as_str(), now],
        )?;
        let id = self.conn.last_insert_rowid();
        let operator = self
            .conn
            .query_row(
                &format!("{OPERATOR_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_operator_row,
            )
            .optional()?;
        operator.ok_or_else(|| {
            RepoError::InvalidData(format!("inserted operator {id} missing on read-back"))
        })
    }

    fn get_operator_by_code(&self, code: &str) -> RepoResult<Option<Operator>> {
        let operator = self
            .conn
            .query_row(
                &format!("{OPERATOR_SELECT_SQL} WHERE code = ?1 COLLATE NOCASE;"),
                [code],
                parse_operator_row,
            )
            .optional()?;
        Ok(operator)
    }

    fn list_operators(&self, limit: Option<u32>) -> RepoResult<Vec<Operator>> {
        let mut stmt = self.conn.prepare(&format!(
            "{OPERATOR_SELECT_SQL} ORDER BY code COLLATE NOCASE ASC LIMIT ?1;"
        ))?;
        let operators = stmt
            .query_map([normalize_limit(limit)], parse_operator_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(operators)
    }

    fn link(
        &self,
        address_id: AddressId,
        operator_id: OperatorId,
        operator_code: &str,
        now: i64,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO address_operators (address_id, operator_id, operator_code, linked_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![address_id, operator_id, operator_code, now],
        )?;
        Ok(())
    }

    fn unlink(&self, address_id: AddressId, operator_id: OperatorId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM address_operators WHERE address_id = ?1 AND operator_id = ?2;",
            params![address_id, operator_id],
        )?;
        Ok(changed == 1)
    }

    fn links_for_address(&self, address_id: AddressId) -> RepoResult<Vec<OperatorLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                link.address_id,
                link.operator_code,
                link.linked_at,
                op.id,
                op.code,
                op.name,
                op.created_at
             FROM address_operators AS link
             JOIN operators AS op ON op.id = link.operator_id
             WHERE link.address_id = ?1
             ORDER BY op.code COLLATE NOCASE ASC;",
        )?;
        let links = stmt
            .query_map([address_id], parse_link_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }
}

fn parse_holder_row(row: &Row<'_>) -> rusqlite::Result<Holder> {
    Ok(Holder {
        id: row.get("id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        noc_phone: row.get("noc_phone")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_operator_row(row: &Row<'_>) -> rusqlite::Result<Operator> {
    Ok(Operator {
        id: row.get("id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_link_row(row: &Row<'_>) -> rusqlite::Result<OperatorLink> {
    Ok(OperatorLink {
        address_id: row.get(0)?,
        operator_code: row.get(1)?,
        linked_at: row.get(2)?,
        operator: Operator {
            id: row.get(3)?,
            code: row.get(4)?,
            name: row.get(5)?,
            created_at: row.get(6)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::{RegistryRepository, SqliteRegistryRepository};
    use crate::db::open_db_in_memory;
    use crate::model::registry::{NewHolder, NewOperator};
    use crate::repo::RepoError;

    #[test]
    fn codes_are_unique_and_found_regardless_of_case() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteRegistryRepository::new(&conn);

        let holder = repo
            .insert_holder(&NewHolder::new("SBA", "SBA Torres", "0800 000"), 10)
            .unwrap();
        assert_eq!(repo.get_holder_by_code("sba").unwrap(), Some(holder));
        assert!(matches!(
            repo.insert_holder(&NewHolder::new("sba", "Copy", "1"), 11),
            Err(RepoError::Constraint(_))
        ));

        repo.insert_operator(&NewOperator::new("VIVO", "Vivo"), 12)
            .unwrap();
        repo.insert_operator(&NewOperator::new("claro", "Claro"), 12)
            .unwrap();
        let codes: Vec<String> = repo
            .list_operators(None)
            .unwrap()
            .into_iter()
            .map(|operator| operator.code)
            .collect();
        assert_eq!(codes, vec!["claro".to_string(), "VIVO".to_string()]);
    }

    #[test]
    fn links_join_the_operator_and_reject_duplicates() {
        let conn = open_db_in_memory().unwrap();
        conn.execute(
            "INSERT INTO addresses (code, uf, municipality, district, street, created_at, updated_at)
             VALUES ('rnnt01', 'RN', 'Natal', 'Centro', 'Rua A', 1, 1);",
            [],
        )
        .unwrap();
        let address_id = conn.last_insert_rowid();
        let repo = SqliteRegistryRepository::new(&conn);
        let tim = repo
            .insert_operator(&NewOperator::new("TIM", "TIM Brasil"), 5)
            .unwrap();

        repo.link(address_id, tim.id, "RNNTL01", 20).unwrap();
        assert!(matches!(
            repo.link(address_id, tim.id, "RNNTL02", 21),
            Err(RepoError::Constraint(_))
        ));

        let links = repo.links_for_address(address_id).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].operator, tim);
        assert_eq!(links[0].operator_code, "RNNTL01");

        assert!(repo.unlink(address_id, tim.id).unwrap());
        assert!(!repo.unlink(address_id, tim.id).unwrap());
    }
}
