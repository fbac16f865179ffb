//! Address repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide insert/update/soft-delete/purge and lookup over `addresses`.
//! - Keep version bookkeeping next to the SQL that enforces it.
//!
//! # Invariants
//! - Every write bumps `version` by exactly one and stamps `updated_at`.
//! - Writes guarded by an expected version change zero rows on mismatch.
//! - Callers pair every write with one change event in the same transaction.

use crate::model::address::{parse_site_type, AddressId, AddressRecord, GeoBounds, NewAddress};
use crate::repo::{
    bool_to_int, like_contains, normalize_limit, parse_bool, RepoError, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const ADDRESS_SELECT_SQL: &str = "SELECT
    id,
    code,
    uf,
    municipality,
    district,
    street,
    number,
    complement,
    postal_code,
    latitude,
    longitude,
    site_type,
    holder_id,
    shared,
    version,
    is_deleted,
    created_at,
    updated_at
FROM addresses";

/// Filter options for address lookups.
///
/// Text filters other than `code`, `uf`, `postal_code` and `holder_code`
/// match substrings, case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressQuery {
    pub code: Option<String>,
    /// Code an operator assigns to the site.
    pub operator_code: Option<String>,
    pub uf: Option<String>,
    pub municipality: Option<String>,
    pub district: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub holder_id: Option<i64>,
    pub holder_code: Option<String>,
    /// Addresses without coordinates never match.
    pub bounds: Option<GeoBounds>,
    pub include_deleted: bool,
    /// Defaults to 20 and clamps to 100.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Records still referencing an address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressDependents {
    pub annotations: u64,
    pub pending_suggestions: u64,
}

impl AddressDependents {
    pub fn is_empty(&self) -> bool {
        self.annotations == 0 && self.pending_suggestions == 0
    }
}

/// Repository interface for address storage.
pub trait AddressRepository {
    /// Inserts a record with version 1 and returns it.
    fn insert(&self, address: &NewAddress, now: i64) -> RepoResult<AddressRecord>;
    fn get(&self, id: AddressId, include_deleted: bool) -> RepoResult<Option<AddressRecord>>;
    fn get_by_code(&self, code: &str, include_deleted: bool) -> RepoResult<Option<AddressRecord>>;
    /// Persists every field of `record` when the stored version equals
    /// `record.version`; returns the stored record with the bumped version.
    fn save(&self, record: &AddressRecord, now: i64) -> RepoResult<Option<AddressRecord>>;
    /// Deletes the row; returns whether a row existed.
    fn purge(&self, id: AddressId) -> RepoResult<bool>;
    fn search(&self, query: &AddressQuery) -> RepoResult<Vec<AddressRecord>>;
    fn dependents(&self, id: AddressId) -> RepoResult<AddressDependents>;
}

/// SQLite-backed address repository.
pub struct SqliteAddressRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAddressRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AddressRepository for SqliteAddressRepository<'_> {
    fn insert(&self, address: &NewAddress, now: i64) -> RepoResult<AddressRecord> {
        self.conn.execute(
            "INSERT INTO addresses (
                code,
                uf,
                municipality,
                district,
                street,
                number,
                complement,
                postal_code,
                latitude,
                longitude,
                site_type,
                holder_id,
                shared,
                version,
                is_deleted,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1, 0, ?14, ?14);",
            params![
                address.code.as_str(),
                address.uf.as_str(),
                address.municipality.as_str(),
                address.district.as_str(),
                address.street.as_str(),
                address.number.as_deref(),
                address.complement.as_deref(),
                address.postal_code.as_deref(),
                address.latitude,
                address.longitude,
                address.site_type.map(|kind| kind.as_str()),
                address.holder_id,
                bool_to_int(address.shared),
                now,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get(id, true)?.ok_or_else(|| {
            RepoError::InvalidData(format!("inserted address {id} missing on read-back"))
        })
    }

    fn get(&self, id: AddressId, include_deleted: bool) -> RepoResult<Option<AddressRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ADDRESS_SELECT_SQL}
             WHERE id = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;
        let mut rows = stmt.query(params![id, bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_address_row(row)?));
        }
        Ok(None)
    }

    fn get_by_code(&self, code: &str, include_deleted: bool) -> RepoResult<Option<AddressRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ADDRESS_SELECT_SQL}
             WHERE code = ?1 COLLATE NOCASE
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;
        let mut rows = stmt.query(params![code, bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_address_row(row)?));
        }
        Ok(None)
    }

    fn save(&self, record: &AddressRecord, now: i64) -> RepoResult<Option<AddressRecord>> {
        let changed = self.conn.execute(
            "UPDATE addresses
             SET
                code = ?1,
                uf = ?2,
                municipality = ?3,
                district = ?4,
                street = ?5,
                number = ?6,
                complement = ?7,
                postal_code = ?8,
                latitude = ?9,
                longitude = ?10,
                site_type = ?11,
                holder_id = ?12,
                shared = ?13,
                is_deleted = ?14,
                version = version + 1,
                updated_at = ?15
             WHERE id = ?16
               AND version = ?17;",
            params![
                record.code.as_str(),
                record.uf.as_str(),
                record.municipality.as_str(),
                record.district.as_str(),
                record.street.as_str(),
                record.number.as_deref(),
                record.complement.as_deref(),
                record.postal_code.as_deref(),
                record.latitude,
                record.longitude,
                record.site_type.map(|kind| kind.as_str()),
                record.holder_id,
                bool_to_int(record.shared),
                bool_to_int(record.is_deleted),
                now,
                record.id,
                record.version,
            ],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        self.get(record.id, true)
    }

    fn purge(&self, id: AddressId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM addresses WHERE id = ?1;", [id])?;
        Ok(changed == 1)
    }

    fn search(&self, query: &AddressQuery) -> RepoResult<Vec<AddressRecord>> {
        let mut sql = format!("{ADDRESS_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }
        if let Some(code) = query.code.as_ref() {
            sql.push_str(" AND code = ? COLLATE NOCASE");
            bind_values.push(Value::Text(code.clone()));
        }
        if let Some(uf) = query.uf.as_ref() {
            sql.push_str(" AND uf = ?");
            bind_values.push(Value::Text(uf.clone()));
        }
        for (column, value) in [
            ("municipality", &query.municipality),
            ("district", &query.district),
            ("street", &query.street),
        ] {
            if let Some(value) = value.as_ref() {
                sql.push_str(&format!(" AND {column} LIKE ? ESCAPE '\\'"));
                bind_values.push(Value::Text(like_contains(value)));
            }
        }
        if let Some(postal_code) = query.postal_code.as_ref() {
            sql.push_str(" AND REPLACE(postal_code, '-', '') = ?");
            bind_values.push(Value::Text(postal_code.replace('-', "")));
        }
        if let Some(holder_id) = query.holder_id {
            sql.push_str(" AND holder_id = ?");
            bind_values.push(Value::Integer(holder_id));
        }
        if let Some(holder_code) = query.holder_code.as_ref() {
            sql.push_str(
                " AND holder_id IN (SELECT id FROM holders WHERE code = ? COLLATE NOCASE)",
            );
            bind_values.push(Value::Text(holder_code.clone()));
        }
        if let Some(operator_code) = query.operator_code.as_ref() {
            sql.push_str(
                " AND id IN (SELECT address_id FROM address_operators
                             WHERE operator_code LIKE ? ESCAPE '\\')",
            );
            bind_values.push(Value::Text(like_contains(operator_code)));
        }
        if let Some(bounds) = query.bounds {
            sql.push_str(" AND latitude BETWEEN ? AND ? AND longitude BETWEEN ? AND ?");
            bind_values.extend([
                Value::Real(bounds.south),
                Value::Real(bounds.north),
                Value::Real(bounds.west),
                Value::Real(bounds.east),
            ]);
        }

        sql.push_str(" ORDER BY uf ASC, municipality ASC, street ASC, id ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_limit(query.limit))));
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_address_row(row)?);
        }
        Ok(records)
    }

    fn dependents(&self, id: AddressId) -> RepoResult<AddressDependents> {
        let annotations: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM annotations WHERE address_id = ?1;",
            [id],
            |row| row.get(0),
        )?;
        let pending_suggestions: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM suggestions
             WHERE target_address_id = ?1
               AND status = 'pending';",
            [id],
            |row| row.get(0),
        )?;
        Ok(AddressDependents {
            annotations: count_to_u64(annotations)?,
            pending_suggestions: count_to_u64(pending_suggestions)?,
        })
    }
}

/// Returns the current version of an address, deleted or not.
pub fn current_version(conn: &Connection, id: AddressId) -> RepoResult<Option<i64>> {
    let version = conn
        .query_row(
            "SELECT version FROM addresses WHERE id = ?1;",
            [id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(version)
}

pub(crate) fn count_to_u64(value: i64) -> RepoResult<u64> {
    u64::try_from(value).map_err(|_| RepoError::InvalidData(format!("negative count `{value}`")))
}

fn parse_address_row(row: &Row<'_>) -> RepoResult<AddressRecord> {
    let site_type = match row.get::<_, Option<String>>("site_type")? {
        Some(value) => Some(parse_site_type(&value).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid site type `{value}` in addresses.site_type"
            ))
        })?),
        None => None,
    };

    Ok(AddressRecord {
        id: row.get("id")?,
        code: row.get("code")?,
        uf: row.get("uf")?,
        municipality: row.get("municipality")?,
        district: row.get("district")?,
        street: row.get("street")?,
        number: row.get("number")?,
        complement: row.get("complement")?,
        postal_code: row.get("postal_code")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        site_type,
        holder_id: row.get("holder_id")?,
        shared: parse_bool(row.get("shared")?, "addresses.shared")?,
        version: row.get("version")?,
        is_deleted: parse_bool(row.get("is_deleted")?, "addresses.is_deleted")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
