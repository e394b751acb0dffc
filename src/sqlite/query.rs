// used to validate attribute names before they end up inside a json path
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{CofferError, Result};

lazy_static! {
    static ref PROPERTY: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

pub const CREATE_SCHEMA: &str = "
    create table if not exists orm_resources (
        id text not null primary key,
        internal_resource text not null,
        metadata text not null default '{}',
        lock_version integer not null default 0,
        created_at text not null,
        updated_at text not null
    );
    create index if not exists orm_resources_model on orm_resources (internal_resource);
";

pub const LOCK_VERSION: &str = "
    select lock_version
        from orm_resources
        where id = ?1
";

pub const INSERT: &str = "
    insert into orm_resources (
        id,
        internal_resource,
        metadata,
        lock_version,
        created_at,
        updated_at
    ) values (?1, ?2, ?3, 1, ?4, ?5)
";

// the lock_version guard makes a concurrent writer's update a no-op
pub const UPDATE: &str = "
    update orm_resources
        set internal_resource = ?2,
            metadata = ?3,
            lock_version = lock_version + 1,
            updated_at = ?4
        where id = ?1
        and lock_version = ?5
";

pub const DELETE: &str = "
    delete from orm_resources
        where id = ?1
";

pub const WIPE: &str = "
    delete from orm_resources
";

pub const FIND_BY: &str = "
    select id, internal_resource, metadata, lock_version, created_at, updated_at
        from orm_resources
        where id = ?1
";

// keyset pagination over the primary key
pub const PAGE_AFTER: &str = "
    select id, internal_resource, metadata, lock_version, created_at, updated_at
        from orm_resources
        where id > ?1
        and (?2 is null or internal_resource = ?2)
        order by id
        limit ?3
";

pub const COUNT_OF_MODEL: &str = "
    select count(*)
        from orm_resources
        where internal_resource = ?1
";

// Positional join: one result row per array element, in array order,
// so duplicates and the recorded order survive.
pub const FIND_MEMBERS: &str = "
    select member.id,
           member.internal_resource,
           member.metadata,
           member.lock_version,
           member.created_at,
           member.updated_at
        from orm_resources parent
        join json_each(parent.metadata, '$.member_ids') as b
        join orm_resources member
        on member.id = case when b.type = 'object' then json_extract(b.value, '$.id') end
        where parent.id = ?1
        and (?2 is null or member.internal_resource = ?2)
        order by b.key
";

pub const FIND_REFERENCES: &str = "
    select member.id,
           member.internal_resource,
           member.metadata,
           member.lock_version,
           member.created_at,
           member.updated_at
        from orm_resources parent
        join json_each(parent.metadata, ?2) as b
        join orm_resources member
        on member.id = case when b.type = 'object' then json_extract(b.value, '$.id') end
        where parent.id = ?1
        order by b.key
";

pub const FIND_INVERSE_REFERENCES: &str = "
    select r.id, r.internal_resource, r.metadata, r.lock_version, r.created_at, r.updated_at
        from orm_resources r
        where exists (
            select 1
                from json_each(r.metadata, ?1) as b
                where case when b.type = 'object' then json_extract(b.value, '$.id') end = ?2
        )
        order by r.id
";

/// The json path of a top-level attribute in the metadata column.
pub fn property_path(property: &str) -> Result<String> {
    if !PROPERTY.is_match(property) {
        return Err(CofferError::InvalidValue(format!(
            "'{property}' is not a queryable attribute name"
        )));
    }
    Ok(format!("$.\"{property}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_names_are_validated() {
        assert_eq!(property_path("member_ids").unwrap(), "$.\"member_ids\"");
        assert!(property_path("a') or 1=1 --").is_err());
    }
}
