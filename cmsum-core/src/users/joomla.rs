//! Joomla user storage.
//!
//! Accounts live in `P_users`; group membership in `P_user_usergroup_map`
//! with group titles in `P_usergroups`. Either companion may be missing on
//! older or partial installations, so role reads degrade to whatever the
//! observed companion tables allow.

use super::{SchemaContext, UserChange, UserKey, UserSchema};
use crate::adapters::helpers::{RowExt, expect_rows};
use crate::error::CmsError;
use crate::models::{CmsFamily, UserRecord};
use crate::Result;
use async_trait::async_trait;
use sqlx::AnyConnection;
use std::collections::{BTreeMap, BTreeSet};

/// Role label used when group titles are unavailable
fn group_label(group_id: i64) -> String {
    format!("group {}", group_id)
}

fn parse_group_label(role: &str) -> Option<i64> {
    role.trim().strip_prefix("group ")?.trim().parse().ok()
}

/// Joomla `users` + group tables schema
#[derive(Debug, Clone, Copy, Default)]
pub struct JoomlaSchema;

#[async_trait]
impl UserSchema for JoomlaSchema {
    fn family(&self) -> CmsFamily {
        CmsFamily::Joomla
    }

    async fn fetch(
        &self,
        conn: &mut AnyConnection,
        ctx: &SchemaContext<'_>,
        key: UserKey<'_>,
    ) -> Result<Vec<UserRecord>> {
        let users_table = ctx.installation.table("users");
        let mut params = ctx.dialect.params();
        let filter = key.filter("u.id", "u.username", &mut params);
        let text = |expr: &str| ctx.dialect.cast_text(expr);
        let sql = format!(
            "SELECT {} AS id, {} AS username, {} AS name, {} AS email \
             FROM {} u{} ORDER BY u.id",
            ctx.dialect.cast_int("u.id"),
            text("u.username"),
            text("u.name"),
            text("u.email"),
            ctx.table("users"),
            filter
        );

        let rows = key
            .bind(sqlx::query(&sql))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                CmsError::query_failed(format!("Failed to read users from {}", users_table), e)
            })?;

        let mut users = Vec::with_capacity(rows.len());
        let mut positions = BTreeMap::new();
        for row in &rows {
            let id: i64 = row.get_field("id", Some(&users_table))?;
            positions.insert(id, users.len());
            users.push(UserRecord {
                id,
                username: row.get_field("username", Some(&users_table))?,
                display_name: row.get_field("name", Some(&users_table))?,
                email: row.get_field("email", Some(&users_table))?,
                roles: BTreeSet::new(),
                profile: BTreeMap::new(),
                prefix: ctx.prefix().to_string(),
                family: CmsFamily::Joomla,
            });
        }

        if users.is_empty() || !ctx.installation.companions.user_group_map {
            return Ok(users);
        }

        let single_user = match key {
            UserKey::All => None,
            UserKey::Id(_) | UserKey::Username(_) => users.first().map(|u| u.id),
        };
        for (user_id, role) in fetch_roles(conn, ctx, single_user).await? {
            if let Some(&position) = positions.get(&user_id) {
                users[position].roles.insert(role);
            }
        }

        Ok(users)
    }

    async fn write(
        &self,
        conn: &mut AnyConnection,
        ctx: &SchemaContext<'_>,
        change: &UserChange<'_>,
    ) -> Result<Vec<String>> {
        let baseline = change.baseline;
        let desired = change.desired;
        let mut written = Vec::new();

        if !desired.profile.is_empty() && desired.profile != baseline.profile {
            return Err(CmsError::configuration(
                "Joomla users have no profile fields",
            ));
        }

        let mut params = ctx.dialect.params();
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        if desired.display_name != baseline.display_name {
            assignments.push(format!("name = {}", params.next_param()));
            values.push(desired.display_name.as_str());
            written.push("display_name".to_string());
        }
        if desired.email != baseline.email {
            assignments.push(format!("email = {}", params.next_param()));
            values.push(desired.email.as_str());
            written.push("email".to_string());
        }
        if let Some(hash) = change.password {
            assignments.push(format!("password = {}", params.next_param()));
            values.push(hash.encoded.as_str());
            written.push("password".to_string());
        }

        if !assignments.is_empty() {
            let sql = format!(
                "UPDATE {} SET {} WHERE id = {}",
                ctx.table("users"),
                assignments.join(", "),
                params.next_param()
            );
            let mut query = sqlx::query(&sql);
            for value in values {
                query = query.bind(value);
            }
            let result = query
                .bind(baseline.id)
                .execute(&mut *conn)
                .await
                .map_err(|e| CmsError::query_failed("Failed to update Joomla user row", e))?;
            expect_rows(ctx.prefix(), &baseline.username, "users", 1, result.rows_affected())?;
        }

        if desired.roles != baseline.roles {
            replace_groups(conn, ctx, baseline, &desired.roles).await?;
            written.push("roles".to_string());
        }

        Ok(written)
    }
}

/// Reads `(user id, role)` pairs, with titles when the group table exists.
async fn fetch_roles(
    conn: &mut AnyConnection,
    ctx: &SchemaContext<'_>,
    user_id: Option<i64>,
) -> Result<Vec<(i64, String)>> {
    let map_table = ctx.installation.table("user_usergroup_map");
    let with_titles = ctx.installation.companions.user_groups;
    let mut params = ctx.dialect.params();

    let mut sql = if with_titles {
        format!(
            "SELECT {} AS user_id, {} AS title FROM {} m JOIN {} g ON g.id = m.group_id",
            ctx.dialect.cast_int("m.user_id"),
            ctx.dialect.cast_text("g.title"),
            ctx.table("user_usergroup_map"),
            ctx.table("usergroups")
        )
    } else {
        format!(
            "SELECT {} AS user_id, {} AS group_id FROM {} m",
            ctx.dialect.cast_int("m.user_id"),
            ctx.dialect.cast_int("m.group_id"),
            ctx.table("user_usergroup_map")
        )
    };
    if user_id.is_some() {
        sql.push_str(&format!(" WHERE m.user_id = {}", params.next_param()));
    }
    sql.push_str(" ORDER BY m.user_id, m.group_id");

    let mut query = sqlx::query(&sql);
    if let Some(id) = user_id {
        query = query.bind(id);
    }
    let rows = query.fetch_all(&mut *conn).await.map_err(|e| {
        CmsError::query_failed(format!("Failed to read group map {}", map_table), e)
    })?;

    let mut roles = Vec::with_capacity(rows.len());
    for row in &rows {
        let user_id: i64 = row.get_field("user_id", Some(&map_table))?;
        let role = if with_titles {
            row.get_field("title", Some(&map_table))?
        } else {
            group_label(row.get_field("group_id", Some(&map_table))?)
        };
        roles.push((user_id, role));
    }
    Ok(roles)
}

/// Deletes every mapping of the user, then inserts one per requested role.
async fn replace_groups(
    conn: &mut AnyConnection,
    ctx: &SchemaContext<'_>,
    user: &UserRecord,
    roles: &BTreeSet<String>,
) -> Result<()> {
    if !ctx.installation.companions.user_group_map {
        return Err(CmsError::configuration(format!(
            "Installation '{}' has no group map table, roles cannot be changed",
            ctx.prefix()
        )));
    }

    let mut group_ids = Vec::with_capacity(roles.len());
    for role in roles {
        group_ids.push(resolve_group(conn, ctx, role).await?);
    }

    let mut params = ctx.dialect.params();
    let sql = format!(
        "DELETE FROM {} WHERE user_id = {}",
        ctx.table("user_usergroup_map"),
        params.next_param()
    );
    let deleted = sqlx::query(&sql)
        .bind(user.id)
        .execute(&mut *conn)
        .await
        .map_err(|e| CmsError::query_failed("Failed to clear user groups", e))?;
    tracing::debug!(
        "Removed {} group mappings of '{}'",
        deleted.rows_affected(),
        user.username
    );

    let mut params = ctx.dialect.params();
    let sql = format!(
        "INSERT INTO {} (user_id, group_id) VALUES ({}, {})",
        ctx.table("user_usergroup_map"),
        params.next_param(),
        params.next_param()
    );
    for group_id in group_ids {
        let result = sqlx::query(&sql)
            .bind(user.id)
            .bind(group_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| CmsError::query_failed("Failed to insert user group", e))?;
        expect_rows(
            ctx.prefix(),
            &user.username,
            &format!("user_usergroup_map group {}", group_id),
            1,
            result.rows_affected(),
        )?;
    }

    Ok(())
}

/// Resolves a role title (or a `group <id>` label) to a group id.
async fn resolve_group(
    conn: &mut AnyConnection,
    ctx: &SchemaContext<'_>,
    role: &str,
) -> Result<i64> {
    let unknown = || CmsError::UnknownRole {
        prefix: ctx.prefix().to_string(),
        role: role.to_string(),
    };

    if !ctx.installation.companions.user_groups {
        return parse_group_label(role).ok_or_else(unknown);
    }

    let mut params = ctx.dialect.params();
    let sql = format!(
        "SELECT {} AS id FROM {} WHERE title = {} ORDER BY id",
        ctx.dialect.cast_int("id"),
        ctx.table("usergroups"),
        params.next_param()
    );
    let row = sqlx::query(&sql)
        .bind(role)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| CmsError::query_failed(format!("Failed to look up group '{}'", role), e))?;

    match row {
        Some(row) => row.get_field("id", Some(&ctx.installation.table("usergroups"))),
        None => parse_group_label(role).ok_or_else(unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_labels() {
        assert_eq!(group_label(8), "group 8");
        assert_eq!(parse_group_label("group 8"), Some(8));
        assert_eq!(parse_group_label(" group 12 "), Some(12));
        assert_eq!(parse_group_label("Super Users"), None);
        assert_eq!(parse_group_label("group x"), None);
    }
}
